// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use reqwest::StatusCode;

use serde::Deserialize;
use serde::Serialize;

use tokio::fs::create_dir_all;
use tokio::fs::read;
use tokio::fs::write;
use tokio::time::sleep;

use tracing::debug;

use crate::config::Account;
use crate::Error;


/// The base URL of the Microsoft identity platform.
const AUTHORITY_BASE: &str = "https://login.microsoftonline.com";
/// The scopes requested on login. Unlike with MSAL, `offline_access`
/// has to be spelled out here or no refresh token is issued.
const SCOPES: &str = "User.Read Mail.ReadWrite offline_access";
/// The grant type identifying device-code token requests.
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
/// Leeway subtracted from the cached access token's lifetime, in
/// seconds, so that we do not present a token that expires mid-flight.
const EXPIRY_SKEW: u64 = 60;


/// Retrieve the current time as seconds since the Unix epoch.
fn now() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|duration| duration.as_secs())
    .unwrap_or(0)
}


/// The cached result of a successful token acquisition, persisted
/// between invocations.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
struct TokenCache {
  /// The access token presented to the Graph API.
  access_token: String,
  /// The time at which `access_token` expires, in seconds since the
  /// Unix epoch.
  expires_at: u64,
  /// The refresh token used to acquire a new access token silently.
  refresh_token: String,
}

impl TokenCache {
  /// Load the token cache, reporting its absence as `None`.
  async fn load(path: &Path) -> Result<Option<Self>, Error> {
    let data = match read(path).await {
      Ok(data) => data,
      Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
      Err(err) => {
        return Err(Error::Auth(format!(
          "failed to read token cache `{}`: {err}",
          path.display()
        )))
      },
    };

    let cache = serde_json::from_slice::<Self>(&data).map_err(|err| {
      Error::Auth(format!(
        "token cache `{}` is corrupt ({err}): run `draft-message --login` to reconnect",
        path.display()
      ))
    })?;
    Ok(Some(cache))
  }

  /// Persist the token cache, readable only by the owning user.
  async fn save(&self, path: &Path) -> Result<(), Error> {
    let data = serde_json::to_vec(self)
      .map_err(|err| Error::Transient(format!("failed to serialize token cache: {err}")))?;

    // The cache may live in a directory that no invocation created so
    // far, e.g., when the account is configured through the
    // environment only.
    if let Some(dir) = path.parent() {
      let () = create_dir_all(dir).await.map_err(|err| {
        Error::Transient(format!(
          "failed to create token cache directory `{}`: {err}",
          dir.display()
        ))
      })?;
    }

    let () = write(path, data).await.map_err(|err| {
      Error::Transient(format!(
        "failed to write token cache `{}`: {err}",
        path.display()
      ))
    })?;

    #[cfg(unix)]
    {
      use std::fs::Permissions;
      use std::os::unix::fs::PermissionsExt as _;

      let () = tokio::fs::set_permissions(path, Permissions::from_mode(0o600))
        .await
        .map_err(|err| {
          Error::Transient(format!(
            "failed to restrict permissions on token cache `{}`: {err}",
            path.display()
          ))
        })?;
    }

    debug!(path = %path.display(), "token cache saved");
    Ok(())
  }

  /// Check whether the cached access token is still usable at the
  /// provided point in time.
  fn is_fresh(&self, now: u64) -> bool {
    self.expires_at > now.saturating_add(EXPIRY_SKEW)
  }
}


/// The identity platform's response to a device authorization request.
#[derive(Debug, Deserialize)]
pub struct DeviceAuthorization {
  /// The code with which to poll for a token.
  device_code: String,
  /// The full instruction string, meant to be displayed verbatim. It
  /// already names the verification URI and the code to enter there.
  pub message: String,
  /// The number of seconds before `device_code` expires.
  expires_in: u64,
  /// The polling interval to honor, in seconds.
  #[serde(default = "default_poll_interval")]
  interval: u64,
}

fn default_poll_interval() -> u64 {
  5
}


/// A successful token endpoint response.
#[derive(Debug, Deserialize)]
struct Tokens {
  access_token: String,
  expires_in: u64,
  #[serde(default)]
  refresh_token: Option<String>,
}

/// A failed token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenError {
  error: String,
  #[serde(default)]
  error_description: String,
}


/// The outcome of a single device-code poll.
#[derive(Debug)]
enum Poll {
  /// The user completed the login.
  Granted(Tokens),
  /// The user has not entered the code yet; keep polling.
  Pending,
  /// The service asked us to back off; keep polling more slowly.
  SlowDown,
}

/// Interpret a token endpoint response to a device-code poll.
fn classify_poll(status: StatusCode, body: &str) -> Result<Poll, Error> {
  if status.is_success() {
    let tokens = serde_json::from_str::<Tokens>(body)
      .map_err(|err| Error::Transient(format!("failed to parse token response: {err}")))?;
    return Ok(Poll::Granted(tokens))
  }

  let error = serde_json::from_str::<TokenError>(body)
    .map_err(|err| Error::Transient(format!("failed to parse token error response: {err}")))?;

  match error.error.as_str() {
    "authorization_pending" => Ok(Poll::Pending),
    "slow_down" => Ok(Poll::SlowDown),
    "expired_token" => Err(Error::Auth(
      "the device code expired before the login was completed; please retry".to_string(),
    )),
    "authorization_declined" | "access_denied" => {
      Err(Error::Auth("the login request was declined".to_string()))
    },
    _ => Err(Error::Auth(format!(
      "login failed ({}): {}",
      error.error, error.error_description
    ))),
  }
}

/// Interpret a token endpoint response to a refresh token redemption.
fn classify_refresh(status: StatusCode, body: &str) -> Result<Tokens, Error> {
  if status.is_success() {
    let tokens = serde_json::from_str::<Tokens>(body)
      .map_err(|err| Error::Transient(format!("failed to parse token response: {err}")))?;
    return Ok(tokens)
  }

  if status.is_client_error() {
    let detail = serde_json::from_str::<TokenError>(body)
      .map(|error| error.error_description)
      .unwrap_or_else(|_| body.trim().to_string());
    Err(Error::Auth(format!(
      "login session expired or was revoked ({detail}): run `draft-message --login` to reconnect"
    )))
  } else {
    Err(Error::Transient(format!(
      "token service reported failure ({status}): {}",
      body.trim()
    )))
  }
}


/// A type handling token acquisition for a single account, fronting
/// the on-disk token cache.
#[derive(Debug)]
pub(crate) struct Authenticator {
  /// The account to acquire tokens for.
  account: Account,
  /// The HTTP client used for token endpoint requests.
  http: reqwest::Client,
}

impl Authenticator {
  pub(crate) fn new(account: Account, http: reqwest::Client) -> Self {
    Self { account, http }
  }

  fn device_code_url(&self) -> String {
    format!(
      "{AUTHORITY_BASE}/{}/oauth2/v2.0/devicecode",
      self.account.tenant_id
    )
  }

  fn token_url(&self) -> String {
    format!(
      "{AUTHORITY_BASE}/{}/oauth2/v2.0/token",
      self.account.tenant_id
    )
  }

  /// Persist freshly acquired tokens, carrying over the previous
  /// refresh token if the service did not rotate it.
  async fn store(&self, tokens: Tokens, previous: Option<&str>) -> Result<String, Error> {
    let Tokens {
      access_token,
      expires_in,
      refresh_token,
    } = tokens;

    let refresh_token = refresh_token
      .or_else(|| previous.map(ToString::to_string))
      .ok_or_else(|| {
        Error::Auth(
          "the token service issued no refresh token; check that the app registration permits \
           offline access"
            .to_string(),
        )
      })?;

    let cache = TokenCache {
      access_token,
      expires_at: now().saturating_add(expires_in),
      refresh_token,
    };
    let () = cache.save(&self.account.token_cache).await?;
    Ok(cache.access_token)
  }

  /// Acquire an access token without user interaction, from the cache
  /// or by redeeming the cached refresh token.
  pub(crate) async fn access_token(&self) -> Result<String, Error> {
    let cache = TokenCache::load(&self.account.token_cache).await?;
    let Some(cache) = cache else {
      return Err(Error::Auth(format!(
        "not logged in (no token cache at `{}`): run `draft-message --login` to connect the \
         account",
        self.account.token_cache.display()
      )))
    };

    if cache.is_fresh(now()) {
      debug!("using cached access token");
      return Ok(cache.access_token)
    }

    debug!("cached access token expired; redeeming refresh token");
    let params = [
      ("client_id", self.account.client_id.as_str()),
      ("grant_type", "refresh_token"),
      ("refresh_token", cache.refresh_token.as_str()),
      ("scope", SCOPES),
    ];
    let response = self.http.post(self.token_url()).form(&params).send().await?;
    let status = response.status();
    let body = response.text().await?;
    let tokens = classify_refresh(status, &body)?;

    self.store(tokens, Some(&cache.refresh_token)).await
  }

  /// Start a device-code login, returning the authorization whose
  /// `message` the caller is expected to surface to the user.
  pub(crate) async fn begin_device_login(&self) -> Result<DeviceAuthorization, Error> {
    let params = [
      ("client_id", self.account.client_id.as_str()),
      ("scope", SCOPES),
    ];
    let response = self
      .http
      .post(self.device_code_url())
      .form(&params)
      .send()
      .await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
      let detail = serde_json::from_str::<TokenError>(&body)
        .map(|error| error.error_description)
        .unwrap_or_else(|_| body.trim().to_string());
      return Err(Error::Auth(format!(
        "failed to start device login ({status}): {detail}"
      )))
    }

    serde_json::from_str::<DeviceAuthorization>(&body).map_err(|err| {
      Error::Transient(format!(
        "failed to parse device authorization response: {err}"
      ))
    })
  }

  /// Poll the token endpoint until the user completed the device-code
  /// login, then persist the acquired tokens.
  pub(crate) async fn finish_device_login(
    &self,
    authorization: DeviceAuthorization,
  ) -> Result<(), Error> {
    let deadline = Instant::now() + Duration::from_secs(authorization.expires_in);
    let mut interval = Duration::from_secs(authorization.interval);

    loop {
      let () = sleep(interval).await;

      if Instant::now() >= deadline {
        return Err(Error::Auth(
          "the device code expired before the login was completed; please retry".to_string(),
        ))
      }

      let params = [
        ("client_id", self.account.client_id.as_str()),
        ("grant_type", DEVICE_CODE_GRANT),
        ("device_code", authorization.device_code.as_str()),
      ];
      let response = self.http.post(self.token_url()).form(&params).send().await?;
      let status = response.status();
      let body = response.text().await?;

      match classify_poll(status, &body)? {
        Poll::Granted(tokens) => {
          let _token = self.store(tokens, None).await?;
          debug!("device login completed");
          return Ok(())
        },
        Poll::Pending => (),
        Poll::SlowDown => interval += Duration::from_secs(5),
      }
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  use std::path::PathBuf;

  use tempfile::TempDir;

  use tokio::test;


  fn account(cache: PathBuf) -> Account {
    Account {
      client_id: "client".to_string(),
      tenant_id: "tenant".to_string(),
      token_cache: cache,
    }
  }

  /// Check that the token cache round-trips through its on-disk
  /// representation and ends up readable only by the user.
  #[test]
  async fn token_cache_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");
    let cache = TokenCache {
      access_token: "access".to_string(),
      expires_at: 1234,
      refresh_token: "refresh".to_string(),
    };

    let () = cache.save(&path).await.unwrap();
    let loaded = TokenCache::load(&path).await.unwrap().unwrap();
    assert_eq!(loaded, cache);

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt as _;

      let mode = std::fs::metadata(&path).unwrap().permissions().mode();
      assert_eq!(mode & 0o777, 0o600);
    }
  }

  /// Check that saving the cache creates its directory if necessary,
  /// as is the case on first login with an environment-only account.
  #[test]
  async fn cache_directory_created_on_save() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("draft-message").join("token-cache.json");
    let cache = TokenCache {
      access_token: "access".to_string(),
      expires_at: 1234,
      refresh_token: "refresh".to_string(),
    };

    let () = cache.save(&path).await.unwrap();
    let loaded = TokenCache::load(&path).await.unwrap().unwrap();
    assert_eq!(loaded, cache);
  }

  /// Check that the absence of a cache file is not an error.
  #[test]
  async fn missing_token_cache() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("no-cache.json");
    assert!(TokenCache::load(&path).await.unwrap().is_none());
  }

  /// Check that a corrupt cache file points the user at the login
  /// flow.
  #[test]
  async fn corrupt_token_cache() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");
    let () = tokio::fs::write(&path, b"not json").await.unwrap();

    let err = TokenCache::load(&path).await.unwrap_err();
    assert!(matches!(err, Error::Auth(..)), "{err}");
    assert!(err.to_string().contains("--login"), "{err}");
  }

  /// Check the expiry logic, including the safety margin.
  #[test]
  async fn token_freshness() {
    let cache = TokenCache {
      access_token: "access".to_string(),
      expires_at: 1000,
      refresh_token: "refresh".to_string(),
    };

    assert!(cache.is_fresh(0));
    assert!(cache.is_fresh(1000 - EXPIRY_SKEW - 1));
    assert!(!cache.is_fresh(1000 - EXPIRY_SKEW));
    assert!(!cache.is_fresh(1000));
    assert!(!cache.is_fresh(2000));
  }

  /// Check that silent token acquisition without a cache fails with an
  /// authentication error and no network traffic.
  #[test]
  async fn silent_acquisition_requires_login() {
    let dir = TempDir::new().unwrap();
    let auth = Authenticator::new(
      account(dir.path().join("no-cache.json")),
      reqwest::Client::new(),
    );

    let err = auth.access_token().await.unwrap_err();
    assert!(matches!(err, Error::Auth(..)), "{err}");
    assert!(err.to_string().contains("--login"), "{err}");
  }

  /// Check that a device authorization response parses, tolerating
  /// the additional members the service sends and defaulting the
  /// polling interval when absent.
  #[test]
  async fn device_authorization_parsing() {
    let body = r#"{
      "device_code": "dc",
      "user_code": "ABC123",
      "verification_uri": "https://microsoft.com/devicelogin",
      "message": "To sign in, enter the code ABC123.",
      "expires_in": 900
    }"#;

    let authorization = serde_json::from_str::<DeviceAuthorization>(body).unwrap();
    assert_eq!(authorization.message, "To sign in, enter the code ABC123.");
    assert_eq!(authorization.device_code, "dc");
    assert_eq!(authorization.interval, default_poll_interval());
  }

  /// Check the interpretation of device-code poll responses.
  #[test]
  async fn poll_classification() {
    let body = r#"{"access_token": "at", "expires_in": 3600, "refresh_token": "rt"}"#;
    let poll = classify_poll(StatusCode::OK, body).unwrap();
    assert!(matches!(poll, Poll::Granted(..)), "{poll:?}");

    let body = r#"{"error": "authorization_pending"}"#;
    let poll = classify_poll(StatusCode::BAD_REQUEST, body).unwrap();
    assert!(matches!(poll, Poll::Pending), "{poll:?}");

    let body = r#"{"error": "slow_down"}"#;
    let poll = classify_poll(StatusCode::BAD_REQUEST, body).unwrap();
    assert!(matches!(poll, Poll::SlowDown), "{poll:?}");

    let body = r#"{"error": "expired_token"}"#;
    let err = classify_poll(StatusCode::BAD_REQUEST, body).unwrap_err();
    assert!(matches!(err, Error::Auth(..)), "{err}");

    let body = r#"{"error": "authorization_declined"}"#;
    let err = classify_poll(StatusCode::BAD_REQUEST, body).unwrap_err();
    assert!(matches!(err, Error::Auth(..)), "{err}");
  }

  /// Check the interpretation of refresh token redemption responses.
  #[test]
  async fn refresh_classification() {
    let body = r#"{"access_token": "at", "expires_in": 3600}"#;
    let tokens = classify_refresh(StatusCode::OK, body).unwrap();
    assert_eq!(tokens.access_token, "at");
    assert_eq!(tokens.refresh_token, None);

    let body = r#"{"error": "invalid_grant", "error_description": "expired"}"#;
    let err = classify_refresh(StatusCode::BAD_REQUEST, body).unwrap_err();
    assert!(matches!(err, Error::Auth(..)), "{err}");
    assert!(err.to_string().contains("--login"), "{err}");

    let err = classify_refresh(StatusCode::SERVICE_UNAVAILABLE, "oops").unwrap_err();
    assert!(matches!(err, Error::Transient(..)), "{err}");
  }
}
