// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::env::var_os;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use tokio::fs::read;

use crate::Error;


/// The name of the environment variable overriding the configured
/// application (client) ID.
pub const CLIENT_ID_ENV: &str = "AZURE_CLIENT_ID";
/// The name of the environment variable overriding the configured
/// directory (tenant) ID.
pub const TENANT_ID_ENV: &str = "AZURE_TENANT_ID";

/// The file name used for the token cache unless configured otherwise.
const TOKEN_CACHE_FILE: &str = "token-cache.json";


/// Retrieve the path to the program's per-user configuration file.
pub fn system_config_path() -> Result<PathBuf, Error> {
  let mut dir = if let Some(dir) = var_os("XDG_CONFIG_HOME") {
    PathBuf::from(dir)
  } else if let Some(home) = var_os("HOME") {
    Path::new(&home).join(".config")
  } else {
    return Err(Error::Auth(
      "unable to determine configuration directory: neither XDG_CONFIG_HOME nor HOME is set"
        .to_string(),
    ))
  };

  let () = dir.push("draft-message");
  let () = dir.push("config.json");
  Ok(dir)
}


/// The on-disk shape of the configuration file. All members are
/// optional here; completeness is checked only after environment
/// variable overrides have been applied.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
  /// The application (client) ID of the Azure app registration.
  client_id: Option<String>,
  /// The directory (tenant) ID to authenticate against.
  tenant_id: Option<String>,
  /// The path at which to store cached tokens.
  token_cache: Option<PathBuf>,
}


/// A type representing a single Microsoft 365 account.
#[derive(Clone, Debug)]
pub struct Account {
  /// The application (client) ID of the Azure app registration.
  pub client_id: String,
  /// The directory (tenant) ID to authenticate against.
  pub tenant_id: String,
  /// The path at which cached tokens are stored.
  pub token_cache: PathBuf,
}

impl Account {
  /// Load the account configuration.
  ///
  /// If `config` is `None` the per-user configuration file is
  /// consulted, but it is acceptable for it to be absent as long as
  /// the `AZURE_CLIENT_ID` and `AZURE_TENANT_ID` environment
  /// variables supply the necessary data. An explicitly provided path
  /// has to exist.
  pub async fn load(config: Option<PathBuf>) -> Result<Self, Error> {
    let env_client_id = var_os(CLIENT_ID_ENV).map(|id| id.to_string_lossy().into_owned());
    let env_tenant_id = var_os(TENANT_ID_ENV).map(|id| id.to_string_lossy().into_owned());

    Self::load_impl(config, env_client_id, env_tenant_id).await
  }

  async fn load_impl(
    config: Option<PathBuf>,
    env_client_id: Option<String>,
    env_tenant_id: Option<String>,
  ) -> Result<Self, Error> {
    let explicit = config.is_some();
    let path = if let Some(config) = config {
      config
    } else {
      system_config_path()?
    };

    let file = match read(&path).await {
      Ok(data) => serde_json::from_slice::<ConfigFile>(&data).map_err(|err| {
        Error::Validation(format!(
          "failed to parse `{}` contents as JSON: {err}",
          path.display()
        ))
      })?,
      Err(err) if err.kind() == ErrorKind::NotFound && !explicit => ConfigFile::default(),
      Err(err) => {
        return Err(Error::Auth(format!(
          "failed to read configuration file `{}`: {err}",
          path.display()
        )))
      },
    };

    let cache_default = path
      .parent()
      .map(|dir| dir.join(TOKEN_CACHE_FILE))
      .unwrap_or_else(|| PathBuf::from(TOKEN_CACHE_FILE));

    resolve(file, env_client_id, env_tenant_id, cache_default)
  }
}


/// Merge the configuration file contents with environment variable
/// overrides, checking for completeness.
fn resolve(
  file: ConfigFile,
  env_client_id: Option<String>,
  env_tenant_id: Option<String>,
  cache_default: PathBuf,
) -> Result<Account, Error> {
  let ConfigFile {
    client_id,
    tenant_id,
    token_cache,
  } = file;

  let client_id = env_client_id.or(client_id).ok_or_else(|| {
    Error::Auth(format!(
      "no client ID configured: set `client_id` in the configuration file or export {CLIENT_ID_ENV}"
    ))
  })?;
  let tenant_id = env_tenant_id.or(tenant_id).ok_or_else(|| {
    Error::Auth(format!(
      "no tenant ID configured: set `tenant_id` in the configuration file or export {TENANT_ID_ENV}"
    ))
  })?;

  Ok(Account {
    client_id,
    tenant_id,
    token_cache: token_cache.unwrap_or(cache_default),
  })
}


#[cfg(test)]
mod tests {
  use super::*;

  use tempfile::TempDir;

  use tokio::test;


  /// Check that environment variables take precedence over the
  /// configuration file.
  #[test]
  async fn environment_overrides_file() {
    let file = ConfigFile {
      client_id: Some("file-client".to_string()),
      tenant_id: Some("file-tenant".to_string()),
      token_cache: None,
    };
    let account = resolve(
      file,
      Some("env-client".to_string()),
      None,
      PathBuf::from("cache.json"),
    )
    .unwrap();

    assert_eq!(account.client_id, "env-client");
    assert_eq!(account.tenant_id, "file-tenant");
    assert_eq!(account.token_cache, PathBuf::from("cache.json"));
  }

  /// Check that a missing client or tenant ID is reported as an
  /// authentication problem.
  #[test]
  async fn missing_ids_are_reported() {
    let err = resolve(ConfigFile::default(), None, None, PathBuf::new()).unwrap_err();
    assert!(matches!(err, Error::Auth(..)), "{err}");
    assert!(err.to_string().contains("client ID"), "{err}");

    let err = resolve(
      ConfigFile::default(),
      Some("client".to_string()),
      None,
      PathBuf::new(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("tenant ID"), "{err}");
  }

  /// Check that we can load a configuration file, with the token cache
  /// path defaulting to a sibling of the file.
  #[test]
  async fn load_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    let data = r#"{"client_id": "id1", "tenant_id": "id2"}"#;
    let () = tokio::fs::write(&path, data).await.unwrap();

    let account = Account::load_impl(Some(path), None, None).await.unwrap();
    assert_eq!(account.client_id, "id1");
    assert_eq!(account.tenant_id, "id2");
    assert_eq!(account.token_cache, dir.path().join(TOKEN_CACHE_FILE));
  }

  /// Check that an explicitly provided but non-existent configuration
  /// file path is flagged.
  #[test]
  async fn explicit_config_must_exist() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("no-such-config.json");

    let err = Account::load_impl(Some(path), None, None).await.unwrap_err();
    assert!(matches!(err, Error::Auth(..)), "{err}");
    assert!(err.to_string().contains("no-such-config.json"), "{err}");
  }
}
