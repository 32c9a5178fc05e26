// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

//! A library for creating draft emails in a Microsoft 365 mailbox via
//! the Microsoft Graph API.
//!
//! A draft is created in the signed-in user's mailbox; no email is
//! ever sent. Authentication uses the OAuth2 device-code flow with an
//! on-disk token cache, so that after a one-time interactive login
//! subsequent invocations run without user interaction.

#![allow(clippy::collapsible_else_if, clippy::let_and_return, clippy::let_unit_value)]

mod auth;
mod config;
mod error;
mod graph;

use std::time::Duration;

use tracing::debug;
use tracing::info;

use crate::auth::Authenticator;

pub use crate::auth::DeviceAuthorization;
pub use crate::config::system_config_path;
pub use crate::config::Account;
pub use crate::config::CLIENT_ID_ENV;
pub use crate::config::TENANT_ID_ENV;
pub use crate::error::Error;
pub use crate::graph::BodyKind;
pub use crate::graph::CreatedDraft;


/// The timeout applied to individual HTTP requests, in seconds.
const REQUEST_TIMEOUT: u64 = 30;


/// Normalize a list of recipient arguments into individual email
/// addresses.
///
/// Each argument may itself contain multiple addresses separated by
/// commas or whitespace. An address without an `@` is rejected.
fn normalize_recipients(input: &[String]) -> Result<Vec<String>, Error> {
  let mut addresses = Vec::new();

  for entry in input {
    for part in entry.replace(',', " ").split_whitespace() {
      if !part.contains('@') {
        return Err(Error::Validation(format!(
          "malformed recipient address `{part}`"
        )))
      }
      let () = addresses.push(part.to_string());
    }
  }
  Ok(addresses)
}


/// An email draft to be created in the user's mailbox.
#[derive(Clone, Debug)]
pub struct Draft {
  /// The list of primary recipients. Never empty.
  pub to: Vec<String>,
  /// The list of carbon copy recipients.
  pub cc: Vec<String>,
  /// The list of blind carbon copy recipients.
  pub bcc: Vec<String>,
  /// The subject line.
  pub subject: String,
  /// The message body, passed through to the service verbatim.
  pub body: String,
  /// How the service should interpret the body.
  pub body_kind: BodyKind,
}

impl Draft {
  /// Create a draft from raw recipient arguments, normalizing and
  /// validating them in the process.
  ///
  /// The subject and body may be empty, but at least one `to`
  /// recipient has to be present.
  pub fn new(
    to: &[String],
    cc: &[String],
    bcc: &[String],
    subject: String,
    body: String,
  ) -> Result<Self, Error> {
    let to = normalize_recipients(to)?;
    if to.is_empty() {
      return Err(Error::Validation(
        "at least one recipient is required".to_string(),
      ))
    }

    Ok(Self {
      to,
      cc: normalize_recipients(cc)?,
      bcc: normalize_recipients(bcc)?,
      subject,
      body,
      body_kind: BodyKind::default(),
    })
  }

  /// Change how the service should interpret the body.
  pub fn with_body_kind(mut self, body_kind: BodyKind) -> Self {
    self.body_kind = body_kind;
    self
  }
}


/// A client for the mailbox of a single Microsoft 365 account.
#[derive(Debug)]
pub struct Client {
  /// The token acquisition handler.
  auth: Authenticator,
  /// The HTTP client used for Graph API requests.
  http: reqwest::Client,
}

impl Client {
  /// Create a client for the provided account.
  pub fn new(account: Account) -> Result<Self, Error> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(REQUEST_TIMEOUT))
      .build()?;
    let auth = Authenticator::new(account, http.clone());

    Ok(Self { auth, http })
  }

  /// Create the provided draft in the account's mailbox, returning
  /// the service-assigned identifier of the new draft message.
  ///
  /// Exactly one draft is created per call and no email is sent. No
  /// retrying takes place; any failure is reported to the caller.
  pub async fn create_draft(&self, draft: &Draft) -> Result<CreatedDraft, Error> {
    let token = self.auth.access_token().await?;
    let message = graph::Message::from(draft);
    debug!(
      recipients = draft.to.len(),
      subject = %draft.subject,
      "submitting create-draft request"
    );

    let response = self
      .http
      .post(graph::create_message_url())
      .bearer_auth(&token)
      .json(&message)
      .send()
      .await?;
    let response = graph::check_response(response).await?;

    let created = response
      .json::<CreatedDraft>()
      .await
      .map_err(|err| Error::Transient(format!("failed to parse create-draft response: {err}")))?;
    info!(id = %created.id, "draft created");
    Ok(created)
  }

  /// Start an interactive device-code login.
  ///
  /// The returned authorization's `message` is meant to be displayed
  /// to the user; [`finish_login`][Self::finish_login] then waits for
  /// the login to complete.
  pub async fn begin_login(&self) -> Result<DeviceAuthorization, Error> {
    self.auth.begin_device_login().await
  }

  /// Wait for the user to complete a device-code login and persist
  /// the acquired credentials.
  pub async fn finish_login(&self, authorization: DeviceAuthorization) -> Result<(), Error> {
    self.auth.finish_device_login(authorization).await
  }
}
