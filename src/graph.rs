// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use reqwest::Response;
use reqwest::StatusCode;

use serde::Deserialize;
use serde::Serialize;

use crate::Draft;
use crate::Error;


/// The base URL of the Microsoft Graph API.
pub(crate) const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Retrieve the URL of the create-draft endpoint, which stores a new
/// message in the signed-in user's mailbox without sending it.
pub(crate) fn create_message_url() -> String {
  format!("{GRAPH_BASE}/me/messages")
}


/// The content type of a message body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub enum BodyKind {
  /// Plain text.
  #[serde(rename = "Text")]
  Text,
  /// HTML markup, passed through to the service unaltered.
  #[default]
  #[serde(rename = "HTML")]
  Html,
}


/// The body of a Graph message.
#[derive(Debug, Serialize)]
pub(crate) struct Body<'draft> {
  #[serde(rename = "contentType")]
  pub content_type: BodyKind,
  pub content: &'draft str,
}


/// A single message recipient, in the doubly nested shape the Graph
/// API insists on.
#[derive(Debug, Serialize)]
pub(crate) struct Recipient<'draft> {
  #[serde(rename = "emailAddress")]
  pub email_address: EmailAddress<'draft>,
}

#[derive(Debug, Serialize)]
pub(crate) struct EmailAddress<'draft> {
  pub address: &'draft str,
}


/// The payload of a create-draft request.
#[derive(Debug, Serialize)]
pub(crate) struct Message<'draft> {
  pub subject: &'draft str,
  pub body: Body<'draft>,
  #[serde(rename = "toRecipients")]
  pub to_recipients: Vec<Recipient<'draft>>,
  #[serde(rename = "ccRecipients", skip_serializing_if = "Vec::is_empty")]
  pub cc_recipients: Vec<Recipient<'draft>>,
  #[serde(rename = "bccRecipients", skip_serializing_if = "Vec::is_empty")]
  pub bcc_recipients: Vec<Recipient<'draft>>,
}

impl<'draft> From<&'draft Draft> for Message<'draft> {
  fn from(draft: &'draft Draft) -> Self {
    fn recipients(addresses: &[String]) -> Vec<Recipient<'_>> {
      addresses
        .iter()
        .map(|address| Recipient {
          email_address: EmailAddress { address },
        })
        .collect()
    }

    Self {
      subject: &draft.subject,
      body: Body {
        content_type: draft.body_kind,
        content: &draft.body,
      },
      to_recipients: recipients(&draft.to),
      cc_recipients: recipients(&draft.cc),
      bcc_recipients: recipients(&draft.bcc),
    }
  }
}


/// The subset of the Graph response to a create-draft request that we
/// care about.
#[derive(Debug, Deserialize)]
pub struct CreatedDraft {
  /// The identifier of the newly created draft message.
  pub id: String,
  /// A link for opening the draft in Outlook on the web.
  #[serde(rename = "webLink")]
  pub web_link: Option<String>,
}


/// Map a non-success HTTP status to an error of the appropriate class.
pub(crate) fn classify_status(status: StatusCode, detail: &str) -> Error {
  match status {
    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth(format!(
      "service rejected credentials ({status}): {detail}"
    )),
    StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Error::Validation(format!(
      "service rejected request ({status}): {detail}"
    )),
    _ => Error::Transient(format!("service reported failure ({status}): {detail}")),
  }
}

/// Check a Graph response for success, turning failures into an error
/// carrying whatever detail the service provided.
pub(crate) async fn check_response(response: Response) -> Result<Response, Error> {
  let status = response.status();
  if status.is_success() {
    Ok(response)
  } else {
    let detail = response.text().await.unwrap_or_default();
    let detail = error_detail(&detail);
    Err(classify_status(status, &detail))
  }
}

/// Extract the human-readable message from a Graph error body, falling
/// back to the raw body if it does not have the expected shape.
fn error_detail(body: &str) -> String {
  #[derive(Deserialize)]
  struct ErrorBody {
    error: ErrorDetail,
  }

  #[derive(Deserialize)]
  struct ErrorDetail {
    message: String,
  }

  match serde_json::from_str::<ErrorBody>(body) {
    Ok(parsed) => parsed.error.message,
    Err(..) => body.trim().to_string(),
  }
}
