// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error as ThisError;


/// The error type used throughout the library.
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum Error {
  /// Credentials are missing, expired, or lack the necessary scopes.
  ///
  /// Typically resolved by performing an interactive login.
  #[error("authentication failure: {0}")]
  Auth(String),
  /// The draft request is malformed, either as determined locally or
  /// as reported by the service.
  #[error("invalid draft request: {0}")]
  Validation(String),
  /// The service could not be reached or reported a failure that is
  /// not the request's fault.
  #[error("service failure: {0}")]
  Transient(String),
}

impl From<reqwest::Error> for Error {
  fn from(err: reqwest::Error) -> Self {
    // Status-carrying errors are classified where the response is
    // handled; anything surfacing here is a transport level problem.
    Self::Transient(err.to_string())
  }
}


#[cfg(test)]
mod tests {
  use super::*;


  /// Make sure that errors render a human-readable message.
  #[test]
  fn error_display() {
    let err = Error::Auth("token expired".to_string());
    assert_eq!(err.to_string(), "authentication failure: token expired");

    let err = Error::Validation("no recipients".to_string());
    assert_eq!(err.to_string(), "invalid draft request: no recipients");

    let err = Error::Transient("connection reset".to_string());
    assert_eq!(err.to_string(), "service failure: connection reset");
  }
}
