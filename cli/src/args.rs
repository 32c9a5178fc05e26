// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;

use clap::ArgAction;
use clap::Parser;
use clap::ValueEnum;

use drafty::BodyKind;


/// A program for creating draft emails in a Microsoft 365 mailbox.
#[derive(Debug, Parser)]
#[clap(version = env!("VERSION"))]
pub(crate) struct Args {
  /// One or more recipient email addresses.
  #[clap(long, num_args(1..), required_unless_present = "login")]
  pub to: Vec<String>,
  /// Carbon copy recipient email addresses.
  #[clap(long, num_args(1..))]
  pub cc: Vec<String>,
  /// Blind carbon copy recipient email addresses.
  #[clap(long, num_args(1..))]
  pub bcc: Vec<String>,
  /// The subject to use for the draft; may be empty.
  #[clap(short, long, required_unless_present = "login")]
  pub subject: Option<String>,
  /// The body of the draft; may be empty and may contain HTML.
  #[clap(short, long, required_unless_present = "login")]
  pub body: Option<String>,
  /// The content type of the body.
  #[clap(long, value_enum, default_value_t = ContentType::Html)]
  pub content_type: ContentType,
  /// Perform an interactive login instead of creating a draft.
  #[clap(long)]
  pub login: bool,
  /// The path to the configuration file.
  #[clap(short, long)]
  pub config: Option<PathBuf>,
  /// Increase verbosity (can be supplied multiple times).
  #[clap(short = 'v', long = "verbose", action = ArgAction::Count)]
  pub verbosity: u8,
}


/// How the service should interpret the draft's body.
#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
pub(crate) enum ContentType {
  /// Plain text.
  Text,
  /// HTML markup, passed through unaltered.
  Html,
}

impl From<ContentType> for BodyKind {
  fn from(content_type: ContentType) -> Self {
    match content_type {
      ContentType::Text => BodyKind::Text,
      ContentType::Html => BodyKind::Html,
    }
  }
}
