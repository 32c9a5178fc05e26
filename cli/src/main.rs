// Copyright (C) 2026 Daniel Mueller <deso@posteo.net>
// SPDX-License-Identifier: GPL-3.0-or-later

#![allow(clippy::collapsible_if, clippy::let_and_return, clippy::let_unit_value)]

mod args;

use std::env::args_os;
use std::env::var_os;
use std::ffi::OsString;

use clap::Parser as _;

use anyhow::Context as _;
use anyhow::Result;

use drafty::Account;
use drafty::BodyKind;
use drafty::Client;
use drafty::Draft;

use tracing::subscriber::set_global_default as set_global_subscriber;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::FmtSubscriber;

use crate::args::Args;


/// Perform an interactive device-code login for the account.
async fn login(client: &Client) -> Result<()> {
  let authorization = client.begin_login().await?;
  // The message contains the verification URI and the code to enter
  // there; display it verbatim and wait for the user to comply.
  println!("{}", authorization.message);

  let () = client.finish_login(authorization).await?;
  println!("Login succeeded. Credentials are cached and will be refreshed automatically.");
  Ok(())
}


async fn run_impl(args: Args) -> Result<()> {
  let Args {
    to,
    cc,
    bcc,
    subject,
    body,
    content_type,
    login: interactive_login,
    config,
    verbosity: _,
  } = args;

  let account = Account::load(config)
    .await
    .context("failed to load account configuration")?;
  let client = Client::new(account).context("failed to create mail service client")?;

  if interactive_login {
    return login(&client).await
  }

  // Presence of subject and body is enforced at the argument parsing
  // level for draft invocations.
  let subject = subject.unwrap_or_default();
  let body = body.unwrap_or_default();

  let draft =
    Draft::new(&to, &cc, &bcc, subject, body)?.with_body_kind(BodyKind::from(content_type));
  let created = client
    .create_draft(&draft)
    .await
    .context("failed to create draft")?;

  println!("{}", created.id);
  Ok(())
}

fn setup_tracing(verbosity: u8) -> Result<()> {
  let builder =
    FmtSubscriber::builder().with_timer(ChronoLocal::new("%Y-%m-%dT%H:%M:%S%.3f%:z".to_string()));

  if verbosity != 0 {
    let level = match verbosity {
      0 => LevelFilter::WARN,
      1 => LevelFilter::INFO,
      2 => LevelFilter::DEBUG,
      _ => LevelFilter::TRACE,
    };
    let subscriber = builder.with_max_level(level).finish();
    let () =
      set_global_subscriber(subscriber).with_context(|| "failed to set tracing subscriber")?;
  } else {
    let directive = var_os(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    let directive = directive
      .to_str()
      .with_context(|| format!("env var `{}` is not valid UTF-8", EnvFilter::DEFAULT_ENV))?;

    let subscriber = builder.with_env_filter(EnvFilter::new(directive)).finish();
    let () =
      set_global_subscriber(subscriber).with_context(|| "failed to set tracing subscriber")?;
  }
  Ok(())
}


/// Run the program and report errors, if any.
async fn run<A, T>(args: A) -> Result<()>
where
  A: IntoIterator<Item = T>,
  T: Into<OsString> + Clone,
{
  let args = match Args::try_parse_from(args) {
    Ok(args) => args,
    Err(err) => match err.kind() {
      clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
        print!("{}", err);
        return Ok(())
      },
      _ => return Err(err.into()),
    },
  };

  let () = setup_tracing(args.verbosity)?;

  run_impl(args).await
}


#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  run(args_os()).await
}
