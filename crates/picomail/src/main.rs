//! `picomail` - one-shot SMTP sender
//!
//! Sends one message to each recipient over a single SMTP session. Works
//! for email-to-SMS gateways as well as ordinary mailboxes.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod settings;

use std::io::Read;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use picomail_smtp::Client;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use settings::{Cli, PASSWORD_ENV, Settings};

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "picomail=info,picomail_smtp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(&Cli::parse()) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            error!(failed, "Some recipients were not reached");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Sends the message and returns the number of recipients that failed.
fn run(cli: &Cli) -> Result<usize> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    settings.apply(cli, std::env::var(PASSWORD_ENV).ok())?;
    settings
        .smtp
        .validate()
        .context("Incomplete SMTP configuration")?;

    let body = match &cli.body {
        Some(body) => body.clone(),
        None => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .context("Failed to read message body from stdin")?;
            body
        }
    };

    info!(
        server = %settings.smtp.address(),
        recipients = cli.recipients.len(),
        "Sending message"
    );
    let mut client = Client::open(settings.smtp.clone())
        .with_context(|| format!("Failed to open session with {}", settings.smtp.address()))?;

    let mut failed = 0;
    for (index, recipient) in cli.recipients.iter().enumerate() {
        match deliver(&mut client, recipient, &settings.headers, &body, cli.mime) {
            Ok(()) => info!(%recipient, "Delivered"),
            Err(e) => {
                error!(%recipient, "{e:#}");
                failed += 1;
                if !client.is_connected() {
                    // Later recipients would only fail the same way
                    failed += cli.recipients.len() - index - 1;
                    break;
                }
            }
        }
    }

    client.quit();
    Ok(failed)
}

fn deliver(
    client: &mut Client,
    recipient: &str,
    headers: &[String],
    body: &str,
    mime: bool,
) -> Result<()> {
    client.to(recipient).context("Recipient not accepted")?;
    for header in headers {
        client.write(header.as_str())?;
    }
    client.send(body, mime).context("Message not accepted")?;
    Ok(())
}
