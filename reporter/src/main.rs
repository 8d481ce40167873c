//! Presence Reporter - command-line entry point.
//!
//! Posts one report per invocation to the Presence server. Built for the
//! channels where a full desktop client is overkill: phone shortcut
//! automations, watch exporters, and shell scripts.
//!
//! # Commands
//!
//! - `presence-reporter status`: report the desktop foreground window
//! - `presence-reporter heartrate`: report a heart-rate sample
//! - `presence-reporter phone`: report phone lock/battery/app state
//!
//! # Environment Variables
//!
//! See the [`presence_reporter::config`] module for configuration options.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use presence_reporter::config::Config;
use presence_reporter::sender::{Sender, SenderConfig};

/// Presence Reporter - post a status report to the Presence server.
#[derive(Parser, Debug)]
#[command(name = "presence-reporter")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    PRESENCE_SERVER_URL    Server base URL (required)
    PRESENCE_SECRET_TOKEN  Shared credential, must match the server (required)
    PRESENCE_SOURCE        Source tag for reports (default: hostname)

EXAMPLES:
    # Report a heart-rate sample
    presence-reporter heartrate --rate 72 --source watch

    # Report the phone as unlocked at 80% battery
    presence-reporter phone --locked false --battery 80 --app Safari

    # Report desktop activity from a script
    presence-reporter status --process code.exe --title main.rs \\
        --app code.exe=main.rs --app chrome.exe=Inbox")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report the desktop foreground window and open applications.
    Status {
        /// Foreground process name, e.g. `code.exe`.
        #[arg(long)]
        process: Option<String>,

        /// Foreground window title.
        #[arg(long)]
        title: Option<String>,

        /// Visible application; repeatable.
        #[arg(long = "app", value_name = "PROCESS[=TITLE]")]
        apps: Vec<String>,
    },

    /// Report a heart-rate sample.
    Heartrate {
        /// Beats per minute.
        #[arg(long)]
        rate: i64,

        /// Source tag; defaults to PRESENCE_SOURCE.
        #[arg(long)]
        source: Option<String>,
    },

    /// Report phone lock, battery, and foreground app state.
    Phone {
        /// Whether the phone is locked; omit if unknown.
        #[arg(long)]
        locked: Option<bool>,

        /// Battery percentage, 0-100.
        #[arg(long)]
        battery: Option<u8>,

        /// Foreground app name.
        #[arg(long)]
        app: Option<String>,

        /// Source tag; defaults to PRESENCE_SOURCE.
        #[arg(long)]
        source: Option<String>,
    },
}

impl Command {
    /// The ingestion endpoint this command posts to.
    fn endpoint(&self) -> &'static str {
        match self {
            Self::Status { .. } => "/api/status",
            Self::Heartrate { .. } => "/api/heartrate",
            Self::Phone { .. } => "/api/phone_status",
        }
    }

    /// Builds the report payload, stamped with the local clock and filling
    /// in the configured source tag.
    fn into_payload(self, default_source: &str) -> Value {
        let created_at = Utc::now().to_rfc3339();
        match self {
            Self::Status {
                process,
                title,
                apps,
            } => json!({
                "createdAt": created_at,
                "activeProcess": process,
                "activeTitle": title,
                "apps": apps.iter().map(|app| parse_app_entry(app)).collect::<Vec<_>>(),
            }),
            Self::Heartrate { rate, source } => json!({
                "createdAt": created_at,
                "rate": rate,
                "source": source.as_deref().unwrap_or(default_source),
            }),
            Self::Phone {
                locked,
                battery,
                app,
                source,
            } => json!({
                "createdAt": created_at,
                "locked": locked,
                "battery": battery,
                "app": app,
                "source": source.as_deref().unwrap_or(default_source),
            }),
        }
    }
}

/// Parses a repeatable `--app` argument of the form `PROCESS[=TITLE]`.
fn parse_app_entry(raw: &str) -> Value {
    match raw.split_once('=') {
        Some((process, title)) => json!({"process": process, "title": title}),
        None => json!({"process": raw, "title": ""}),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load reporter configuration")?;

    let endpoint = cli.command.endpoint();
    let payload = cli.command.into_payload(&config.source);

    let mut sender = Sender::new(SenderConfig::with_defaults(
        config.server_url,
        config.secret_token,
    ));

    sender
        .post_report(endpoint, &payload)
        .await
        .with_context(|| format!("failed to deliver report to {endpoint}"))?;

    println!("report delivered to {endpoint}");
    Ok(())
}

/// Initialize logging for a short-lived CLI: quiet by default, RUST_LOG to
/// turn it up.
fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
