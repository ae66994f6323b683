//! `relaymail` - inbound email relay
//!
//! Reads a receipt event, then blocks, applies admin commands to, or
//! forwards each stored message it names.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use relaymail_core::{
    DirectoryObjectStore, OutboxMailer, RecordOutcome, RelayConfig, RelayEngine, SesEvent,
    validate_config,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Relay stored inbound mail to its owner.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file (JSON). Defaults to `<config dir>/relaymail/config.json`.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Receipt event to process (JSON).
    #[arg(short, long)]
    event: PathBuf,

    /// Directory holding one subdirectory per storage bucket.
    #[arg(short, long)]
    store: PathBuf,

    /// Directory outbound messages and notifications are spooled into.
    #[arg(short, long)]
    outbox: PathBuf,
}

fn default_config_path() -> anyhow::Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("relaymail").join("config.json"))
        .context("no configuration directory on this platform, pass --config")
}

fn load_config(args: &Args) -> anyhow::Result<RelayConfig> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let config = RelayConfig::load(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;

    if let Err(errors) = validate_config(&config) {
        for e in &errors {
            error!(field = e.field(), "{e}");
        }
        bail!("invalid configuration in {}", path.display());
    }
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relaymail=info,relaymail_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let event = std::fs::read_to_string(&args.event)
        .with_context(|| format!("failed to read event {}", args.event.display()))?;
    let records = SesEvent::from_json(&event)
        .with_context(|| format!("failed to decode event {}", args.event.display()))?
        .into_records();

    let store = DirectoryObjectStore::new(args.store.join(&config.bucket));
    let mailer = OutboxMailer::new(&args.outbox);

    info!(
        records = records.len(),
        store = %store.root().display(),
        outbox = %mailer.dir().display(),
        relay_to = %config.relay_to,
        "Starting relay"
    );

    let engine = RelayEngine::new(config, store, mailer);

    let report = engine.process_batch(&records).await;

    for record in &report.records {
        match &record.outcome {
            RecordOutcome::SendFailed { link, .. } => {
                info!(message_id = %record.message_id, link = %link, "Left for manual retrieval");
            }
            outcome if outcome.is_failure() => {
                info!(message_id = %record.message_id, outcome = outcome.label(), "Left in store");
            }
            _ => {}
        }
    }

    info!(
        processed = report.records.len(),
        failures = report.failures(),
        "Relay finished"
    );
    Ok(())
}
