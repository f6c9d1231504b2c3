//! `itd` entry point.
//!
//! Loads configuration, runs one detection batch over the lookback window
//! and writes the findings file. Exit codes: 0 no high findings, 1 at
//! least one high finding, 2 source or configuration error, 3 internal
//! engine or emission error.

use std::path::PathBuf;

use chrono::{Duration, Utc};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use itd_core::Severity;
use itd_detector::alert::WebhookDispatcher;
use itd_detector::emit::FindingWriter;
use itd_detector::{CancelToken, DetectorConfig, Engine, JsonlAuditSource};

#[derive(Debug, Parser)]
#[command(name = "itd", about = "AI-assisted insider threat detector", version)]
struct Args {
    /// Path to the configuration file (YAML or JSON)
    #[arg(long)]
    config: PathBuf,

    /// Hours to look back for events
    #[arg(long, default_value_t = 24)]
    lookback_hours: i64,

    /// Override the configured correlation window
    #[arg(long)]
    window_minutes: Option<i64>,

    /// Output file for findings; stdout when omitted
    #[arg(long)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = match DetectorConfig::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("{}", err);
            return err.exit_code();
        }
    };
    if let Some(window) = args.window_minutes {
        config.window_minutes = window;
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        tracing::warn!("interrupt received, finishing current actors");
        handler_token.cancel();
    }) {
        tracing::warn!("failed to install interrupt handler: {}", err);
    }

    let engine = match Engine::from_config(config.clone(), cancel) {
        Ok(engine) => engine,
        Err(err) => {
            tracing::error!("{}", err);
            return err.exit_code();
        }
    };

    let source = JsonlAuditSource::new(
        config.sources.recon_log.clone(),
        config.sources.exfil_log.clone(),
    );

    let now = Utc::now();
    let start = now - Duration::hours(args.lookback_hours);
    tracing::info!(
        "starting detection run (lookback: {}h, window: {}min)",
        args.lookback_hours,
        config.window_minutes
    );

    let outcome = match engine.run(&source, start, now, now) {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!("{}", err);
            return err.exit_code();
        }
    };

    let writer = FindingWriter::new(args.output.clone());
    if let Err(err) = writer.write(&outcome.findings) {
        tracing::error!("{}", err);
        return err.exit_code();
    }

    match WebhookDispatcher::from_config(&config.alerting) {
        Ok(Some(dispatcher)) => {
            if let Err(err) = dispatcher.dispatch(&outcome.findings) {
                tracing::error!("{}", err);
                return err.exit_code();
            }
        }
        Ok(None) => {}
        Err(err) => {
            tracing::error!("{}", err);
            return err.exit_code();
        }
    }

    let medium = outcome
        .findings
        .iter()
        .filter(|f| f.severity == Severity::Medium)
        .count();
    let low = outcome.findings.len() - outcome.stats.high_findings - medium;
    tracing::info!(
        "detection complete: {} high, {} medium, {} low severity findings",
        outcome.stats.high_findings,
        medium,
        low
    );

    if outcome.stats.high_findings > 0 {
        1
    } else {
        0
    }
}
