// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Measurement Journal command line
//!
//! Connects Google Fit, records measurements into the vault, and runs
//! one-off or periodic syncs.

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use measurement_journal::{
    config::Config,
    services::ManualEntry,
    time_utils::{format_utc_rfc3339, now_epoch_seconds},
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

#[derive(Parser)]
#[command(
    name = "measurement-journal",
    version,
    about = "Body measurement journal with Google Fit sync"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect Google Fit through the browser
    Auth,
    /// Print an authorization URL for completing the flow by hand
    AuthUrl,
    /// Finish a manual authorization with the redirect's code and state
    CompleteAuth {
        #[arg(long)]
        code: String,
        #[arg(long)]
        state: String,
    },
    /// Forget the stored Google Fit tokens
    SignOut,
    /// Show connection and sync settings
    Status,
    /// Pull measurements from Google Fit into the vault
    Sync {
        /// Days to look back (defaults to the configured lookback)
        #[arg(long)]
        days: Option<i64>,
    },
    /// Keep running and sync on the configured interval
    Watch,
    /// Record measurements, e.g. `record --value Weight=80.5 --value Waist=82`
    Record {
        #[arg(long)]
        user: Option<String>,
        /// RFC3339 timestamp, defaults to now
        #[arg(long)]
        at: Option<String>,
        /// NAME=VALUE in the configured unit system, repeatable
        #[arg(long = "value", required = true)]
        values: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::debug!(vault = %config.vault_path.display(), "Configuration loaded");

    let state = AppState::from_config(config).await?;

    match cli.command {
        Commands::Auth => {
            state.tokens.authenticate().await?;
            println!("Connected to Google Fit.");
        }
        Commands::AuthUrl => {
            let url = state.tokens.begin_manual_authentication().await?;
            println!("{url}");
        }
        Commands::CompleteAuth { code, state: nonce } => {
            state.tokens.complete_authentication(&code, &nonce).await?;
            println!("Connected to Google Fit.");
        }
        Commands::SignOut => {
            state.tokens.sign_out().await?;
            println!("Signed out.");
        }
        Commands::Status => print_status(&state).await?,
        Commands::Sync { days } => {
            let report = match days {
                Some(days) if days <= 0 => bail!("--days must be positive"),
                Some(days) => {
                    let end = now_epoch_seconds();
                    state.sync.run_once(end - days * SECONDS_PER_DAY, end).await?
                }
                None => state.sync.run_recent().await?,
            };
            println!(
                "{} samples, {} new entries, {} already present",
                report.samples, report.appended, report.skipped
            );
            for failure in &report.failures {
                println!("failed: {failure}");
            }
        }
        Commands::Watch => watch(&state).await?,
        Commands::Record { user, at, values } => {
            let entry = ManualEntry {
                user,
                at_epoch_seconds: parse_timestamp(at.as_deref())?,
                values: values
                    .iter()
                    .map(|pair| parse_value(pair))
                    .collect::<anyhow::Result<_>>()?,
            };
            let report = state.recorder.record(&entry).await?;
            println!(
                "{} entries written, {} already present",
                report.appended, report.skipped
            );
            if let Some(error) = report.push_error {
                println!("Google Fit push failed: {error}");
            }
        }
    }

    Ok(())
}

async fn print_status(state: &AppState) -> anyhow::Result<()> {
    let settings = state.settings.load().await?;
    let credential = state.tokens.credential_snapshot();

    println!(
        "Google Fit: {}",
        if state.tokens.is_authenticated() {
            "connected"
        } else {
            "not connected"
        }
    );
    if let Some(expires_at) = credential.expires_at() {
        println!("Access token expires: {}", format_utc_rfc3339(expires_at));
    }
    println!("Sync enabled: {}", settings.google_fit.enabled);
    println!(
        "Sync interval: {} min, lookback {} days",
        settings.google_fit.sync_interval_minutes, settings.google_fit.lookback_days
    );
    println!("Default user: {}", settings.default_user_name());
    Ok(())
}

async fn watch(state: &AppState) -> anyhow::Result<()> {
    let settings = state.settings.load().await?;
    if !settings.google_fit.enabled {
        bail!("Google Fit sync is disabled in settings");
    }

    let mut credential_changes = state.tokens.subscribe();
    tokio::spawn(async move {
        while credential_changes.changed().await.is_ok() {
            let connected = !credential_changes.borrow().has_no_tokens();
            tracing::info!(connected, "Credential changed");
        }
    });

    if let Err(e) = state.scheduler.sync_now().await {
        tracing::warn!(error = %e, "Initial sync failed");
    }
    state
        .scheduler
        .set_interval(settings.google_fit.sync_interval_minutes);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    state.scheduler.cancel();
    tracing::info!("Shutting down");
    Ok(())
}

fn parse_value(pair: &str) -> anyhow::Result<(String, f64)> {
    let (name, value) = pair
        .split_once('=')
        .ok_or_else(|| anyhow!("expected NAME=VALUE, got '{pair}'"))?;
    let value: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("invalid number for {name}"))?;
    Ok((name.trim().to_string(), value))
}

fn parse_timestamp(raw: Option<&str>) -> anyhow::Result<i64> {
    match raw {
        None => Ok(now_epoch_seconds()),
        Some(raw) => Ok(chrono::DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("invalid timestamp '{raw}'"))?
            .timestamp()),
    }
}

/// Initialize logging on stderr. `LOG_FORMAT=json` switches to structured
/// JSON lines.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("measurement_journal=debug,info"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        let format = tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_current_span(true)
            .flatten_event(true)
            .with_writer(std::io::stderr);
        tracing_subscriber::registry().with(filter).with(format).init();
    } else {
        let format = tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr);
        tracing_subscriber::registry().with(filter).with(format).init();
    }
}
