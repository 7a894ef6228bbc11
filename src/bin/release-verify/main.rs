//! release-verify CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, CliFormat, CliLogFormat};
use release_verify::event::{
    create_run_event_channel, CheckState, VerifyEvent, VerifyEventsChannel,
};
use release_verify::{build_matrix, CheckerSet, RunSettings, VerificationMatrix, Verifier};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for the report
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    match cli.log_format {
        CliLogFormat::Pretty => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
        CliLogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }

    info!("release-verify v{}", env!("CARGO_PKG_VERSION"));

    // Build configuration and the matrix; configuration errors stop here
    let config = cli.to_config()?;
    let mut matrix = build_matrix(&config)?;
    let groups = cli.selected_groups();
    if !groups.is_empty() {
        matrix.retain_groups(&groups);
    }

    if cli.plan {
        print_plan(&matrix, cli.format)?;
        return Ok(());
    }

    let (events_tx, events_rx) = create_run_event_channel(matrix.len());
    let progress = tokio::spawn(log_progress(events_rx));

    let checkers = CheckerSet::from_config(&config)?;
    let verifier =
        Verifier::new(checkers, RunSettings::from(&config.runner)).with_events(events_tx);
    let report = verifier.verify(&matrix).await;
    drop(verifier);
    let _ = progress.await;

    match cli.format {
        CliFormat::Text => print!("{report}"),
        CliFormat::Json => println!("{}", report.to_json()?),
    }

    if !report.is_success() {
        std::process::exit(report.exit_code());
    }
    Ok(())
}

fn print_plan(matrix: &VerificationMatrix, format: CliFormat) -> color_eyre::Result<()> {
    match format {
        CliFormat::Json => println!("{}", serde_json::to_string_pretty(matrix)?),
        CliFormat::Text => {
            for check in matrix.checks() {
                println!("{:<40} {}", check.label, check.artifact.canonical_key());
            }
            println!(
                "{} checks, {} distinct artifacts",
                matrix.len(),
                matrix.distinct_keys()
            );
        }
    }
    Ok(())
}

async fn log_progress(mut events: VerifyEventsChannel) {
    let mut total = 0;
    let mut done = 0;
    loop {
        match events.recv().await {
            Ok(VerifyEvent::RunStarted { total: planned }) => total = planned,
            Ok(VerifyEvent::CheckStateChanged { state, .. }) if state.is_terminal() => {
                done += 1;
                debug!("{done}/{total} checks complete");
            }
            Ok(VerifyEvent::CheckStateChanged {
                state: CheckState::Checking,
                label,
                ..
            }) => debug!("Checking: {label}"),
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }
}
