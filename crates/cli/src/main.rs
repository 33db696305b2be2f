use std::process::ExitCode;

use clap::Parser as _;
use cli::Cli;
use tokio::{
    select,
    signal::unix::{SignalKind, signal},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::CliConfig;

mod cli;
mod config;
mod fixture;
mod telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match CliConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = color_eyre::install() {
        eprintln!("Failed to install error reporting: {err}");
        return ExitCode::FAILURE;
    }
    if let Err(err) = telemetry::init("warn") {
        eprintln!("Failed to initialize logging: {err:?}");
        return ExitCode::FAILURE;
    }

    info!(account = %config.core.account, fixture = %config.fixture.display(), "starting");

    let shutdown_token = CancellationToken::new();
    let mut command_jh = tokio::spawn(cli.run(config, shutdown_token.clone()));

    let mut sigterm = signal(SignalKind::terminate())
        .expect("setting sigterm listener on unix should always work");
    let mut sigint = signal(SignalKind::interrupt())
        .expect("setting sigint listener on unix should always work");

    let finished = select! {
        res = &mut command_jh => Some(res),
        _ = sigterm.recv() => {
            info!("received SIGTERM signal");
            None
        }
        _ = sigint.recv() => {
            info!("received SIGINT signal");
            None
        }
    };

    // a signalled command gets to observe cancellation and tear its session down
    let signalled = finished.is_none();
    let result = match finished {
        Some(res) => res,
        None => {
            shutdown_token.cancel();
            command_jh.await
        }
    };

    match result {
        Ok(Ok(())) if signalled => {
            info!("command stopped by signal");
            ExitCode::FAILURE
        }
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            error!(error = %e, "command failed");
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(%e, "command exited unexpectedly");
            ExitCode::FAILURE
        }
    }
}
