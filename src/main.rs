use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use runner_rotator_lib::cli::Cli;
use runner_rotator_lib::{init_logging, AppState, CycleReport, RunMode, EXIT_CONFIG_ERROR};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match init_logging(cli.log_dir.as_deref(), cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let config = cli.into_config();
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }
    let mode = config.mode;
    tracing::info!(mode = ?mode, dry_run = config.dry_run, runner = %config.runner_name, "Runner rotator starting up");

    let state = match AppState::new_production(config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let mut scheduler = match state.into_scheduler() {
        Ok(scheduler) => scheduler,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load rotation metrics");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    match mode {
        RunMode::CheckAndRefresh => {
            let report = scheduler.run_once().await;
            print_report(&report);
            ExitCode::from(report.outcome.exit_code())
        }
        RunMode::Daemon => {
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                wait_for_shutdown().await;
                tracing::info!("Shutdown requested, stopping after the current cycle");
                trigger.cancel();
            });

            scheduler.run_daemon(cancel, print_report).await;
            ExitCode::SUCCESS
        }
    }
}

fn print_report(report: &CycleReport) {
    match serde_json::to_string(report) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize cycle report"),
    }
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
