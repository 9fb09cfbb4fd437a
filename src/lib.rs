//! Runner Rotator - keep a self-hosted CI runner registered with a fresh credential
//!
//! This library provides the core functionality for the rotator, organized around
//! trait-based dependency injection for testability.

pub mod traits;
pub mod mocks;
pub mod production;

pub mod cli;
pub mod config;
pub mod credential;
pub mod error;
pub mod expiration;
pub mod refresh;
pub mod retry_policy;
pub mod rotation_state;
pub mod scheduler;
pub mod status;
mod state;

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use config::{ConfigError, RotatorConfig, RunMode};
pub use refresh::{RefreshOrchestrator, RefreshSettings};
pub use retry_policy::{RetryDecision, RetryPolicy};
pub use rotation_state::RotationState;
pub use scheduler::{CycleOutcome, CycleReport, Scheduler, SchedulerSettings};
pub use state::AppState;
pub use status::{classify, StatusCategory};

/// Exit code for configuration and startup failures
pub const EXIT_CONFIG_ERROR: u8 = 2;

fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "runner_rotator_lib=debug,runner_rotator=debug"
    } else {
        "runner_rotator_lib=info,runner_rotator=info"
    }
}

/// Initialize logging to stdout and, when `log_dir` is given, a daily rolling file.
///
/// The returned guard flushes the file writer on drop; hold it for the process lifetime.
pub fn init_logging(
    log_dir: Option<&Path>,
    verbose: bool,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter(verbose).into()),
    );

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = rolling::daily(dir, "runner-rotator.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer()) // stdout
        .with(file_layer) // file
        .try_init()?;

    Ok(guard)
}
