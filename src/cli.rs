//! Command-line surface

use std::path::PathBuf;

use clap::{ArgGroup, Parser};

use crate::config::{RotatorConfig, RunMode};

/// Keep a self-hosted CI runner registered with a fresh credential.
#[derive(Parser, Debug)]
#[command(name = "runner-rotator", version, about)]
#[command(group(ArgGroup::new("mode").required(true).args(["daemon", "check_and_refresh"])))]
pub struct Cli {
    /// Poll on an interval until interrupted
    #[arg(long)]
    pub daemon: bool,

    /// Run one check cycle and exit
    #[arg(long)]
    pub check_and_refresh: bool,

    /// Report what would happen without touching the runner or state
    #[arg(long)]
    pub dry_run: bool,

    /// Credential provider base URL
    #[arg(long, env = "ROTATOR_PROVIDER_URL")]
    pub provider_url: String,

    /// Bearer token for the credential provider
    #[arg(long, env = "ROTATOR_PROVIDER_AUTH_TOKEN", hide_env_values = true)]
    pub provider_auth_token: Option<String>,

    /// Organization or repository URL the runner registers against
    #[arg(long, env = "ROTATOR_REGISTRATION_URL")]
    pub registration_url: String,

    #[arg(long, env = "ROTATOR_RUNNER_NAME", default_value = "runner")]
    pub runner_name: String,

    /// Runner installation directory
    #[arg(long, env = "ROTATOR_RUNNER_DIR", default_value = ".")]
    pub runner_dir: PathBuf,

    /// Where metrics, cached expiry and the audit log live [default: <runner-dir>/.rotator]
    #[arg(long, env = "ROTATOR_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Also write daily rolling log files here
    #[arg(long, env = "ROTATOR_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Refresh when fewer than this many seconds remain
    #[arg(long, env = "ROTATOR_THRESHOLD", default_value_t = 3600)]
    pub threshold: u64,

    /// Seconds between daemon checks
    #[arg(long, env = "ROTATOR_INTERVAL", default_value_t = 300)]
    pub interval: u64,

    /// Refresh attempts per cycle
    #[arg(long, env = "ROTATOR_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,

    /// Base delay in seconds between attempts
    #[arg(long, env = "ROTATOR_BASE_DELAY", default_value_t = 5)]
    pub base_delay: u64,

    /// Attempts per provider HTTP call
    #[arg(long, env = "ROTATOR_HTTP_MAX_ATTEMPTS", default_value_t = 3)]
    pub http_max_attempts: u32,

    /// Consecutive failed cycles before alerting
    #[arg(long, env = "ROTATOR_ALERT_THRESHOLD", default_value_t = 3)]
    pub alert_threshold: u32,

    /// Debug logging unless RUST_LOG is set
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn mode(&self) -> RunMode {
        if self.daemon {
            RunMode::Daemon
        } else {
            RunMode::CheckAndRefresh
        }
    }

    pub fn into_config(self) -> RotatorConfig {
        let mode = self.mode();
        RotatorConfig {
            provider_url: self.provider_url,
            provider_auth_token: self.provider_auth_token,
            registration_url: self.registration_url,
            runner_name: self.runner_name,
            runner_dir: self.runner_dir,
            state_dir: self.state_dir,
            log_dir: self.log_dir,
            threshold_secs: self.threshold,
            interval_secs: self.interval,
            max_attempts: self.max_attempts,
            base_delay_secs: self.base_delay,
            http_max_attempts: self.http_max_attempts,
            alert_threshold: self.alert_threshold,
            dry_run: self.dry_run,
            mode,
        }
    }
}
