//! Rotator configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::refresh::RefreshSettings;
use crate::retry_policy::RetryPolicy;
use crate::scheduler::SchedulerSettings;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} is not a valid URL: {reason}")]
    InvalidUrl { field: &'static str, reason: String },
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// How the scheduler is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One check cycle, then exit
    CheckAndRefresh,
    /// Poll every interval until interrupted
    Daemon,
}

#[derive(Debug, Clone)]
pub struct RotatorConfig {
    pub provider_url: String,
    pub provider_auth_token: Option<String>,
    pub registration_url: String,
    pub runner_name: String,
    pub runner_dir: PathBuf,
    pub state_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub threshold_secs: u64,
    pub interval_secs: u64,
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub http_max_attempts: u32,
    pub alert_threshold: u32,
    pub dry_run: bool,
    pub mode: RunMode,
}

impl RotatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("provider_url", &self.provider_url)?;
        check_url("registration_url", &self.registration_url)?;
        if self.runner_name.trim().is_empty() {
            return Err(ConfigError::Empty { field: "runner_name" });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Zero { field: "max_attempts" });
        }
        if self.http_max_attempts == 0 {
            return Err(ConfigError::Zero { field: "http_max_attempts" });
        }
        if self.interval_secs == 0 {
            return Err(ConfigError::Zero { field: "interval" });
        }
        Ok(())
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| self.runner_dir.join(".rotator"))
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.state_dir().join("rotation-metrics.json")
    }

    pub fn expiry_cache_path(&self) -> PathBuf {
        self.state_dir().join("token-expiry")
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.state_dir().join("rotation-audit.log")
    }

    pub fn runner_dir(&self) -> &Path {
        &self.runner_dir
    }

    pub fn refresh_settings(&self) -> RefreshSettings {
        RefreshSettings {
            max_attempts: self.max_attempts,
            base_delay_secs: self.base_delay_secs,
            http_policy: RetryPolicy::new(self.http_max_attempts, self.base_delay_secs),
            alert_threshold: self.alert_threshold,
            registration_url: self.registration_url.clone(),
            runner_name: self.runner_name.clone(),
            expiry_cache: Some(self.expiry_cache_path()),
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            threshold_secs: i64::try_from(self.threshold_secs).unwrap_or(i64::MAX),
            interval: Duration::from_secs(self.interval_secs),
            dry_run: self.dry_run,
        }
    }
}

fn check_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Empty { field });
    }
    let url = reqwest::Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        field,
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            field,
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RotatorConfig {
        RotatorConfig {
            provider_url: "https://tokens.internal/api".to_string(),
            provider_auth_token: None,
            registration_url: "https://github.com/acme".to_string(),
            runner_name: "builder-1".to_string(),
            runner_dir: PathBuf::from("/opt/runner"),
            state_dir: None,
            log_dir: None,
            threshold_secs: 3600,
            interval_secs: 300,
            max_attempts: 3,
            base_delay_secs: 5,
            http_max_attempts: 3,
            alert_threshold: 3,
            dry_run: false,
            mode: RunMode::CheckAndRefresh,
        }
    }

    #[test]
    fn test_valid_config() {
        assert_eq!(config().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_bad_urls() {
        let mut c = config();
        c.provider_url = String::new();
        assert_eq!(c.validate(), Err(ConfigError::Empty { field: "provider_url" }));

        let mut c = config();
        c.provider_url = "not a url".to_string();
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidUrl { field: "provider_url", .. })
        ));

        let mut c = config();
        c.registration_url = "ftp://github.com/acme".to_string();
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidUrl { field: "registration_url", .. })
        ));
    }

    #[test]
    fn test_rejects_zero_counts() {
        let mut c = config();
        c.max_attempts = 0;
        assert_eq!(c.validate(), Err(ConfigError::Zero { field: "max_attempts" }));

        let mut c = config();
        c.http_max_attempts = 0;
        assert_eq!(c.validate(), Err(ConfigError::Zero { field: "http_max_attempts" }));

        let mut c = config();
        c.interval_secs = 0;
        assert_eq!(c.validate(), Err(ConfigError::Zero { field: "interval" }));
    }

    #[test]
    fn test_zero_base_delay_is_allowed() {
        let mut c = config();
        c.base_delay_secs = 0;
        assert_eq!(c.validate(), Ok(()));
    }

    #[test]
    fn test_derived_paths() {
        let c = config();
        assert_eq!(c.state_dir(), PathBuf::from("/opt/runner/.rotator"));
        assert_eq!(c.metrics_path(), PathBuf::from("/opt/runner/.rotator/rotation-metrics.json"));
        assert_eq!(c.expiry_cache_path(), PathBuf::from("/opt/runner/.rotator/token-expiry"));
        assert_eq!(c.audit_log_path(), PathBuf::from("/opt/runner/.rotator/rotation-audit.log"));

        let mut c = config();
        c.state_dir = Some(PathBuf::from("/var/lib/rotator"));
        assert_eq!(c.metrics_path(), PathBuf::from("/var/lib/rotator/rotation-metrics.json"));
    }

    #[test]
    fn test_settings_carry_knobs() {
        let mut c = config();
        c.http_max_attempts = 5;
        c.base_delay_secs = 7;
        c.dry_run = true;

        let refresh = c.refresh_settings();
        assert_eq!(refresh.http_policy, RetryPolicy::new(5, 7));
        assert_eq!(refresh.base_delay_secs, 7);
        assert_eq!(refresh.expiry_cache, Some(c.expiry_cache_path()));

        let sched = c.scheduler_settings();
        assert_eq!(sched.threshold_secs, 3600);
        assert_eq!(sched.interval, Duration::from_secs(300));
        assert!(sched.dry_run);
    }
}
