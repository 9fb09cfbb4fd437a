//! Agent configurator trait for (de)registering the runner and driving its service

use thiserror::Error;

use super::credential_provider::RegistrationToken;

#[derive(Debug, Clone, Error)]
pub enum ConfiguratorError {
    #[error("Failed to launch {program}: {reason}")]
    SpawnFailed { program: String, reason: String },
    #[error("{step} exited with code {code}: {stderr}")]
    NonZeroExit {
        step: String,
        code: i32,
        stderr: String,
    },
    #[error("{step} was terminated by a signal")]
    Terminated { step: String },
}

/// Registration parameters for the new token
#[derive(Debug, Clone)]
pub struct Registration<'a> {
    pub url: &'a str,
    pub token: &'a RegistrationToken,
    pub name: &'a str,
}

/// Trait for the local configurator executable and its service supervisor
///
/// Production: `config.sh` and `svc.sh` in the runner directory
/// Testing: Recorded invocations with scripted exit codes
#[async_trait::async_trait]
pub trait AgentConfigurator: Send + Sync {
    /// Stop the runner service
    async fn stop_service(&self) -> Result<(), ConfiguratorError>;

    /// Start the runner service
    async fn start_service(&self) -> Result<(), ConfiguratorError>;

    /// Remove the current registration. `None` forces an unconditional local removal.
    async fn remove(&self, token: Option<&RegistrationToken>) -> Result<(), ConfiguratorError>;

    /// Register with a fresh token
    async fn register(&self, registration: Registration<'_>) -> Result<(), ConfiguratorError>;
}
