//! Failure taxonomy for rotation
//!
//! Boundary errors (`ProviderError`, `ConfiguratorError`, ...) live next to
//! their traits. This module groups them into the kinds the scheduler and
//! the audit trail reason about.

use serde::Serialize;

use crate::status::StatusCategory;
use crate::traits::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport failures and 5xx. Transport failures carry status 0 and are
    /// retried only by the attempt loop, never per HTTP call.
    TransientNetwork,
    /// Bad credentials, permissions or request. Not retried.
    ClientConfiguration,
    /// Retried with the server-hinted or extended delay
    RateLimited,
    /// Registering with the new token failed
    ConfiguratorFailure,
    /// Every refresh attempt in a cycle failed
    ExhaustedRetries,
}

impl ErrorKind {
    pub fn from_provider(error: &ProviderError) -> Self {
        match error {
            ProviderError::InvalidUrl(_) | ProviderError::Decode(_) => ErrorKind::ClientConfiguration,
            ProviderError::NetworkError(_) | ProviderError::Timeout => ErrorKind::TransientNetwork,
            ProviderError::HttpError { .. } => match crate::status::classify(error.status_code()) {
                StatusCategory::RateLimit => ErrorKind::RateLimited,
                StatusCategory::ClientError => ErrorKind::ClientConfiguration,
                _ => ErrorKind::TransientNetwork,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::ClientConfiguration => "client_configuration",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ConfiguratorFailure => "configurator_failure",
            ErrorKind::ExhaustedRetries => "exhausted_retries",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
