//! Credential provider trait for issuing registration tokens

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("HTTP error: {status}")]
    HttpError {
        status: u16,
        retry_after: Option<u64>,
    },
    #[error("Timeout")]
    Timeout,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Malformed response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Status fed to the retry policy. Transport failures have no status and map to 0.
    pub fn status_code(&self) -> i64 {
        match self {
            ProviderError::HttpError { status, .. } => i64::from(*status),
            _ => 0,
        }
    }

    /// Server-supplied wait hint, in seconds
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ProviderError::HttpError { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Opaque registration secret. Never printed in full.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationToken(String);

impl RegistrationToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Last four characters, for log correlation
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 4 {
            return "****".to_string();
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("****{}", tail)
    }
}

impl std::fmt::Debug for RegistrationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RegistrationToken({})", self.masked())
    }
}

impl std::fmt::Display for RegistrationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Response body of the issuing endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct IssuedToken {
    pub token: RegistrationToken,
    #[serde(rename = "expiresAt", alias = "expires_at")]
    pub expires_at: DateTime<Utc>,
}

/// Trait for the remote endpoint that hands out registration tokens
///
/// Production: reqwest against `<provider>/registration-token`
/// Testing: Scripted responses
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Issue a fresh registration token
    async fn issue_token(&self) -> Result<IssuedToken, ProviderError>;

    /// Issue a token scoped to removing the current registration
    async fn removal_token(&self) -> Result<RegistrationToken, ProviderError>;
}
