//! Status classification for credential provider responses
//!
//! Every integer status maps to exactly one category. Transport failures that
//! never produced a response are reported as status `0` and land in `Unknown`.

use serde::{Deserialize, Serialize};

/// Outcome categories for a provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    Success,     // 200-299
    ClientError, // 400-499 except 429
    RateLimit,   // 429
    ServerError, // 500-599
    Unknown,     // everything else, including 0
}

impl StatusCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCategory::Success => "success",
            StatusCategory::ClientError => "client_error",
            StatusCategory::RateLimit => "rate_limit",
            StatusCategory::ServerError => "server_error",
            StatusCategory::Unknown => "unknown",
        }
    }

    /// Categories the retry policy is allowed to retry
    pub fn is_transient(&self) -> bool {
        matches!(self, StatusCategory::RateLimit | StatusCategory::ServerError)
    }
}

impl std::fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a transport status code. Total: never fails, never panics.
pub fn classify(status_code: i64) -> StatusCategory {
    match status_code {
        200..=299 => StatusCategory::Success,
        // Must come before the general 4xx arm
        429 => StatusCategory::RateLimit,
        400..=499 => StatusCategory::ClientError,
        500..=599 => StatusCategory::ServerError,
        _ => StatusCategory::Unknown,
    }
}
