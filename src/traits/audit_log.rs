//! Append-only audit trail of checks, refresh attempts and alerts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outcome of a single refresh attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    ProviderFailed,
    RegisterFailed,
}

/// One line of the audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    Check {
        seconds_until_expiry: Option<i64>,
        refresh_needed: bool,
        dry_run: bool,
    },
    Attempt {
        attempt: u32,
        outcome: AttemptOutcome,
        delay_seconds: Option<u64>,
        detail: Option<String>,
    },
    Refreshed {
        expires_at: DateTime<Utc>,
        token: String,
    },
    Exhausted {
        attempts: u32,
        consecutive_failures: u32,
    },
    Alert {
        consecutive_failures: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub cycle_id: Uuid,
    #[serde(flatten)]
    pub event: AuditEvent,
}

impl AuditEntry {
    pub fn now(cycle_id: Uuid, event: AuditEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            cycle_id,
            event,
        }
    }
}

/// Trait for the append-only audit trail
///
/// Production: JSON lines file
/// Testing: In-memory vector
#[cfg_attr(test, mockall::automock)]
pub trait AuditLog: Send + Sync {
    fn append(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}
