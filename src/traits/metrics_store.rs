//! Metrics store trait for persisting rotation history

use thiserror::Error;

use crate::rotation_state::RotationState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Trait for durable rotation counters
///
/// Production: JSON file in the state directory
/// Testing: In-memory cell
#[cfg_attr(test, mockall::automock)]
pub trait MetricsStore: Send + Sync {
    /// Load the last record. A missing record yields the zero state.
    fn load(&self) -> Result<RotationState, StoreError>;

    /// Overwrite the full record
    fn save(&self, state: &RotationState) -> Result<(), StoreError>;
}
