//! JSON file metrics store
//!
//! Single-writer: only one rotator instance manages a given runner, so the
//! record is overwritten in place without locking.

use std::path::PathBuf;

use crate::rotation_state::RotationState;
use crate::traits::{MetricsStore, StoreError};

pub struct FileMetricsStore {
    path: PathBuf,
}

impl FileMetricsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl MetricsStore for FileMetricsStore {
    fn load(&self) -> Result<RotationState, StoreError> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No metrics record yet, starting from zero");
            return Ok(RotationState::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(RotationState::default());
        }
        match serde_json::from_str(&content) {
            Ok(state) => Ok(state),
            Err(e) => {
                let aside = self.path.with_extension("json.corrupt");
                tracing::warn!(
                    path = %self.path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "Metrics record is corrupt, starting from zero"
                );
                if let Err(e) = std::fs::rename(&self.path, &aside) {
                    tracing::warn!(error = %e, "Failed to move corrupt metrics record aside");
                }
                Ok(RotationState::default())
            }
        }
    }

    fn save(&self, state: &RotationState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(state)?;
        // Replaced atomically via rename
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), "Saved rotation metrics");
        Ok(())
    }
}
