//! Expiry resolution across the places a token's lifetime may be recorded
//!
//! Sources are consulted in a fixed order and the first usable value wins. A
//! source that is missing, empty or unparsable is skipped; only running out of
//! sources yields "not found".

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::credential::Provenance;

/// JSON pointer of the expiry field inside the runner's live config
pub const LIVE_CONFIG_POINTER: &str = "/tokenExpiresAt";
/// JSON pointer of the expiry field inside the credentials file
pub const CREDENTIALS_POINTER: &str = "/data/tokenExpiresAt";

/// A single place to look for the expiry
#[derive(Debug, Clone)]
pub enum ExpirySource {
    /// A field inside a JSON document, addressed by JSON pointer
    JsonField {
        path: PathBuf,
        pointer: String,
        provenance: Provenance,
    },
    /// Plain-text file holding a single epoch integer
    CacheFile { path: PathBuf },
}

impl ExpirySource {
    pub fn provenance(&self) -> Provenance {
        match self {
            ExpirySource::JsonField { provenance, .. } => *provenance,
            ExpirySource::CacheFile { .. } => Provenance::Cache,
        }
    }

    fn path(&self) -> &Path {
        match self {
            ExpirySource::JsonField { path, .. } => path,
            ExpirySource::CacheFile { path } => path,
        }
    }

    fn read_epoch(&self) -> Option<i64> {
        let content = match std::fs::read_to_string(self.path()) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(
                    source = self.provenance().as_str(),
                    path = %self.path().display(),
                    error = %e,
                    "Expiry source unreadable, skipping"
                );
                return None;
            }
        };

        let epoch = match self {
            ExpirySource::JsonField { pointer, .. } => {
                let doc: serde_json::Value = match serde_json::from_str(&content) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(
                            path = %self.path().display(),
                            error = %e,
                            "Expiry source is not valid JSON, skipping"
                        );
                        return None;
                    }
                };
                doc.pointer(pointer).and_then(value_to_epoch)
            }
            ExpirySource::CacheFile { .. } => content.trim().parse::<i64>().ok(),
        };

        if epoch.is_none() {
            tracing::debug!(
                source = self.provenance().as_str(),
                path = %self.path().display(),
                "No usable expiry in source"
            );
        }
        epoch
    }
}

/// Convert a JSON value holding an ISO-8601 string or an epoch number
fn value_to_epoch(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::String(s) => parse_timestamp(s),
        serde_json::Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// Parse an RFC 3339 timestamp or a bare epoch integer
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).timestamp());
    }
    raw.parse::<i64>().ok()
}

/// The expiry that was found and where
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedExpiry {
    pub epoch: i64,
    pub provenance: Provenance,
}

/// Time left on the current credential. Negative means already expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExpiryStatus {
    pub seconds_until_expiry: i64,
    pub expires_at_epoch: i64,
    pub provenance: Provenance,
}

impl ExpiryStatus {
    pub fn is_expired(&self) -> bool {
        self.seconds_until_expiry < 0
    }
}

pub struct ExpirationResolver {
    sources: Vec<ExpirySource>,
}

impl ExpirationResolver {
    pub fn new(sources: Vec<ExpirySource>) -> Self {
        Self { sources }
    }

    /// Standard source order for a runner install: live config, credentials, cache
    pub fn for_runner(runner_dir: &Path, cache_path: PathBuf) -> Self {
        Self::new(vec![
            ExpirySource::JsonField {
                path: runner_dir.join(".runner"),
                pointer: LIVE_CONFIG_POINTER.to_string(),
                provenance: Provenance::LiveConfig,
            },
            ExpirySource::JsonField {
                path: runner_dir.join(".credentials"),
                pointer: CREDENTIALS_POINTER.to_string(),
                provenance: Provenance::CredentialsFile,
            },
            ExpirySource::CacheFile { path: cache_path },
        ])
    }

    pub fn sources(&self) -> &[ExpirySource] {
        &self.sources
    }

    /// First usable expiry in priority order, or `None` when every source is exhausted
    pub fn resolve_expiry_epoch(&self) -> Option<ResolvedExpiry> {
        self.sources.iter().find_map(|source| {
            source.read_epoch().map(|epoch| ResolvedExpiry {
                epoch,
                provenance: source.provenance(),
            })
        })
    }

    /// Seconds until expiry as of `now`
    pub fn check_expiration_at(&self, now: i64) -> Option<ExpiryStatus> {
        let resolved = self.resolve_expiry_epoch()?;
        let status = ExpiryStatus {
            seconds_until_expiry: resolved.epoch.saturating_sub(now),
            expires_at_epoch: resolved.epoch,
            provenance: resolved.provenance,
        };
        tracing::debug!(
            source = resolved.provenance.as_str(),
            seconds_until_expiry = status.seconds_until_expiry,
            "Resolved token expiry"
        );
        Some(status)
    }

    pub fn check_expiration(&self) -> Option<ExpiryStatus> {
        self.check_expiration_at(Utc::now().timestamp())
    }
}

/// Write the cached-expiry file (single epoch integer)
pub fn write_cached_expiry(path: &Path, epoch: i64) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, format!("{}\n", epoch))
}
