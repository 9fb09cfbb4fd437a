//! Registration credential and where its expiry was learned from

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::traits::{IssuedToken, RegistrationToken};

/// Where a credential's expiry was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Freshly returned by the credential provider
    Issued,
    LiveConfig,
    CredentialsFile,
    Cache,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Issued => "issued",
            Provenance::LiveConfig => "live_config",
            Provenance::CredentialsFile => "credentials_file",
            Provenance::Cache => "cache",
        }
    }
}

/// A registration token with its absolute expiry. Superseded, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct Credential {
    #[serde(skip)]
    pub token: RegistrationToken,
    pub expires_at: DateTime<Utc>,
    pub provenance: Provenance,
}

impl Credential {
    pub fn expires_at_epoch(&self) -> i64 {
        self.expires_at.timestamp()
    }
}

impl From<IssuedToken> for Credential {
    fn from(issued: IssuedToken) -> Self {
        Self {
            token: issued.token,
            expires_at: issued.expires_at,
            provenance: Provenance::Issued,
        }
    }
}
