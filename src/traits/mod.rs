//! Trait definitions for dependency injection
//!
//! All external collaborators are abstracted behind traits to enable testing.

mod agent_configurator;
mod audit_log;
mod credential_provider;
mod metrics_store;

pub use agent_configurator::{AgentConfigurator, ConfiguratorError, Registration};
pub use audit_log::{AttemptOutcome, AuditEntry, AuditError, AuditEvent, AuditLog};
pub use credential_provider::{CredentialProvider, IssuedToken, ProviderError, RegistrationToken};
pub use metrics_store::{MetricsStore, StoreError};

#[cfg(test)]
pub use audit_log::MockAuditLog;
#[cfg(test)]
pub use metrics_store::MockMetricsStore;
