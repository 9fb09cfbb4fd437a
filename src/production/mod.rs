//! Production implementations of traits

mod file_audit_log;
mod file_metrics_store;
mod http_provider;
mod runner_configurator;

pub use file_audit_log::FileAuditLog;
pub use file_metrics_store::FileMetricsStore;
pub use http_provider::ReqwestCredentialProvider;
pub use runner_configurator::ScriptConfigurator;
