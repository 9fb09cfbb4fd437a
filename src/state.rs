//! Application state management

use std::sync::Arc;

use crate::config::RotatorConfig;
use crate::expiration::ExpirationResolver;
use crate::production::{
    FileAuditLog, FileMetricsStore, ReqwestCredentialProvider, ScriptConfigurator,
};
use crate::refresh::RefreshOrchestrator;
use crate::scheduler::Scheduler;
use crate::traits::{AgentConfigurator, AuditLog, CredentialProvider, MetricsStore, StoreError};

/// Application state containing all dependencies
pub struct AppState {
    pub config: RotatorConfig,
    pub provider: Arc<dyn CredentialProvider>,
    pub configurator: Arc<dyn AgentConfigurator>,
    pub metrics: Arc<dyn MetricsStore>,
    pub audit: Arc<dyn AuditLog>,
    pub resolver: ExpirationResolver,
}

impl AppState {
    /// Create a new AppState with production implementations
    pub fn new_production(config: RotatorConfig) -> Result<Self, Box<dyn std::error::Error>> {
        tracing::info!("Initializing AppState");

        let state_dir = config.state_dir();
        std::fs::create_dir_all(&state_dir)?;

        let metrics_path = config.metrics_path();
        tracing::info!(path = %metrics_path.display(), "Using rotation metrics file");
        let metrics = Arc::new(FileMetricsStore::new(metrics_path));

        let audit_path = config.audit_log_path();
        tracing::info!(path = %audit_path.display(), "Using audit log");
        let audit = Arc::new(FileAuditLog::new(audit_path));

        let provider = Arc::new(ReqwestCredentialProvider::new(
            &config.provider_url,
            config.provider_auth_token.clone(),
        )?);
        tracing::info!(url = %config.provider_url, "Credential provider initialized");

        let configurator = Arc::new(ScriptConfigurator::for_runner(config.runner_dir()));
        tracing::info!(runner_dir = %config.runner_dir().display(), "Runner configurator initialized");

        let resolver = ExpirationResolver::for_runner(config.runner_dir(), config.expiry_cache_path());

        Ok(Self {
            config,
            provider,
            configurator,
            metrics,
            audit,
            resolver,
        })
    }

    /// Assemble the scheduler, loading persisted rotation metrics
    pub fn into_scheduler(self) -> Result<Scheduler, StoreError> {
        let orchestrator = RefreshOrchestrator::new(
            self.provider,
            self.configurator,
            self.metrics.clone(),
            self.audit.clone(),
            self.config.refresh_settings(),
        );
        Scheduler::new(
            self.resolver,
            orchestrator,
            self.metrics,
            self.audit,
            self.config.scheduler_settings(),
        )
    }
}
