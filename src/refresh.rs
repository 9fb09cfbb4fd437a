//! Token refresh orchestration
//!
//! Two retry loops coexist here and are deliberately kept apart:
//!
//! - [`RefreshOrchestrator::issue_with_policy`] guards each provider call with the
//!   HTTP [`RetryPolicy`] (linear backoff for server errors, hinted or extended
//!   delay for rate limits, no retry otherwise).
//! - [`RefreshOrchestrator::refresh_with_retry`] wraps the whole issue-and-configure
//!   sequence in an attempt loop with a flat delay between attempts.
//!
//! Configuration sub-steps are best-effort except registration with the new
//! token, which is fatal for the attempt.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::credential::Credential;
use crate::error::ErrorKind;
use crate::expiration::write_cached_expiry;
use crate::retry_policy::RetryPolicy;
use crate::rotation_state::RotationState;
use crate::traits::{
    AgentConfigurator, AttemptOutcome, AuditEntry, AuditEvent, AuditLog, ConfiguratorError,
    CredentialProvider, IssuedToken, MetricsStore, ProviderError, Registration,
};

/// Knobs for one orchestrator
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub max_attempts: u32,
    /// Flat delay between whole refresh attempts
    pub base_delay_secs: u64,
    /// Per-call policy for provider requests
    pub http_policy: RetryPolicy,
    pub alert_threshold: u32,
    pub registration_url: String,
    pub runner_name: String,
    /// Cached-expiry file written after each issuance
    pub expiry_cache: Option<PathBuf>,
}

/// A configuration sub-step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigStep {
    StopService,
    Deregister,
    Register,
    StartService,
}

impl ConfigStep {
    /// Only registration aborts an attempt
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConfigStep::Register)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigStep::StopService => "stop_service",
            ConfigStep::Deregister => "deregister",
            ConfigStep::Register => "register",
            ConfigStep::StartService => "start_service",
        }
    }
}

/// Tagged result of one configuration sub-step
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Ok,
    NonFatalError(ConfiguratorError),
    FatalError(ConfiguratorError),
}

impl StepOutcome {
    pub fn from_result(step: ConfigStep, result: Result<(), ConfiguratorError>) -> Self {
        match result {
            Ok(()) => StepOutcome::Ok,
            Err(e) if step.is_fatal() => StepOutcome::FatalError(e),
            Err(e) => StepOutcome::NonFatalError(e),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, StepOutcome::FatalError(_))
    }
}

/// Per-step outcomes of a configuration pass
#[derive(Debug, Clone, Default)]
pub struct ConfigurationReport {
    pub steps: Vec<(ConfigStep, StepOutcome)>,
    /// Removal fell back to the unconditional form
    pub unscoped_removal: bool,
}

impl ConfigurationReport {
    fn push(&mut self, step: ConfigStep, outcome: StepOutcome) -> &StepOutcome {
        match &outcome {
            StepOutcome::Ok => tracing::debug!(step = step.as_str(), "Configuration step succeeded"),
            StepOutcome::NonFatalError(e) => {
                tracing::warn!(step = step.as_str(), error = %e, "Configuration step failed, continuing")
            }
            StepOutcome::FatalError(e) => {
                tracing::error!(step = step.as_str(), error = %e, "Configuration step failed, aborting attempt")
            }
        }
        self.steps.push((step, outcome));
        &self.steps[self.steps.len() - 1].1
    }

    pub fn outcome(&self, step: ConfigStep) -> Option<&StepOutcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }

    pub fn fatal_error(&self) -> Option<&ConfiguratorError> {
        self.steps.iter().find_map(|(_, o)| match o {
            StepOutcome::FatalError(e) => Some(e),
            _ => None,
        })
    }
}

/// Per-attempt record, kept only for the current refresh
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub delay_seconds: Option<u64>,
    pub error_kind: Option<ErrorKind>,
}

#[derive(Debug, Clone)]
pub struct RefreshSuccess {
    pub credential: Credential,
    pub attempts: Vec<AttemptRecord>,
    pub configuration: ConfigurationReport,
}

/// All attempts of one refresh cycle failed
#[derive(Debug, Clone, Error)]
#[error("Token refresh exhausted after {} attempts: {last_error}", .attempts.len())]
pub struct Exhausted {
    pub attempts: Vec<AttemptRecord>,
    pub last_error: String,
    pub consecutive_failures: u32,
    /// This cycle brought the failure streak up to the alert threshold
    pub alert_raised: bool,
}

impl Exhausted {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ExhaustedRetries
    }
}

enum AttemptFailure {
    Provider(ProviderError),
    Register(ConfiguratorError),
}

impl AttemptFailure {
    fn outcome(&self) -> AttemptOutcome {
        match self {
            AttemptFailure::Provider(_) => AttemptOutcome::ProviderFailed,
            AttemptFailure::Register(_) => AttemptOutcome::RegisterFailed,
        }
    }

    fn kind(&self) -> ErrorKind {
        match self {
            AttemptFailure::Provider(e) => ErrorKind::from_provider(e),
            AttemptFailure::Register(_) => ErrorKind::ConfiguratorFailure,
        }
    }

    fn detail(&self) -> String {
        match self {
            AttemptFailure::Provider(e) => e.to_string(),
            AttemptFailure::Register(e) => e.to_string(),
        }
    }
}

pub struct RefreshOrchestrator {
    provider: Arc<dyn CredentialProvider>,
    configurator: Arc<dyn AgentConfigurator>,
    metrics: Arc<dyn MetricsStore>,
    audit: Arc<dyn AuditLog>,
    settings: RefreshSettings,
}

impl RefreshOrchestrator {
    pub fn new(
        provider: Arc<dyn CredentialProvider>,
        configurator: Arc<dyn AgentConfigurator>,
        metrics: Arc<dyn MetricsStore>,
        audit: Arc<dyn AuditLog>,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            provider,
            configurator,
            metrics,
            audit,
            settings,
        }
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.settings
    }

    /// Issue a token, retrying individual provider calls per the HTTP retry policy
    pub async fn issue_with_policy(&self) -> Result<IssuedToken, ProviderError> {
        let policy = self.settings.http_policy;
        let mut call: u32 = 0;

        loop {
            call = call.saturating_add(1);
            let error = match self.provider.issue_token().await {
                Ok(issued) => return Ok(issued),
                Err(e) => e,
            };

            let decision = policy.decide(call, error.status_code(), error.retry_after());
            if !decision.should_retry {
                tracing::warn!(
                    call,
                    status = error.status_code(),
                    category = %decision.category,
                    error = %error,
                    "Provider call failed, not retrying"
                );
                return Err(error);
            }

            tracing::info!(
                call,
                status = error.status_code(),
                category = %decision.category,
                delay_secs = decision.delay_seconds,
                "Provider call failed, retrying"
            );
            tokio::time::sleep(Duration::from_secs(decision.delay_seconds)).await;
        }
    }

    /// Stop, deregister, register and restart the runner with `credential`
    pub async fn configure(&self, credential: &Credential) -> ConfigurationReport {
        let mut report = ConfigurationReport::default();

        let stop = self.configurator.stop_service().await;
        report.push(ConfigStep::StopService, StepOutcome::from_result(ConfigStep::StopService, stop));

        let removal = self.deregister(&mut report).await;
        report.push(ConfigStep::Deregister, StepOutcome::from_result(ConfigStep::Deregister, removal));

        let register = self
            .configurator
            .register(Registration {
                url: &self.settings.registration_url,
                token: &credential.token,
                name: &self.settings.runner_name,
            })
            .await;
        if report
            .push(ConfigStep::Register, StepOutcome::from_result(ConfigStep::Register, register))
            .is_fatal()
        {
            return report;
        }

        let start = self.configurator.start_service().await;
        report.push(ConfigStep::StartService, StepOutcome::from_result(ConfigStep::StartService, start));

        report
    }

    /// Scoped removal first, unconditional removal when that is not possible
    async fn deregister(&self, report: &mut ConfigurationReport) -> Result<(), ConfiguratorError> {
        match self.provider.removal_token().await {
            Ok(token) => match self.configurator.remove(Some(&token)).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(error = %e, "Scoped removal failed, falling back to unconditional removal");
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Could not obtain removal token, falling back to unconditional removal");
            }
        }
        report.unscoped_removal = true;
        self.configurator.remove(None).await
    }

    /// Rotate the credential, retrying whole attempts with a flat delay.
    ///
    /// `state` is updated and persisted before returning, on both paths.
    pub async fn refresh_with_retry(
        &self,
        state: &mut RotationState,
        cycle_id: Uuid,
    ) -> Result<RefreshSuccess, Exhausted> {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempts = Vec::new();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            tracing::info!(attempt, max_attempts, "Starting token refresh attempt");

            let failure = match self.attempt_once().await {
                Ok((credential, configuration)) => {
                    attempts.push(AttemptRecord {
                        attempt,
                        outcome: AttemptOutcome::Succeeded,
                        delay_seconds: None,
                        error_kind: None,
                    });
                    self.audit(
                        cycle_id,
                        AuditEvent::Attempt {
                            attempt,
                            outcome: AttemptOutcome::Succeeded,
                            delay_seconds: None,
                            detail: None,
                        },
                    );

                    state.record_success(Utc::now().timestamp());
                    self.persist(state);
                    self.audit(
                        cycle_id,
                        AuditEvent::Refreshed {
                            expires_at: credential.expires_at,
                            token: credential.token.masked(),
                        },
                    );
                    tracing::info!(
                        attempt,
                        expires_at = %credential.expires_at.to_rfc3339(),
                        total_refreshes = state.total_refreshes,
                        "Token refreshed"
                    );
                    return Ok(RefreshSuccess {
                        credential,
                        attempts,
                        configuration,
                    });
                }
                Err(failure) => failure,
            };

            last_error = failure.detail();
            let delay_seconds = (attempt < max_attempts).then_some(self.settings.base_delay_secs);
            attempts.push(AttemptRecord {
                attempt,
                outcome: failure.outcome(),
                delay_seconds,
                error_kind: Some(failure.kind()),
            });
            self.audit(
                cycle_id,
                AuditEvent::Attempt {
                    attempt,
                    outcome: failure.outcome(),
                    delay_seconds,
                    detail: Some(last_error.clone()),
                },
            );
            tracing::warn!(
                attempt,
                max_attempts,
                kind = %failure.kind(),
                error = %last_error,
                "Refresh attempt failed"
            );

            if let Some(delay) = delay_seconds {
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }
        }

        let alert_raised = state.record_failure(self.settings.alert_threshold);
        self.persist(state);
        self.audit(
            cycle_id,
            AuditEvent::Exhausted {
                attempts: max_attempts,
                consecutive_failures: state.consecutive_failures,
            },
        );
        tracing::error!(
            attempts = max_attempts,
            consecutive_failures = state.consecutive_failures,
            error = %last_error,
            "Token refresh exhausted"
        );

        if alert_raised {
            self.audit(
                cycle_id,
                AuditEvent::Alert {
                    consecutive_failures: state.consecutive_failures,
                },
            );
            tracing::error!(
                consecutive_failures = state.consecutive_failures,
                threshold = self.settings.alert_threshold,
                "ALERT: runner token rotation keeps failing, operator action required"
            );
        }

        Err(Exhausted {
            attempts,
            last_error,
            consecutive_failures: state.consecutive_failures,
            alert_raised,
        })
    }

    async fn attempt_once(&self) -> Result<(Credential, ConfigurationReport), AttemptFailure> {
        let issued = self.issue_with_policy().await.map_err(AttemptFailure::Provider)?;
        let credential = Credential::from(issued);

        if let Some(path) = &self.settings.expiry_cache {
            if let Err(e) = write_cached_expiry(path, credential.expires_at_epoch()) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to cache token expiry");
            }
        }

        let configuration = self.configure(&credential).await;
        if let Some(e) = configuration.fatal_error() {
            return Err(AttemptFailure::Register(e.clone()));
        }
        Ok((credential, configuration))
    }

    fn persist(&self, state: &RotationState) {
        if let Err(e) = self.metrics.save(state) {
            tracing::error!(error = %e, "Failed to persist rotation metrics");
        }
    }

    fn audit(&self, cycle_id: Uuid, event: AuditEvent) {
        if let Err(e) = self.audit.append(&AuditEntry::now(cycle_id, event)) {
            tracing::warn!(error = %e, "Failed to append audit entry");
        }
    }
}
