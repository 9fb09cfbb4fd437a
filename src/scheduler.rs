//! Check-and-refresh scheduling
//!
//! One sequential control flow: `Idle -> Checking -> (NoAction | Refreshing) -> Idle`,
//! with `Refreshing -> Alerting -> Idle` when a refresh cycle is exhausted.
//! Single-shot mode runs one cycle; daemon mode repeats it every interval until
//! cancelled. Cancellation is only observed between cycles, so a refresh that
//! has started always finishes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::expiration::{ExpirationResolver, ExpiryStatus};
use crate::refresh::RefreshOrchestrator;
use crate::rotation_state::RotationState;
use crate::traits::{AuditEntry, AuditEvent, AuditLog, MetricsStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Checking,
    NoAction,
    Refreshing,
    Alerting,
}

/// Why a refresh was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshReason {
    ExpiryUnknown,
    Expired,
    BelowThreshold,
}

/// Decide whether the credential needs rotating
pub fn refresh_reason(status: Option<&ExpiryStatus>, threshold_secs: i64) -> Option<RefreshReason> {
    match status {
        None => Some(RefreshReason::ExpiryUnknown),
        Some(s) if s.seconds_until_expiry < 0 => Some(RefreshReason::Expired),
        Some(s) if s.seconds_until_expiry < threshold_secs => Some(RefreshReason::BelowThreshold),
        Some(_) => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    NoAction,
    Refreshed,
    /// Dry run: a refresh was needed but not performed
    WouldRefresh,
    Exhausted,
}

impl CycleOutcome {
    /// Process exit code for single-shot mode
    pub fn exit_code(&self) -> u8 {
        match self {
            CycleOutcome::NoAction | CycleOutcome::Refreshed | CycleOutcome::WouldRefresh => 0,
            CycleOutcome::Exhausted => 1,
        }
    }
}

/// Summary of one check cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub outcome: CycleOutcome,
    pub seconds_until_expiry: Option<i64>,
    pub reason: Option<RefreshReason>,
    pub consecutive_failures: u32,
    pub alert_raised: bool,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub threshold_secs: i64,
    pub interval: Duration,
    pub dry_run: bool,
}

pub struct Scheduler {
    resolver: ExpirationResolver,
    orchestrator: RefreshOrchestrator,
    metrics: Arc<dyn MetricsStore>,
    audit: Arc<dyn AuditLog>,
    settings: SchedulerSettings,
    state: RotationState,
    current: SchedulerState,
}

impl Scheduler {
    /// Build a scheduler, loading rotation history from `metrics`
    pub fn new(
        resolver: ExpirationResolver,
        orchestrator: RefreshOrchestrator,
        metrics: Arc<dyn MetricsStore>,
        audit: Arc<dyn AuditLog>,
        settings: SchedulerSettings,
    ) -> Result<Self, StoreError> {
        let state = metrics.load()?;
        tracing::info!(
            total_refreshes = state.total_refreshes,
            failed_refreshes = state.failed_refreshes,
            consecutive_failures = state.consecutive_failures,
            "Loaded rotation metrics"
        );
        Ok(Self {
            resolver,
            orchestrator,
            metrics,
            audit,
            settings,
            state,
            current: SchedulerState::Idle,
        })
    }

    pub fn state(&self) -> &RotationState {
        &self.state
    }

    pub fn current(&self) -> SchedulerState {
        self.current
    }

    fn transition(&mut self, next: SchedulerState) {
        tracing::debug!(from = ?self.current, to = ?next, "Scheduler transition");
        self.current = next;
    }

    fn persist(&self) {
        if let Err(e) = self.metrics.save(&self.state) {
            tracing::error!(error = %e, "Failed to persist rotation metrics");
        }
    }

    /// Run one check cycle and, if needed, one refresh cycle
    pub async fn run_once(&mut self) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        self.transition(SchedulerState::Checking);

        let now = Utc::now().timestamp();
        let status = self.resolver.check_expiration_at(now);
        let reason = refresh_reason(status.as_ref(), self.settings.threshold_secs);
        let seconds_until_expiry = status.map(|s| s.seconds_until_expiry);

        if !self.settings.dry_run {
            self.state.record_check(now);
            self.persist();
        }
        if let Err(e) = self.audit.append(&AuditEntry::now(
            cycle_id,
            AuditEvent::Check {
                seconds_until_expiry,
                refresh_needed: reason.is_some(),
                dry_run: self.settings.dry_run,
            },
        )) {
            tracing::warn!(error = %e, "Failed to append audit entry");
        }

        let mut report = CycleReport {
            cycle_id,
            outcome: CycleOutcome::NoAction,
            seconds_until_expiry,
            reason,
            consecutive_failures: self.state.consecutive_failures,
            alert_raised: false,
        };

        let Some(reason) = reason else {
            self.transition(SchedulerState::NoAction);
            tracing::info!(
                seconds_until_expiry = ?seconds_until_expiry,
                threshold = self.settings.threshold_secs,
                "Token valid, no action needed"
            );
            self.transition(SchedulerState::Idle);
            return report;
        };

        if self.settings.dry_run {
            tracing::info!(
                reason = ?reason,
                seconds_until_expiry = ?seconds_until_expiry,
                "Dry run: token would be refreshed"
            );
            report.outcome = CycleOutcome::WouldRefresh;
            self.transition(SchedulerState::Idle);
            return report;
        }

        tracing::info!(reason = ?reason, seconds_until_expiry = ?seconds_until_expiry, "Token needs refresh");
        self.transition(SchedulerState::Refreshing);

        match self
            .orchestrator
            .refresh_with_retry(&mut self.state, cycle_id)
            .await
        {
            Ok(_) => {
                report.outcome = CycleOutcome::Refreshed;
            }
            Err(exhausted) => {
                self.transition(SchedulerState::Alerting);
                tracing::error!(error = %exhausted, "Refresh cycle exhausted");
                report.outcome = CycleOutcome::Exhausted;
                report.alert_raised = exhausted.alert_raised;
            }
        }
        report.consecutive_failures = self.state.consecutive_failures;

        self.transition(SchedulerState::Idle);
        report
    }

    /// Poll until `cancel` fires. Returns the number of completed cycles.
    ///
    /// Exhausted refresh cycles are reported and polling continues.
    pub async fn run_daemon<F>(&mut self, cancel: CancellationToken, mut on_report: F) -> u64
    where
        F: FnMut(&CycleReport) + Send,
    {
        tracing::info!(
            interval_secs = self.settings.interval.as_secs(),
            threshold = self.settings.threshold_secs,
            "Rotation daemon started"
        );
        let mut cycles: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let report = self.run_once().await;
            cycles += 1;
            on_report(&report);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }

        tracing::info!(cycles, "Rotation daemon stopped");
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expiration::{write_cached_expiry, ExpirySource};
    use crate::mocks::{
        InMemoryAuditLog, InMemoryMetricsStore, RecordedConfigurator, ScriptedCredentialProvider,
    };
    use crate::refresh::RefreshSettings;
    use crate::retry_policy::RetryPolicy;
    use crate::traits::ProviderError;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        cache: std::path::PathBuf,
        provider: ScriptedCredentialProvider,
        configurator: RecordedConfigurator,
        metrics: InMemoryMetricsStore,
        audit: InMemoryAuditLog,
    }

    impl Fixture {
        fn new(provider: ScriptedCredentialProvider) -> Self {
            let dir = TempDir::new().unwrap();
            let cache = dir.path().join("token-expiry");
            Self {
                _dir: dir,
                cache,
                provider,
                configurator: RecordedConfigurator::new(),
                metrics: InMemoryMetricsStore::new(),
                audit: InMemoryAuditLog::new(),
            }
        }

        fn expires_in(&self, secs: i64) {
            write_cached_expiry(&self.cache, Utc::now().timestamp() + secs).unwrap();
        }

        fn scheduler(&self, dry_run: bool) -> Scheduler {
            let orchestrator = RefreshOrchestrator::new(
                Arc::new(self.provider.clone()),
                Arc::new(self.configurator.clone()),
                Arc::new(self.metrics.clone()),
                Arc::new(self.audit.clone()),
                RefreshSettings {
                    max_attempts: 3,
                    base_delay_secs: 5,
                    http_policy: RetryPolicy::new(3, 5),
                    alert_threshold: 3,
                    registration_url: "https://github.com/acme".to_string(),
                    runner_name: "builder-1".to_string(),
                    expiry_cache: Some(self.cache.clone()),
                },
            );
            Scheduler::new(
                ExpirationResolver::new(vec![ExpirySource::CacheFile {
                    path: self.cache.clone(),
                }]),
                orchestrator,
                Arc::new(self.metrics.clone()),
                Arc::new(self.audit.clone()),
                SchedulerSettings {
                    threshold_secs: 3600,
                    interval: Duration::from_secs(300),
                    dry_run,
                },
            )
            .unwrap()
        }
    }

    fn status(secs: i64) -> ExpiryStatus {
        ExpiryStatus {
            seconds_until_expiry: secs,
            expires_at_epoch: 0,
            provenance: crate::credential::Provenance::Cache,
        }
    }

    #[test]
    fn test_refresh_reason_transitions() {
        assert_eq!(refresh_reason(None, 3600), Some(RefreshReason::ExpiryUnknown));
        assert_eq!(refresh_reason(Some(&status(-1)), 3600), Some(RefreshReason::Expired));
        assert_eq!(refresh_reason(Some(&status(0)), 3600), Some(RefreshReason::BelowThreshold));
        assert_eq!(refresh_reason(Some(&status(3599)), 3600), Some(RefreshReason::BelowThreshold));
        assert_eq!(refresh_reason(Some(&status(3600)), 3600), None);
        assert_eq!(refresh_reason(Some(&status(86_400)), 3600), None);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(CycleOutcome::NoAction.exit_code(), 0);
        assert_eq!(CycleOutcome::Refreshed.exit_code(), 0);
        assert_eq!(CycleOutcome::WouldRefresh.exit_code(), 0);
        assert_eq!(CycleOutcome::Exhausted.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_repeated_check_is_idempotent() {
        let fx = Fixture::new(ScriptedCredentialProvider::success());
        fx.expires_in(86_400);
        let mut scheduler = fx.scheduler(false);

        let first = scheduler.run_once().await;
        let after_first = fx.metrics.snapshot().unwrap();
        let second = scheduler.run_once().await;
        let after_second = fx.metrics.snapshot().unwrap();

        assert_eq!(first.outcome, CycleOutcome::NoAction);
        assert_eq!(second.outcome, CycleOutcome::NoAction);
        assert_eq!(fx.provider.issue_calls(), 0);
        assert!(fx.configurator.calls().is_empty());
        assert!(after_first.last_check_at.is_some());
        assert!(after_second.last_check_at >= after_first.last_check_at);
        assert_eq!(after_second.last_refresh_at, None);
        assert_eq!(after_second.total_refreshes, 0);
        assert_eq!(after_second.failed_refreshes, 0);
        assert_eq!(after_second.consecutive_failures, 0);
        assert_eq!(scheduler.current(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_near_expiry_triggers_refresh() {
        let provider = ScriptedCredentialProvider::new();
        provider.set_behavior(crate::mocks::ProviderBehavior::AlwaysSucceed {
            valid_for_secs: 86_400,
        });
        let fx = Fixture::new(provider);
        fx.expires_in(60);
        let mut scheduler = fx.scheduler(false);

        let report = scheduler.run_once().await;

        assert_eq!(report.outcome, CycleOutcome::Refreshed);
        assert_eq!(report.reason, Some(RefreshReason::BelowThreshold));
        assert_eq!(scheduler.state().total_refreshes, 1);
        assert_eq!(fx.configurator.register_count(), 1);

        // The new expiry is now cached, so the next check is a no-op
        let next = scheduler.run_once().await;
        assert_eq!(next.outcome, CycleOutcome::NoAction);
        assert_eq!(fx.provider.issue_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_expiry_triggers_refresh() {
        let fx = Fixture::new(ScriptedCredentialProvider::success());
        let mut scheduler = fx.scheduler(false);

        let report = scheduler.run_once().await;

        assert_eq!(report.reason, Some(RefreshReason::ExpiryUnknown));
        assert_eq!(report.seconds_until_expiry, None);
        assert_eq!(report.outcome, CycleOutcome::Refreshed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_token_triggers_refresh() {
        let fx = Fixture::new(ScriptedCredentialProvider::success());
        fx.expires_in(-120);
        let mut scheduler = fx.scheduler(false);

        let report = scheduler.run_once().await;

        assert_eq!(report.reason, Some(RefreshReason::Expired));
        assert!(report.seconds_until_expiry.unwrap() < 0);
        assert_eq!(report.outcome, CycleOutcome::Refreshed);
    }

    #[tokio::test]
    async fn test_dry_run_neither_refreshes_nor_persists() {
        let fx = Fixture::new(ScriptedCredentialProvider::success());
        fx.expires_in(10);
        let mut scheduler = fx.scheduler(true);

        let report = scheduler.run_once().await;

        assert_eq!(report.outcome, CycleOutcome::WouldRefresh);
        assert_eq!(fx.provider.issue_calls(), 0);
        assert!(fx.configurator.calls().is_empty());
        assert_eq!(fx.metrics.save_count(), 0);
        assert!(matches!(
            fx.audit.events().first(),
            Some(AuditEvent::Check { dry_run: true, refresh_needed: true, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_cycle_reports_and_alerts_once() {
        let fx = Fixture::new(ScriptedCredentialProvider::always_fail(ProviderError::HttpError {
            status: 401,
            retry_after: None,
        }));
        let mut scheduler = fx.scheduler(false);

        let mut alerts = Vec::new();
        for _ in 0..4 {
            let report = scheduler.run_once().await;
            assert_eq!(report.outcome, CycleOutcome::Exhausted);
            alerts.push(report.alert_raised);
        }

        assert_eq!(alerts, vec![false, false, true, false]);
        assert_eq!(fx.audit.alert_count(), 1);
        assert_eq!(scheduler.state().consecutive_failures, 4);
        assert_eq!(scheduler.current(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_state_is_loaded_at_startup() {
        let mut fx = Fixture::new(ScriptedCredentialProvider::success());
        fx.metrics = InMemoryMetricsStore::with_state(RotationState {
            total_refreshes: 9,
            consecutive_failures: 2,
            ..Default::default()
        });
        let scheduler = fx.scheduler(false);

        assert_eq!(scheduler.state().total_refreshes, 9);
        assert_eq!(scheduler.state().consecutive_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_daemon_polls_until_cancelled() {
        let fx = Fixture::new(ScriptedCredentialProvider::success());
        fx.expires_in(86_400 * 30);
        let mut scheduler = fx.scheduler(false);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            // Lands inside the third interval sleep
            tokio::time::sleep(Duration::from_secs(650)).await;
            canceller.cancel();
        });

        let mut outcomes = Vec::new();
        let cycles = scheduler
            .run_daemon(cancel, |report| outcomes.push(report.outcome))
            .await;

        assert_eq!(cycles, 3);
        assert_eq!(outcomes, vec![CycleOutcome::NoAction; 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_daemon_exits_immediately_when_already_cancelled() {
        let fx = Fixture::new(ScriptedCredentialProvider::success());
        let mut scheduler = fx.scheduler(false);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let cycles = scheduler.run_daemon(cancel, |_| {}).await;

        assert_eq!(cycles, 0);
        assert!(fx.metrics.snapshot().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_daemon_lets_refresh_finish_before_stopping() {
        let cancel = CancellationToken::new();
        let mut fx = Fixture::new(ScriptedCredentialProvider::success());
        let trigger = cancel.clone();
        // Interrupt arrives while the runner is being re-registered
        fx.configurator = RecordedConfigurator::new().on_register(Arc::new(move || trigger.cancel()));
        let mut scheduler = fx.scheduler(false);

        let mut outcomes = Vec::new();
        let cycles = scheduler
            .run_daemon(cancel, |report| outcomes.push(report.outcome))
            .await;

        assert_eq!(cycles, 1);
        assert_eq!(outcomes, vec![CycleOutcome::Refreshed]);
        // Service restarted after registration despite the interrupt
        assert_eq!(
            fx.configurator.calls().last(),
            Some(&crate::mocks::ConfiguratorCall::StartService)
        );
        assert_eq!(fx.metrics.snapshot().unwrap().total_refreshes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_daemon_keeps_polling_after_exhaustion() {
        let fx = Fixture::new(ScriptedCredentialProvider::always_fail(ProviderError::HttpError {
            status: 403,
            retry_after: None,
        }));
        let mut scheduler = fx.scheduler(false);
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();

        let mut count = 0;
        let cycles = scheduler
            .run_daemon(cancel, move |report| {
                assert_eq!(report.outcome, CycleOutcome::Exhausted);
                count += 1;
                if count == 2 {
                    canceller.cancel();
                }
            })
            .await;

        assert_eq!(cycles, 2);
        assert_eq!(scheduler.state().failed_refreshes, 2);
    }
}
