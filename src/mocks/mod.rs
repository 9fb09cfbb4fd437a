//! Test doubles for dependency injection
//!
//! Provides in-memory implementations of all external collaborators for isolated testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::rotation_state::RotationState;
use crate::traits::{
    AgentConfigurator, AuditEntry, AuditError, AuditEvent, AuditLog, ConfiguratorError,
    CredentialProvider, IssuedToken, MetricsStore, ProviderError, Registration, RegistrationToken,
    StoreError,
};

// ============================================================================
// ScriptedCredentialProvider
// ============================================================================

/// Failure configuration for the credential provider
#[derive(Debug, Clone)]
pub enum ProviderBehavior {
    /// Always issue a token valid for the given number of seconds
    AlwaysSucceed { valid_for_secs: i64 },
    /// Fail N times, then succeed
    FailThenSucceed { fail_count: usize, error: ProviderError },
    /// Always fail with given error
    AlwaysFail(ProviderError),
}

/// Scripted credential provider for testing
///
/// Queued responses are consumed first; once the queue is empty the
/// configured behavior applies.
#[derive(Clone)]
pub struct ScriptedCredentialProvider {
    queue: Arc<Mutex<VecDeque<Result<IssuedToken, ProviderError>>>>,
    behavior: Arc<Mutex<ProviderBehavior>>,
    removal_error: Arc<Mutex<Option<ProviderError>>>,
    issue_calls: Arc<Mutex<usize>>,
    removal_calls: Arc<Mutex<usize>>,
}

impl ScriptedCredentialProvider {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            behavior: Arc::new(Mutex::new(ProviderBehavior::AlwaysSucceed {
                valid_for_secs: 3600,
            })),
            removal_error: Arc::new(Mutex::new(None)),
            issue_calls: Arc::new(Mutex::new(0)),
            removal_calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Always issue a one-hour token
    pub fn success() -> Self {
        Self::new()
    }

    /// Fail N times, then succeed
    pub fn fail_then_succeed(fail_count: usize, error: ProviderError) -> Self {
        let provider = Self::new();
        provider.set_behavior(ProviderBehavior::FailThenSucceed { fail_count, error });
        provider
    }

    /// Always fail with given error
    pub fn always_fail(error: ProviderError) -> Self {
        let provider = Self::new();
        provider.set_behavior(ProviderBehavior::AlwaysFail(error));
        provider
    }

    pub fn set_behavior(&self, behavior: ProviderBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Queue a one-off response ahead of the configured behavior
    pub fn push_response(&self, response: Result<IssuedToken, ProviderError>) {
        self.queue.lock().unwrap().push_back(response);
    }

    /// Make removal-token requests fail
    pub fn fail_removal(&self, error: ProviderError) {
        *self.removal_error.lock().unwrap() = Some(error);
    }

    /// Number of issue calls made
    pub fn issue_calls(&self) -> usize {
        *self.issue_calls.lock().unwrap()
    }

    /// Number of removal-token calls made
    pub fn removal_calls(&self) -> usize {
        *self.removal_calls.lock().unwrap()
    }

    fn token(valid_for_secs: i64, n: usize) -> IssuedToken {
        IssuedToken {
            token: RegistrationToken::new(format!("TOKEN-{:04}", n)),
            expires_at: Utc::now() + Duration::seconds(valid_for_secs),
        }
    }
}

impl Default for ScriptedCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for ScriptedCredentialProvider {
    async fn issue_token(&self) -> Result<IssuedToken, ProviderError> {
        let mut count = self.issue_calls.lock().unwrap();
        *count += 1;
        let current_count = *count;
        drop(count);

        if let Some(response) = self.queue.lock().unwrap().pop_front() {
            return response;
        }

        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            ProviderBehavior::AlwaysSucceed { valid_for_secs } => {
                Ok(Self::token(valid_for_secs, current_count))
            }
            ProviderBehavior::FailThenSucceed { fail_count, error } => {
                if current_count <= fail_count {
                    Err(error)
                } else {
                    Ok(Self::token(3600, current_count))
                }
            }
            ProviderBehavior::AlwaysFail(error) => Err(error),
        }
    }

    async fn removal_token(&self) -> Result<RegistrationToken, ProviderError> {
        *self.removal_calls.lock().unwrap() += 1;
        match self.removal_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(RegistrationToken::new("REMOVAL-TOKEN")),
        }
    }
}

// ============================================================================
// RecordedConfigurator
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfiguratorCall {
    StopService,
    StartService,
    Remove { scoped: bool },
    Register { url: String, name: String, token: String },
}

/// Recorded agent configurator for testing
///
/// Records every invocation; individual steps can be told to fail.
#[derive(Clone, Default)]
pub struct RecordedConfigurator {
    calls: Arc<Mutex<Vec<ConfiguratorCall>>>,
    fail_stop: Arc<Mutex<bool>>,
    fail_start: Arc<Mutex<bool>>,
    fail_scoped_remove: Arc<Mutex<bool>>,
    fail_remove: Arc<Mutex<bool>>,
    register_failures: Arc<Mutex<usize>>,
    on_register: Arc<Mutex<Option<Arc<dyn Fn() + Send + Sync>>>>,
}

impl RecordedConfigurator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_stop(self) -> Self {
        *self.fail_stop.lock().unwrap() = true;
        self
    }

    pub fn fail_start(self) -> Self {
        *self.fail_start.lock().unwrap() = true;
        self
    }

    /// Fail removal when given a scoped token
    pub fn fail_scoped_remove(self) -> Self {
        *self.fail_scoped_remove.lock().unwrap() = true;
        self
    }

    /// Fail every removal, scoped or not
    pub fn fail_remove(self) -> Self {
        *self.fail_remove.lock().unwrap() = true;
        self
    }

    /// Fail the next `count` registrations
    pub fn fail_register(self, count: usize) -> Self {
        *self.register_failures.lock().unwrap() = count;
        self
    }

    /// Run `hook` whenever registration is invoked
    pub fn on_register(self, hook: Arc<dyn Fn() + Send + Sync>) -> Self {
        *self.on_register.lock().unwrap() = Some(hook);
        self
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<ConfiguratorCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of registration calls made
    pub fn register_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, ConfiguratorCall::Register { .. }))
            .count()
    }

    fn record(&self, call: ConfiguratorCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn exit(step: &str) -> ConfiguratorError {
        ConfiguratorError::NonZeroExit {
            step: step.to_string(),
            code: 1,
            stderr: format!("{} failed", step),
        }
    }
}

#[async_trait]
impl AgentConfigurator for RecordedConfigurator {
    async fn stop_service(&self) -> Result<(), ConfiguratorError> {
        self.record(ConfiguratorCall::StopService);
        if *self.fail_stop.lock().unwrap() {
            return Err(Self::exit("service stop"));
        }
        Ok(())
    }

    async fn start_service(&self) -> Result<(), ConfiguratorError> {
        self.record(ConfiguratorCall::StartService);
        if *self.fail_start.lock().unwrap() {
            return Err(Self::exit("service start"));
        }
        Ok(())
    }

    async fn remove(&self, token: Option<&RegistrationToken>) -> Result<(), ConfiguratorError> {
        let scoped = token.is_some();
        self.record(ConfiguratorCall::Remove { scoped });
        if *self.fail_remove.lock().unwrap() || (scoped && *self.fail_scoped_remove.lock().unwrap()) {
            return Err(Self::exit("remove"));
        }
        Ok(())
    }

    async fn register(&self, registration: Registration<'_>) -> Result<(), ConfiguratorError> {
        self.record(ConfiguratorCall::Register {
            url: registration.url.to_string(),
            name: registration.name.to_string(),
            token: registration.token.expose().to_string(),
        });
        let hook = self.on_register.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook();
        }
        let mut remaining = self.register_failures.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(Self::exit("register"));
        }
        Ok(())
    }
}

// ============================================================================
// InMemoryMetricsStore
// ============================================================================

/// In-memory metrics store for testing
#[derive(Clone, Default)]
pub struct InMemoryMetricsStore {
    state: Arc<Mutex<Option<RotationState>>>,
    saves: Arc<Mutex<usize>>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store with a pre-existing record
    pub fn with_state(state: RotationState) -> Self {
        Self {
            state: Arc::new(Mutex::new(Some(state))),
            saves: Arc::new(Mutex::new(0)),
        }
    }

    /// Last saved record, if any
    pub fn snapshot(&self) -> Option<RotationState> {
        self.state.lock().unwrap().clone()
    }

    /// Number of saves performed
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

impl MetricsStore for InMemoryMetricsStore {
    fn load(&self) -> Result<RotationState, StoreError> {
        Ok(self.state.lock().unwrap().clone().unwrap_or_default())
    }

    fn save(&self, state: &RotationState) -> Result<(), StoreError> {
        *self.state.lock().unwrap() = Some(state.clone());
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}

// ============================================================================
// InMemoryAuditLog
// ============================================================================

/// In-memory audit log for testing
#[derive(Clone, Default)]
pub struct InMemoryAuditLog {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.entries().into_iter().map(|e| e.event).collect()
    }

    /// Number of alert lines written
    pub fn alert_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, AuditEvent::Alert { .. }))
            .count()
    }
}

impl AuditLog for InMemoryAuditLog {
    fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
