//! Rotation history counters
//!
//! Loaded once at startup, mutated after every check or refresh attempt and
//! persisted by the caller through a [`MetricsStore`](crate::traits::MetricsStore).

use serde::{Deserialize, Serialize};

/// Durable record of rotation activity
///
/// Serialized with the on-disk field names of the metrics record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationState {
    #[serde(default, rename = "lastCheckEpoch")]
    pub last_check_at: Option<i64>,
    #[serde(default, rename = "lastRefreshEpoch")]
    pub last_refresh_at: Option<i64>,
    #[serde(default)]
    pub total_refreshes: u64,
    #[serde(default)]
    pub failed_refreshes: u64,
    #[serde(default)]
    pub consecutive_failures: u32,
}

impl RotationState {
    /// A check ran. Never touches the failure streak.
    pub fn record_check(&mut self, now: i64) {
        self.last_check_at = Some(now);
    }

    /// A refresh completed end to end
    pub fn record_success(&mut self, now: i64) {
        self.last_refresh_at = Some(now);
        self.total_refreshes += 1;
        self.consecutive_failures = 0;
    }

    /// A refresh cycle exhausted its attempts.
    ///
    /// Returns true when this failure is the one that brings the streak up to
    /// `alert_threshold`. Later failures in the same streak return false.
    pub fn record_failure(&mut self, alert_threshold: u32) -> bool {
        self.failed_refreshes += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        alert_threshold > 0 && self.consecutive_failures == alert_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_zero_state() {
        let state = RotationState::default();
        assert_eq!(state.last_check_at, None);
        assert_eq!(state.last_refresh_at, None);
        assert_eq!(state.total_refreshes, 0);
        assert_eq!(state.failed_refreshes, 0);
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn test_check_does_not_reset_streak() {
        let mut state = RotationState {
            consecutive_failures: 2,
            ..Default::default()
        };
        state.record_check(1_000);
        assert_eq!(state.last_check_at, Some(1_000));
        assert_eq!(state.consecutive_failures, 2);
    }

    #[test]
    fn test_success_resets_streak() {
        let mut state = RotationState {
            consecutive_failures: 5,
            failed_refreshes: 5,
            ..Default::default()
        };
        state.record_success(2_000);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.total_refreshes, 1);
        assert_eq!(state.failed_refreshes, 5);
        assert_eq!(state.last_refresh_at, Some(2_000));
    }

    #[test]
    fn test_alert_fires_once_per_crossing() {
        let mut state = RotationState::default();
        assert!(!state.record_failure(3));
        assert!(!state.record_failure(3));
        assert!(state.record_failure(3));
        assert!(!state.record_failure(3));
        assert!(!state.record_failure(3));
        assert_eq!(state.failed_refreshes, 5);

        // A success re-arms the alert
        state.record_success(10);
        assert!(!state.record_failure(3));
        assert!(!state.record_failure(3));
        assert!(state.record_failure(3));
    }

    #[test]
    fn test_zero_threshold_never_alerts() {
        let mut state = RotationState::default();
        for _ in 0..5 {
            assert!(!state.record_failure(0));
        }
    }

    #[test]
    fn test_json_field_names() {
        let state = RotationState {
            last_check_at: Some(10),
            last_refresh_at: None,
            total_refreshes: 2,
            failed_refreshes: 1,
            consecutive_failures: 1,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["lastCheckEpoch"], 10);
        assert!(json["lastRefreshEpoch"].is_null());
        assert_eq!(json["totalRefreshes"], 2);
        assert_eq!(json["failedRefreshes"], 1);
        assert_eq!(json["consecutiveFailures"], 1);
    }

    #[test]
    fn test_missing_fields_default() {
        let state: RotationState = serde_json::from_str(r#"{"totalRefreshes": 7}"#).unwrap();
        assert_eq!(state.total_refreshes, 7);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.last_check_at, None);
    }
}
