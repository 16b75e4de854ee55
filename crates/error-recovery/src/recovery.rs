//! Retry & Backoff Recovery Manager

use crate::{LocusError, LocusErrorType};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, warn};

/// Recovery policy knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Retries per error type before degrading to low-power fallback
    pub max_retries: u32,
    /// Base delay before the first retry
    pub retry_delay: Duration,
    /// Multiplier applied per consecutive retry
    pub retry_backoff: f64,
    /// Error types that are always swallowed
    pub ignore_types: HashSet<LocusErrorType>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            retry_backoff: 2.0,
            ignore_types: HashSet::new(),
        }
    }
}

/// What the caller should do with a classified error
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecoveryDecision {
    /// Swallow the error entirely
    Ignore,
    /// Retry the failed operation after the given delay
    Retry { delay: Duration },
    /// Surface the error to subscribers without retrying
    Propagate,
    /// Retry budget exhausted: degrade to low-power tracking
    FallbackLowPower,
    /// Only the user can fix this (permissions, disabled services)
    RequestUserAction,
}

/// Per-type retry bookkeeping with exponential backoff.
pub struct RecoveryManager {
    config: RecoveryConfig,
    retry_counts: HashMap<LocusErrorType, u32>,
}

impl RecoveryManager {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            retry_counts: HashMap::new(),
        }
    }

    /// Decide how to handle an error, advancing that type's retry counter
    /// when the decision is a retry.
    pub fn decide(&mut self, error: &LocusError) -> RecoveryDecision {
        if self.config.ignore_types.contains(&error.error_type) {
            debug!("Ignoring error by policy: {}", error);
            return RecoveryDecision::Ignore;
        }

        if !error.recoverable {
            return match error.error_type {
                LocusErrorType::PermissionDenied | LocusErrorType::ServicesDisabled => {
                    RecoveryDecision::RequestUserAction
                }
                _ => RecoveryDecision::Propagate,
            };
        }

        let count = self.retry_counts.entry(error.error_type).or_insert(0);
        if *count >= self.config.max_retries {
            warn!(
                "Retry budget exhausted for {:?} ({} attempts), falling back to low power",
                error.error_type, count
            );
            return RecoveryDecision::FallbackLowPower;
        }

        let delay = self
            .config
            .retry_delay
            .mul_f64(self.config.retry_backoff.powi(*count as i32));
        *count += 1;
        debug!(
            "Retry {}/{} for {:?} after {:?}",
            count, self.config.max_retries, error.error_type, delay
        );
        RecoveryDecision::Retry { delay }
    }

    /// Clear the retry counter for a type once an operation of that type
    /// succeeds again.
    pub fn mark_resolved(&mut self, error_type: LocusErrorType) {
        if self.retry_counts.remove(&error_type).is_some() {
            debug!("Marked {:?} resolved", error_type);
        }
    }

    /// Current retry count for a type.
    pub fn retry_count(&self, error_type: LocusErrorType) -> u32 {
        self.retry_counts.get(&error_type).copied().unwrap_or(0)
    }

    /// Drop all retry bookkeeping.
    pub fn reset(&mut self) {
        self.retry_counts.clear();
    }
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::new(RecoveryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_error() -> LocusError {
        LocusError::new(LocusErrorType::NetworkError, "connection refused")
    }

    #[test]
    fn test_exponential_backoff() {
        let mut mgr = RecoveryManager::default();
        let err = network_error();

        match mgr.decide(&err) {
            RecoveryDecision::Retry { delay } => assert_eq!(delay, Duration::from_secs(1)),
            other => panic!("expected retry, got {other:?}"),
        }
        match mgr.decide(&err) {
            RecoveryDecision::Retry { delay } => assert_eq!(delay, Duration::from_secs(2)),
            other => panic!("expected retry, got {other:?}"),
        }
        match mgr.decide(&err) {
            RecoveryDecision::Retry { delay } => assert_eq!(delay, Duration::from_secs(4)),
            other => panic!("expected retry, got {other:?}"),
        }
    }

    #[test]
    fn test_fallback_after_max_retries() {
        let mut mgr = RecoveryManager::default();
        let err = network_error();
        for _ in 0..3 {
            assert!(matches!(mgr.decide(&err), RecoveryDecision::Retry { .. }));
        }
        assert_eq!(mgr.decide(&err), RecoveryDecision::FallbackLowPower);
        // Sticky until resolved
        assert_eq!(mgr.decide(&err), RecoveryDecision::FallbackLowPower);
    }

    #[test]
    fn test_mark_resolved_resets_counter() {
        let mut mgr = RecoveryManager::default();
        let err = network_error();
        for _ in 0..3 {
            mgr.decide(&err);
        }
        mgr.mark_resolved(LocusErrorType::NetworkError);
        assert_eq!(mgr.retry_count(LocusErrorType::NetworkError), 0);
        assert!(matches!(mgr.decide(&err), RecoveryDecision::Retry { .. }));
    }

    #[test]
    fn test_ignore_set() {
        let mut config = RecoveryConfig::default();
        config.ignore_types.insert(LocusErrorType::NetworkError);
        let mut mgr = RecoveryManager::new(config);
        assert_eq!(mgr.decide(&network_error()), RecoveryDecision::Ignore);
    }

    #[test]
    fn test_permission_requests_user_action() {
        let mut mgr = RecoveryManager::default();
        let err = LocusError::new(LocusErrorType::PermissionDenied, "denied");
        assert_eq!(mgr.decide(&err), RecoveryDecision::RequestUserAction);
    }

    #[test]
    fn test_config_error_propagates() {
        let mut mgr = RecoveryManager::default();
        let err = LocusError::new(LocusErrorType::ConfigError, "invalid option: foo");
        assert_eq!(mgr.decide(&err), RecoveryDecision::Propagate);
    }
}
