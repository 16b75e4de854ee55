//! Shared Error Type

use crate::classify;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Failure taxonomy for the location pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocusErrorType {
    PermissionDenied,
    LocationTimeout,
    NetworkError,
    ServiceDisconnected,
    ServicesDisabled,
    ConfigError,
    GeofenceError,
    Unknown,
}

/// Suggested remediation attached to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryAction {
    RequestPermission,
    EnableLocationServices,
    RetryLater,
    ReduceAccuracy,
    CheckConfiguration,
}

/// The error type surfaced to subscribers and routed through recovery.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[error("{error_type:?}: {message}")]
pub struct LocusError {
    pub error_type: LocusErrorType,
    pub message: String,
    /// Whether a retry can plausibly succeed without user intervention
    pub recoverable: bool,
    pub recovery_action: Option<RecoveryAction>,
    /// Free-form context from the originating layer
    pub details: Option<Value>,
}

impl LocusError {
    /// Build an error of a known type; recoverability and the suggested
    /// action default per type.
    pub fn new(error_type: LocusErrorType, message: impl Into<String>) -> Self {
        let (recoverable, recovery_action) = defaults_for(error_type);
        Self {
            error_type,
            message: message.into(),
            recoverable,
            recovery_action,
            details: None,
        }
    }

    /// Build an error by classifying a raw message.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(classify(&message), message)
    }

    /// Attach free-form details.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

fn defaults_for(error_type: LocusErrorType) -> (bool, Option<RecoveryAction>) {
    match error_type {
        LocusErrorType::PermissionDenied => (false, Some(RecoveryAction::RequestPermission)),
        LocusErrorType::ServicesDisabled => (false, Some(RecoveryAction::EnableLocationServices)),
        LocusErrorType::LocationTimeout => (true, Some(RecoveryAction::ReduceAccuracy)),
        LocusErrorType::NetworkError => (true, Some(RecoveryAction::RetryLater)),
        LocusErrorType::ServiceDisconnected => (true, Some(RecoveryAction::RetryLater)),
        LocusErrorType::ConfigError => (false, Some(RecoveryAction::CheckConfiguration)),
        LocusErrorType::GeofenceError => (true, None),
        LocusErrorType::Unknown => (true, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_permission_errors_are_not_recoverable() {
        let err = LocusError::new(LocusErrorType::PermissionDenied, "denied");
        assert!(!err.recoverable);
        assert_eq!(err.recovery_action, Some(RecoveryAction::RequestPermission));
    }

    #[test]
    fn test_timeout_is_recoverable() {
        let err = LocusError::new(LocusErrorType::LocationTimeout, "timed out");
        assert!(err.recoverable);
    }

    #[test]
    fn test_from_message_classifies() {
        let err = LocusError::from_message("network unreachable");
        assert_eq!(err.error_type, LocusErrorType::NetworkError);
    }

    #[test]
    fn test_display_includes_type_and_message() {
        let err = LocusError::new(LocusErrorType::GeofenceError, "too many regions");
        assert_eq!(err.to_string(), "GeofenceError: too many regions");
    }

    #[test]
    fn test_details_round_trip() {
        let err = LocusError::from_message("whatever").with_details(json!({"code": 7}));
        assert_eq!(err.details, Some(json!({"code": 7})));
    }
}
