//! Substring Error Classification

use crate::LocusErrorType;

/// Map a raw error message to a [`LocusErrorType`] by substring heuristics.
///
/// Checks run in precedence order; the first family that matches wins, and
/// anything unmatched falls back to `Unknown`.
pub fn classify(message: &str) -> LocusErrorType {
    let msg = message.to_lowercase();

    if msg.contains("permission") || msg.contains("denied") || msg.contains("unauthorized") {
        LocusErrorType::PermissionDenied
    } else if msg.contains("timeout") || msg.contains("timed out") {
        LocusErrorType::LocationTimeout
    } else if msg.contains("network") || msg.contains("connection") || msg.contains("internet") {
        LocusErrorType::NetworkError
    } else if msg.contains("disconnect") {
        LocusErrorType::ServiceDisconnected
    } else if msg.contains("disabled")
        || msg.contains("provider off")
        || msg.contains("location services")
    {
        LocusErrorType::ServicesDisabled
    } else if msg.contains("config") || msg.contains("invalid option") {
        LocusErrorType::ConfigError
    } else if msg.contains("geofence") || msg.contains("region") {
        LocusErrorType::GeofenceError
    } else {
        LocusErrorType::Unknown
    }
}
