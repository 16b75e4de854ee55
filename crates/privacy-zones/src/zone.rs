//! Privacy Zone Model

use chrono::{DateTime, Utc};
use geo_kernel::Coordinate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Zone registry errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ZoneError {
    /// Zero, negative, or non-finite radius
    #[error("zone radius {0} must be finite and > 0")]
    InvalidRadius(f64),

    /// Obfuscation radius invalid for an obfuscate zone
    #[error("obfuscation radius {0} must be finite and > 0")]
    InvalidObfuscationRadius(f64),

    /// Operation referenced a zone that is not registered
    #[error("unknown zone: {0}")]
    UnknownZone(String),
}

/// What happens to a sample matching the zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneAction {
    /// Drop the sample from the stream
    Exclude,
    /// Replace the coordinate with a randomized nearby point
    Obfuscate,
}

/// A caller-defined privacy zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacyZone {
    pub id: String,
    pub center: Coordinate,
    /// Match radius around the center, meters
    pub radius_m: f64,
    pub action: ZoneAction,
    /// Radius of the obfuscation disc around the center, meters
    pub obfuscation_radius_m: f64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PrivacyZone {
    /// Create a zone; the obfuscation radius defaults to the match radius.
    pub fn new(
        id: impl Into<String>,
        center: Coordinate,
        radius_m: f64,
        action: ZoneAction,
    ) -> Result<Self, ZoneError> {
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(ZoneError::InvalidRadius(radius_m));
        }
        let now = Utc::now();
        Ok(Self {
            id: id.into(),
            center,
            radius_m,
            action,
            obfuscation_radius_m: radius_m,
            enabled: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Override the obfuscation disc radius.
    pub fn with_obfuscation_radius(mut self, radius_m: f64) -> Result<Self, ZoneError> {
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(ZoneError::InvalidObfuscationRadius(radius_m));
        }
        self.obfuscation_radius_m = radius_m;
        Ok(self)
    }
}

/// Zone registry lifecycle notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneEvent {
    Added(String),
    Replaced(String),
    Removed(String),
    Enabled(String),
    Disabled(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn center() -> Coordinate {
        Coordinate::new(37.0, -122.0, 0.0).unwrap()
    }

    #[test]
    fn test_new_zone_defaults() {
        let z = PrivacyZone::new("home", center(), 100.0, ZoneAction::Obfuscate).unwrap();
        assert!(z.enabled);
        assert_eq!(z.obfuscation_radius_m, 100.0);
        assert_eq!(z.created_at, z.updated_at);
    }

    #[test]
    fn test_radius_validation() {
        assert_eq!(
            PrivacyZone::new("x", center(), 0.0, ZoneAction::Exclude),
            Err(ZoneError::InvalidRadius(0.0))
        );
        assert!(PrivacyZone::new("x", center(), f64::NAN, ZoneAction::Exclude).is_err());
    }

    #[test]
    fn test_obfuscation_radius_override() {
        let z = PrivacyZone::new("home", center(), 100.0, ZoneAction::Obfuscate)
            .unwrap()
            .with_obfuscation_radius(250.0)
            .unwrap();
        assert_eq!(z.obfuscation_radius_m, 250.0);
        assert!(z.with_obfuscation_radius(-1.0).is_err());
    }
}
