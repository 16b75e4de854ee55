//! Validated Geographic Coordinate

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from geometric validation
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GeoError {
    /// Latitude outside [-90, 90]
    #[error("latitude {0} is out of range [-90, 90]")]
    InvalidLatitude(f64),

    /// Longitude outside [-180, 180]
    #[error("longitude {0} is out of range [-180, 180]")]
    InvalidLongitude(f64),

    /// Negative or non-finite accuracy
    #[error("accuracy {0} must be finite and >= 0")]
    InvalidAccuracy(f64),

    /// Polygon with fewer than three vertices
    #[error("polygon needs at least 3 vertices, got {0}")]
    DegeneratePolygon(usize),
}

/// A geographic position with measurement metadata.
///
/// Construction validates latitude ∈ [-90, 90], longitude ∈ [-180, 180]
/// and accuracy ≥ 0; a `Coordinate` that exists is always well-formed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy estimate in meters
    pub accuracy_m: f64,
    /// Ground speed in m/s, when the provider reports one
    pub speed_mps: Option<f64>,
    /// Heading in degrees clockwise from true north
    pub heading_deg: Option<f64>,
    /// Altitude above the WGS84 ellipsoid in meters
    pub altitude_m: Option<f64>,
}

impl Coordinate {
    /// Create a validated coordinate.
    pub fn new(latitude: f64, longitude: f64, accuracy_m: f64) -> Result<Self, GeoError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(GeoError::InvalidLatitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(GeoError::InvalidLongitude(longitude));
        }
        if !accuracy_m.is_finite() || accuracy_m < 0.0 {
            return Err(GeoError::InvalidAccuracy(accuracy_m));
        }
        Ok(Self {
            latitude,
            longitude,
            accuracy_m,
            speed_mps: None,
            heading_deg: None,
            altitude_m: None,
        })
    }

    /// Attach a reported ground speed (m/s).
    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = Some(speed_mps);
        self
    }

    /// Attach a reported heading (degrees).
    pub fn with_heading(mut self, heading_deg: f64) -> Self {
        self.heading_deg = Some(heading_deg);
        self
    }

    /// Attach a reported altitude (meters).
    pub fn with_altitude(mut self, altitude_m: f64) -> Self {
        self.altitude_m = Some(altitude_m);
        self
    }
}
