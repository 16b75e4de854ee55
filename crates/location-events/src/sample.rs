//! Location Sample

use chrono::{DateTime, Utc};
use geo_kernel::Coordinate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One positioning fix flowing through the enrichment pipeline.
///
/// Samples are immutable once created: each pipeline stage that needs to
/// annotate a sample consumes it and returns a new copy with the added
/// metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub coordinate: Coordinate,
    /// Whether the device reported itself as moving at fix time
    pub is_moving: bool,
    /// Provider odometer reading in meters
    pub odometer_m: f64,
    /// Set by the spoof detector; `None` until analyzed
    pub mock: Option<bool>,
    /// Set by the privacy engine when the coordinate was randomized
    pub obfuscated: bool,
}

impl LocationSample {
    /// Create a fresh sample with a new unique id.
    pub fn new(coordinate: Coordinate, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            coordinate,
            is_moving: false,
            odometer_m: 0.0,
            mock: None,
            obfuscated: false,
        }
    }

    /// Copy with the motion flag set.
    pub fn moving(mut self, is_moving: bool) -> Self {
        self.is_moving = is_moving;
        self
    }

    /// Copy with the odometer reading set.
    pub fn with_odometer(mut self, odometer_m: f64) -> Self {
        self.odometer_m = odometer_m;
        self
    }

    /// Copy tagged by the spoof detector.
    pub fn tagged_mock(mut self, mock: bool) -> Self {
        self.mock = Some(mock);
        self
    }

    /// Copy with the coordinate replaced by an obfuscated one.
    pub fn obfuscated_at(mut self, coordinate: Coordinate) -> Self {
        self.coordinate = coordinate;
        self.obfuscated = true;
        self
    }
}
