//! Trip Configuration

use geo_kernel::Coordinate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Trip tracking knobs, snapshotted into the trip state on start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripConfig {
    /// Start a trip automatically on the first qualifying movement
    pub start_on_moving: bool,
    /// Minimum distance between consecutive samples to qualify (meters)
    pub start_distance_m: f64,
    /// Minimum implied speed between consecutive samples to qualify (km/h)
    pub start_speed_kph: f64,
    /// Reference route for deviation detection, when configured
    pub route: Option<Vec<Coordinate>>,
    /// Perpendicular distance from the route that counts as a deviation
    pub route_deviation_threshold_m: f64,
    /// Re-arm window after a deviation fires while still off-route
    pub deviation_cooldown: Duration,
}

impl Default for TripConfig {
    fn default() -> Self {
        Self {
            start_on_moving: false,
            start_distance_m: 50.0,
            start_speed_kph: 5.0,
            route: None,
            route_deviation_threshold_m: 100.0,
            deviation_cooldown: Duration::from_secs(120),
        }
    }
}
