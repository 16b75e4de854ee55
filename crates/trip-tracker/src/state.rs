//! Persistent Trip State & Summary

use crate::TripConfig;
use chrono::{DateTime, Utc};
use location_events::LocationSample;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Per-deviation bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct DeviationState {
    /// Whether the next over-threshold sample should fire
    pub armed: bool,
    pub last_fired: Option<DateTime<Utc>>,
}

impl Default for DeviationState {
    fn default() -> Self {
        Self {
            armed: true,
            last_fired: None,
        }
    }
}

/// The running state of an active trip.
///
/// Serialized as-is through the [`crate::TripStore`] so a restart resumes
/// the same trip id and accumulators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripState {
    pub trip_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Config snapshot taken at start; later config changes do not affect
    /// a trip already underway
    pub config: TripConfig,
    pub distance_m: f64,
    pub max_speed_mps: f64,
    /// Milliseconds attributed to movement
    pub moving_ms: u64,
    /// Milliseconds attributed to standing still
    pub idle_ms: u64,
    pub last_sample: Option<LocationSample>,
    pub(crate) deviation: DeviationState,
}

impl TripState {
    pub(crate) fn begin(config: TripConfig, started_at: DateTime<Utc>) -> Self {
        Self {
            trip_id: Uuid::new_v4(),
            started_at,
            config,
            distance_m: 0.0,
            max_speed_mps: 0.0,
            moving_ms: 0,
            idle_ms: 0,
            last_sample: None,
            deviation: DeviationState::default(),
        }
    }

    /// Produce the summary for a trip ending at `ended_at`.
    pub(crate) fn summarize(&self, ended_at: DateTime<Utc>) -> TripSummary {
        let duration_ms = (ended_at - self.started_at).num_milliseconds().max(0) as u64;
        let duration = Duration::from_millis(duration_ms);
        let average_speed_mps = if duration_ms > 0 {
            self.distance_m / (duration_ms as f64 / 1000.0)
        } else {
            0.0
        };
        TripSummary {
            trip_id: self.trip_id,
            started_at: self.started_at,
            ended_at,
            distance_m: self.distance_m,
            duration,
            average_speed_mps,
            max_speed_mps: self.max_speed_mps,
            moving_duration: Duration::from_millis(self.moving_ms),
            idle_duration: Duration::from_millis(self.idle_ms),
        }
    }
}

/// The result of a completed trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripSummary {
    pub trip_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub distance_m: f64,
    pub duration: Duration,
    pub average_speed_mps: f64,
    pub max_speed_mps: f64,
    pub moving_duration: Duration,
    pub idle_duration: Duration,
}
