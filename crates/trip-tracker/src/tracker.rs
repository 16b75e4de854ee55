//! Trip Lifecycle Tracking

use crate::state::TripState;
use crate::{StoreError, TripConfig, TripStore, TripSummary};
use chrono::{DateTime, Utc};
use geo_kernel::{haversine_distance, implied_speed_kph, point_to_segment_distance};
use location_events::LocationSample;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Trip lifecycle notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TripEvent {
    Started {
        trip_id: Uuid,
        timestamp: DateTime<Utc>,
        /// Whether the movement threshold triggered the start
        auto: bool,
    },
    RouteDeviation {
        trip_id: Uuid,
        deviation_m: f64,
        sample: LocationSample,
    },
    Stopped {
        summary: TripSummary,
    },
}

/// The idle/active trip state machine.
pub struct TripTracker {
    config: TripConfig,
    store: Arc<dyn TripStore>,
    active: Option<TripState>,
    /// Last sample seen while idle, anchoring the auto-start threshold
    idle_anchor: Option<LocationSample>,
}

impl TripTracker {
    pub fn new(config: TripConfig, store: Arc<dyn TripStore>) -> Self {
        Self {
            config,
            store,
            active: None,
            idle_anchor: None,
        }
    }

    /// Attempt to resume a prior trip from the store. Called once after
    /// construction so a process restart does not lose an in-flight trip.
    pub async fn restore(&mut self) {
        match self.store.load().await {
            Ok(Some(state)) => {
                info!(
                    "Resumed trip {} ({}m so far)",
                    state.trip_id, state.distance_m as i64
                );
                self.active = Some(state);
            }
            Ok(None) => debug!("No persisted trip to resume"),
            Err(e) => warn!("Trip restore failed, starting idle: {}", e),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Id of the trip underway, if any.
    pub fn trip_id(&self) -> Option<Uuid> {
        self.active.as_ref().map(|s| s.trip_id)
    }

    /// Explicitly start a trip. A duplicate start against an active trip
    /// is an idempotent no-op.
    pub async fn start(&mut self) -> Option<TripEvent> {
        if let Some(state) = &self.active {
            debug!("Trip {} already active, ignoring start", state.trip_id);
            return None;
        }
        let state = TripState::begin(self.config.clone(), Utc::now());
        let event = TripEvent::Started {
            trip_id: state.trip_id,
            timestamp: state.started_at,
            auto: false,
        };
        info!("Trip {} started", state.trip_id);
        self.active = Some(state);
        self.idle_anchor = None;
        self.persist().await;
        event.into()
    }

    /// Stop the active trip and return its summary. Returns `None` when no
    /// trip is underway; that is not an error.
    pub async fn stop(&mut self) -> Option<TripSummary> {
        let state = self.active.take()?;
        let ended_at = match &state.last_sample {
            Some(s) if s.timestamp >= state.started_at => s.timestamp,
            _ => Utc::now().max(state.started_at),
        };
        let summary = state.summarize(ended_at);
        info!(
            "Trip {} stopped: {}m in {:?}",
            summary.trip_id, summary.distance_m as i64, summary.duration
        );
        if let Err(e) = self.store.clear().await {
            warn!("Trip store clear failed: {}", e);
        }
        Some(summary)
    }

    /// Feed one enriched sample through the machine.
    pub async fn handle_sample(&mut self, sample: &LocationSample) -> Vec<TripEvent> {
        let mut events = Vec::new();

        if self.active.is_none() {
            if self.config.start_on_moving {
                if let Some(event) = self.try_auto_start(sample) {
                    events.push(event);
                }
            }
            if self.active.is_none() {
                self.idle_anchor = Some(sample.clone());
                return events;
            }
        }

        if let Some(state) = &mut self.active {
            accumulate(state, sample);
            if let Some(event) = check_route_deviation(state, sample) {
                events.push(event);
            }
            state.last_sample = Some(sample.clone());
        }
        self.persist().await;
        events
    }

    /// Drop in-memory state without touching the store; a later
    /// [`Self::restore`] resumes whatever was last persisted.
    pub fn reset(&mut self) {
        self.active = None;
        self.idle_anchor = None;
        debug!("Trip tracker reset");
    }

    fn try_auto_start(&mut self, sample: &LocationSample) -> Option<TripEvent> {
        let anchor = self.idle_anchor.as_ref()?;
        let distance = haversine_distance(&anchor.coordinate, &sample.coordinate);
        let elapsed_secs =
            (sample.timestamp - anchor.timestamp).num_milliseconds() as f64 / 1000.0;
        let speed_kph = implied_speed_kph(distance, elapsed_secs);
        if distance < self.config.start_distance_m || speed_kph < self.config.start_speed_kph {
            return None;
        }

        // The qualifying movement belongs to the trip: anchor it at the
        // idle sample so the first segment is counted.
        let mut state = TripState::begin(self.config.clone(), anchor.timestamp);
        state.last_sample = Some(anchor.clone());
        let event = TripEvent::Started {
            trip_id: state.trip_id,
            timestamp: state.started_at,
            auto: true,
        };
        info!(
            "Trip {} auto-started ({}m at {:.1} km/h)",
            state.trip_id, distance as i64, speed_kph
        );
        self.active = Some(state);
        self.idle_anchor = None;
        Some(event)
    }

    async fn persist(&self) {
        let Some(state) = &self.active else {
            return;
        };
        if let Err(e) = self.store.save(state).await {
            // Persistence is best-effort; the machine keeps running in memory
            warn!("Trip state save failed: {}", e);
        }
    }
}

fn accumulate(state: &mut TripState, sample: &LocationSample) {
    let Some(prev) = &state.last_sample else {
        return;
    };
    let delta_m = haversine_distance(&prev.coordinate, &sample.coordinate);
    let dt_ms = (sample.timestamp - prev.timestamp).num_milliseconds().max(0) as u64;

    state.distance_m += delta_m;
    // A segment counts as moving when either endpoint was moving
    if prev.is_moving || sample.is_moving {
        state.moving_ms += dt_ms;
    } else {
        state.idle_ms += dt_ms;
    }

    let speed = sample.coordinate.speed_mps.unwrap_or_else(|| {
        if dt_ms > 0 {
            delta_m / (dt_ms as f64 / 1000.0)
        } else {
            0.0
        }
    });
    if speed > state.max_speed_mps {
        state.max_speed_mps = speed;
    }
}

fn check_route_deviation(state: &mut TripState, sample: &LocationSample) -> Option<TripEvent> {
    let route = state.config.route.as_ref().filter(|r| r.len() >= 2)?;
    let deviation_m = route
        .windows(2)
        .map(|seg| point_to_segment_distance(&sample.coordinate, &seg[0], &seg[1]))
        .fold(f64::INFINITY, f64::min);

    if deviation_m <= state.config.route_deviation_threshold_m {
        // Back on route: re-arm for the next excursion
        state.deviation.armed = true;
        return None;
    }

    let cooldown_elapsed = state.deviation.last_fired.map_or(true, |t| {
        (sample.timestamp - t).num_milliseconds().max(0) as u128
            >= state.config.deviation_cooldown.as_millis()
    });
    if !state.deviation.armed && !cooldown_elapsed {
        return None;
    }

    state.deviation.armed = false;
    state.deviation.last_fired = Some(sample.timestamp);
    warn!(
        "Trip {} deviated {}m from route",
        state.trip_id, deviation_m as i64
    );
    Some(TripEvent::RouteDeviation {
        trip_id: state.trip_id,
        deviation_m,
        sample: sample.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryTripStore;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use geo_kernel::Coordinate;
    use std::time::Duration;

    fn sample_at(lat: f64, lon: f64, secs: i64) -> LocationSample {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let coord = Coordinate::new(lat, lon, 5.0).unwrap();
        LocationSample::new(coord, base + ChronoDuration::seconds(secs))
    }

    fn tracker(config: TripConfig) -> TripTracker {
        TripTracker::new(config, Arc::new(MemoryTripStore::new()))
    }

    #[tokio::test]
    async fn test_stop_without_start_returns_no_summary() {
        let mut t = tracker(TripConfig::default());
        assert_eq!(t.stop().await, None);
    }

    #[tokio::test]
    async fn test_start_then_stop_produces_summary() {
        let mut t = tracker(TripConfig::default());
        let started = t.start().await;
        assert!(matches!(
            started,
            Some(TripEvent::Started { auto: false, .. })
        ));

        let summary = t.stop().await.unwrap();
        assert!(summary.ended_at >= summary.started_at);
        assert!(!t.is_active());
    }

    #[tokio::test]
    async fn test_duplicate_start_is_idempotent() {
        let mut t = tracker(TripConfig::default());
        t.start().await;
        let first_id = t.trip_id().unwrap();
        assert!(t.start().await.is_none());
        assert_eq!(t.trip_id(), Some(first_id));
    }

    #[tokio::test]
    async fn test_distance_accumulates() {
        let mut t = tracker(TripConfig::default());
        t.start().await;
        // Three fixes heading north, ~111 m apart
        for i in 0..3 {
            t.handle_sample(&sample_at(37.0 + i as f64 * 0.001, -122.0, i * 30))
                .await;
        }
        let summary = t.stop().await.unwrap();
        assert!((summary.distance_m - 222.0).abs() < 5.0, "{}", summary.distance_m);
    }

    #[tokio::test]
    async fn test_moving_attribution_counts_either_endpoint() {
        let mut t = tracker(TripConfig::default());
        t.start().await;
        t.handle_sample(&sample_at(37.0, -122.0, 0)).await; // idle
        t.handle_sample(&sample_at(37.0005, -122.0, 60).moving(true)).await; // idle->moving
        t.handle_sample(&sample_at(37.001, -122.0, 120).moving(false)).await; // moving->idle
        t.handle_sample(&sample_at(37.001, -122.0, 180)).await; // idle->idle

        let summary = t.stop().await.unwrap();
        // Both boundary segments attribute as moving; only the last is idle
        assert_eq!(summary.moving_duration, Duration::from_secs(120));
        assert_eq!(summary.idle_duration, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_auto_start_on_movement_threshold() {
        let config = TripConfig {
            start_on_moving: true,
            start_distance_m: 50.0,
            start_speed_kph: 5.0,
            ..Default::default()
        };
        let mut t = tracker(config);

        // First sample only anchors
        assert!(t.handle_sample(&sample_at(37.0, -122.0, 0)).await.is_empty());
        assert!(!t.is_active());

        // ~111 m in 30 s (13 km/h): qualifies
        let events = t.handle_sample(&sample_at(37.001, -122.0, 30)).await;
        assert!(matches!(
            events.as_slice(),
            [TripEvent::Started { auto: true, .. }]
        ));
        assert!(t.is_active());

        // The qualifying segment is already part of the trip
        let summary = t.stop().await.unwrap();
        assert!(summary.distance_m > 100.0);
    }

    #[tokio::test]
    async fn test_no_auto_start_below_threshold() {
        let config = TripConfig {
            start_on_moving: true,
            start_distance_m: 50.0,
            start_speed_kph: 5.0,
            ..Default::default()
        };
        let mut t = tracker(config);

        t.handle_sample(&sample_at(37.0, -122.0, 0)).await;
        // ~11 m in 30 s: too short and too slow
        t.handle_sample(&sample_at(37.0001, -122.0, 30)).await;
        assert!(!t.is_active());

        // Far enough but too slow: ~111 m over an hour
        t.handle_sample(&sample_at(37.002, -122.0, 3630)).await;
        assert!(!t.is_active());
    }

    #[tokio::test]
    async fn test_route_deviation_fires_and_rearms() {
        let route = vec![
            Coordinate::new(37.0, -122.0, 0.0).unwrap(),
            Coordinate::new(37.0, -121.9, 0.0).unwrap(),
        ];
        let config = TripConfig {
            route: Some(route),
            route_deviation_threshold_m: 100.0,
            deviation_cooldown: Duration::from_secs(600),
            ..Default::default()
        };
        let mut t = tracker(config);
        t.start().await;

        // On the route
        assert!(t.handle_sample(&sample_at(37.0, -121.95, 0)).await.is_empty());

        // ~1.1 km north of the route: deviation fires
        let events = t.handle_sample(&sample_at(37.01, -121.95, 60)).await;
        assert!(matches!(
            events.as_slice(),
            [TripEvent::RouteDeviation { .. }]
        ));

        // Still off-route within the cooldown: suppressed
        assert!(t.handle_sample(&sample_at(37.01, -121.95, 120)).await.is_empty());

        // Back on the route re-arms
        assert!(t.handle_sample(&sample_at(37.0, -121.94, 180)).await.is_empty());
        let events = t.handle_sample(&sample_at(37.01, -121.94, 240)).await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_route_deviation_refires_after_cooldown() {
        let route = vec![
            Coordinate::new(37.0, -122.0, 0.0).unwrap(),
            Coordinate::new(37.0, -121.9, 0.0).unwrap(),
        ];
        let config = TripConfig {
            route: Some(route),
            route_deviation_threshold_m: 100.0,
            deviation_cooldown: Duration::from_secs(120),
            ..Default::default()
        };
        let mut t = tracker(config);
        t.start().await;

        assert_eq!(t.handle_sample(&sample_at(37.01, -121.95, 0)).await.len(), 1);
        assert!(t.handle_sample(&sample_at(37.01, -121.95, 60)).await.is_empty());
        // Cooldown elapsed while still off-route
        assert_eq!(t.handle_sample(&sample_at(37.01, -121.95, 120)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_restore_resumes_trip() {
        let store = Arc::new(MemoryTripStore::new());
        let mut t = TripTracker::new(TripConfig::default(), store.clone());
        t.start().await;
        t.handle_sample(&sample_at(37.0, -122.0, 0)).await;
        t.handle_sample(&sample_at(37.001, -122.0, 30)).await;
        let trip_id = t.trip_id().unwrap();
        drop(t);

        let mut resumed = TripTracker::new(TripConfig::default(), store);
        resumed.restore().await;
        assert_eq!(resumed.trip_id(), Some(trip_id));
        let summary = resumed.stop().await.unwrap();
        assert!(summary.distance_m > 100.0);
    }

    #[tokio::test]
    async fn test_reset_keeps_persisted_state() {
        let store = Arc::new(MemoryTripStore::new());
        let mut t = TripTracker::new(TripConfig::default(), store.clone());
        t.start().await;
        let trip_id = t.trip_id().unwrap();
        t.reset();
        assert!(!t.is_active());

        t.restore().await;
        assert_eq!(t.trip_id(), Some(trip_id));
    }

    struct FailingStore;

    #[async_trait]
    impl TripStore for FailingStore {
        async fn save(&self, _: &TripState) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".into()))
        }
        async fn load(&self) -> Result<Option<TripState>, StoreError> {
            Err(StoreError::Unavailable("disk full".into()))
        }
        async fn clear(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".into()))
        }
    }

    #[tokio::test]
    async fn test_persistence_failures_are_non_fatal() {
        let mut t = TripTracker::new(TripConfig::default(), Arc::new(FailingStore));
        t.restore().await;
        t.start().await;
        t.handle_sample(&sample_at(37.0, -122.0, 0)).await;
        t.handle_sample(&sample_at(37.001, -122.0, 30)).await;
        let summary = t.stop().await.unwrap();
        assert!(summary.distance_m > 100.0);
    }
}
