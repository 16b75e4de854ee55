//! Spoof Analysis

use crate::SpoofConfig;
use geo_kernel::{haversine_distance, implied_speed_kph, spoof_confidence};
use location_events::LocationSample;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// One independent spoofing signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpoofFactor {
    MockProvider,
    ImpossibleSpeed,
    RepeatedCoordinates,
}

/// The outcome of analyzing one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpoofVerdict {
    pub factors: Vec<SpoofFactor>,
    /// Combined confidence in [0, 1]
    pub confidence: f64,
    /// Whether policy says the sample must be dropped
    pub blocked: bool,
}

/// Rounding granularity for the repeat streak: 5 decimals, ~1.1 m.
const REPEAT_ROUNDING_SCALE: f64 = 1e5;

/// Stateful spoof detector over a bounded fix history.
pub struct SpoofDetector {
    config: SpoofConfig,
    history: VecDeque<LocationSample>,
    repeat_count: u32,
    last_rounded: Option<(i64, i64)>,
}

impl SpoofDetector {
    pub fn new(config: SpoofConfig) -> Self {
        let capacity = config.history_size.max(1);
        Self {
            config,
            history: VecDeque::with_capacity(capacity),
            repeat_count: 0,
            last_rounded: None,
        }
    }

    /// Analyze a sample. Returns a verdict when at least
    /// `min_factors_for_detection` factors fired, `None` otherwise.
    ///
    /// The sample is recorded into the history either way so consecutive
    /// analyses see it as the previous fix.
    pub fn analyze(&mut self, sample: &LocationSample) -> Option<SpoofVerdict> {
        if !self.config.enabled {
            self.record(sample);
            return None;
        }

        let mock = sample.mock == Some(true);
        let impossible_speed = self.check_impossible_speed(sample);
        let repeated = self.check_repeated(sample);
        self.record(sample);

        let mut factors = Vec::new();
        if mock {
            factors.push(SpoofFactor::MockProvider);
        }
        if impossible_speed {
            factors.push(SpoofFactor::ImpossibleSpeed);
        }
        if repeated {
            factors.push(SpoofFactor::RepeatedCoordinates);
        }

        if factors.len() < self.config.min_factors_for_detection {
            if !factors.is_empty() {
                debug!(
                    "Spoof factors below detection threshold: {:?} ({}/{})",
                    factors,
                    factors.len(),
                    self.config.min_factors_for_detection
                );
            }
            return None;
        }

        let verdict = SpoofVerdict {
            confidence: spoof_confidence(mock, impossible_speed, repeated),
            blocked: self.config.block_mock_locations,
            factors,
        };
        warn!(
            "Spoof verdict for sample {}: {:?} (confidence {:.2}, blocked: {})",
            sample.id, verdict.factors, verdict.confidence, verdict.blocked
        );
        Some(verdict)
    }

    /// Forget all history and streak state.
    pub fn reset(&mut self) {
        self.history.clear();
        self.repeat_count = 0;
        self.last_rounded = None;
        debug!("Spoof detector reset");
    }

    /// Number of retained samples.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn check_impossible_speed(&self, sample: &LocationSample) -> bool {
        let Some(prev) = self.history.back() else {
            return false;
        };
        let elapsed_secs = (sample.timestamp - prev.timestamp).num_milliseconds() as f64 / 1000.0;
        if elapsed_secs <= 0.0 {
            return false;
        }
        let distance = haversine_distance(&prev.coordinate, &sample.coordinate);
        let speed_kph = implied_speed_kph(distance, elapsed_secs);
        speed_kph > self.config.max_possible_speed_kph
    }

    fn check_repeated(&mut self, sample: &LocationSample) -> bool {
        let rounded = (
            (sample.coordinate.latitude * REPEAT_ROUNDING_SCALE).round() as i64,
            (sample.coordinate.longitude * REPEAT_ROUNDING_SCALE).round() as i64,
        );
        if self.last_rounded == Some(rounded) {
            self.repeat_count += 1;
        } else {
            self.last_rounded = Some(rounded);
            self.repeat_count = 1;
        }
        self.repeat_count >= self.config.repeat_threshold
    }

    fn record(&mut self, sample: &LocationSample) {
        if self.history.len() >= self.config.history_size.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(sample.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use geo_kernel::Coordinate;

    fn sample_at(lat: f64, lon: f64, secs: i64) -> LocationSample {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let coord = Coordinate::new(lat, lon, 5.0).unwrap();
        LocationSample::new(coord, base + Duration::seconds(secs))
    }

    fn detector(config: SpoofConfig) -> SpoofDetector {
        SpoofDetector::new(config)
    }

    #[test]
    fn test_clean_stream_yields_no_verdict() {
        let mut det = detector(SpoofConfig::default());
        for i in 0..20 {
            // ~11 m per second, well under any speed cap
            let s = sample_at(37.0 + i as f64 * 0.0001, -122.0, i);
            assert!(det.analyze(&s).is_none());
        }
    }

    #[test]
    fn test_impossible_speed_factor() {
        let config = SpoofConfig {
            min_factors_for_detection: 1,
            ..Default::default()
        };
        let mut det = detector(config);
        assert!(det.analyze(&sample_at(37.0, -122.0, 0)).is_none());
        // ~111 km north one second later
        let verdict = det.analyze(&sample_at(38.0, -122.0, 1)).unwrap();
        assert!(verdict.factors.contains(&SpoofFactor::ImpossibleSpeed));
    }

    #[test]
    fn test_repeat_threshold_boundary() {
        let config = SpoofConfig {
            min_factors_for_detection: 1,
            repeat_threshold: 5,
            ..Default::default()
        };
        let mut det = detector(config);
        // threshold - 1 identical fixes: never a verdict
        for i in 0..4 {
            assert!(det.analyze(&sample_at(37.0, -122.0, i * 60)).is_none());
        }
        // the fifth identical fix trips the factor
        let verdict = det.analyze(&sample_at(37.0, -122.0, 240)).unwrap();
        assert!(verdict
            .factors
            .contains(&SpoofFactor::RepeatedCoordinates));
    }

    #[test]
    fn test_movement_resets_repeat_streak() {
        let config = SpoofConfig {
            min_factors_for_detection: 1,
            repeat_threshold: 3,
            ..Default::default()
        };
        let mut det = detector(config);
        det.analyze(&sample_at(37.0, -122.0, 0));
        det.analyze(&sample_at(37.0, -122.0, 60));
        // Move beyond the rounding cell, streak starts over
        det.analyze(&sample_at(37.001, -122.0, 120));
        assert!(det.analyze(&sample_at(37.001, -122.0, 180)).is_none());
    }

    #[test]
    fn test_mock_flag_alone_below_default_threshold() {
        let mut det = detector(SpoofConfig::default());
        let s = sample_at(37.0, -122.0, 0).tagged_mock(true);
        // Default needs two factors
        assert!(det.analyze(&s).is_none());
    }

    #[test]
    fn test_two_factors_produce_verdict() {
        let mut det = detector(SpoofConfig::default());
        det.analyze(&sample_at(37.0, -122.0, 0));
        let spoofed = sample_at(38.0, -122.0, 1).tagged_mock(true);
        let verdict = det.analyze(&spoofed).unwrap();
        assert_eq!(verdict.factors.len(), 2);
        assert!(verdict.confidence >= 0.6);
        assert!(!verdict.blocked);
    }

    #[test]
    fn test_block_mock_locations_sets_blocked() {
        let config = SpoofConfig {
            block_mock_locations: true,
            min_factors_for_detection: 1,
            ..Default::default()
        };
        let mut det = detector(config);
        det.analyze(&sample_at(37.0, -122.0, 0));
        let verdict = det.analyze(&sample_at(38.0, -122.0, 1)).unwrap();
        assert!(verdict.blocked);
    }

    #[test]
    fn test_disabled_detector_is_silent() {
        let config = SpoofConfig {
            enabled: false,
            min_factors_for_detection: 1,
            ..Default::default()
        };
        let mut det = detector(config);
        det.analyze(&sample_at(37.0, -122.0, 0));
        assert!(det.analyze(&sample_at(38.0, -122.0, 1)).is_none());
    }

    #[test]
    fn test_history_is_bounded() {
        let config = SpoofConfig {
            history_size: 5,
            ..Default::default()
        };
        let mut det = detector(config);
        for i in 0..50 {
            det.analyze(&sample_at(37.0 + i as f64 * 0.0001, -122.0, i));
        }
        assert_eq!(det.history_len(), 5);
    }

    #[test]
    fn test_reset_clears_streak() {
        let config = SpoofConfig {
            min_factors_for_detection: 1,
            repeat_threshold: 2,
            ..Default::default()
        };
        let mut det = detector(config);
        det.analyze(&sample_at(37.0, -122.0, 0));
        det.reset();
        assert_eq!(det.history_len(), 0);
        // Streak starts over after reset
        assert!(det.analyze(&sample_at(37.0, -122.0, 60)).is_none());
    }
}
