//! Enrichment Pipeline
//!
//! Applies the fixed stage order spoof → privacy → polygon to location
//! samples. Each stage may disqualify the sample from the rest of the
//! pipeline; the polygon stage only adds side events.

use error_recovery::{LocusError, LocusErrorType};
use location_events::LocationSample;
use polygon_geofence::{GeofencePolygon, GeofenceTransition, PolygonGeofenceEngine};
use privacy_zones::{PrivacyZone, PrivacyZoneEngine, ZoneError, ZoneEvent};
use spoof_detector::{SpoofConfig, SpoofDetector, SpoofVerdict};
use tracing::debug;

/// What became of one location sample.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineVerdict {
    /// Sample survived (possibly tagged/obfuscated), with any polygon
    /// transitions it caused
    Enriched {
        sample: LocationSample,
        transitions: Vec<GeofenceTransition>,
    },
    /// Spoof policy dropped the sample onto the blocked channel
    Blocked {
        sample: LocationSample,
        verdict: SpoofVerdict,
    },
    /// A privacy exclude zone swallowed the sample
    Excluded,
}

/// The ordered enrichment stages, driven synchronously per sample.
pub struct EnrichmentPipeline {
    spoof: SpoofDetector,
    privacy: PrivacyZoneEngine,
    polygons: PolygonGeofenceEngine,
}

impl EnrichmentPipeline {
    pub fn new(spoof_config: SpoofConfig, obfuscation_seed: u64) -> Self {
        Self {
            spoof: SpoofDetector::new(spoof_config),
            privacy: PrivacyZoneEngine::new(obfuscation_seed),
            polygons: PolygonGeofenceEngine::new(),
        }
    }

    /// Run one sample through all stages in order.
    ///
    /// A stage failure (corrupt zone geometry) surfaces as an error; the
    /// offending sample is dropped by the caller and later samples keep
    /// flowing.
    pub fn process(&mut self, sample: LocationSample) -> Result<PipelineVerdict, LocusError> {
        // Stage 1: spoof analysis
        let sample = match self.spoof.analyze(&sample) {
            Some(verdict) if verdict.blocked => {
                debug!("Sample {} blocked by spoof policy", sample.id);
                return Ok(PipelineVerdict::Blocked { sample, verdict });
            }
            Some(_) => sample.tagged_mock(true),
            None => sample,
        };

        // Stage 2: privacy zones
        let outcome = self.privacy.process(&sample).map_err(zone_error)?;
        if outcome.was_excluded {
            return Ok(PipelineVerdict::Excluded);
        }
        let sample = outcome.sample.unwrap_or(sample);

        // Stage 3: polygon containment; never drops the sample
        let transitions = self.polygons.process(&sample);

        Ok(PipelineVerdict::Enriched {
            sample,
            transitions,
        })
    }

    /// Zone registry passthroughs.
    pub fn upsert_zone(&mut self, zone: PrivacyZone) -> ZoneEvent {
        self.privacy.upsert(zone)
    }

    pub fn remove_zone(&mut self, id: &str) -> Result<ZoneEvent, ZoneError> {
        self.privacy.remove(id)
    }

    pub fn set_zone_enabled(&mut self, id: &str, enabled: bool) -> Result<ZoneEvent, ZoneError> {
        self.privacy.set_enabled(id, enabled)
    }

    /// Polygon registry passthroughs.
    pub fn add_polygon(&mut self, polygon: GeofencePolygon) {
        self.polygons.add(polygon);
    }

    pub fn remove_polygon(&mut self, id: &str) -> Result<(), polygon_geofence::PolygonError> {
        self.polygons.remove(id)
    }

    pub fn polygon_inside(&self, id: &str) -> bool {
        self.polygons.is_inside(id)
    }

    /// Reset every stage's transient state; registries stay intact.
    pub fn reset(&mut self) {
        self.spoof.reset();
        self.polygons.reset_state();
    }
}

fn zone_error(e: ZoneError) -> LocusError {
    LocusError::new(LocusErrorType::ConfigError, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use geo_kernel::Coordinate;
    use privacy_zones::ZoneAction;

    fn sample_at(lat: f64, lon: f64, secs: i64) -> LocationSample {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 7, 0, 0).unwrap();
        let coord = Coordinate::new(lat, lon, 5.0).unwrap();
        LocationSample::new(coord, base + Duration::seconds(secs))
    }

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon, 0.0).unwrap()
    }

    #[test]
    fn test_clean_sample_passes_all_stages() {
        let mut pipeline = EnrichmentPipeline::new(SpoofConfig::default(), 1);
        let verdict = pipeline.process(sample_at(37.0, -122.0, 0)).unwrap();
        match verdict {
            PipelineVerdict::Enriched {
                sample,
                transitions,
            } => {
                assert_eq!(sample.mock, None);
                assert!(!sample.obfuscated);
                assert!(transitions.is_empty());
            }
            other => panic!("expected enriched, got {other:?}"),
        }
    }

    #[test]
    fn test_spoofed_sample_blocked_before_privacy() {
        let config = SpoofConfig {
            block_mock_locations: true,
            min_factors_for_detection: 1,
            ..Default::default()
        };
        let mut pipeline = EnrichmentPipeline::new(config, 1);
        pipeline.process(sample_at(37.0, -122.0, 0)).unwrap();
        // ~111 km in one second
        let verdict = pipeline.process(sample_at(38.0, -122.0, 1)).unwrap();
        assert!(matches!(verdict, PipelineVerdict::Blocked { .. }));
    }

    #[test]
    fn test_unblocked_verdict_tags_mock() {
        let config = SpoofConfig {
            block_mock_locations: false,
            min_factors_for_detection: 1,
            ..Default::default()
        };
        let mut pipeline = EnrichmentPipeline::new(config, 1);
        pipeline.process(sample_at(37.0, -122.0, 0)).unwrap();
        let verdict = pipeline.process(sample_at(38.0, -122.0, 1)).unwrap();
        match verdict {
            PipelineVerdict::Enriched { sample, .. } => assert_eq!(sample.mock, Some(true)),
            other => panic!("expected enriched, got {other:?}"),
        }
    }

    #[test]
    fn test_exclude_zone_stops_pipeline() {
        let mut pipeline = EnrichmentPipeline::new(SpoofConfig::default(), 1);
        pipeline.upsert_zone(
            PrivacyZone::new("home", coord(37.0, -122.0), 500.0, ZoneAction::Exclude).unwrap(),
        );
        let verdict = pipeline.process(sample_at(37.0, -122.0, 0)).unwrap();
        assert_eq!(verdict, PipelineVerdict::Excluded);
    }

    #[test]
    fn test_obfuscated_sample_reaches_polygons() {
        let mut pipeline = EnrichmentPipeline::new(SpoofConfig::default(), 1);
        pipeline.upsert_zone(
            PrivacyZone::new("office", coord(37.05, -121.95), 50_000.0, ZoneAction::Obfuscate)
                .unwrap()
                .with_obfuscation_radius(10.0)
                .unwrap(),
        );
        pipeline.add_polygon(
            GeofencePolygon::new(
                "campus",
                vec![
                    coord(37.0, -122.0),
                    coord(37.1, -122.0),
                    coord(37.1, -121.9),
                    coord(37.0, -121.9),
                ],
            )
            .unwrap(),
        );

        let verdict = pipeline.process(sample_at(37.05, -121.95, 0)).unwrap();
        match verdict {
            PipelineVerdict::Enriched {
                sample,
                transitions,
            } => {
                assert!(sample.obfuscated);
                // Obfuscated within 10 m of the zone center: still inside
                assert_eq!(transitions.len(), 1);
            }
            other => panic!("expected enriched, got {other:?}"),
        }
    }

    #[test]
    fn test_reset_clears_containment_but_keeps_registries() {
        let mut pipeline = EnrichmentPipeline::new(SpoofConfig::default(), 1);
        pipeline.add_polygon(
            GeofencePolygon::new(
                "campus",
                vec![
                    coord(37.0, -122.0),
                    coord(37.1, -122.0),
                    coord(37.1, -121.9),
                    coord(37.0, -121.9),
                ],
            )
            .unwrap(),
        );

        let first = pipeline.process(sample_at(37.05, -121.95, 0)).unwrap();
        assert!(matches!(
            first,
            PipelineVerdict::Enriched { ref transitions, .. } if transitions.len() == 1
        ));

        pipeline.reset();
        // Same point re-enters after reset: the polygon is still registered
        let again = pipeline.process(sample_at(37.05, -121.95, 10)).unwrap();
        assert!(matches!(
            again,
            PipelineVerdict::Enriched { ref transitions, .. } if transitions.len() == 1
        ));
    }
}
