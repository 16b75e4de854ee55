//! Zone Registry & Sample Processing

use crate::{PrivacyZone, ZoneAction, ZoneError, ZoneEvent};
use chrono::Utc;
use geo_kernel::{destination, haversine_distance};
use location_events::LocationSample;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use tracing::{debug, info};

/// Result of applying the zone registry to one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneOutcome {
    /// The surviving (possibly obfuscated) sample; `None` when excluded
    pub sample: Option<LocationSample>,
    pub was_excluded: bool,
    pub was_obfuscated: bool,
    /// Ids of all enabled zones the sample matched
    pub matched_zones: Vec<String>,
}

impl ZoneOutcome {
    fn pass(sample: LocationSample) -> Self {
        Self {
            sample: Some(sample),
            was_excluded: false,
            was_obfuscated: false,
            matched_zones: Vec::new(),
        }
    }
}

/// Registry of privacy zones plus the seeded generator used for
/// obfuscation offsets.
pub struct PrivacyZoneEngine {
    zones: HashMap<String, PrivacyZone>,
    rng: StdRng,
}

impl PrivacyZoneEngine {
    /// Create an engine whose obfuscation offsets are deterministic for a
    /// given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            zones: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Insert or replace a zone. Replacement keeps the original creation
    /// timestamp and refreshes `updated_at`.
    pub fn upsert(&mut self, mut zone: PrivacyZone) -> ZoneEvent {
        match self.zones.get(&zone.id) {
            Some(existing) => {
                zone.created_at = existing.created_at;
                zone.updated_at = Utc::now();
                info!("Replaced privacy zone {}", zone.id);
                let id = zone.id.clone();
                self.zones.insert(id.clone(), zone);
                ZoneEvent::Replaced(id)
            }
            None => {
                info!("Added privacy zone {}", zone.id);
                let id = zone.id.clone();
                self.zones.insert(id.clone(), zone);
                ZoneEvent::Added(id)
            }
        }
    }

    /// Remove a zone.
    pub fn remove(&mut self, id: &str) -> Result<ZoneEvent, ZoneError> {
        self.zones
            .remove(id)
            .map(|z| {
                info!("Removed privacy zone {}", z.id);
                ZoneEvent::Removed(z.id)
            })
            .ok_or_else(|| ZoneError::UnknownZone(id.to_string()))
    }

    /// Enable or disable a zone in place.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<ZoneEvent, ZoneError> {
        let zone = self
            .zones
            .get_mut(id)
            .ok_or_else(|| ZoneError::UnknownZone(id.to_string()))?;
        zone.enabled = enabled;
        zone.updated_at = Utc::now();
        Ok(if enabled {
            ZoneEvent::Enabled(zone.id.clone())
        } else {
            ZoneEvent::Disabled(zone.id.clone())
        })
    }

    /// Registered zone count.
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Look up a zone by id.
    pub fn get(&self, id: &str) -> Option<&PrivacyZone> {
        self.zones.get(id)
    }

    /// Apply the registry to a sample.
    ///
    /// Any matching exclude zone drops the sample; otherwise the nearest
    /// matching obfuscate zone replaces its coordinate with a random point
    /// inside the zone's obfuscation disc. Zones with corrupt geometry
    /// surface as errors rather than silently passing the true coordinate.
    pub fn process(&mut self, sample: &LocationSample) -> Result<ZoneOutcome, ZoneError> {
        let mut matched = Vec::new();
        let mut excluded = false;
        let mut nearest_obfuscate: Option<(f64, String)> = None;

        for zone in self.zones.values().filter(|z| z.enabled) {
            if !zone.radius_m.is_finite() || zone.radius_m <= 0.0 {
                return Err(ZoneError::InvalidRadius(zone.radius_m));
            }
            let distance = haversine_distance(&zone.center, &sample.coordinate);
            if distance > zone.radius_m {
                continue;
            }
            matched.push(zone.id.clone());
            match zone.action {
                ZoneAction::Exclude => excluded = true,
                ZoneAction::Obfuscate => {
                    let nearer = nearest_obfuscate
                        .as_ref()
                        .map_or(true, |(best, _)| distance < *best);
                    if nearer {
                        nearest_obfuscate = Some((distance, zone.id.clone()));
                    }
                }
            }
        }

        if excluded {
            debug!("Sample {} excluded by privacy zones {:?}", sample.id, matched);
            return Ok(ZoneOutcome {
                sample: None,
                was_excluded: true,
                was_obfuscated: false,
                matched_zones: matched,
            });
        }

        if let Some((_, zone_id)) = nearest_obfuscate {
            let zone = self
                .zones
                .get(&zone_id)
                .ok_or_else(|| ZoneError::UnknownZone(zone_id.clone()))?;
            if !zone.obfuscation_radius_m.is_finite() || zone.obfuscation_radius_m <= 0.0 {
                return Err(ZoneError::InvalidObfuscationRadius(zone.obfuscation_radius_m));
            }
            let bearing = self.rng.gen_range(0.0..360.0);
            // sqrt keeps the offset uniform over the disc area
            let offset = zone.obfuscation_radius_m * self.rng.gen::<f64>().sqrt();
            let replacement = destination(&zone.center, bearing, offset);
            debug!(
                "Sample {} obfuscated by zone {} ({}m offset)",
                sample.id, zone_id, offset as i64
            );
            return Ok(ZoneOutcome {
                sample: Some(sample.clone().obfuscated_at(replacement)),
                was_excluded: false,
                was_obfuscated: true,
                matched_zones: matched,
            });
        }

        let mut outcome = ZoneOutcome::pass(sample.clone());
        outcome.matched_zones = matched;
        Ok(outcome)
    }
}
