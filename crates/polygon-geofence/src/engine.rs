//! Containment Tracking Engine

use crate::{GeofenceAction, GeofencePolygon, GeofenceTransition, PolygonError};
use chrono::{DateTime, Utc};
use geo_kernel::{point_in_polygon, BoundingBox};
use location_events::LocationSample;
use std::collections::HashMap;
use tracing::{debug, info};

/// Transient per-polygon containment state
#[derive(Debug, Clone, Default)]
struct ContainmentState {
    inside: bool,
    entered_at: Option<DateTime<Utc>>,
    dwell_emitted: bool,
}

/// A registered polygon with its cached bounding box prefilter
struct RegisteredPolygon {
    polygon: GeofencePolygon,
    bbox: Option<BoundingBox>,
}

/// Tracks containment for every registered polygon and emits transitions
/// on state flips.
#[derive(Default)]
pub struct PolygonGeofenceEngine {
    polygons: HashMap<String, RegisteredPolygon>,
    states: HashMap<String, ContainmentState>,
}

impl PolygonGeofenceEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a polygon. Replacing clears that id's
    /// containment state.
    pub fn add(&mut self, polygon: GeofencePolygon) {
        let id = polygon.id.clone();
        let bbox = polygon.bounding_box();
        info!("Registered polygon geofence {}", id);
        self.states.remove(&id);
        self.polygons.insert(id, RegisteredPolygon { polygon, bbox });
    }

    /// Remove a polygon and its containment state.
    pub fn remove(&mut self, id: &str) -> Result<(), PolygonError> {
        self.states.remove(id);
        self.polygons
            .remove(id)
            .map(|_| info!("Removed polygon geofence {}", id))
            .ok_or_else(|| PolygonError::UnknownPolygon(id.to_string()))
    }

    /// Look up a registered polygon.
    pub fn get(&self, id: &str) -> Option<&GeofencePolygon> {
        self.polygons.get(id).map(|r| &r.polygon)
    }

    /// Registered polygon count.
    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Whether the last processed sample was inside the polygon.
    pub fn is_inside(&self, id: &str) -> bool {
        self.states.get(id).map(|s| s.inside).unwrap_or(false)
    }

    /// Forget all containment state, keeping the registered polygons.
    pub fn reset_state(&mut self) {
        self.states.clear();
        debug!("Polygon containment state reset");
    }

    /// Test the sample against every polygon; emit Enter/Exit on state
    /// flips and at most one Dwell per entry once the dwell delay has
    /// matured. Unchanged state never re-emits.
    pub fn process(&mut self, sample: &LocationSample) -> Vec<GeofenceTransition> {
        let mut transitions = Vec::new();

        for reg in self.polygons.values() {
            let poly = &reg.polygon;
            let in_bbox = reg
                .bbox
                .map(|b| b.contains(&sample.coordinate))
                .unwrap_or(false);
            let contains = in_bbox && point_in_polygon(&sample.coordinate, &poly.vertices);

            let state = self.states.entry(poly.id.clone()).or_default();
            if contains && !state.inside {
                state.inside = true;
                state.entered_at = Some(sample.timestamp);
                state.dwell_emitted = false;
                debug!("Entered polygon {}", poly.id);
                if poly.notify_on_enter {
                    transitions.push(transition(poly, GeofenceAction::Enter, sample));
                }
            } else if !contains && state.inside {
                state.inside = false;
                state.entered_at = None;
                state.dwell_emitted = false;
                debug!("Exited polygon {}", poly.id);
                if poly.notify_on_exit {
                    transitions.push(transition(poly, GeofenceAction::Exit, sample));
                }
            } else if contains && poly.notify_on_dwell && !state.dwell_emitted {
                let matured = state.entered_at.map_or(false, |entered| {
                    (sample.timestamp - entered).num_milliseconds() as u128
                        >= poly.dwell_delay.as_millis()
                });
                if matured {
                    state.dwell_emitted = true;
                    debug!("Dwell matured in polygon {}", poly.id);
                    transitions.push(transition(poly, GeofenceAction::Dwell, sample));
                }
            }
        }

        transitions
    }
}

fn transition(
    poly: &GeofencePolygon,
    action: GeofenceAction,
    sample: &LocationSample,
) -> GeofenceTransition {
    GeofenceTransition {
        polygon_id: poly.id.clone(),
        action,
        sample: sample.clone(),
        timestamp: sample.timestamp,
    }
}
