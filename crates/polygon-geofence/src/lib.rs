//! Polygon Geofence Engine
//!
//! Maintains named polygons and a transient inside/outside flag per
//! polygon id. Processing a sample tests containment for every registered
//! polygon and emits a transition only when the state flips (plus one
//! optional dwell notification per entry). This stage never drops the
//! sample; it only produces side events.

mod engine;
mod polygon;

pub use engine::PolygonGeofenceEngine;
pub use polygon::{GeofenceAction, GeofencePolygon, GeofenceTransition, PolygonError};
