//! Polygon Geofence Model

use chrono::{DateTime, Utc};
use geo_kernel::{
    bounding_box, centroid, perimeter_m, shoelace_area_m2, BoundingBox, Coordinate, GeoError,
};
use location_events::LocationSample;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Polygon registry errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PolygonError {
    #[error(transparent)]
    Geometry(#[from] GeoError),

    #[error("unknown polygon: {0}")]
    UnknownPolygon(String),
}

/// A containment-state change for one polygon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeofenceAction {
    Enter,
    Exit,
    Dwell,
}

impl GeofenceAction {
    /// Parse a bridge action string ("ENTER"/"exit"/"Dwell"...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "enter" => Some(Self::Enter),
            "exit" => Some(Self::Exit),
            "dwell" => Some(Self::Dwell),
            _ => None,
        }
    }
}

/// Emitted when a polygon's containment state flips (or a dwell matures)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceTransition {
    pub polygon_id: String,
    pub action: GeofenceAction,
    /// The sample that caused the transition
    pub sample: LocationSample,
    pub timestamp: DateTime<Utc>,
}

/// A named polygon geofence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofencePolygon {
    pub id: String,
    /// Closed vertex ring, at least three vertices
    pub vertices: Vec<Coordinate>,
    pub notify_on_enter: bool,
    pub notify_on_exit: bool,
    pub notify_on_dwell: bool,
    /// Time a point must stay inside before a dwell fires
    pub dwell_delay: Duration,
    /// Caller-supplied payload echoed on transitions
    pub extras: Option<Value>,
}

impl GeofencePolygon {
    /// Create a polygon; rejects rings with fewer than three vertices.
    pub fn new(id: impl Into<String>, vertices: Vec<Coordinate>) -> Result<Self, PolygonError> {
        if vertices.len() < 3 {
            return Err(GeoError::DegeneratePolygon(vertices.len()).into());
        }
        Ok(Self {
            id: id.into(),
            vertices,
            notify_on_enter: true,
            notify_on_exit: true,
            notify_on_dwell: false,
            dwell_delay: Duration::from_secs(300),
            extras: None,
        })
    }

    /// Configure which transitions are reported.
    pub fn with_notifications(mut self, enter: bool, exit: bool, dwell: bool) -> Self {
        self.notify_on_enter = enter;
        self.notify_on_exit = exit;
        self.notify_on_dwell = dwell;
        self
    }

    /// Configure the dwell maturity delay.
    pub fn with_dwell_delay(mut self, delay: Duration) -> Self {
        self.dwell_delay = delay;
        self
    }

    /// Attach a caller payload.
    pub fn with_extras(mut self, extras: Value) -> Self {
        self.extras = Some(extras);
        self
    }

    /// Vertex-mean centroid.
    pub fn centroid(&self) -> Option<Coordinate> {
        centroid(&self.vertices)
    }

    /// Axis-aligned bounding box.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        bounding_box(&self.vertices)
    }

    /// Enclosed area in square meters.
    pub fn area_m2(&self) -> f64 {
        shoelace_area_m2(&self.vertices)
    }

    /// Ring perimeter in meters.
    pub fn perimeter_m(&self) -> f64 {
        perimeter_m(&self.vertices)
    }
}
