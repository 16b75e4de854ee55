//! Geometry & Scoring Kernels
//!
//! Pure functions shared by the enrichment pipeline:
//! - Great-circle distance and destination points
//! - Even-odd point-in-polygon containment
//! - Point-to-segment distance for route deviation
//! - Spoof-factor confidence scoring
//!
//! Nothing in this crate holds state or performs I/O.

mod coordinate;
mod distance;
mod polygon;
mod scoring;

pub use coordinate::{Coordinate, GeoError};
pub use distance::{
    destination, haversine_distance, implied_speed_kph, point_to_segment_distance,
    EARTH_RADIUS_M,
};
pub use polygon::{bounding_box, centroid, perimeter_m, point_in_polygon, shoelace_area_m2, BoundingBox};
pub use scoring::{spoof_confidence, WEIGHT_IMPOSSIBLE_SPEED, WEIGHT_MOCK_PROVIDER, WEIGHT_REPEATED_COORDINATES};
