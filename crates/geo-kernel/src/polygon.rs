//! Polygon Containment and Derived Attributes

use crate::{haversine_distance, Coordinate, EARTH_RADIUS_M};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    /// Whether the box contains the point (inclusive edges).
    pub fn contains(&self, point: &Coordinate) -> bool {
        point.latitude >= self.min_latitude
            && point.latitude <= self.max_latitude
            && point.longitude >= self.min_longitude
            && point.longitude <= self.max_longitude
    }
}

/// Even-odd point-in-polygon test over the vertex ring.
///
/// Robust to non-convex shapes; vertices are treated as a closed ring
/// (last vertex connects back to the first). Fewer than three vertices
/// contain nothing.
pub fn point_in_polygon(point: &Coordinate, vertices: &[Coordinate]) -> bool {
    if vertices.len() < 3 {
        return false;
    }
    let (x, y) = (point.longitude, point.latitude);
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (xi, yi) = (vertices[i].longitude, vertices[i].latitude);
        let (xj, yj) = (vertices[j].longitude, vertices[j].latitude);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Bounding box of a vertex ring. Returns `None` for an empty ring.
pub fn bounding_box(vertices: &[Coordinate]) -> Option<BoundingBox> {
    let first = vertices.first()?;
    let mut bbox = BoundingBox {
        min_latitude: first.latitude,
        max_latitude: first.latitude,
        min_longitude: first.longitude,
        max_longitude: first.longitude,
    };
    for v in &vertices[1..] {
        bbox.min_latitude = bbox.min_latitude.min(v.latitude);
        bbox.max_latitude = bbox.max_latitude.max(v.latitude);
        bbox.min_longitude = bbox.min_longitude.min(v.longitude);
        bbox.max_longitude = bbox.max_longitude.max(v.longitude);
    }
    Some(bbox)
}

/// Vertex-mean centroid of the ring. Returns `None` for an empty ring.
pub fn centroid(vertices: &[Coordinate]) -> Option<Coordinate> {
    if vertices.is_empty() {
        return None;
    }
    let n = vertices.len() as f64;
    let lat = vertices.iter().map(|v| v.latitude).sum::<f64>() / n;
    let lon = vertices.iter().map(|v| v.longitude).sum::<f64>() / n;
    Some(Coordinate {
        latitude: lat,
        longitude: lon,
        ..vertices[0]
    })
}

/// Ring perimeter in meters (haversine edge lengths, closed ring).
pub fn perimeter_m(vertices: &[Coordinate]) -> f64 {
    if vertices.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    for i in 0..vertices.len() {
        let j = (i + 1) % vertices.len();
        total += haversine_distance(&vertices[i], &vertices[j]);
    }
    total
}

/// Ring area in square meters via the shoelace formula in a local
/// equirectangular projection around the ring centroid.
pub fn shoelace_area_m2(vertices: &[Coordinate]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let ref_lat = vertices.iter().map(|v| v.latitude).sum::<f64>() / vertices.len() as f64;
    let cos_lat = ref_lat.to_radians().cos();
    let deg_m = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

    let mut sum = 0.0;
    for i in 0..vertices.len() {
        let j = (i + 1) % vertices.len();
        let xi = vertices[i].longitude * deg_m * cos_lat;
        let yi = vertices[i].latitude * deg_m;
        let xj = vertices[j].longitude * deg_m * cos_lat;
        let yj = vertices[j].latitude * deg_m;
        sum += xi * yj - xj * yi;
    }
    (sum / 2.0).abs()
}
