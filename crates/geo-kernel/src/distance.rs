//! Great-Circle Distance Kernels

use crate::Coordinate;

/// Mean Earth radius in meters (IUGG)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates in meters (haversine).
pub fn haversine_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Destination point reached from `origin` along `bearing_deg` (clockwise
/// from north) after `distance_m` meters of great-circle travel.
///
/// Measurement metadata (accuracy, speed, heading, altitude) carries over
/// from the origin unchanged.
pub fn destination(origin: &Coordinate, bearing_deg: f64, distance_m: f64) -> Coordinate {
    let ang = distance_m / EARTH_RADIUS_M;
    let brg = bearing_deg.to_radians();
    let lat1 = origin.latitude.to_radians();
    let lon1 = origin.longitude.to_radians();

    let lat2 = (lat1.sin() * ang.cos() + lat1.cos() * ang.sin() * brg.cos()).asin();
    let lon2 = lon1
        + (brg.sin() * ang.sin() * lat1.cos()).atan2(ang.cos() - lat1.sin() * lat2.sin());

    // Normalize longitude into [-180, 180]
    let lon_deg = (lon2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;

    Coordinate {
        latitude: lat2.to_degrees(),
        longitude: lon_deg,
        ..*origin
    }
}

/// Speed in km/h implied by covering `distance_m` in `elapsed_secs`.
///
/// Returns 0.0 when the elapsed time is zero or negative, so callers never
/// divide by a degenerate interval.
pub fn implied_speed_kph(distance_m: f64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return 0.0;
    }
    distance_m * 3.6 / elapsed_secs
}

/// Distance in meters from `point` to the great-circle segment `a`-`b`.
///
/// The segment is short in practice (consecutive route vertices), so the
/// perpendicular foot is found in a local equirectangular projection around
/// the point's latitude and the final distance measured with haversine.
pub fn point_to_segment_distance(point: &Coordinate, a: &Coordinate, b: &Coordinate) -> f64 {
    let cos_lat = point.latitude.to_radians().cos();

    // Project into meters relative to `a`
    let deg_m = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
    let px = (point.longitude - a.longitude) * deg_m * cos_lat;
    let py = (point.latitude - a.latitude) * deg_m;
    let bx = (b.longitude - a.longitude) * deg_m * cos_lat;
    let by = (b.latitude - a.latitude) * deg_m;

    let seg_len_sq = bx * bx + by * by;
    let t = if seg_len_sq > 0.0 {
        ((px * bx + py * by) / seg_len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let closest = Coordinate {
        latitude: a.latitude + t * (b.latitude - a.latitude),
        longitude: a.longitude + t * (b.longitude - a.longitude),
        ..*a
    };
    haversine_distance(point, &closest)
}
