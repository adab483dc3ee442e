//! Ring geometry and the synthetic foundation-depth heuristic.

/// Outer polygon ring as [lon, lat] pairs, implicitly closed.
pub type Ring = Vec<[f64; 2]>;

/// Metres per degree, used to convert ring areas to approximate m².
const DEG_TO_M: f64 = 111_000.0;

/// Earth radius in metres for great-circle distances.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Compute the bounding box of a polygon ring as [minLon, minLat, maxLon, maxLat].
pub fn ring_bbox(ring: &[[f64; 2]]) -> [f64; 4] {
    let mut bbox = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
    for &[lon, lat] in ring {
        if lon < bbox[0] { bbox[0] = lon; }
        if lat < bbox[1] { bbox[1] = lat; }
        if lon > bbox[2] { bbox[2] = lon; }
        if lat > bbox[3] { bbox[3] = lat; }
    }
    bbox
}

/// Area of a polygon ring in degrees² (shoelace). The ring does not need
/// to be explicitly closed; the wrap-around pair is included.
pub fn ring_area_deg2(ring: &[[f64; 2]]) -> f64 {
    let n = ring.len();
    let mut area = 0.0;
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        area += (ring[j][0] + ring[i][0]) * (ring[j][1] - ring[i][1]);
        j = i;
    }
    area.abs() / 2.0
}

/// Haversine great-circle distance in metres between two [lon, lat] points.
pub fn haversine(p1: [f64; 2], p2: [f64; 2]) -> f64 {
    let phi1 = p1[1].to_radians();
    let phi2 = p2[1].to_radians();
    let d_phi = (p2[1] - p1[1]).to_radians();
    let d_lambda = (p2[0] - p1[0]).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    EARTH_RADIUS_M * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Foundation depth heuristic in metres (negative = below ground).
///
/// The ring area in degrees² is converted to approximate m² at 111 000 m per
/// degree; depth grows with the square root of the footprint and saturates in
/// [-15, -1.5]. Purely synthetic, no real-world calibration.
pub fn foundation_depth(area_deg2: f64) -> f64 {
    let area_m2 = area_deg2 * DEG_TO_M * DEG_TO_M;
    (-(1.5 + area_m2.sqrt() * 0.002)).clamp(-15.0, -1.5)
}

/// Round to 2 decimal places (stored depths and stats).
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Round to 6 decimal places (sample-point coordinates).
pub fn round6(v: f64) -> f64 {
    (v * 1e6).round() / 1e6
}
