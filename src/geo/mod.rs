use std::time::Duration;

use uuid::Uuid;

use crate::models::booking::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;
const KM_PER_DEGREE_LAT: f64 = 111.0;

/// How far out the simulated helper marker starts from the job address.
const DEPARTURE_RADIUS_KM: f64 = 2.5;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (delta_lng / 2.0).sin().powi(2);

    EARTH_RADIUS_KM * 2.0 * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Linear interpolation between two points, clamped to the segment.
pub fn lerp(a: &GeoPoint, b: &GeoPoint, t: f64) -> GeoPoint {
    let t = t.clamp(0.0, 1.0);
    GeoPoint {
        lat: a.lat + (b.lat - a.lat) * t,
        lng: a.lng + (b.lng - a.lng) * t,
    }
}

/// One deterministic simulation step: where a marker moving at `speed_kmh`
/// ends up after `elapsed`, never overshooting the target. Same inputs,
/// same output.
pub fn step_toward(prev: &GeoPoint, target: &GeoPoint, elapsed: Duration, speed_kmh: f64) -> GeoPoint {
    let remaining_km = haversine_km(prev, target);
    if remaining_km <= f64::EPSILON {
        return *target;
    }

    let travelled_km = speed_kmh.max(0.0) * elapsed.as_secs_f64() / 3600.0;
    if travelled_km >= remaining_km {
        return *target;
    }

    lerp(prev, target, travelled_km / remaining_km)
}

/// Where the simulated helper departs from: a fixed-radius offset from the
/// job address at a bearing derived from the booking id, so every viewer of
/// the same booking sees the same approach path.
pub fn departure_point(target: &GeoPoint, booking_id: Uuid) -> GeoPoint {
    let folded = booking_id
        .as_bytes()
        .iter()
        .fold(0u64, |acc, byte| acc.wrapping_mul(131).wrapping_add(*byte as u64));
    let bearing = (folded % 3_600) as f64 / 3_600.0 * std::f64::consts::TAU;

    let delta_lat = DEPARTURE_RADIUS_KM / KM_PER_DEGREE_LAT * bearing.cos();
    let lng_scale = KM_PER_DEGREE_LAT * target.lat.to_radians().cos().abs().max(0.01);
    let delta_lng = DEPARTURE_RADIUS_KM / lng_scale * bearing.sin();

    GeoPoint {
        lat: target.lat + delta_lat,
        lng: target.lng + delta_lng,
    }
}
