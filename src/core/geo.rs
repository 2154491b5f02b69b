//! Great-circle distance

use crate::types::GeoPoint;

/// Mean Earth radius used for proximity ranking
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two points, in kilometres
///
/// Returns `None` when the result is not a finite number.
pub fn haversine_km(from: GeoPoint, to: GeoPoint) -> Option<f64> {
    let phi1 = from.latitude.to_radians();
    let phi2 = to.latitude.to_radians();
    let d_phi = (to.latitude - from.latitude).to_radians();
    let d_lambda = (to.longitude - from.longitude).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let distance = 2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt());

    distance.is_finite().then_some(distance)
}
