// Great-circle distance

use crate::models::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometres.
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint { latitude, longitude }
    }

    #[test]
    fn measures_known_distances() {
        let lisbon = point(38.7223, -9.1393);
        let porto = point(41.1579, -8.6291);
        let d = distance_km(lisbon, porto);
        assert!((d - 274.0).abs() < 3.0, "got {}", d);
        assert_eq!(distance_km(lisbon, lisbon), 0.0);
    }
}
