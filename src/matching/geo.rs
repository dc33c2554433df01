use crate::models::Location;

const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Great-circle (haversine) distance in kilometres
pub fn distance_km(from: Location, to: Location) -> f64 {
    let (lat1, lat2) = (from.latitude.to_radians(), to.latitude.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (to.longitude - from.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        let p = Location::new(48.8566, 2.3522);
        assert!(distance_km(p, p).abs() < 1e-9);
    }

    #[test]
    fn test_known_distance() {
        // Paris to London is roughly 344 km
        let paris = Location::new(48.8566, 2.3522);
        let london = Location::new(51.5074, -0.1278);
        let d = distance_km(paris, london);
        assert!((d - 343.5).abs() < 2.0, "got {d}");
        assert!((distance_km(london, paris) - d).abs() < 1e-9);
    }
}
