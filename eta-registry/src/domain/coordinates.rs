//! Geographic coordinates.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance to another coordinate, in kilometres.
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();

        let a = (d_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);

        2.0 * a.sqrt().asin() * EARTH_RADIUS_KM
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Distance is non-negative and symmetric for any pair of points.
        #[test]
        fn non_negative_and_symmetric(
            lat1 in -85.0f64..85.0, lng1 in -180.0f64..180.0,
            lat2 in -85.0f64..85.0, lng2 in -180.0f64..180.0,
        ) {
            let a = Coordinates::new(lat1, lng1);
            let b = Coordinates::new(lat2, lng2);
            let d = a.distance_to(&b);
            prop_assert!(d >= 0.0);
            prop_assert!((d - b.distance_to(&a)).abs() < 1e-6);
        }
    }
}
