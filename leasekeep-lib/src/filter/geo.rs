use serde::{Deserialize, Serialize};

use crate::{Endpoint, ErrorKind, Result};

/// Mean Earth radius used for great-circle distances
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Two coordinates closer than this (in degrees, per axis) are the same spot
const COORDINATE_TOLERANCE: f64 = 1e-6;

/// A point on the globe, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new point
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// The location of an endpoint, if it has both coordinates
    #[must_use]
    pub const fn of(endpoint: &Endpoint) -> Option<Self> {
        match (endpoint.latitude, endpoint.longitude) {
            (Some(latitude), Some(longitude)) => Some(Self::new(latitude, longitude)),
            _ => None,
        }
    }

    /// Great-circle distance in kilometers (haversine formula)
    #[must_use]
    pub fn distance_km(&self, other: &Self) -> f64 {
        let (lat1, lon1) = (self.latitude.to_radians(), self.longitude.to_radians());
        let (lat2, lon2) = (other.latitude.to_radians(), other.longitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = lon2 - lon1;

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        // Rounding can push `a` a hair above 1 for antipodal points
        let c = 2.0 * a.sqrt().min(1.0).asin();
        EARTH_RADIUS_KM * c
    }

    /// Whether both coordinates agree within a micro-degree
    #[must_use]
    pub fn is_near(&self, other: &Self) -> bool {
        (self.latitude - other.latitude).abs() <= COORDINATE_TOLERANCE
            && (self.longitude - other.longitude).abs() <= COORDINATE_TOLERANCE
    }
}

/// A validated geographic constraint: either "exactly here" or "within
/// `radius_km` of here"
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoConstraint {
    center: GeoPoint,
    radius_km: Option<f64>,
}

impl GeoConstraint {
    /// Validate the raw coordinate inputs of a filter.
    ///
    /// Returns `Ok(None)` when no geographic constraint was requested.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::IncompleteCoordinates`] if only one of latitude and
    ///   longitude is given
    /// - [`ErrorKind::RadiusWithoutCoordinates`] if a radius is given
    ///   without a center
    /// - [`ErrorKind::InvalidRadius`] if the radius is not a positive number
    pub fn from_parts(
        latitude: Option<f64>,
        longitude: Option<f64>,
        radius_km: Option<f64>,
    ) -> Result<Option<Self>> {
        let center = match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => GeoPoint::new(latitude, longitude),
            (None, None) if radius_km.is_some() => return Err(ErrorKind::RadiusWithoutCoordinates),
            (None, None) => return Ok(None),
            _ => return Err(ErrorKind::IncompleteCoordinates),
        };

        if let Some(radius) = radius_km {
            // Also rejects NaN
            if !(radius > 0.0) {
                return Err(ErrorKind::InvalidRadius(radius));
            }
        }

        Ok(Some(Self { center, radius_km }))
    }

    /// The center point
    #[must_use]
    pub const fn center(&self) -> GeoPoint {
        self.center
    }

    /// The search radius, if any
    #[must_use]
    pub const fn radius_km(&self) -> Option<f64> {
        self.radius_km
    }

    /// Endpoints without coordinates never match
    #[must_use]
    pub fn matches(&self, endpoint: &Endpoint) -> bool {
        let Some(location) = GeoPoint::of(endpoint) else {
            return false;
        };
        match self.radius_km {
            None => self.center.is_near(&location),
            Some(radius) => self.center.distance_km(&location) <= radius,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BUENOS_AIRES: GeoPoint = GeoPoint::new(-34.6037, -58.3816);
    const SANTIAGO: GeoPoint = GeoPoint::new(-33.4489, -70.6693);

    #[test]
    fn test_distance() {
        assert!(BUENOS_AIRES.distance_km(&BUENOS_AIRES).abs() < 1e-9);
        let d = BUENOS_AIRES.distance_km(&SANTIAGO);
        // Roughly 1140 km as the crow flies
        assert!((1100.0..1180.0).contains(&d), "{d}");
        assert!((d - SANTIAGO.distance_km(&BUENOS_AIRES)).abs() < 1e-9);
    }

    #[test]
    fn test_antipodes_do_not_produce_nan() {
        let d = GeoPoint::new(0.0, 0.0).distance_km(&GeoPoint::new(0.0, 180.0));
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn test_validation() {
        assert_eq!(GeoConstraint::from_parts(None, None, None), Ok(None));
        assert_eq!(
            GeoConstraint::from_parts(Some(1.0), None, None),
            Err(ErrorKind::IncompleteCoordinates)
        );
        assert_eq!(
            GeoConstraint::from_parts(None, Some(1.0), Some(5.0)),
            Err(ErrorKind::IncompleteCoordinates)
        );
        assert_eq!(
            GeoConstraint::from_parts(None, None, Some(5.0)),
            Err(ErrorKind::RadiusWithoutCoordinates)
        );
        assert_eq!(
            GeoConstraint::from_parts(Some(1.0), Some(1.0), Some(0.0)),
            Err(ErrorKind::InvalidRadius(0.0))
        );
        assert!(GeoConstraint::from_parts(Some(1.0), Some(1.0), Some(f64::NAN)).is_err());
    }

    #[test]
    fn test_exact_match_uses_tolerance() {
        let geo = GeoConstraint::from_parts(Some(10.0), Some(20.0), None)
            .unwrap()
            .unwrap();
        assert!(geo.center().is_near(&GeoPoint::new(10.000_000_5, 20.0)));
        assert!(!geo.center().is_near(&GeoPoint::new(10.00001, 20.0)));
    }
}
