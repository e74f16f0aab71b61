//! Geographic locations and the geodesy collaborator
//!
//! The storage core never does coordinate math itself. Equality, distance and
//! area-of-use checks go through the [`Geodesy`] trait; [`SphericalGeodesy`]
//! is a small reference implementation covering WGS84 lon/lat and spherical
//! web mercator.
//!
//! Coordinates follow the east-first convention: `x` is the easting or
//! longitude, `y` the northing or latitude.

mod registry;

pub use registry::{LocationRegistry, DEFAULT_REGISTRY_CAPACITY};

use crate::storage::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate reference system, identified by EPSG code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Crs(pub u32);

impl Crs {
    /// WGS84 geographic lon/lat
    pub const WGS84: Crs = Crs(4326);
    /// Spherical (web) mercator
    pub const WEB_MERCATOR: Crs = Crs(3857);
    /// Amersfoort / RD New
    pub const RD_NEW: Crs = Crs(28992);

    pub fn epsg(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

/// A point in a given coordinate reference system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub x: f64,
    pub y: f64,
    pub crs: Crs,
}

impl GeoLocation {
    /// Create a location without validating it
    pub fn new(x: f64, y: f64, crs: Crs) -> Self {
        Self { x, y, crs }
    }

    /// WGS84 location from longitude and latitude
    pub fn wgs84(lon: f64, lat: f64) -> Self {
        Self::new(lon, lat, Crs::WGS84)
    }

    /// Create a location, rejecting it when outside its CRS area of use
    pub fn validated(x: f64, y: f64, crs: Crs, geodesy: &dyn Geodesy) -> StorageResult<Self> {
        let location = Self::new(x, y, crs);
        location.validate(geodesy)?;
        Ok(location)
    }

    pub fn validate(&self, geodesy: &dyn Geodesy) -> StorageResult<()> {
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(StorageError::InvalidLocation(format!(
                "{} has non-finite coordinates",
                self
            )));
        }
        if !geodesy.within_bounds(self)? {
            return Err(StorageError::InvalidLocation(format!(
                "{} lies outside the area of use of {}",
                self, self.crs
            )));
        }
        Ok(())
    }

    /// The candidate nearest to this location
    pub fn closest<'a>(
        &self,
        candidates: &'a [GeoLocation],
        geodesy: &dyn Geodesy,
    ) -> StorageResult<Option<&'a GeoLocation>> {
        let mut best: Option<(&GeoLocation, f64)> = None;
        for candidate in candidates {
            let distance = geodesy.distance_meters(self, candidate)?;
            if best.map(|(_, d)| distance < d).unwrap_or(true) {
                best = Some((candidate, distance));
            }
        }
        Ok(best.map(|(location, _)| location))
    }

    pub fn within_radius(
        &self,
        other: &GeoLocation,
        meters: f64,
        geodesy: &dyn Geodesy,
    ) -> StorageResult<bool> {
        Ok(geodesy.distance_meters(self, other)? <= meters)
    }

    /// Canonical identity of this exact coordinate
    pub fn key(&self) -> LocationKey {
        LocationKey::from_location(self)
    }
}

impl fmt::Display for GeoLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}) [{}]", self.x, self.y, self.crs)
    }
}

/// Hashable identity of a location
///
/// Coordinates are quantised to millionths of a unit, which is well below a
/// metre for both degrees and projected metres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationKey {
    pub crs: u32,
    pub x_micro: i64,
    pub y_micro: i64,
}

impl LocationKey {
    const SCALE: f64 = 1_000_000.0;

    pub fn from_location(location: &GeoLocation) -> Self {
        Self {
            crs: location.crs.epsg(),
            x_micro: (location.x * Self::SCALE).round() as i64,
            y_micro: (location.y * Self::SCALE).round() as i64,
        }
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EPSG:{}({:.6},{:.6})",
            self.crs,
            self.x_micro as f64 / Self::SCALE,
            self.y_micro as f64 / Self::SCALE
        )
    }
}

/// Coordinate-system services consumed by the storage core
pub trait Geodesy: Send + Sync {
    /// Whether the location lies inside the area of use of its CRS
    fn within_bounds(&self, location: &GeoLocation) -> StorageResult<bool>;

    /// Geodesic distance between two locations in metres
    fn distance_meters(&self, a: &GeoLocation, b: &GeoLocation) -> StorageResult<f64>;

    /// Whether two locations denote the same place
    fn locations_equal(&self, a: &GeoLocation, b: &GeoLocation) -> bool {
        if a.key() == b.key() {
            return true;
        }
        self.distance_meters(a, b)
            .map(|d| d < EQUALITY_TOLERANCE_METERS)
            .unwrap_or(false)
    }
}

/// Distance under which two locations are considered the same place
pub const EQUALITY_TOLERANCE_METERS: f64 = 0.01;

/// Mean earth radius used for great-circle distances
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Sphere radius of the web mercator projection
const MERCATOR_RADIUS_M: f64 = 6_378_137.0;

/// Reference geodesy on a spherical earth
///
/// Supports EPSG:4326 and EPSG:3857 fully; EPSG:28992 only for area-of-use
/// checks, distances involving it are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct SphericalGeodesy;

impl SphericalGeodesy {
    /// Area of use as `(min_x, min_y, max_x, max_y)` in CRS units
    fn area_of_use(crs: Crs) -> Option<(f64, f64, f64, f64)> {
        match crs {
            Crs::WGS84 => Some((-180.0, -90.0, 180.0, 90.0)),
            Crs::WEB_MERCATOR => Some((
                -20_037_508.34,
                -20_048_966.1,
                20_037_508.34,
                20_048_966.1,
            )),
            Crs::RD_NEW => Some((-7_000.0, 289_000.0, 300_000.0, 629_000.0)),
            _ => None,
        }
    }

    /// Convert to WGS84 (lon, lat) degrees
    fn to_lon_lat(location: &GeoLocation) -> StorageResult<(f64, f64)> {
        match location.crs {
            Crs::WGS84 => Ok((location.x, location.y)),
            Crs::WEB_MERCATOR => {
                let lon = (location.x / MERCATOR_RADIUS_M).to_degrees();
                let lat = (2.0 * (location.y / MERCATOR_RADIUS_M).exp().atan()
                    - std::f64::consts::FRAC_PI_2)
                    .to_degrees();
                Ok((lon, lat))
            }
            other => Err(StorageError::InvalidLocation(format!(
                "no conversion from {} to {} available",
                other,
                Crs::WGS84
            ))),
        }
    }
}

impl Geodesy for SphericalGeodesy {
    fn within_bounds(&self, location: &GeoLocation) -> StorageResult<bool> {
        let (min_x, min_y, max_x, max_y) = Self::area_of_use(location.crs).ok_or_else(|| {
            StorageError::InvalidLocation(format!("unsupported reference system {}", location.crs))
        })?;
        Ok(min_x <= location.x && location.x <= max_x && min_y <= location.y && location.y <= max_y)
    }

    fn distance_meters(&self, a: &GeoLocation, b: &GeoLocation) -> StorageResult<f64> {
        let (lon1, lat1) = Self::to_lon_lat(a)?;
        let (lon2, lat2) = Self::to_lon_lat(b)?;

        // Haversine
        let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
        let d_phi = (lat2 - lat1).to_radians();
        let d_lambda = (lon2 - lon1).to_radians();
        let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
        Ok(2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_bounds() {
        let geodesy = SphericalGeodesy;
        assert!(GeoLocation::validated(5.18, 52.1, Crs::WGS84, &geodesy).is_ok());
        assert!(matches!(
            GeoLocation::validated(5.18, 95.0, Crs::WGS84, &geodesy),
            Err(StorageError::InvalidLocation(_))
        ));
        assert!(GeoLocation::validated(155_000.0, 463_000.0, Crs::RD_NEW, &geodesy).is_ok());
        assert!(GeoLocation::validated(155_000.0, 63_000.0, Crs::RD_NEW, &geodesy).is_err());
        // unknown reference system
        assert!(GeoLocation::validated(1.0, 1.0, Crs(9999), &geodesy).is_err());
        assert!(GeoLocation::validated(f64::NAN, 1.0, Crs::WGS84, &geodesy).is_err());
    }

    #[test]
    fn test_distance() {
        let geodesy = SphericalGeodesy;
        let de_bilt = GeoLocation::wgs84(5.1797, 52.1017);
        let amsterdam = GeoLocation::wgs84(4.9041, 52.3676);

        let d = geodesy.distance_meters(&de_bilt, &amsterdam).unwrap();
        assert!((d - 35_000.0).abs() < 2_000.0, "distance was {}", d);
        assert_eq!(geodesy.distance_meters(&de_bilt, &de_bilt).unwrap(), 0.0);
    }

    #[test]
    fn test_equality_across_reference_systems() {
        let geodesy = SphericalGeodesy;
        let origin = GeoLocation::wgs84(0.0, 0.0);
        let mercator_origin = GeoLocation::new(0.0, 0.0, Crs::WEB_MERCATOR);
        assert!(geodesy.locations_equal(&origin, &mercator_origin));

        let elsewhere = GeoLocation::wgs84(0.001, 0.0);
        assert!(!geodesy.locations_equal(&origin, &elsewhere));
    }

    #[test]
    fn test_closest_and_radius() {
        let geodesy = SphericalGeodesy;
        let here = GeoLocation::wgs84(5.0, 52.0);
        let candidates = [
            GeoLocation::wgs84(6.0, 52.0),
            GeoLocation::wgs84(5.1, 52.0),
            GeoLocation::wgs84(4.0, 51.0),
        ];
        let closest = here.closest(&candidates, &geodesy).unwrap().unwrap();
        assert_eq!(*closest, candidates[1]);

        assert!(here.within_radius(&candidates[1], 10_000.0, &geodesy).unwrap());
        assert!(!here.within_radius(&candidates[0], 10_000.0, &geodesy).unwrap());
    }

    #[test]
    fn test_location_key_quantisation() {
        let a = GeoLocation::wgs84(5.1234561, 52.0);
        let b = GeoLocation::wgs84(5.1234559, 52.0);
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().to_string(), "EPSG:4326(5.123456,52.000000)");
    }
}
