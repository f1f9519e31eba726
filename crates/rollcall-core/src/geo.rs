//! Great-circle proximity evaluation.
//!
//! Decides whether a device is inside a classroom's check-in perimeter by
//! computing the haversine distance between two points on a spherical Earth.
//! At building-sized radii (tens of meters) the spherical model is accurate
//! to well under a meter, so no ellipsoidal correction is applied.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Mean Earth radius used for all distance calculations, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Slack added to the radius when deciding `within_range`.
///
/// Projecting a point exactly `r` meters out and measuring it back can land a
/// few picometers past `r`. A micrometer is far below any positioning
/// accuracy, so points on the perimeter stay inside it.
pub const BOUNDARY_TOLERANCE_METERS: f64 = 1e-6;

/// Valid latitude range in decimal degrees.
pub const LATITUDE_RANGE: (f64, f64) = (-90.0, 90.0);

/// Valid longitude range in decimal degrees.
pub const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);

/// Errors raised while validating evaluator inputs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    /// A latitude or longitude component is outside its valid range (or NaN).
    #[error("Invalid {axis}: {value} is outside [{min}, {max}] decimal degrees")]
    InvalidCoordinate {
        /// Which component failed ("latitude" or "longitude").
        axis: &'static str,
        /// The offending value.
        value: f64,
        /// Lower bound of the valid range.
        min: f64,
        /// Upper bound of the valid range.
        max: f64,
    },

    /// A classroom radius is negative or not finite.
    #[error("Invalid classroom radius: {0} meters. Radius must be a finite, non-negative distance.")]
    InvalidRadius(f64),
}

/// Result type for geometry operations.
pub type GeoResult<T> = std::result::Result<T, GeoError>;

/// A position on Earth in decimal degrees.
///
/// Fields are public so a raw device report can be carried as-is and judged
/// by [`evaluate`]. Deserializing always validates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct GeoCoordinate {
    /// Latitude in decimal degrees, within [-90, 90].
    pub latitude: f64,
    /// Longitude in decimal degrees, within [-180, 180].
    pub longitude: f64,
}

impl GeoCoordinate {
    /// Create a coordinate, rejecting out-of-range components.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::InvalidCoordinate`] if either component is out of
    /// range or NaN.
    pub fn new(latitude: f64, longitude: f64) -> GeoResult<Self> {
        let coordinate = Self {
            latitude,
            longitude,
        };
        coordinate.validate()?;
        Ok(coordinate)
    }

    /// Check both components against their valid ranges.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::InvalidCoordinate`] naming the first bad component.
    pub fn validate(&self) -> GeoResult<()> {
        ensure_within("latitude", self.latitude, LATITUDE_RANGE)?;
        ensure_within("longitude", self.longitude, LONGITUDE_RANGE)
    }
}

#[derive(Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawCoordinate> for GeoCoordinate {
    type Error = GeoError;

    fn try_from(raw: RawCoordinate) -> GeoResult<Self> {
        Self::new(raw.latitude, raw.longitude)
    }
}

fn ensure_within(axis: &'static str, value: f64, (min, max): (f64, f64)) -> GeoResult<()> {
    // NaN fails `contains`, so it is rejected here too.
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(GeoError::InvalidCoordinate {
            axis,
            value,
            min,
            max,
        })
    }
}

/// A classroom's registered position and accepted check-in perimeter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawClassroomLocation")]
pub struct ClassroomLocation {
    /// Center of the perimeter.
    pub center: GeoCoordinate,
    /// Accepted distance from the center, in meters. Zero is allowed.
    pub radius_meters: f64,
}

impl ClassroomLocation {
    /// Create a classroom location, validating center and radius.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::InvalidCoordinate`] for a bad center or
    /// [`GeoError::InvalidRadius`] for a negative or non-finite radius.
    pub fn new(center: GeoCoordinate, radius_meters: f64) -> GeoResult<Self> {
        let location = Self {
            center,
            radius_meters,
        };
        location.validate()?;
        Ok(location)
    }

    /// Validate center and radius.
    ///
    /// # Errors
    ///
    /// See [`ClassroomLocation::new`].
    pub fn validate(&self) -> GeoResult<()> {
        self.center.validate()?;
        if self.radius_meters.is_finite() && self.radius_meters >= 0.0 {
            Ok(())
        } else {
            Err(GeoError::InvalidRadius(self.radius_meters))
        }
    }
}

#[derive(Deserialize)]
struct RawClassroomLocation {
    center: GeoCoordinate,
    radius_meters: f64,
}

impl TryFrom<RawClassroomLocation> for ClassroomLocation {
    type Error = GeoError;

    fn try_from(raw: RawClassroomLocation) -> GeoResult<Self> {
        Self::new(raw.center, raw.radius_meters)
    }
}

/// Outcome of a single proximity evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximityResult {
    /// Great-circle distance between device and classroom center, in meters.
    pub distance_meters: f64,
    /// Whether the distance is within the classroom radius (inclusive).
    pub within_range: bool,
}

/// Evaluate whether `device` lies within `classroom`'s perimeter.
///
/// A device exactly on the perimeter counts as within range, up to
/// [`BOUNDARY_TOLERANCE_METERS`] of rounding.
///
/// # Errors
///
/// Returns [`GeoError::InvalidCoordinate`] if either coordinate is out of
/// range, or [`GeoError::InvalidRadius`] if the classroom radius is negative.
pub fn evaluate(device: GeoCoordinate, classroom: ClassroomLocation) -> GeoResult<ProximityResult> {
    device.validate()?;
    classroom.validate()?;

    let distance_meters = haversine_distance(device, classroom.center);
    let within_range = distance_meters <= classroom.radius_meters + BOUNDARY_TOLERANCE_METERS;

    debug!(
        distance_meters,
        radius_meters = classroom.radius_meters,
        within_range,
        "Evaluated proximity"
    );

    Ok(ProximityResult {
        distance_meters,
        within_range,
    })
}

/// Great-circle distance between two coordinates, in meters.
#[must_use]
pub fn haversine_distance(a: GeoCoordinate, b: GeoCoordinate) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    // Rounding can push h just past 1 for antipodal points.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

/// The point reached by travelling `distance_meters` from `origin` along the
/// initial bearing `bearing_degrees` (clockwise from true north).
#[must_use]
pub fn destination_point(
    origin: GeoCoordinate,
    bearing_degrees: f64,
    distance_meters: f64,
) -> GeoCoordinate {
    let delta = distance_meters / EARTH_RADIUS_METERS;
    let theta = bearing_degrees.to_radians();
    let phi1 = origin.latitude.to_radians();
    let lambda1 = origin.longitude.to_radians();

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
    let lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());

    GeoCoordinate {
        latitude: phi2.to_degrees(),
        longitude: (lambda2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio_test::{assert_err, assert_ok};

    fn nyc() -> GeoCoordinate {
        GeoCoordinate::new(40.7128, -74.0060).unwrap()
    }

    fn classroom(radius_meters: f64) -> ClassroomLocation {
        ClassroomLocation {
            center: nyc(),
            radius_meters,
        }
    }

    #[test]
    fn test_identical_points_are_within_any_radius() {
        for radius in [0.0, 0.5, 50.0, 10_000.0] {
            let result = evaluate(nyc(), classroom(radius)).unwrap();
            assert!(result.distance_meters.abs() < 1e-9);
            assert!(result.within_range, "radius {radius} should accept");
        }
    }

    #[test]
    fn test_point_exactly_on_perimeter_is_within_range() {
        for bearing in 0..360 {
            let device = destination_point(nyc(), f64::from(bearing), 50.0);
            let result = evaluate(device, classroom(50.0)).unwrap();
            assert!(
                result.within_range,
                "bearing {bearing}: {} m from center",
                result.distance_meters
            );
        }
    }

    #[test]
    fn test_point_just_outside_perimeter_is_out_of_range() {
        for bearing in 0..360 {
            let device = destination_point(nyc(), f64::from(bearing), 50.001);
            let result = evaluate(device, classroom(50.0)).unwrap();
            assert!(!result.within_range, "bearing {bearing} should be outside");
        }
    }

    #[test]
    fn test_distance_is_symmetric() {
        let pairs = [
            (nyc(), GeoCoordinate::new(51.5074, -0.1278).unwrap()),
            (
                GeoCoordinate::new(0.0, 179.9).unwrap(),
                GeoCoordinate::new(0.0, -179.9).unwrap(),
            ),
        ];
        for (a, b) in pairs {
            let ab = haversine_distance(a, b);
            let ba = haversine_distance(b, a);
            assert!((ab - ba).abs() < 1e-6, "{ab} != {ba}");
        }
    }

    #[test]
    fn test_antipodal_points_do_not_produce_nan() {
        let a = GeoCoordinate::new(0.0, 0.0).unwrap();
        let b = GeoCoordinate::new(0.0, 180.0).unwrap();
        let distance = haversine_distance(a, b);
        assert!(distance.is_finite());
        assert!((distance - std::f64::consts::PI * EARTH_RADIUS_METERS).abs() < 1.0);
    }

    #[test]
    fn test_out_of_range_coordinates_are_rejected() {
        let bad_latitude = GeoCoordinate {
            latitude: 91.0,
            longitude: 0.0,
        };
        let bad_longitude = GeoCoordinate {
            latitude: 0.0,
            longitude: 181.0,
        };
        let not_a_number = GeoCoordinate {
            latitude: f64::NAN,
            longitude: 0.0,
        };

        for device in [bad_latitude, bad_longitude, not_a_number] {
            let err = evaluate(device, classroom(50.0)).unwrap_err();
            assert!(matches!(err, GeoError::InvalidCoordinate { .. }));
        }

        let bad_center = ClassroomLocation {
            center: bad_latitude,
            radius_meters: 50.0,
        };
        assert!(matches!(
            evaluate(nyc(), bad_center),
            Err(GeoError::InvalidCoordinate {
                axis: "latitude",
                ..
            })
        ));
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        assert_ok!(GeoCoordinate::new(90.0, 180.0));
        assert_ok!(GeoCoordinate::new(-90.0, -180.0));
        assert_err!(GeoCoordinate::new(-90.000_001, 0.0));
    }

    #[test]
    fn test_zero_radius_is_valid_but_negative_is_not() {
        assert_ok!(ClassroomLocation::new(nyc(), 0.0));
        assert_eq!(
            ClassroomLocation::new(nyc(), -1.0),
            Err(GeoError::InvalidRadius(-1.0))
        );
        assert_eq!(
            evaluate(nyc(), classroom(-1.0)),
            Err(GeoError::InvalidRadius(-1.0))
        );
        assert!(matches!(
            evaluate(nyc(), classroom(f64::INFINITY)),
            Err(GeoError::InvalidRadius(_))
        ));
    }

    #[test]
    fn test_device_at_classroom_center() {
        let result = evaluate(nyc(), classroom(50.0)).unwrap();
        assert!(result.distance_meters < 0.01);
        assert!(result.within_range);
    }

    #[test]
    fn test_device_fifty_six_meters_north() {
        let device = GeoCoordinate::new(40.7133, -74.0060).unwrap();
        let result = evaluate(device, classroom(50.0)).unwrap();
        assert!(
            (result.distance_meters - 55.6).abs() < 0.5,
            "got {}",
            result.distance_meters
        );
        assert!(!result.within_range);
    }

    #[test]
    fn test_deserializing_validates() {
        let coordinate: GeoCoordinate =
            serde_json::from_str(r#"{"latitude": 40.7128, "longitude": -74.006}"#).unwrap();
        assert_eq!(coordinate, nyc());

        assert_err!(serde_json::from_str::<GeoCoordinate>(
            r#"{"latitude": 91.0, "longitude": 0.0}"#
        ));
        assert_err!(serde_json::from_str::<ClassroomLocation>(
            r#"{"center": {"latitude": 0.0, "longitude": 0.0}, "radius_meters": -5.0}"#
        ));

        let classroom = classroom(50.0);
        let json = serde_json::to_string(&classroom).unwrap();
        assert_eq!(
            serde_json::from_str::<ClassroomLocation>(&json).unwrap(),
            classroom
        );
    }

    #[test]
    fn test_destination_point_wraps_longitude() {
        let origin = GeoCoordinate::new(0.0, 179.9999).unwrap();
        let east = destination_point(origin, 90.0, 100.0);
        assert_ok!(east.validate());
        assert!(east.longitude < 0.0);
    }

    fn coordinate() -> impl Strategy<Value = GeoCoordinate> {
        // Poles are left out: bearings are degenerate there.
        (-89.0..89.0_f64, -180.0..=180.0_f64).prop_map(|(latitude, longitude)| GeoCoordinate {
            latitude,
            longitude,
        })
    }

    proptest! {
        #[test]
        fn prop_identical_points_are_within_any_radius(
            center in coordinate(),
            radius in 0.0..100_000.0_f64,
        ) {
            let location = ClassroomLocation::new(center, radius).unwrap();
            let result = evaluate(center, location).unwrap();
            prop_assert!(result.within_range);
            prop_assert!(result.distance_meters.abs() < 1e-6);
        }

        #[test]
        fn prop_perimeter_is_inclusive(
            center in coordinate(),
            bearing in 0.0..360.0_f64,
            radius in 1.0..5_000.0_f64,
        ) {
            let device = destination_point(center, bearing, radius);
            let location = ClassroomLocation::new(center, radius).unwrap();
            let result = evaluate(device, location).unwrap();
            prop_assert!(result.within_range, "{} m vs radius {radius}", result.distance_meters);
        }

        #[test]
        fn prop_beyond_perimeter_is_out_of_range(
            center in coordinate(),
            bearing in 0.0..360.0_f64,
            radius in 1.0..5_000.0_f64,
            epsilon in 0.001..10.0_f64,
        ) {
            let device = destination_point(center, bearing, radius + epsilon);
            let location = ClassroomLocation::new(center, radius).unwrap();
            prop_assert!(!evaluate(device, location).unwrap().within_range);
        }

        #[test]
        fn prop_distance_is_symmetric(a in coordinate(), b in coordinate()) {
            let ab = haversine_distance(a, b);
            let ba = haversine_distance(b, a);
            prop_assert!((ab - ba).abs() < 1e-6, "{ab} != {ba}");
        }

        #[test]
        fn prop_destination_stays_valid(
            origin in coordinate(),
            bearing in 0.0..360.0_f64,
            distance in 0.0..20_000.0_f64,
        ) {
            let destination = destination_point(origin, bearing, distance);
            prop_assert!(destination.validate().is_ok());
            prop_assert!((haversine_distance(origin, destination) - distance).abs() < 1e-3);
        }
    }
}
