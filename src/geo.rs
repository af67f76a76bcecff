// src/geo.rs
//! Coordinate validation and geodesic distance on the WGS-84 ellipsoid.
//!
//! `distance_m` is the single distance function used both for radius inclusion
//! and for anything reported back, so boundary decisions stay consistent.

use crate::error::EventError;

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);
/// Mean Earth radius, used by the haversine fallback and the bounding box.
const MEAN_RADIUS_M: f64 = 6_371_008.8;

const VINCENTY_MAX_ITER: usize = 200;
const VINCENTY_EPS: f64 = 1e-12;

pub fn validate_latitude(lat: f64) -> Result<(), EventError> {
    if lat.is_finite() && (-90.0..=90.0).contains(&lat) {
        Ok(())
    } else {
        Err(EventError::validation(format!(
            "latitude must be between -90 and 90, got {lat}"
        )))
    }
}

pub fn validate_longitude(lon: f64) -> Result<(), EventError> {
    if lon.is_finite() && (-180.0..=180.0).contains(&lon) {
        Ok(())
    } else {
        Err(EventError::validation(format!(
            "longitude must be between -180 and 180, got {lon}"
        )))
    }
}

pub fn validate_point(lat: f64, lon: f64) -> Result<(), EventError> {
    validate_latitude(lat)?;
    validate_longitude(lon)
}

/// Geodesic distance in meters between two points (degrees).
///
/// Vincenty's inverse formula on WGS-84. Nearly antipodal points can fail to
/// converge; those fall back to the spherical haversine distance.
pub fn distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    vincenty_m(lat1, lon1, lat2, lon2).unwrap_or_else(|| haversine_m(lat1, lon1, lat2, lon2))
}

pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    distance_m(lat1, lon1, lat2, lon2) / 1000.0
}

pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (p1, p2) = (lat1.to_radians(), lat2.to_radians());
    let dlat = p2 - p1;
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + p1.cos() * p2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * MEAN_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

fn vincenty_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Option<f64> {
    let l = (lon2 - lon1).to_radians();
    let u1 = ((1.0 - WGS84_F) * lat1.to_radians().tan()).atan();
    let u2 = ((1.0 - WGS84_F) * lat2.to_radians().tan()).atan();
    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();

    let mut lambda = l;
    for _ in 0..VINCENTY_MAX_ITER {
        let (sin_lambda, cos_lambda) = lambda.sin_cos();
        let sin_sigma = ((cos_u2 * sin_lambda).powi(2)
            + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda).powi(2))
        .sqrt();
        if sin_sigma == 0.0 {
            // coincident points
            return Some(0.0);
        }
        let cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        let sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
        // equatorial line: cos_sq_alpha == 0
        let cos_2sigma_m = if cos_sq_alpha == 0.0 {
            0.0
        } else {
            cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
        };
        let c = WGS84_F / 16.0 * cos_sq_alpha * (4.0 + WGS84_F * (4.0 - 3.0 * cos_sq_alpha));
        let prev = lambda;
        lambda = l
            + (1.0 - c)
                * WGS84_F
                * sin_alpha
                * (sigma
                    + c * sin_sigma
                        * (cos_2sigma_m
                            + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)));

        if (lambda - prev).abs() < VINCENTY_EPS {
            let u_sq = cos_sq_alpha * (WGS84_A * WGS84_A - WGS84_B * WGS84_B) / (WGS84_B * WGS84_B);
            let a = 1.0 + u_sq / 16_384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
            let b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
            let delta_sigma = b
                * sin_sigma
                * (cos_2sigma_m
                    + b / 4.0
                        * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)
                            - b / 6.0
                                * cos_2sigma_m
                                * (-3.0 + 4.0 * sin_sigma * sin_sigma)
                                * (-3.0 + 4.0 * cos_2sigma_m * cos_2sigma_m)));
            return Some(WGS84_B * a * (sigma - delta_sigma));
        }
    }
    None
}

/// Latitude/longitude box guaranteed to contain every point within `radius_m`.
///
/// Used only as an index-friendly prefilter; the exact test is `distance_m`.
/// The box is padded so ellipsoid-vs-sphere differences never exclude a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn around(lat: f64, lon: f64, radius_m: f64) -> Self {
        let padded = radius_m * 1.01 + 1.0;
        let lat_delta = (padded / MEAN_RADIUS_M).to_degrees();
        let min_lat = (lat - lat_delta).max(-90.0);
        let max_lat = (lat + lat_delta).min(90.0);

        // Near the poles (or for huge radii) every longitude qualifies.
        let cos_lat = min_lat.to_radians().cos().min(max_lat.to_radians().cos());
        if min_lat <= -90.0 || max_lat >= 90.0 || cos_lat <= 1e-9 {
            return Self {
                min_lat,
                max_lat,
                min_lon: -180.0,
                max_lon: 180.0,
            };
        }
        let lon_delta = (padded / (MEAN_RADIUS_M * cos_lat)).to_degrees();
        if lon_delta >= 180.0 {
            return Self {
                min_lat,
                max_lat,
                min_lon: -180.0,
                max_lon: 180.0,
            };
        }
        Self {
            min_lat,
            max_lat,
            min_lon: lon - lon_delta,
            max_lon: lon + lon_delta,
        }
    }

    /// Longitude bounds may extend past ±180 near the antimeridian; wrap the
    /// candidate into range before comparing.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        if lat < self.min_lat || lat > self.max_lat {
            return false;
        }
        [lon, lon - 360.0, lon + 360.0]
            .iter()
            .any(|l| *l >= self.min_lon && *l <= self.max_lon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_bounds_are_inclusive() {
        assert!(validate_point(90.0, 180.0).is_ok());
        assert!(validate_point(-90.0, -180.0).is_ok());
        assert!(validate_latitude(91.0).is_err());
        assert!(validate_longitude(-180.5).is_err());
        assert!(validate_latitude(f64::NAN).is_err());
    }

    #[test]
    fn zero_distance_for_identical_points() {
        assert_eq!(distance_m(40.7, -74.0, 40.7, -74.0), 0.0);
    }

    #[test]
    fn one_degree_of_latitude_at_equator() {
        // WGS-84 meridian arc for the first degree from the equator: ~110.574 km
        let d = distance_km(0.0, 0.0, 1.0, 0.0);
        assert!((d - 110.574).abs() < 0.01, "got {d}");
    }

    #[test]
    fn known_city_pair_is_close_to_reference() {
        // New York (JFK) to London (LHR), ellipsoidal ~5555 km
        let d = distance_km(40.6413, -73.7781, 51.4700, -0.4543);
        assert!((d - 5555.0).abs() < 10.0, "got {d}");
    }

    #[test]
    fn antipodal_points_fall_back_without_panicking() {
        let d = distance_km(0.0, 0.0, 0.5, 179.7);
        assert!(d.is_finite() && d > 19_000.0);
    }

    #[test]
    fn bounding_box_contains_every_point_in_radius() {
        let bb = BoundingBox::around(40.7, -74.0, 5_000.0);
        // due east and north at 4.99 km
        assert!(bb.contains(40.7, -74.0 + 0.0592));
        assert!(bb.contains(40.7 + 0.0449, -74.0));
        assert!(!bb.contains(41.0, -74.0));
    }

    #[test]
    fn bounding_box_wraps_antimeridian() {
        let bb = BoundingBox::around(0.0, 179.99, 10_000.0);
        assert!(bb.contains(0.0, -179.99));
    }
}
