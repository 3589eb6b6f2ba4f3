//! Coordinate and geometry utilities.
//!
//! Pure functions shared by the visibility models and the DOP calculators:
//! geodetic → ECEF conversion on the WGS84 ellipsoid, vector normalization,
//! and the horizon math used by the elevation-mask models (threshold cosine
//! under the circular-orbit approximation, ellipse-tangent solving for the
//! ellipsoidal horizon correction).

use nalgebra::Vector3;
use std::f64::consts::FRAC_PI_2;

use crate::constants::{
    Degree, Meter, Radian, NOMINAL_ORBIT_RADIUS, RADEG, WGS84_ECC_SQUARED, WGS84_MAJOR_AXIS,
    WGS84_MINOR_AXIS,
};

/// Tolerance below which the ellipse-tangent discriminant is considered
/// genuinely negative (receiver inside the ellipsoid) rather than rounding
/// noise from a receiver sitting exactly on it.
const TANGENT_DISCRIMINANT_TOL: f64 = 1.0e-9;

/// Convert geodetic coordinates to ECEF meters on the WGS84 ellipsoid.
///
/// Arguments
/// ---------
/// * `lat`: geodetic latitude in degrees
/// * `lon`: geodetic longitude in degrees (east-positive)
/// * `alt`: height above the ellipsoid in meters
///
/// Return
/// ------
/// * The ECEF position vector in meters
pub fn geodetic_to_ecef(lat: Degree, lon: Degree, alt: Meter) -> Vector3<f64> {
    let lat = lat * RADEG;
    let lon = lon * RADEG;
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();

    // Prime vertical radius of curvature
    let n = WGS84_MAJOR_AXIS / (1.0 - WGS84_ECC_SQUARED * sin_lat * sin_lat).sqrt();

    Vector3::new(
        (n + alt) * cos_lat * cos_lon,
        (n + alt) * cos_lat * sin_lon,
        (n * (1.0 - WGS84_ECC_SQUARED) + alt) * sin_lat,
    )
}

/// Unit vector in the direction of `v`.
pub fn unit(v: &Vector3<f64>) -> Vector3<f64> {
    v / v.norm()
}

/// Dot-product threshold for an elevation mask under the spherical-earth,
/// circular-orbit approximation.
///
/// A satellite at unit ECEF direction `s` is above the mask iff
/// `dot(unit(u), s) >= mask_threshold_cosine(mask, u.norm())`. The formula
/// places the satellite on the nominal orbit sphere and computes the
/// geocentric angle to the mask ray:
/// `θ = π/2 − mask − asin(cos(mask) · |u| / R_nom)`.
///
/// Arguments
/// ---------
/// * `mask`: elevation mask angle above the local horizon, radians, ≥ 0
/// * `receiver_norm`: geocentric distance of the receiver in meters
///
/// Return
/// ------
/// * The threshold cosine value
pub fn mask_threshold_cosine(mask: Radian, receiver_norm: Meter) -> f64 {
    let orbit_angle = (mask.cos() / NOMINAL_ORBIT_RADIUS * receiver_norm).asin();
    (FRAC_PI_2 - mask - orbit_angle).cos()
}

/// Slope angle of the horizon tangent in the receiver's meridian plane.
///
/// The WGS84 ellipse, inflated by the flight's minimum altitude on both
/// axes, is intersected with the meridian half-plane of the receiver
/// (coordinates `c` along the equatorial projection, `d` along `|z|`; the
/// fold by `|z|` makes both hemispheres map to the same upper half-plane).
/// The two tangent points from the receiver are the roots of a quadratic;
/// the forward candidate gives the direction of the visible horizon.
///
/// Arguments
/// ---------
/// * `u`: receiver ECEF position in meters
/// * `min_alt`: minimum altitude seen in the flight, meters
///
/// Return
/// ------
/// * The absolute slope angle of the tangent line in radians, or `None` if
///   the discriminant is negative (receiver strictly inside the inflated
///   ellipsoid, possible only for pathological altitude inputs)
pub fn horizon_tangent_slope(u: &Vector3<f64>, min_alt: Meter) -> Option<Radian> {
    let c = u.x.hypot(u.y);
    let d = u.z.abs();

    let a = WGS84_MAJOR_AXIS + min_alt;
    let b = WGS84_MINOR_AXIS + min_alt;

    let e = c * c / (a * a) + d * d / (b * b) - 1.0;
    if e < -TANGENT_DISCRIMINANT_TOL {
        return None;
    }
    // The epoch at the flight's minimum altitude sits exactly on the
    // inflated ellipse; rounding can push the discriminant marginally
    // negative there. The clamped value converges to the on-surface
    // tangent slope atan(c·b² / (d·a²)).
    let e = e.max(1.0e-12);
    let sqrt_e = e.sqrt();

    let x1 = (c + d * a / b * sqrt_e) / (e + 1.0);
    let y1 = (d - c * b / a * sqrt_e) / (e + 1.0);

    let slope = ((y1 - d) / (x1 - c)).atan();
    Some(slope.abs())
}

#[cfg(test)]
mod geometry_test {
    use super::*;

    // Tampere test point used across the unit tests.
    const LAT: Degree = 61.4498;
    const LON: Degree = 23.8595;

    #[test]
    fn test_geodetic_to_ecef() {
        let u = geodetic_to_ecef(LAT, LON, 150.0);
        assert!((u.x - 2_795_080.366889955).abs() < 1e-6);
        assert!((u.y - 1_236_246.1651187015).abs() < 1e-6);
        assert!((u.z - 5_579_601.907974247).abs() < 1e-6);
    }

    #[test]
    fn test_geodetic_to_ecef_equator() {
        let u = geodetic_to_ecef(0.0, 0.0, 0.0);
        assert!((u.x - WGS84_MAJOR_AXIS).abs() < 1e-9);
        assert!(u.y.abs() < 1e-9);
        assert!(u.z.abs() < 1e-9);

        let p = geodetic_to_ecef(90.0, 0.0, 0.0);
        assert!((p.z - WGS84_MINOR_AXIS).abs() < 1e-6);
    }

    #[test]
    fn test_unit() {
        let v = Vector3::new(3.0, 0.0, 4.0);
        let n = unit(&v);
        assert!((n.norm() - 1.0).abs() < 1e-15);
        assert!((n.x - 0.6).abs() < 1e-15);
        assert!((n.z - 0.8).abs() < 1e-15);
    }

    #[test]
    fn test_mask_threshold_zero_mask() {
        // With a zero mask the threshold reduces to |u| / R_nom.
        let u = geodetic_to_ecef(LAT, LON, 150.0);
        let th = mask_threshold_cosine(0.0, u.norm());
        assert!((th - u.norm() / NOMINAL_ORBIT_RADIUS).abs() < 1e-12);
    }

    #[test]
    fn test_mask_threshold_five_degrees() {
        let u = geodetic_to_ecef(LAT, LON, 150.0);
        let th = mask_threshold_cosine(5.0 * RADEG, u.norm());
        assert!((th - 0.3223450195744698).abs() < 1e-9);
    }

    #[test]
    fn test_mask_threshold_monotonic_in_mask() {
        let u = geodetic_to_ecef(LAT, LON, 150.0);
        let norm = u.norm();
        let mut last = mask_threshold_cosine(0.0, norm);
        for deg in 1..=30 {
            let th = mask_threshold_cosine(deg as f64 * RADEG, norm);
            assert!(th > last, "threshold should grow with the mask angle");
            last = th;
        }
    }

    #[test]
    fn test_horizon_tangent_slope_above_surface() {
        let u = geodetic_to_ecef(LAT, LON, 150.0);
        let slope = horizon_tangent_slope(&u, 0.0).unwrap();
        assert!((slope - 0.5051496442890476).abs() < 1e-9);
    }

    #[test]
    fn test_horizon_tangent_slope_on_surface() {
        // Receiver exactly at the flight minimum: discriminant is rounding
        // noise around zero, the slope must converge to the surface tangent.
        let u = geodetic_to_ecef(LAT, LON, 150.0);
        let slope = horizon_tangent_slope(&u, 150.0).unwrap();
        assert!((slope - 0.4983018320501085).abs() < 1e-4);
    }

    #[test]
    fn test_horizon_tangent_slope_inside_is_none() {
        let u = geodetic_to_ecef(LAT, LON, 50.0);
        assert!(horizon_tangent_slope(&u, 150.0).is_none());
    }
}
