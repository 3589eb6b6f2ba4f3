//! Broadcast-ephemeris orbit propagation.
//!
//! Turns the Keplerian broadcast elements of a navigation message into an
//! ECEF position at a requested epoch, following the standard GNSS
//! interface-specification algorithm: corrected mean motion, Newton
//! iteration on Kepler's equation, second-harmonic corrections to argument
//! of latitude, radius and inclination, and an earth-rotation-corrected
//! ascending node.

use hifitime::Epoch;
use nalgebra::Vector3;

use crate::constants::{Prn, SECONDS_PER_WEEK};

/// WGS84 geocentric gravitational constant used by GPS/BeiDou (m³/s²)
const MU_GPS: f64 = 3.986005e14;

/// GTRF geocentric gravitational constant used by Galileo (m³/s²)
const MU_GAL: f64 = 3.986004418e14;

/// Earth rotation rate (rad/s)
const OMEGA_EARTH: f64 = 7.2921151467e-5;

/// Half a GPS week, the wrap point for time-of-week differences (s)
const HALF_WEEK: f64 = SECONDS_PER_WEEK / 2.0;

/// Keplerian broadcast elements for one satellite, as read from a RINEX
/// navigation record.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastEphemeris {
    pub prn: Prn,
    /// Clock epoch of the record (used to pick the freshest block)
    pub toc: Epoch,
    pub crs: f64,
    pub delta_n: f64,
    pub m0: f64,
    pub cuc: f64,
    pub ecc: f64,
    pub cus: f64,
    pub sqrt_a: f64,
    /// Time of ephemeris, seconds of GNSS week
    pub toe: f64,
    pub cic: f64,
    pub omega0: f64,
    pub cis: f64,
    pub i0: f64,
    pub crc: f64,
    pub omega: f64,
    pub omega_dot: f64,
    pub idot: f64,
    /// GNSS week number of `toe`
    pub week: f64,
}

impl BroadcastEphemeris {
    /// ECEF position of the satellite at epoch `t`, in meters.
    pub fn position_at(&self, t: Epoch) -> Vector3<f64> {
        let mu = if self.prn.starts_with('E') {
            MU_GAL
        } else {
            MU_GPS
        };

        let a = self.sqrt_a * self.sqrt_a;
        let n0 = (mu / (a * a * a)).sqrt();

        // Time from ephemeris reference epoch, wrapped to +/- half a week
        let tow = t.to_gpst_seconds() - self.week * SECONDS_PER_WEEK;
        let mut tk = tow - self.toe;
        if tk > HALF_WEEK {
            tk -= SECONDS_PER_WEEK;
        } else if tk < -HALF_WEEK {
            tk += SECONDS_PER_WEEK;
        }

        let n = n0 + self.delta_n;
        let mean_anomaly = self.m0 + n * tk;
        let e_anom = solve_kepler(mean_anomaly, self.ecc);

        let true_anomaly = ((1.0 - self.ecc * self.ecc).sqrt() * e_anom.sin())
            .atan2(e_anom.cos() - self.ecc);
        let phi = true_anomaly + self.omega;

        let (sin_2phi, cos_2phi) = (2.0 * phi).sin_cos();
        let du = self.cus * sin_2phi + self.cuc * cos_2phi;
        let dr = self.crs * sin_2phi + self.crc * cos_2phi;
        let di = self.cis * sin_2phi + self.cic * cos_2phi;

        let arg_lat = phi + du;
        let radius = a * (1.0 - self.ecc * e_anom.cos()) + dr;
        let inc = self.i0 + self.idot * tk + di;

        let x_orb = radius * arg_lat.cos();
        let y_orb = radius * arg_lat.sin();

        // Longitude of ascending node, corrected for earth rotation
        let node = self.omega0 + (self.omega_dot - OMEGA_EARTH) * tk - OMEGA_EARTH * self.toe;

        let (sin_node, cos_node) = node.sin_cos();
        let (sin_inc, cos_inc) = inc.sin_cos();

        Vector3::new(
            x_orb * cos_node - y_orb * cos_inc * sin_node,
            x_orb * sin_node + y_orb * cos_inc * cos_node,
            y_orb * sin_inc,
        )
    }
}

/// Solve Kepler's equation `E - e·sin(E) = M` for the eccentric anomaly.
///
/// Newton iteration; broadcast eccentricities are tiny (< 0.03) so the
/// iteration converges in a handful of steps, but the starting point is
/// still switched for high eccentricities to stay robust.
pub(crate) fn solve_kepler(mean_anomaly: f64, ecc: f64) -> f64 {
    const MAX_ITER: usize = 30;
    const TOL: f64 = 1.0e-13;

    let mut e_anom = if ecc < 0.8 {
        mean_anomaly
    } else {
        std::f64::consts::PI
    };

    for _ in 0..MAX_ITER {
        let delta =
            (e_anom - ecc * e_anom.sin() - mean_anomaly) / (1.0 - ecc * e_anom.cos());
        e_anom -= delta;
        if delta.abs() < TOL {
            break;
        }
    }
    e_anom
}
