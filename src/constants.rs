//! # Constants and type definitions for Skydop
//!
//! This module centralizes the **geodetic constants**, **canonical telemetry
//! column names**, and **common type definitions** used throughout the
//! `skydop` library.
//!
//! ## Overview
//!
//! - WGS84 ellipsoid parameters and the nominal GNSS orbit radius
//! - Unit conversions (degrees ↔ radians)
//! - Core type aliases used across the crate
//! - The [`Constellation`] identifier for GNSS system families
//! - Container types for the satellite catalog and sampled telemetry
//!
//! These definitions are used by all main modules, including the visibility
//! models, the DOP calculators and the pipeline.

use ahash::RandomState;
use nalgebra::Vector3;
use std::collections::{BTreeMap, HashMap};

// -------------------------------------------------------------------------------------------------
// Physical constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// Earth equatorial radius in meters (WGS84 semi-major axis)
pub const WGS84_MAJOR_AXIS: Meter = 6_378_137.0;

/// Earth polar radius in meters (WGS84 semi-minor axis)
pub const WGS84_MINOR_AXIS: Meter = 6_356_752.314245;

/// First eccentricity squared of the WGS84 ellipsoid
pub const WGS84_ECC_SQUARED: f64 =
    1.0 - (WGS84_MINOR_AXIS * WGS84_MINOR_AXIS) / (WGS84_MAJOR_AXIS * WGS84_MAJOR_AXIS);

/// Nominal GNSS orbit radius in meters (GPS semi-major axis, circular-orbit
/// approximation). Two orders of magnitude larger than the earth-radius
/// variation, which is what makes the spherical horizon approximation in the
/// visibility models acceptable.
pub const NOMINAL_ORBIT_RADIUS: Meter = 26_560_000.0;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Number of seconds in a GPS week
pub const SECONDS_PER_WEEK: f64 = 604_800.0;

// -------------------------------------------------------------------------------------------------
// Canonical telemetry column names
// -------------------------------------------------------------------------------------------------

/// Receiver latitude in degrees
pub const CHN_LAT: &str = "latitude";
/// Receiver longitude in degrees
pub const CHN_LON: &str = "longitude";
/// Receiver altitude above sea level in meters
pub const CHN_ALT: &str = "altitude_above_sea_level_m";
/// UTC timestamp, ISO-8601 at second resolution
pub const CHN_UTC: &str = "datetime_utc";
/// Satellite count reported by the receiver itself
pub const CHN_SAT: &str = "satellites_in_view";

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angle in radians
pub type Radian = f64;
/// Distance in meters
pub type Meter = f64;
/// Satellite identifier within a constellation (e.g. `"G05"`)
pub type Prn = String;
/// Timestamp string, ISO-8601 at second resolution; the identity of an epoch
pub type TimestampKey = String;

/// Full satellite-position catalog: `timestamp → (PRN → ECEF position, meters)`.
///
/// Built once per run by the satellite position provider for exactly the
/// sampled timestamps. The per-timestamp map is a [`BTreeMap`] so that
/// iteration order over satellites is deterministic (PRN order), which fixes
/// the ViewMatch tie-break.
pub type SatelliteCatalog = HashMap<TimestampKey, BTreeMap<Prn, Vector3<f64>>, RandomState>;

/// A filtered subset of [`SatelliteCatalog`] produced by one visibility model.
pub type VisibilitySet = SatelliteCatalog;

/// Column-oriented table: `column name → cell values`, one per retained epoch.
pub type ColumnTable = HashMap<String, Vec<String>, RandomState>;

// -------------------------------------------------------------------------------------------------
// Constellations
// -------------------------------------------------------------------------------------------------

/// A GNSS satellite system family.
///
/// The PRN initial is the single-character prefix used by RINEX satellite
/// identifiers (`G12`, `E03`, ...). The short name is embedded in output
/// column names to disambiguate per-constellation DOP series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Constellation {
    Gps,
    Galileo,
    BeiDou,
    Glonass,
}

impl Constellation {
    /// The PRN prefix character of this constellation.
    pub fn initial(&self) -> char {
        match self {
            Constellation::Gps => 'G',
            Constellation::Galileo => 'E',
            Constellation::BeiDou => 'C',
            Constellation::Glonass => 'R',
        }
    }

    /// Short name used in output column suffixes.
    pub fn name(&self) -> &'static str {
        match self {
            Constellation::Gps => "GPS",
            Constellation::Galileo => "GAL",
            Constellation::BeiDou => "BDS",
            Constellation::Glonass => "GLO",
        }
    }

    /// Resolve a constellation from a PRN prefix character.
    pub fn from_initial(c: char) -> Option<Self> {
        match c {
            'G' => Some(Constellation::Gps),
            'E' => Some(Constellation::Galileo),
            'C' => Some(Constellation::BeiDou),
            'R' => Some(Constellation::Glonass),
            _ => None,
        }
    }
}

impl std::fmt::Display for Constellation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
