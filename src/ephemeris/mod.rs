//! # Satellite position provider
//!
//! The pipeline needs, for every sampled timestamp, the ECEF position of
//! every broadcast satellite. That catalog comes from a
//! [`SatellitePositions`] implementation:
//!
//! - [`download::BrdcProvider`] acquires a daily merged broadcast-navigation
//!   RINEX file (cached on disk), parses its Keplerian records and
//!   propagates them to the requested timestamps.
//! - [`FixedCatalog`] serves a precomputed in-memory catalog; used by tests
//!   and by callers that already have satellite positions.
//!
//! Acquisition is a one-time, blocking operation per run; the catalog it
//! returns is read-only for the rest of the pipeline.

pub mod download;
pub(crate) mod kepler;
pub(crate) mod nav_parser;

use crate::constants::{Constellation, SatelliteCatalog, TimestampKey};
use crate::skydop_errors::SkydopError;

/// Source of per-timestamp satellite ECEF positions.
pub trait SatellitePositions {
    /// One-time preparation: resolve ephemeris covering `first_timestamp`
    /// for the given constellations. Idempotent; the pipeline only calls it
    /// again when a re-setup is forced.
    fn setup(
        &mut self,
        first_timestamp: &str,
        constellations: &[Constellation],
    ) -> Result<(), SkydopError>;

    /// Whether [`setup`](SatellitePositions::setup) has completed.
    fn is_setup(&self) -> bool;

    /// Satellite positions for exactly the requested timestamps.
    ///
    /// Must fail with [`SkydopError::CatalogError`] when a timestamp cannot
    /// be covered.
    fn positions(&self, timestamps: &[TimestampKey]) -> Result<SatelliteCatalog, SkydopError>;
}

/// In-memory provider backed by a prebuilt catalog.
#[derive(Debug, Clone, Default)]
pub struct FixedCatalog {
    catalog: SatelliteCatalog,
    ready: bool,
}

impl FixedCatalog {
    pub fn new(catalog: SatelliteCatalog) -> Self {
        FixedCatalog {
            catalog,
            ready: false,
        }
    }
}

impl SatellitePositions for FixedCatalog {
    fn setup(
        &mut self,
        _first_timestamp: &str,
        _constellations: &[Constellation],
    ) -> Result<(), SkydopError> {
        self.ready = true;
        Ok(())
    }

    fn is_setup(&self) -> bool {
        self.ready
    }

    fn positions(&self, timestamps: &[TimestampKey]) -> Result<SatelliteCatalog, SkydopError> {
        let mut out = SatelliteCatalog::default();
        for ts in timestamps {
            let sats = self.catalog.get(ts).cloned().ok_or_else(|| {
                SkydopError::CatalogError(format!("no satellite positions for timestamp '{ts}'"))
            })?;
            out.insert(ts.clone(), sats);
        }
        Ok(out)
    }
}
