//! Satellite visibility models.
//!
//! A [`FovModel`] decides, for every sampled epoch, which satellites of the
//! full catalog the receiver can actually see. Three models are provided:
//!
//! - **ViewMatch** trusts the receiver: it keeps the N satellites whose
//!   directions are closest to the receiver's zenith, N being the count the
//!   receiver itself reported at that epoch.
//! - **ConstantMask** applies a fixed elevation mask above the local
//!   horizon, under the spherical-earth, circular-orbit approximation.
//! - **Treeline** models a drone rising out of surrounding vegetation: the
//!   mask angle shrinks linearly from `max_mask` at the flight's minimum
//!   altitude to `min_mask` at `tree_height` meters above it, and the local
//!   horizon is corrected by the tangent to the WGS84 ellipse.
//!
//! Each model owns the queue of DOP calculators that will run on its
//! selection, so one pipeline run can compare several models side by side.

use std::collections::BTreeMap;
use tracing::debug;

use crate::constants::{
    ColumnTable, Constellation, Degree, Meter, Prn, Radian, SatelliteCatalog, VisibilitySet,
    CHN_ALT, CHN_LAT, CHN_LON, CHN_SAT, CHN_UTC, RADEG,
};
use crate::dop::DopCalc;
use crate::geometry::{geodetic_to_ecef, horizon_tangent_slope, mask_threshold_cosine, unit};
use crate::skydop_errors::SkydopError;
use crate::telemetry::{epoch_rows, EpochRow};

/// A configured visibility model with its attached calculator queue.
#[derive(Debug, Clone)]
pub struct FovModel {
    signature: String,
    cstls: Vec<Constellation>,
    calcs: Vec<DopCalc>,
    kind: FovKind,
}

#[derive(Debug, Clone)]
enum FovKind {
    ViewMatch,
    ConstantMask {
        mask: Radian,
    },
    Treeline {
        max_mask: Radian,
        min_mask: Radian,
        tree_height: Meter,
    },
}

impl FovModel {
    /// Receiver-reported-count model.
    ///
    /// Arguments
    /// ---------
    /// * `signature`: label embedded in the output column names
    /// * `cstls`: constellations eligible for selection (non-empty)
    pub fn view_match(
        signature: impl Into<String>,
        cstls: Vec<Constellation>,
    ) -> Result<Self, SkydopError> {
        Self::build(signature, cstls, FovKind::ViewMatch)
    }

    /// Fixed-elevation-mask model. `mask` is in degrees, non-negative.
    pub fn constant_mask(
        signature: impl Into<String>,
        mask: Degree,
        cstls: Vec<Constellation>,
    ) -> Result<Self, SkydopError> {
        if mask < 0.0 {
            return Err(SkydopError::ConfigurationError(format!(
                "mask angle must be non-negative, got {mask}"
            )));
        }
        Self::build(signature, cstls, FovKind::ConstantMask { mask: mask * RADEG })
    }

    /// Altitude-interpolated-mask model with ellipsoidal horizon correction.
    ///
    /// Arguments
    /// ---------
    /// * `signature`: label embedded in the output column names
    /// * `max_mask`: mask angle in degrees at the flight's minimum altitude
    /// * `min_mask`: mask angle in degrees at and above the treeline
    /// * `tree_height`: height of the treeline above the flight's minimum
    ///   altitude, meters, strictly positive
    /// * `cstls`: constellations eligible for selection (non-empty)
    pub fn treeline(
        signature: impl Into<String>,
        max_mask: Degree,
        min_mask: Degree,
        tree_height: Meter,
        cstls: Vec<Constellation>,
    ) -> Result<Self, SkydopError> {
        if min_mask < 0.0 {
            return Err(SkydopError::ConfigurationError(format!(
                "mask angle must be non-negative, got {min_mask}"
            )));
        }
        if max_mask < min_mask {
            return Err(SkydopError::ConfigurationError(format!(
                "maximum mask angle ({max_mask}) cannot be smaller than the minimum ({min_mask})"
            )));
        }
        if tree_height <= 0.0 {
            return Err(SkydopError::ConfigurationError(format!(
                "tree height must be strictly positive, got {tree_height}"
            )));
        }
        Self::build(
            signature,
            cstls,
            FovKind::Treeline {
                max_mask: max_mask * RADEG,
                min_mask: min_mask * RADEG,
                tree_height,
            },
        )
    }

    fn build(
        signature: impl Into<String>,
        cstls: Vec<Constellation>,
        kind: FovKind,
    ) -> Result<Self, SkydopError> {
        let signature = signature.into();
        if signature.is_empty() {
            return Err(SkydopError::ConfigurationError(
                "model signature cannot be empty".to_string(),
            ));
        }
        if cstls.is_empty() {
            return Err(SkydopError::ConfigurationError(format!(
                "model '{signature}' needs at least one constellation"
            )));
        }
        Ok(FovModel {
            signature,
            cstls,
            calcs: Vec::new(),
            kind,
        })
    }

    /// Queue a calculator on this model's selection. Duplicates are ignored.
    pub fn add_calc(&mut self, calc: DopCalc) {
        if !self.calcs.contains(&calc) {
            self.calcs.push(calc);
        }
    }

    /// The queued calculators, in attach order.
    pub fn calcs(&self) -> &[DopCalc] {
        &self.calcs
    }

    /// Label embedded in the output column names.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Constellations this model selects from.
    pub fn constellations(&self) -> &[Constellation] {
        &self.cstls
    }

    /// Telemetry columns this model reads.
    pub fn required_vars(&self) -> Vec<&'static str> {
        match self.kind {
            FovKind::ViewMatch => vec![CHN_UTC, CHN_LAT, CHN_LON, CHN_ALT, CHN_SAT],
            _ => vec![CHN_UTC, CHN_LAT, CHN_LON, CHN_ALT],
        }
    }

    /// Select the satellites in view for every sampled epoch.
    ///
    /// Arguments
    /// ---------
    /// * `sampled`: the resampled telemetry table
    /// * `catalog`: full satellite positions for exactly the sampled
    ///   timestamps
    ///
    /// Return
    /// ------
    /// * The per-timestamp subset of `catalog` this model keeps in view
    pub fn get_sats(
        &self,
        sampled: &ColumnTable,
        catalog: &SatelliteCatalog,
    ) -> Result<VisibilitySet, SkydopError> {
        debug!(model = %self.signature, "selecting satellites in view");

        let need_reported = matches!(self.kind, FovKind::ViewMatch);
        let rows = epoch_rows(sampled, need_reported)?;

        // Treeline interpolates from the lowest altitude of the flight.
        let min_alt = rows.iter().map(|r| r.alt).fold(f64::INFINITY, f64::min);

        let mut in_view = VisibilitySet::default();
        for row in &rows {
            let sats = catalog.get(&row.timestamp).ok_or_else(|| {
                SkydopError::CatalogError(format!(
                    "satellite catalog has no entry for timestamp '{}'",
                    row.timestamp
                ))
            })?;

            let kept = match &self.kind {
                FovKind::ViewMatch => self.select_reported(row, sats),
                FovKind::ConstantMask { mask } => {
                    let u = geodetic_to_ecef(row.lat, row.lon, row.alt);
                    let threshold = mask_threshold_cosine(*mask, u.norm());
                    self.select_above(&u, threshold, sats)
                }
                FovKind::Treeline {
                    max_mask,
                    min_mask,
                    tree_height,
                } => {
                    let u = geodetic_to_ecef(row.lat, row.lon, row.alt);
                    let slope = horizon_tangent_slope(&u, min_alt).ok_or_else(|| {
                        SkydopError::GeometryError {
                            timestamp: row.timestamp.clone(),
                            reason: "receiver below the horizon reference ellipsoid".to_string(),
                        }
                    })?;

                    let mask = if row.alt < min_alt + tree_height {
                        let h = (row.alt - min_alt) / tree_height;
                        max_mask - (max_mask - min_mask) * h
                    } else {
                        *min_mask
                    };

                    // Depression of the visible horizon relative to the
                    // receiver vertical, plus the vegetation mask.
                    let d_a = std::f64::consts::FRAC_PI_2 - row.lat * RADEG - slope + mask;
                    let threshold = mask_threshold_cosine(d_a, u.norm());
                    self.select_above(&u, threshold, sats)
                }
            };

            in_view.insert(row.timestamp.clone(), kept);
        }
        Ok(in_view)
    }

    fn is_in_cstls(&self, prn: &str) -> bool {
        prn.chars()
            .next()
            .and_then(Constellation::from_initial)
            .is_some_and(|c| self.cstls.contains(&c))
    }

    /// Keep the reported number of satellites, closest-to-zenith first. The
    /// count is clamped to the candidates available; ties break in PRN
    /// order.
    fn select_reported(
        &self,
        row: &EpochRow,
        sats: &BTreeMap<Prn, nalgebra::Vector3<f64>>,
    ) -> BTreeMap<Prn, nalgebra::Vector3<f64>> {
        let u_unit = unit(&geodetic_to_ecef(row.lat, row.lon, row.alt));

        let mut scored: Vec<(f64, &Prn)> = sats
            .iter()
            .filter(|(prn, _)| self.is_in_cstls(prn))
            .map(|(prn, pos)| (u_unit.dot(&unit(pos)), prn))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));

        let n = row.reported_sats.unwrap_or(0).min(scored.len());
        scored[..n]
            .iter()
            .map(|(_, prn)| ((*prn).clone(), sats[*prn]))
            .collect()
    }

    /// Keep the satellites whose zenith-dot clears `threshold`.
    fn select_above(
        &self,
        u: &nalgebra::Vector3<f64>,
        threshold: f64,
        sats: &BTreeMap<Prn, nalgebra::Vector3<f64>>,
    ) -> BTreeMap<Prn, nalgebra::Vector3<f64>> {
        let u_unit = unit(u);
        sats.iter()
            .filter(|(prn, _)| self.is_in_cstls(prn))
            .filter(|(_, pos)| u_unit.dot(&unit(pos)) >= threshold)
            .map(|(prn, pos)| (prn.clone(), *pos))
            .collect()
    }
}
