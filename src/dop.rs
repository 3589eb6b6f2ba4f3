//! Dilution-of-precision calculators.
//!
//! A [`DopCalc`] turns the satellites a visibility model kept in view into
//! per-epoch DOP figures. The unweighted variant restricts the geometry to a
//! single constellation and uses the classic N×4 line-of-sight matrix; the
//! weighted variant mixes constellations through a dual-clock N×5 matrix and
//! elevation-dependent diagonal weights.
//!
//! The DOP figures deliberately reproduce the field-proven reference
//! behaviour: `HDOP = sqrt(Q00² + Q11²)`, `VDOP = Q22`, `TDOP = Q33` and
//! `GDOP = sqrt(trace Q)`, with `Q` the inverse of the (weighted) normal
//! matrix.

use nalgebra::{DMatrix, DVector, Vector3};
use std::collections::BTreeMap;
use tracing::debug;

use crate::constants::{
    ColumnTable, Constellation, Prn, VisibilitySet, CHN_ALT, CHN_LAT, CHN_LON, CHN_UTC,
};
use crate::geometry::{geodetic_to_ecef, unit};
use crate::skydop_errors::SkydopError;
use crate::telemetry::{epoch_rows, EpochRow};

/// Minimum number of satellites for a solvable geometry.
const MIN_SATS: usize = 4;

/// Weight denominators of the weighted calculator, per constellation class.
const WEIGHT_FACTOR_GPS_BDS: f64 = 0.3;
const WEIGHT_FACTOR_GAL_GLO: f64 = 0.6;

/// A queued DOP calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DopCalc {
    /// Single-constellation DOP from the N×4 geometry matrix.
    Unweighted(Constellation),
    /// All-constellation DOP from the N×5 dual-clock geometry matrix with
    /// elevation-dependent weights.
    Weighted,
}

/// One calculator's output: named columns of per-epoch values, in the order
/// of [`DopCalc::column_names`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DopSeries {
    pub columns: Vec<(String, Vec<f64>)>,
}

impl DopCalc {
    /// Output column names for this calculator under the given model
    /// signature, e.g. `HDOP_constm_GPS` or `wHDOP_tree`.
    pub fn column_names(&self, model_signature: &str) -> Vec<String> {
        match self {
            DopCalc::Unweighted(cstl) => ["HDOP", "VDOP", "TDOP", "GDOP", "sats_FOV"]
                .iter()
                .map(|base| format!("{base}_{model_signature}_{cstl}"))
                .collect(),
            DopCalc::Weighted => ["wHDOP", "wVDOP", "wTDOP", "wGDOP", "sats_FOV"]
                .iter()
                .map(|base| format!("{base}_{model_signature}"))
                .collect(),
        }
    }

    /// Telemetry columns this calculator reads.
    pub fn required_vars(&self) -> Vec<&'static str> {
        vec![CHN_UTC, CHN_LAT, CHN_LON, CHN_ALT]
    }

    /// Compute the DOP series over every sampled epoch.
    ///
    /// Arguments
    /// ---------
    /// * `model_signature`: signature of the visibility model that produced
    ///   `visible`, embedded in the output column names
    /// * `sampled`: the resampled telemetry table
    /// * `visible`: per-timestamp satellites kept by the visibility model
    ///
    /// Return
    /// ------
    /// * A [`DopSeries`] with one value per epoch in each column, or the
    ///   first fatal condition encountered ([`SkydopError::NoSatellitesInView`],
    ///   [`SkydopError::GeometryError`], [`SkydopError::UnsupportedConstellation`])
    pub fn compute(
        &self,
        model_signature: &str,
        sampled: &ColumnTable,
        visible: &VisibilitySet,
    ) -> Result<DopSeries, SkydopError> {
        debug!(calc = %self, signature = model_signature, "computing DOP series");

        let rows = epoch_rows(sampled, false)?;
        let names = self.column_names(model_signature);
        let mut values: Vec<Vec<f64>> = vec![Vec::with_capacity(rows.len()); names.len()];

        for row in &rows {
            let sats = visible.get(&row.timestamp).ok_or_else(|| {
                SkydopError::CatalogError(format!(
                    "visibility set has no entry for timestamp '{}'",
                    row.timestamp
                ))
            })?;

            let (hdop, vdop, tdop, gdop, count) = match self {
                DopCalc::Unweighted(cstl) => unweighted_epoch(row, sats, *cstl)?,
                DopCalc::Weighted => weighted_epoch(row, sats)?,
            };

            values[0].push(hdop);
            values[1].push(vdop);
            values[2].push(tdop);
            values[3].push(gdop);
            values[4].push(count as f64);
        }

        Ok(DopSeries {
            columns: names.into_iter().zip(values).collect(),
        })
    }
}

impl std::fmt::Display for DopCalc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DopCalc::Unweighted(cstl) => write!(f, "GDOP_{cstl}"),
            DopCalc::Weighted => write!(f, "wGDOP"),
        }
    }
}

/// DOP figures from an inverted normal matrix.
fn dop_figures(q: &DMatrix<f64>) -> (f64, f64, f64, f64) {
    let hdop = (q[(0, 0)] * q[(0, 0)] + q[(1, 1)] * q[(1, 1)]).sqrt();
    (hdop, q[(2, 2)], q[(3, 3)], q.trace().sqrt())
}

/// Unit line-of-sight components from the receiver to a satellite.
fn line_of_sight(u: &Vector3<f64>, sat: &Vector3<f64>) -> [f64; 3] {
    let d = sat - u;
    let psd = d.norm();
    [-d.x / psd, -d.y / psd, -d.z / psd]
}

fn unweighted_epoch(
    row: &EpochRow,
    sats: &BTreeMap<Prn, Vector3<f64>>,
    cstl: Constellation,
) -> Result<(f64, f64, f64, f64, usize), SkydopError> {
    let u = geodetic_to_ecef(row.lat, row.lon, row.alt);

    let rows: Vec<[f64; 4]> = sats
        .iter()
        .filter(|(prn, _)| prn.starts_with(cstl.initial()))
        .map(|(_, sat)| {
            let [x, y, z] = line_of_sight(&u, sat);
            [x, y, z, 1.0]
        })
        .collect();

    if rows.len() < MIN_SATS {
        return Err(SkydopError::NoSatellitesInView {
            timestamp: row.timestamp.clone(),
            count: rows.len(),
        });
    }

    let g = DMatrix::from_fn(rows.len(), 4, |r, c| rows[r][c]);
    let q = (g.transpose() * &g)
        .try_inverse()
        .ok_or_else(|| SkydopError::GeometryError {
            timestamp: row.timestamp.clone(),
            reason: "normal matrix is singular".to_string(),
        })?;

    let (hdop, vdop, tdop, gdop) = dop_figures(&q);
    Ok((hdop, vdop, tdop, gdop, rows.len()))
}

fn weighted_epoch(
    row: &EpochRow,
    sats: &BTreeMap<Prn, Vector3<f64>>,
) -> Result<(f64, f64, f64, f64, usize), SkydopError> {
    let u = geodetic_to_ecef(row.lat, row.lon, row.alt);
    let u_unit = unit(&u);

    if sats.len() < MIN_SATS {
        return Err(SkydopError::NoSatellitesInView {
            timestamp: row.timestamp.clone(),
            count: sats.len(),
        });
    }

    let mut rows: Vec<[f64; 5]> = Vec::with_capacity(sats.len());
    let mut weights: Vec<f64> = Vec::with_capacity(sats.len());

    for (prn, sat) in sats {
        let [x, y, z] = line_of_sight(&u, sat);

        // Sine of the elevation under the circular-orbit approximation:
        // angle between the receiver vertical and the satellite direction.
        let sin_el = u_unit.dot(&unit(sat));

        let cstl = prn
            .chars()
            .next()
            .and_then(Constellation::from_initial)
            .ok_or_else(|| SkydopError::UnsupportedConstellation(prn.clone()))?;

        // GPS/BeiDou share one receiver clock column, Galileo/Glonass the
        // other; their weight denominators differ.
        let (clock, factor) = match cstl {
            Constellation::Gps | Constellation::BeiDou => ([1.0, 0.0], WEIGHT_FACTOR_GPS_BDS),
            Constellation::Galileo | Constellation::Glonass => {
                ([0.0, 1.0], WEIGHT_FACTOR_GAL_GLO)
            }
        };

        rows.push([x, y, z, clock[0], clock[1]]);
        weights.push(1.0 / (factor * sin_el * sin_el));
    }

    let g = DMatrix::from_fn(rows.len(), 5, |r, c| rows[r][c]);
    let w = DMatrix::from_diagonal(&DVector::from_vec(weights));
    let q = (g.transpose() * w * &g)
        .try_inverse()
        .ok_or_else(|| SkydopError::GeometryError {
            timestamp: row.timestamp.clone(),
            reason: "weighted normal matrix is singular (single clock class?)".to_string(),
        })?;

    let (hdop, vdop, tdop, gdop) = dop_figures(&q);
    Ok((hdop, vdop, tdop, gdop, sats.len()))
}
