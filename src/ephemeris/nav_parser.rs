//! RINEX 3 navigation-message parser.
//!
//! Reads a merged multi-GNSS broadcast navigation file into per-satellite
//! [`BroadcastEphemeris`] blocks. Only the Keplerian constellations
//! (GPS, Galileo, BeiDou, QZSS, IRNSS) are retained; GLONASS and SBAS
//! records carry state vectors instead of orbital elements and are skipped.
//!
//! The format is fixed-width: four 19-character fields per line starting at
//! column 4, with a FORTRAN `D` exponent marker.

use hifitime::Epoch;
use std::collections::{BTreeMap, BTreeSet};

use crate::constants::Prn;
use crate::ephemeris::kepler::BroadcastEphemeris;
use crate::skydop_errors::SkydopError;

/// Number of "broadcast orbit" continuation lines per Keplerian record.
const KEPLERIAN_ORBIT_LINES: usize = 7;

/// Continuation lines of a GLONASS/SBAS state-vector record.
const STATE_VECTOR_ORBIT_LINES: usize = 3;

/// Parsed navigation data for one file: `PRN → ephemeris blocks`, blocks in
/// file order. A [`BTreeMap`] keeps satellite iteration deterministic.
#[derive(Debug, Clone, Default)]
pub(crate) struct NavData {
    records: BTreeMap<Prn, Vec<BroadcastEphemeris>>,
}

impl NavData {
    /// Parse the full text of a RINEX 3 navigation file.
    pub(crate) fn parse(content: &str) -> Result<Self, SkydopError> {
        let mut lines = content.lines();

        // Skip the header block
        let mut in_body = false;
        for line in lines.by_ref() {
            if line.get(60..).unwrap_or("").trim() == "END OF HEADER" {
                in_body = true;
                break;
            }
        }
        if !in_body {
            return Err(SkydopError::RinexParse(
                "no END OF HEADER marker found".to_string(),
            ));
        }

        let mut records: BTreeMap<Prn, Vec<BroadcastEphemeris>> = BTreeMap::new();

        while let Some(line) = lines.next() {
            if line.trim().is_empty() {
                continue;
            }

            let prn = line
                .get(0..3)
                .ok_or_else(|| SkydopError::RinexParse(format!("truncated record line: '{line}'")))?
                .trim()
                .to_string();

            let system = prn.chars().next().unwrap_or(' ');
            if system == 'R' || system == 'S' {
                // State-vector record, not propagated here
                for _ in 0..STATE_VECTOR_ORBIT_LINES {
                    lines.next();
                }
                continue;
            }

            let toc = parse_record_epoch(line)?;

            let mut orbit = [[0.0f64; 4]; KEPLERIAN_ORBIT_LINES];
            for (i, row) in orbit.iter_mut().enumerate() {
                let orbit_line = lines.next().ok_or_else(|| {
                    SkydopError::RinexParse(format!(
                        "record for {prn} at {toc} ends after {i} orbit lines"
                    ))
                })?;
                for (k, slot) in row.iter_mut().enumerate() {
                    *slot = parse_field(orbit_line, k)?;
                }
            }

            let eph = BroadcastEphemeris {
                prn: prn.clone(),
                toc,
                crs: orbit[0][1],
                delta_n: orbit[0][2],
                m0: orbit[0][3],
                cuc: orbit[1][0],
                ecc: orbit[1][1],
                cus: orbit[1][2],
                sqrt_a: orbit[1][3],
                toe: orbit[2][0],
                cic: orbit[2][1],
                omega0: orbit[2][2],
                cis: orbit[2][3],
                i0: orbit[3][0],
                crc: orbit[3][1],
                omega: orbit[3][2],
                omega_dot: orbit[3][3],
                idot: orbit[4][0],
                week: orbit[4][2],
            };

            records.entry(prn).or_default().push(eph);
        }

        Ok(NavData { records })
    }

    /// All satellite identifiers present, in PRN order.
    pub(crate) fn satellites(&self) -> impl Iterator<Item = &Prn> {
        self.records.keys()
    }

    /// The constellation initials present in the parsed data.
    pub(crate) fn constellations(&self) -> BTreeSet<char> {
        self.records
            .keys()
            .filter_map(|prn| prn.chars().next())
            .collect()
    }

    /// The ephemeris block of `prn` whose clock epoch is nearest to `t`.
    pub(crate) fn best_ephemeris(&self, prn: &str, t: Epoch) -> Option<&BroadcastEphemeris> {
        self.records
            .get(prn)?
            .iter()
            .min_by_key(|eph| (eph.toc - t).abs())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parse the `YYYY MM DD HH MM SS` epoch of a record's first line.
fn parse_record_epoch(line: &str) -> Result<Epoch, SkydopError> {
    let fields = line
        .get(4..23)
        .ok_or_else(|| SkydopError::RinexParse(format!("truncated epoch in line: '{line}'")))?;

    let mut parts = fields.split_whitespace();
    let mut next_int = |name: &str| -> Result<i32, SkydopError> {
        parts
            .next()
            .and_then(|p| p.parse::<i32>().ok())
            .ok_or_else(|| SkydopError::RinexParse(format!("bad {name} in epoch '{fields}'")))
    };

    let year = next_int("year")?;
    let month = next_int("month")?;
    let day = next_int("day")?;
    let hour = next_int("hour")?;
    let minute = next_int("minute")?;
    let second = next_int("second")?;

    Epoch::maybe_from_gregorian_utc(
        year,
        month as u8,
        day as u8,
        hour as u8,
        minute as u8,
        second as u8,
        0,
    )
    .map_err(|e| SkydopError::RinexParse(format!("invalid record epoch '{fields}': {e}")))
}

/// Parse the `k`-th 19-character float field of an orbit line.
///
/// Missing trailing fields (short last line) read as zero.
fn parse_field(line: &str, k: usize) -> Result<f64, SkydopError> {
    let start = 4 + 19 * k;
    let end = start + 19;
    let raw = match line.get(start..end.min(line.len())) {
        Some(s) => s.trim(),
        None => return Ok(0.0),
    };
    if raw.is_empty() {
        return Ok(0.0);
    }
    raw.replace(['D', 'd'], "E")
        .parse::<f64>()
        .map_err(|_| SkydopError::RinexParse(format!("bad float field '{raw}' in line '{line}'")))
}
