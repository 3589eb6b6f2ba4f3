//! Receiver telemetry source.
//!
//! [`FlightLog`] reads a logged flight from a CSV file into a
//! column-oriented table keyed by header name. The pipeline only ever asks
//! for the columns the attached models and calculators require; requesting a
//! column the file does not have is a descriptive error, not a panic.
//!
//! The module also provides [`epoch_rows`], the typed view of a sampled
//! table used by the visibility models and the DOP calculators. It is the
//! single place where the `"0"` coordinate sentinel and sensor-dropout
//! misalignment are turned into [`SkydopError::InvalidTelemetry`].

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::constants::{
    ColumnTable, Degree, Meter, TimestampKey, CHN_ALT, CHN_LAT, CHN_LON, CHN_SAT, CHN_UTC,
};
use crate::skydop_errors::SkydopError;
use crate::time::normalize_timestamp;

/// Column-oriented view of one receiver telemetry file.
#[derive(Debug, Clone)]
pub struct FlightLog {
    path: Utf8PathBuf,
    columns: ColumnTable,
    headers: Vec<String>,
    row_count: usize,
    loaded: bool,
}

impl FlightLog {
    /// Create a reader for the given CSV file. The file is not opened until
    /// [`load`](FlightLog::load) is called.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        FlightLog {
            path: path.into(),
            columns: ColumnTable::default(),
            headers: Vec::new(),
            row_count: 0,
            loaded: false,
        }
    }

    /// Read the file into the column table. Idempotent: a second call is a
    /// no-op.
    pub fn load(&mut self) -> Result<(), SkydopError> {
        if self.loaded {
            return Ok(());
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(self.path.as_std_path())?;

        self.headers = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
        for header in &self.headers {
            self.columns.entry(header.clone()).or_default();
        }

        let mut row_count = 0;
        for record in reader.records() {
            let record = record?;
            for (i, header) in self.headers.iter().enumerate() {
                let value = record.get(i).unwrap_or("").trim().to_string();
                // A later duplicate header would push twice into the same
                // column; only the first occurrence is kept.
                if let Some(col) = self.columns.get_mut(header) {
                    if col.len() == row_count {
                        col.push(value);
                    }
                }
            }
            row_count += 1;
        }

        self.row_count = row_count;
        self.loaded = true;
        debug!(
            file = %self.path,
            rows = self.row_count,
            columns = self.headers.len(),
            "telemetry loaded"
        );
        Ok(())
    }

    /// Whether [`load`](FlightLog::load) has completed.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Number of data rows in the file.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Header names in file order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// The first UTC timestamp in the file, normalized to ISO-8601 `T`
    /// separation.
    pub fn first_timestamp(&self) -> Result<TimestampKey, SkydopError> {
        let col = self
            .columns
            .get(CHN_UTC)
            .ok_or_else(|| SkydopError::MissingColumn(CHN_UTC.to_string()))?;
        let first = col.first().ok_or_else(|| {
            SkydopError::InvalidTimestamp(format!("telemetry file '{}' is empty", self.path))
        })?;
        Ok(normalize_timestamp(first))
    }

    /// Copy of the requested columns.
    ///
    /// Arguments
    /// ---------
    /// * `names`: the column names to extract
    ///
    /// Return
    /// ------
    /// * A [`ColumnTable`] restricted to `names`, or
    ///   [`SkydopError::MissingColumn`] naming the first absent header
    pub fn columns<S: AsRef<str>>(&self, names: &[S]) -> Result<ColumnTable, SkydopError> {
        let mut out = ColumnTable::default();
        for name in names {
            let name = name.as_ref();
            let col = self
                .columns
                .get(name)
                .ok_or_else(|| SkydopError::MissingColumn(name.to_string()))?;
            out.insert(name.to_string(), col.clone());
        }
        Ok(out)
    }
}

/// One sampled epoch with typed receiver coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochRow {
    pub timestamp: TimestampKey,
    pub lat: Degree,
    pub lon: Degree,
    pub alt: Meter,
    /// Receiver-reported visible-satellite count; populated only when the
    /// caller asked for it (ViewMatch).
    pub reported_sats: Option<usize>,
}

/// Build the typed epoch sequence from a sampled column table.
///
/// The `"0"` coordinate sentinel marks a sensor dropout; computing DOP on
/// such degenerate coordinates is unsafe, so any sentinel or missing value
/// (a column shortened by the sampler's dropout exclusion) aborts the run.
///
/// Arguments
/// ---------
/// * `sampled`: the resampled column table (must contain the UTC, latitude,
///   longitude and altitude columns)
/// * `need_reported`: also extract the reported-satellite-count column
///
/// Return
/// ------
/// * One [`EpochRow`] per retained timestamp, in epoch order
pub fn epoch_rows(sampled: &ColumnTable, need_reported: bool) -> Result<Vec<EpochRow>, SkydopError> {
    let times = sampled
        .get(CHN_UTC)
        .ok_or_else(|| SkydopError::MissingColumn(CHN_UTC.to_string()))?;

    let mut rows = Vec::with_capacity(times.len());
    for (idx, ts) in times.iter().enumerate() {
        let lat = parse_coordinate(sampled, CHN_LAT, idx, ts)?;
        let lon = parse_coordinate(sampled, CHN_LON, idx, ts)?;
        let alt = parse_numeric(sampled, CHN_ALT, idx, ts)?;

        let reported_sats = if need_reported {
            Some(parse_numeric(sampled, CHN_SAT, idx, ts)? as usize)
        } else {
            None
        };

        rows.push(EpochRow {
            timestamp: ts.clone(),
            lat,
            lon,
            alt,
            reported_sats,
        });
    }
    Ok(rows)
}

fn cell<'a>(
    sampled: &'a ColumnTable,
    column: &str,
    idx: usize,
    timestamp: &str,
) -> Result<&'a str, SkydopError> {
    let col = sampled
        .get(column)
        .ok_or_else(|| SkydopError::MissingColumn(column.to_string()))?;
    col.get(idx)
        .map(|s| s.as_str())
        .ok_or_else(|| SkydopError::InvalidTelemetry {
            timestamp: timestamp.to_string(),
            column: column.to_string(),
            value: "<missing: sensor dropout>".to_string(),
        })
}

fn parse_numeric(
    sampled: &ColumnTable,
    column: &str,
    idx: usize,
    timestamp: &str,
) -> Result<f64, SkydopError> {
    let raw = cell(sampled, column, idx, timestamp)?;
    raw.parse::<f64>()
        .map_err(|_| SkydopError::InvalidTelemetry {
            timestamp: timestamp.to_string(),
            column: column.to_string(),
            value: raw.to_string(),
        })
}

fn parse_coordinate(
    sampled: &ColumnTable,
    column: &str,
    idx: usize,
    timestamp: &str,
) -> Result<f64, SkydopError> {
    let raw = cell(sampled, column, idx, timestamp)?;
    if raw == "0" {
        return Err(SkydopError::InvalidTelemetry {
            timestamp: timestamp.to_string(),
            column: column.to_string(),
            value: raw.to_string(),
        });
    }
    parse_numeric(sampled, column, idx, timestamp)
}

#[cfg(test)]
mod telemetry_test {
    use super::*;

    const SAMPLE: &str = "\
latitude,longitude,altitude_above_sea_level_m,datetime_utc,satellites_in_view,battery
61.4498,23.8595,150.0,2021-04-05 10:00:00,12,99
61.4499,23.8596,151.5,2021-04-05 10:00:01,13,98
61.4500,23.8597,153.0,2021-04-05 10:00:02,12,97
";

    fn sample_log() -> (tempfile::TempDir, FlightLog) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flight.csv");
        std::fs::write(&path, SAMPLE).unwrap();
        let mut log = FlightLog::new(path.to_str().unwrap());
        log.load().unwrap();
        (dir, log)
    }

    #[test]
    fn test_load_and_row_count() {
        let (_dir, log) = sample_log();
        assert!(log.is_loaded());
        assert_eq!(log.row_count(), 3);
        assert_eq!(log.headers().len(), 6);
    }

    #[test]
    fn test_first_timestamp_normalized() {
        let (_dir, log) = sample_log();
        assert_eq!(log.first_timestamp().unwrap(), "2021-04-05T10:00:00");
    }

    #[test]
    fn test_columns_present() {
        let (_dir, log) = sample_log();
        let cols = log.columns(&[CHN_LAT, CHN_SAT]).unwrap();
        assert_eq!(cols[CHN_LAT], vec!["61.4498", "61.4499", "61.4500"]);
        assert_eq!(cols[CHN_SAT], vec!["12", "13", "12"]);
    }

    #[test]
    fn test_columns_missing_is_descriptive() {
        let (_dir, log) = sample_log();
        let err = log.columns(&["no_such_column"]).unwrap_err();
        match err {
            SkydopError::MissingColumn(name) => assert_eq!(name, "no_such_column"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_epoch_rows() {
        let (_dir, log) = sample_log();
        let sampled = log
            .columns(&[CHN_UTC, CHN_LAT, CHN_LON, CHN_ALT, CHN_SAT])
            .unwrap();
        let rows = epoch_rows(&sampled, true).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].timestamp, "2021-04-05 10:00:00");
        assert!((rows[1].alt - 151.5).abs() < 1e-12);
        assert_eq!(rows[2].reported_sats, Some(12));
    }

    #[test]
    fn test_epoch_rows_sentinel_is_fatal() {
        let mut sampled = ColumnTable::default();
        sampled.insert(CHN_UTC.into(), vec!["2021-04-05T10:00:00".into()]);
        sampled.insert(CHN_LAT.into(), vec!["0".into()]);
        sampled.insert(CHN_LON.into(), vec!["23.8595".into()]);
        sampled.insert(CHN_ALT.into(), vec!["150.0".into()]);

        let err = epoch_rows(&sampled, false).unwrap_err();
        match err {
            SkydopError::InvalidTelemetry { column, value, .. } => {
                assert_eq!(column, CHN_LAT);
                assert_eq!(value, "0");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_epoch_rows_dropout_misalignment_is_fatal() {
        // The sampler drops sentinel coordinate values but keeps the other
        // columns of the row, so a dropout shows up as a short column.
        let mut sampled = ColumnTable::default();
        sampled.insert(
            CHN_UTC.into(),
            vec!["2021-04-05T10:00:00".into(), "2021-04-05T10:00:05".into()],
        );
        sampled.insert(CHN_LAT.into(), vec!["61.4498".into()]);
        sampled.insert(CHN_LON.into(), vec!["23.8595".into()]);
        sampled.insert(CHN_ALT.into(), vec!["150.0".into(), "151.0".into()]);

        let err = epoch_rows(&sampled, false).unwrap_err();
        match err {
            SkydopError::InvalidTelemetry { timestamp, .. } => {
                assert_eq!(timestamp, "2021-04-05T10:00:05");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
