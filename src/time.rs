use hifitime::Epoch;
use std::str::FromStr;

use crate::skydop_errors::SkydopError;

/// Normalize a telemetry timestamp to ISO-8601 `T` separation.
///
/// Flight controllers commonly log `YYYY-MM-DD HH:MM:SS`; the pipeline keys
/// everything by the normalized form so that catalog lookups are exact.
pub fn normalize_timestamp(ts: &str) -> String {
    let trimmed = ts.trim();
    match trimmed.split_once(' ') {
        Some((date, time)) => format!("{date}T{time}"),
        None => trimmed.to_string(),
    }
}

/// Parse an ISO-8601 timestamp into a UTC [`Epoch`].
///
/// Argument
/// --------
/// * `ts`: a timestamp string, `T`- or space-separated
///
/// Return
/// ------
/// * The parsed [`Epoch`], or [`SkydopError::InvalidTimestamp`] with the
///   offending string embedded
pub fn parse_timestamp(ts: &str) -> Result<Epoch, SkydopError> {
    Epoch::from_str(&normalize_timestamp(ts))
        .map_err(|e| SkydopError::InvalidTimestamp(format!("'{ts}': {e}")))
}
