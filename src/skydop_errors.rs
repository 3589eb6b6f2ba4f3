use thiserror::Error;

/// Crate-wide error type.
///
/// All fatal conditions of the pipeline surface here with enough context
/// (component, timestamp, offending value) to diagnose a failed run without
/// re-running at a higher verbosity. No variant is retried internally;
/// retry/backoff belongs to the network layer of the ephemeris provider.
#[derive(Error, Debug)]
pub enum SkydopError {
    #[error("Pipeline configuration error: {0}")]
    ConfigurationError(String),

    #[error("No calculators attached to visibility model '{0}'")]
    NoCalculationsQueued(String),

    #[error("Invalid telemetry at {timestamp}: column '{column}' has value '{value}'")]
    InvalidTelemetry {
        timestamp: String,
        column: String,
        value: String,
    },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Satellite catalog error: {0}")]
    CatalogError(String),

    #[error("Constellation not supported for satellite '{0}'")]
    UnsupportedConstellation(String),

    #[error("Fewer than 4 satellites in view at {timestamp} ({count} available)")]
    NoSatellitesInView { timestamp: String, count: usize },

    #[error("Geometry error at {timestamp}: {reason}")]
    GeometryError { timestamp: String, reason: String },

    #[error("Column '{0}' does not exist in the telemetry file")]
    MissingColumn(String),

    #[error("RINEX navigation parsing error: {0}")]
    RinexParse(String),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("HTTP ureq error: {0}")]
    UreqHttpError(#[from] ureq::Error),
}
