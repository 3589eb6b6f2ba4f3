//! Run orchestration.
//!
//! [`DopPipeline`] sequences a whole flight analysis: load the telemetry,
//! resample it to a fixed period, fetch the satellite catalog for exactly
//! the retained timestamps, run every attached visibility model and its
//! calculator queue, and write the merged table to a CSV file.
//!
//! The run is strictly sequential and tracked by an explicit [`RunState`]:
//! no step may run before its predecessor has completed, and `Configured`
//! is memoized so repeated [`process`](DopPipeline::process) calls skip the
//! (potentially network-bound) provider setup unless a re-setup is forced.

use camino::Utf8PathBuf;
use hifitime::Duration;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::{
    ColumnTable, Constellation, SatelliteCatalog, TimestampKey, CHN_LAT, CHN_LON, CHN_UTC,
};
use crate::ephemeris::SatellitePositions;
use crate::skydop_errors::SkydopError;
use crate::telemetry::FlightLog;
use crate::time::{normalize_timestamp, parse_timestamp};
use crate::visibility::FovModel;

fn default_sample_period() -> f64 {
    5.0
}

/// User-facing pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Telemetry CSV file of the flight.
    pub input: Utf8PathBuf,
    /// Output file; defaults to `<input stem>_dop.csv` next to the input.
    pub output: Option<Utf8PathBuf>,
    /// Resampling period in seconds.
    #[serde(default = "default_sample_period")]
    pub sample_period: f64,
}

impl PipelineOptions {
    pub fn new(input: impl Into<Utf8PathBuf>) -> Self {
        PipelineOptions {
            input: input.into(),
            output: None,
            sample_period: default_sample_period(),
        }
    }
}

/// Progress of one pipeline run. States advance strictly left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunState {
    Uninitialized,
    Configured,
    Sampled,
    CatalogLoaded,
    Computed,
    Written,
}

/// The flight-analysis orchestrator.
pub struct DopPipeline {
    opts: PipelineOptions,
    telemetry: FlightLog,
    provider: Box<dyn SatellitePositions>,
    models: Vec<FovModel>,
    state: RunState,
    /// Union of the columns every model and calculator reads, first-seen order.
    required_vars: Vec<String>,
    sampled: ColumnTable,
    sampled_times: Vec<TimestampKey>,
    catalog: SatelliteCatalog,
    /// Merged output table in final column order.
    output_columns: Vec<(String, Vec<String>)>,
}

impl DopPipeline {
    pub fn new(opts: PipelineOptions, provider: Box<dyn SatellitePositions>) -> Self {
        let telemetry = FlightLog::new(opts.input.clone());
        DopPipeline {
            opts,
            telemetry,
            provider,
            models: Vec::new(),
            state: RunState::Uninitialized,
            required_vars: Vec::new(),
            sampled: ColumnTable::default(),
            sampled_times: Vec::new(),
            catalog: SatelliteCatalog::default(),
            output_columns: Vec::new(),
        }
    }

    /// Register a visibility model. A model whose signature is already
    /// registered is silently ignored.
    pub fn add_model(&mut self, model: FovModel) {
        if self
            .models
            .iter()
            .any(|m| m.signature() == model.signature())
        {
            return;
        }
        self.models.push(model);
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Resolved output path.
    pub fn output_path(&self) -> Utf8PathBuf {
        match &self.opts.output {
            Some(path) => path.clone(),
            None => {
                let stem = self.opts.input.file_stem().unwrap_or("flight");
                self.opts.input.with_file_name(format!("{stem}_dop.csv"))
            }
        }
    }

    /// Validate the configuration, aggregate the required telemetry columns
    /// and prepare the collaborators.
    ///
    /// Telemetry loading is idempotent; the provider is set up on the first
    /// run only, unless `force` is given.
    pub fn setup(&mut self, force: bool) -> Result<(), SkydopError> {
        if self.models.is_empty() {
            return Err(SkydopError::ConfigurationError(
                "no visibility model registered; use add_model() first".to_string(),
            ));
        }
        // An empty calculator queue would only surface at compute();
        // checked up front, before any sampling or download work.
        for model in &self.models {
            if model.calcs().is_empty() {
                return Err(SkydopError::NoCalculationsQueued(
                    model.signature().to_string(),
                ));
            }
        }

        self.required_vars.clear();
        for var in self.models.iter().flat_map(|m| {
            m.required_vars()
                .into_iter()
                .chain(m.calcs().iter().flat_map(|c| c.required_vars()))
        }) {
            if !self.required_vars.iter().any(|v| v == var) {
                self.required_vars.push(var.to_string());
            }
        }

        let cstls: Vec<Constellation> = self
            .models
            .iter()
            .flat_map(|m| m.constellations().iter().copied())
            .sorted()
            .dedup()
            .collect();

        self.telemetry.load()?;

        if force || !self.provider.is_setup() {
            let first = self.telemetry.first_timestamp()?;
            debug!(%first, "setting up satellite position provider");
            self.provider.setup(&first, &cstls)?;
        }

        if self.state < RunState::Configured {
            self.state = RunState::Configured;
        }
        Ok(())
    }

    /// Resample the telemetry to the configured fixed period.
    pub fn sample(&mut self) -> Result<(), SkydopError> {
        self.require_state(RunState::Configured, "sample")?;

        let all_pos = self.telemetry.columns(&self.required_vars)?;
        let first = self.telemetry.first_timestamp()?;
        let period = Duration::from_seconds(self.opts.sample_period);

        self.sampled = resample_columns(&all_pos, &first, period)?;
        self.sampled_times = self
            .sampled
            .get(CHN_UTC)
            .cloned()
            .ok_or_else(|| SkydopError::MissingColumn(CHN_UTC.to_string()))?;

        info!(
            rows = self.sampled_times.len(),
            period_s = self.opts.sample_period,
            "telemetry resampled"
        );
        self.state = RunState::Sampled;
        Ok(())
    }

    /// Fetch the satellite catalog for exactly the sampled timestamps.
    pub fn acquire_catalog(&mut self) -> Result<(), SkydopError> {
        self.require_state(RunState::Sampled, "acquire_catalog")?;

        let catalog = self.provider.positions(&self.sampled_times)?;
        if catalog.values().all(|sats| sats.is_empty()) {
            return Err(SkydopError::CatalogError(
                "satellite position provider returned no satellites".to_string(),
            ));
        }

        info!(timestamps = catalog.len(), "satellite catalog acquired");
        self.catalog = catalog;
        self.state = RunState::CatalogLoaded;
        Ok(())
    }

    /// Run every model and its calculator queue, merging all series into the
    /// output table.
    pub fn compute(&mut self) -> Result<(), SkydopError> {
        self.require_state(RunState::CatalogLoaded, "compute")?;

        self.output_columns.clear();
        for var in &self.required_vars {
            if let Some(col) = self.sampled.get(var) {
                self.output_columns.push((var.clone(), col.clone()));
            }
        }

        for model in &self.models {
            info!(model = model.signature(), "computing satellites in view");
            let visible = model.get_sats(&self.sampled, &self.catalog)?;

            for calc in model.calcs() {
                info!(calc = %calc, model = model.signature(), "computing DOP series");
                let series = calc.compute(model.signature(), &self.sampled, &visible)?;
                for (name, values) in series.columns {
                    let rendered = values.iter().map(f64::to_string).collect();
                    self.output_columns.push((name, rendered));
                }
            }
        }

        self.state = RunState::Computed;
        Ok(())
    }

    /// Write the merged table as CSV.
    ///
    /// Columns shortened by the sampler's dropout exclusion are padded with
    /// empty cells so every row stays aligned.
    pub fn write(&mut self) -> Result<(), SkydopError> {
        self.require_state(RunState::Computed, "write")?;

        let path = self.output_path();
        let mut writer = csv::Writer::from_path(path.as_std_path())?;

        writer.write_record(self.output_columns.iter().map(|(name, _)| name))?;

        let row_count = self
            .output_columns
            .iter()
            .map(|(_, col)| col.len())
            .max()
            .unwrap_or(0);
        for row in 0..row_count {
            writer.write_record(
                self.output_columns
                    .iter()
                    .map(|(_, col)| col.get(row).map(String::as_str).unwrap_or("")),
            )?;
        }
        writer.flush()?;

        info!(file = %path, rows = row_count, "output written");
        self.state = RunState::Written;
        Ok(())
    }

    /// Run the whole sequence: setup, sample, acquire, compute, write.
    pub fn process(&mut self) -> Result<(), SkydopError> {
        self.reset();
        self.setup(false)?;
        self.sample()?;
        self.acquire_catalog()?;
        self.compute()?;
        self.write()?;
        Ok(())
    }

    /// Discard per-run data so a new computation can start. The configured
    /// state (loaded telemetry, provider setup) is kept.
    pub fn reset(&mut self) {
        self.sampled = ColumnTable::default();
        self.sampled_times.clear();
        self.catalog = SatelliteCatalog::default();
        self.output_columns.clear();
        if self.state > RunState::Configured {
            self.state = RunState::Configured;
        }
    }

    fn require_state(&self, at_least: RunState, operation: &str) -> Result<(), SkydopError> {
        if self.state < at_least {
            return Err(SkydopError::ConfigurationError(format!(
                "{operation}() requires the {at_least:?} state, pipeline is {:?}",
                self.state
            )));
        }
        Ok(())
    }
}

/// Fixed-period resampling of a column table.
///
/// The walking pointer starts one period before the first timestamp and
/// advances by exactly one period per retained row, so irregular input
/// cadence cannot accumulate drift. A telemetry gap longer than the period
/// leaves the pointer behind the input clock, and the rows after the gap
/// are retained back to back until it catches up; retained epochs are
/// spaced by at least the period only over gap-free input.
/// Latitude/longitude cells holding the
/// `"0"` dropout sentinel are excluded from their column for that row; the
/// row's other columns are still emitted.
///
/// Arguments
/// ---------
/// * `all_pos`: the full-rate column table (must contain the UTC column)
/// * `first_timestamp`: first timestamp of the flight, normalized
/// * `period`: the sampling period
///
/// Return
/// ------
/// * The resampled table, UTC values normalized to `T` separation
pub(crate) fn resample_columns(
    all_pos: &ColumnTable,
    first_timestamp: &str,
    period: Duration,
) -> Result<ColumnTable, SkydopError> {
    let times = all_pos
        .get(CHN_UTC)
        .ok_or_else(|| SkydopError::MissingColumn(CHN_UTC.to_string()))?;

    let mut sampled = ColumnTable::default();
    for name in all_pos.keys() {
        sampled.entry(name.clone()).or_default();
    }

    let mut last_saved = parse_timestamp(first_timestamp)? - period;
    for (i, raw_ts) in times.iter().enumerate() {
        let normalized = normalize_timestamp(raw_ts);
        let t = parse_timestamp(&normalized)?;
        if t - last_saved < period {
            continue;
        }

        for (name, col) in all_pos {
            let value = col.get(i).map(String::as_str).unwrap_or("");
            if (name == CHN_LAT || name == CHN_LON) && value == "0" {
                continue;
            }
            let cell = if name == CHN_UTC {
                normalized.clone()
            } else {
                value.to_string()
            };
            // Present by construction, all_pos keys seed sampled.
            if let Some(out) = sampled.get_mut(name) {
                out.push(cell);
            }
        }

        last_saved += period;
    }
    Ok(sampled)
}
