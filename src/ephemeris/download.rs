//! Broadcast-navigation file acquisition.
//!
//! [`BrdcProvider`] implements [`SatellitePositions`] on top of the daily
//! merged multi-GNSS broadcast files published by the IGS data centers. The
//! file for the flight's date is downloaded once into a local cache
//! directory and parsed lazily; subsequent runs reuse the cached copy.

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use hifitime::Epoch;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use tracing::{debug, info};
use ureq::Agent;

use crate::constants::{Constellation, SatelliteCatalog, TimestampKey};
use crate::ephemeris::nav_parser::NavData;
use crate::ephemeris::SatellitePositions;
use crate::skydop_errors::SkydopError;
use crate::time::parse_timestamp;

/// URL template for the daily merged broadcast file. `{yyyy}` and `{ddd}`
/// are replaced by the four-digit year and the zero-padded day of year.
pub const DEFAULT_URL_TEMPLATE: &str =
    "https://igs.bkg.bund.de/root_ftp/IGS/BRDC/{yyyy}/{ddd}/BRDC00WRD_R_{yyyy}{ddd}0000_01D_MN.rnx";

/// A broadcast block older than this relative to the requested epoch is
/// considered expired and its satellite is dropped for that timestamp.
const MAX_EPHEMERIS_AGE_S: f64 = 4.0 * 3600.0;

/// Acquisition options for [`BrdcProvider`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrdcOptions {
    /// Where daily files come from; see [`DEFAULT_URL_TEMPLATE`].
    pub url_template: String,
    /// Cache directory override; defaults to the platform cache dir.
    pub cache_dir: Option<Utf8PathBuf>,
    /// Use this local navigation file instead of downloading.
    pub local_file: Option<Utf8PathBuf>,
}

impl Default for BrdcOptions {
    fn default() -> Self {
        BrdcOptions {
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            cache_dir: None,
            local_file: None,
        }
    }
}

/// Downloading, caching [`SatellitePositions`] provider.
///
/// Serves the Keplerian constellations only (GPS, Galileo, BeiDou): GLONASS
/// broadcast records are state vectors and are skipped by the parser, so a
/// setup requesting [`Constellation::Glonass`] fails with a catalog error.
/// Use [`FixedCatalog`](crate::ephemeris::FixedCatalog) for precomputed
/// GLONASS positions.
pub struct BrdcProvider {
    opts: BrdcOptions,
    agent: Agent,
    nav: OnceCell<NavData>,
    constellations: Vec<Constellation>,
}

impl BrdcProvider {
    pub fn new(opts: BrdcOptions) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(std::time::Duration::from_secs(60)))
            .build();

        BrdcProvider {
            opts,
            agent: config.into(),
            nav: OnceCell::new(),
            constellations: Vec::new(),
        }
    }

    /// Resolve the navigation file for `date`, downloading it if the cache
    /// has no copy yet.
    fn ensure_file(&self, date: Epoch) -> Result<Utf8PathBuf, SkydopError> {
        if let Some(path) = &self.opts.local_file {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(SkydopError::CatalogError(format!(
                "navigation file not found at '{path}'"
            )));
        }

        let (yyyy, ddd) = year_and_day_of_year(date)?;
        let cache_dir = match &self.opts.cache_dir {
            Some(dir) => dir.clone(),
            None => {
                let base = BaseDirs::new().ok_or_else(|| {
                    SkydopError::CatalogError("cannot locate a cache directory".to_string())
                })?;
                let cache = Utf8Path::from_path(base.cache_dir()).ok_or_else(|| {
                    SkydopError::CatalogError("cache directory path is not UTF-8".to_string())
                })?;
                cache.join("skydop").join("brdc")
            }
        };
        fs::create_dir_all(&cache_dir)?;

        let local_file = cache_dir.join(format!("brdc_{yyyy}{ddd:03}.rnx"));
        if local_file.exists() {
            debug!(file = %local_file, "using cached navigation file");
            return Ok(local_file);
        }

        let url = self
            .opts
            .url_template
            .replace("{yyyy}", &yyyy.to_string())
            .replace("{ddd}", &format!("{ddd:03}"));

        info!(url = %url, "downloading broadcast navigation file");
        let body = self
            .agent
            .get(url.as_str())
            .call()?
            .body_mut()
            .read_to_string()?;
        fs::write(&local_file, &body)?;
        info!(file = %local_file, "navigation file cached");

        Ok(local_file)
    }
}

impl SatellitePositions for BrdcProvider {
    fn setup(
        &mut self,
        first_timestamp: &str,
        constellations: &[Constellation],
    ) -> Result<(), SkydopError> {
        if self.nav.get().is_some() {
            return Ok(());
        }

        let date = parse_timestamp(first_timestamp)?;
        let path = self.ensure_file(date)?;
        let content = fs::read_to_string(path.as_std_path())?;
        let nav = NavData::parse(&content)?;

        if nav.is_empty() {
            return Err(SkydopError::CatalogError(format!(
                "navigation file '{path}' contains no keplerian records"
            )));
        }

        let present = nav.constellations();
        for cstl in constellations {
            if !present.contains(&cstl.initial()) {
                return Err(SkydopError::CatalogError(format!(
                    "no ephemeris for constellation {cstl} in '{path}'"
                )));
            }
        }

        self.constellations = constellations.to_vec();
        // Cannot already be set: guarded by the early return above.
        let _ = self.nav.set(nav);
        Ok(())
    }

    fn is_setup(&self) -> bool {
        self.nav.get().is_some()
    }

    fn positions(&self, timestamps: &[TimestampKey]) -> Result<SatelliteCatalog, SkydopError> {
        let nav = self.nav.get().ok_or_else(|| {
            SkydopError::ConfigurationError("satellite provider has not been set up".to_string())
        })?;

        let mut catalog = SatelliteCatalog::default();
        for ts in timestamps {
            let epoch = parse_timestamp(ts)?;
            let mut sats = BTreeMap::new();

            for prn in nav.satellites() {
                let in_scope = prn
                    .chars()
                    .next()
                    .and_then(Constellation::from_initial)
                    .is_some_and(|c| self.constellations.contains(&c));
                if !in_scope {
                    continue;
                }

                if let Some(eph) = nav.best_ephemeris(prn, epoch) {
                    if (eph.toc - epoch).abs().to_seconds() <= MAX_EPHEMERIS_AGE_S {
                        sats.insert(prn.clone(), eph.position_at(epoch));
                    }
                }
            }

            if sats.is_empty() {
                return Err(SkydopError::CatalogError(format!(
                    "no usable ephemeris around timestamp '{ts}'"
                )));
            }
            catalog.insert(ts.clone(), sats);
        }
        Ok(catalog)
    }
}

/// Four-digit year and 1-based day of year of `date` (UTC).
fn year_and_day_of_year(date: Epoch) -> Result<(i32, u32), SkydopError> {
    let (year, ..) = date.to_gregorian_utc();
    let jan1 = Epoch::maybe_from_gregorian_utc(year, 1, 1, 0, 0, 0, 0)
        .map_err(|e| SkydopError::InvalidTimestamp(format!("{e}")))?;
    let ddd = (date - jan1).to_unit(hifitime::Unit::Day).floor() as u32 + 1;
    Ok((year, ddd))
}

#[cfg(test)]
mod download_test {
    use super::*;
    use std::str::FromStr;

    const NAV_FIXTURE: &str = "\
     3.04           N: GNSS NAV DATA    M: MIXED            RINEX VERSION / TYPE
                                                            END OF HEADER
G05 2021 04 05 10 00 00-1.234500000000D-04-2.500000000000D-12 0.000000000000D+00
     6.100000000000D+01 2.343750000000D+01 4.469828000000D-09-9.337000000000D-01
     1.285000000000D-06 5.734560000000D-03 7.387250000000D-06 5.153647000000D+03
     1.224000000000D+05 5.215410000000D-08 2.776700000000D+00-1.452800000000D-07
     9.612200000000D-01 2.669687500000D+02 7.216500000000D-01-8.053500000000D-09
    -4.357300000000D-10 1.000000000000D+00 2.152000000000D+03 0.000000000000D+00
     2.000000000000D+00 0.000000000000D+00 4.656000000000D-09 6.100000000000D+01
     1.152180000000D+05 4.000000000000D+00
R03 2021 04 05 10 15 00 1.800000000000D-05 0.000000000000D+00 9.000000000000D+04
     1.100000000000D+07 2.200000000000D+00 0.000000000000D+00 0.000000000000D+00
    -5.000000000000D+06 1.100000000000D+00 0.000000000000D+00 5.000000000000D+00
     2.100000000000D+07-3.300000000000D+00-2.700000000000D-09 0.000000000000D+00
";

    #[test]
    fn test_year_and_day_of_year() {
        let d = Epoch::from_str("2021-04-05T10:00:00").unwrap();
        assert_eq!(year_and_day_of_year(d).unwrap(), (2021, 95));

        let jan1 = Epoch::from_str("2021-01-01T00:00:01").unwrap();
        assert_eq!(year_and_day_of_year(jan1).unwrap(), (2021, 1));
    }

    #[test]
    fn test_missing_local_file_is_catalog_error() {
        let provider = BrdcProvider::new(BrdcOptions {
            local_file: Some(Utf8PathBuf::from("/nonexistent/brdc.rnx")),
            ..BrdcOptions::default()
        });
        let date = Epoch::from_str("2021-04-05T10:00:00").unwrap();
        let err = provider.ensure_file(date).unwrap_err();
        assert!(matches!(err, SkydopError::CatalogError(_)));
    }

    #[test]
    fn test_glonass_request_fails_setup() {
        // GLONASS broadcast records are state vectors; the parser skips
        // them, so the file has no 'R' ephemeris to offer.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brdc.rnx");
        std::fs::write(&path, NAV_FIXTURE).unwrap();

        let mut provider = BrdcProvider::new(BrdcOptions {
            local_file: Some(Utf8PathBuf::from(path.to_str().unwrap())),
            ..BrdcOptions::default()
        });

        let err = provider
            .setup(
                "2021-04-05T10:00:00",
                &[Constellation::Gps, Constellation::Glonass],
            )
            .unwrap_err();
        match err {
            SkydopError::CatalogError(msg) => assert!(msg.contains("GLO")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_positions_before_setup_is_configuration_error() {
        let provider = BrdcProvider::new(BrdcOptions::default());
        let err = provider
            .positions(&["2021-04-05T10:00:00".to_string()])
            .unwrap_err();
        assert!(matches!(err, SkydopError::ConfigurationError(_)));
    }
}
