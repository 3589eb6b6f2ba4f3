use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use nalgebra::Vector3;
use tempfile::TempDir;

use skydop::constants::{Constellation, Prn, SatelliteCatalog};
use skydop::dop::DopCalc;
use skydop::ephemeris::FixedCatalog;
use skydop::pipeline::{DopPipeline, PipelineOptions, RunState};
use skydop::skydop_errors::SkydopError;
use skydop::visibility::FovModel;

const EPOCHS: [&str; 3] = [
    "2021-04-05T10:00:00",
    "2021-04-05T10:00:05",
    "2021-04-05T10:00:10",
];

/// Five GPS satellites on the nominal orbit sphere, one at the zenith of a
/// receiver at Tampere (61.4498°N, 23.8595°E, 150 m) and four at 45°
/// elevation on the cardinal azimuths.
fn zenith_constellation() -> Vec<(&'static str, Vector3<f64>)> {
    vec![
        ("G01", Vector3::new(11669200.09109261, 5161212.548127067, 23294318.068299398)),
        ("G07", Vector3::new(-2765191.3164080563, -1223026.4293018028, 26387336.41989829)),
        ("G11", Vector3::new(3329388.9417400137, 18233462.07260499, 19023396.91331426)),
        ("G17", Vector3::new(21824588.06224668, 9652875.680018006, 11659457.406730235)),
        ("G23", Vector3::new(15730007.804098612, -9803612.821888786, 19023396.91331426)),
    ]
}

fn catalog_with(prns: &[&str]) -> SatelliteCatalog {
    let mut catalog = SatelliteCatalog::default();
    for ts in EPOCHS {
        let sats: BTreeMap<Prn, Vector3<f64>> = zenith_constellation()
            .into_iter()
            .filter(|(prn, _)| prns.contains(prn))
            .map(|(prn, pos)| (prn.to_string(), pos))
            .collect();
        catalog.insert(ts.to_string(), sats);
    }
    catalog
}

/// An 11 row, 1 Hz flight log; resampling at 5 s keeps three epochs.
fn write_flight_log(dir: &TempDir, bad_latitude_row: Option<usize>) -> Utf8PathBuf {
    let mut content = String::from(
        "latitude,longitude,altitude_above_sea_level_m,datetime_utc,satellites_in_view,battery\n",
    );
    for s in 0..11 {
        let lat = match bad_latitude_row {
            Some(bad) if bad == s => "0",
            _ => "61.4498",
        };
        content.push_str(&format!(
            "{lat},23.8595,150.0,2021-04-05 10:00:{s:02},5,{}\n",
            99 - s
        ));
    }

    let path = Utf8PathBuf::from_path_buf(dir.path().join("flight.csv")).unwrap();
    std::fs::write(&path, content).unwrap();
    path
}

fn pipeline_with(
    input: Utf8PathBuf,
    catalog: SatelliteCatalog,
    model: FovModel,
) -> DopPipeline {
    let mut pipeline = DopPipeline::new(
        PipelineOptions::new(input),
        Box::new(FixedCatalog::new(catalog)),
    );
    pipeline.add_model(model);
    pipeline
}

fn read_output(path: &Utf8PathBuf) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path.as_std_path()).unwrap();
    let headers = reader.headers().unwrap().iter().map(str::to_string).collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    (headers, rows)
}

#[test]
fn test_end_to_end_constant_mask_gdop() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_flight_log(&dir, None);

    let mut model = FovModel::constant_mask("constm", 0.0, vec![Constellation::Gps]).unwrap();
    model.add_calc(DopCalc::Unweighted(Constellation::Gps));

    let mut pipeline = pipeline_with(
        input,
        catalog_with(&["G01", "G07", "G11", "G17", "G23"]),
        model,
    );
    pipeline.process().unwrap();
    assert_eq!(pipeline.state(), RunState::Written);

    let (headers, rows) = read_output(&pipeline.output_path());
    assert_eq!(
        headers,
        vec![
            "datetime_utc",
            "latitude",
            "longitude",
            "altitude_above_sea_level_m",
            "HDOP_constm_GPS",
            "VDOP_constm_GPS",
            "TDOP_constm_GPS",
            "GDOP_constm_GPS",
            "sats_FOV_constm_GPS",
        ]
    );
    assert_eq!(rows.len(), 3);

    for (row, epoch) in rows.iter().zip(EPOCHS) {
        assert_eq!(row[0], epoch);
        // All five symmetric satellites are above a 0 degree mask; GDOP for
        // this geometry is 5.0313 from an independent computation.
        assert_eq!(row[8], "5");
        let gdop: f64 = row[7].parse().unwrap();
        assert!((gdop - 5.03127304953573).abs() / 5.03127304953573 < 1e-9);
    }
}

#[test]
fn test_repeated_process_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_flight_log(&dir, None);

    let mut model = FovModel::constant_mask("constm", 0.0, vec![Constellation::Gps]).unwrap();
    model.add_calc(DopCalc::Unweighted(Constellation::Gps));

    let mut pipeline = pipeline_with(
        input,
        catalog_with(&["G01", "G07", "G11", "G17", "G23"]),
        model,
    );
    pipeline.process().unwrap();
    let first = read_output(&pipeline.output_path());

    pipeline.process().unwrap();
    let second = read_output(&pipeline.output_path());
    assert_eq!(first, second);

    pipeline.reset();
    assert_eq!(pipeline.state(), RunState::Configured);
}

#[test]
fn test_view_match_sentinel_latitude_aborts_without_output() {
    let dir = tempfile::tempdir().unwrap();
    // The bad row lands on the second retained epoch (t = 5 s).
    let input = write_flight_log(&dir, Some(5));

    let mut model = FovModel::view_match("match", vec![Constellation::Gps]).unwrap();
    model.add_calc(DopCalc::Unweighted(Constellation::Gps));

    let mut pipeline = pipeline_with(
        input,
        catalog_with(&["G01", "G07", "G11", "G17", "G23"]),
        model,
    );

    let err = pipeline.process().unwrap_err();
    assert!(matches!(err, SkydopError::InvalidTelemetry { .. }));
    assert!(!pipeline.output_path().exists());
}

#[test]
fn test_too_few_satellites_aborts_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_flight_log(&dir, None);

    let mut model = FovModel::constant_mask("constm", 0.0, vec![Constellation::Gps]).unwrap();
    model.add_calc(DopCalc::Unweighted(Constellation::Gps));

    let mut pipeline = pipeline_with(input, catalog_with(&["G01", "G07", "G11"]), model);

    let err = pipeline.process().unwrap_err();
    match err {
        SkydopError::NoSatellitesInView { count, .. } => assert_eq!(count, 3),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!pipeline.output_path().exists());
}

#[test]
fn test_two_models_share_one_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_flight_log(&dir, None);

    let mut constm = FovModel::constant_mask("constm", 0.0, vec![Constellation::Gps]).unwrap();
    constm.add_calc(DopCalc::Unweighted(Constellation::Gps));
    let mut vm = FovModel::view_match("match", vec![Constellation::Gps]).unwrap();
    vm.add_calc(DopCalc::Unweighted(Constellation::Gps));

    let mut pipeline = pipeline_with(
        input,
        catalog_with(&["G01", "G07", "G11", "G17", "G23"]),
        constm,
    );
    pipeline.add_model(vm);
    pipeline.process().unwrap();

    let (headers, rows) = read_output(&pipeline.output_path());
    // ViewMatch adds the reported-count column to the telemetry block, and
    // both models contribute a full DOP column group.
    assert!(headers.contains(&"satellites_in_view".to_string()));
    assert!(headers.contains(&"GDOP_constm_GPS".to_string()));
    assert!(headers.contains(&"GDOP_match_GPS".to_string()));

    // The log reports 5 satellites and 5 are catalogued, so both models
    // keep the same set and agree on every DOP figure.
    let idx_a = headers.iter().position(|h| h == "GDOP_constm_GPS").unwrap();
    let idx_b = headers.iter().position(|h| h == "GDOP_match_GPS").unwrap();
    for row in &rows {
        assert_eq!(row[idx_a], row[idx_b]);
    }
}

#[test]
fn test_explicit_output_path_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_flight_log(&dir, None);
    let output = Utf8PathBuf::from_path_buf(dir.path().join("custom_name.csv")).unwrap();

    let mut model = FovModel::constant_mask("constm", 0.0, vec![Constellation::Gps]).unwrap();
    model.add_calc(DopCalc::Unweighted(Constellation::Gps));

    let mut opts = PipelineOptions::new(input);
    opts.output = Some(output.clone());

    let mut pipeline = DopPipeline::new(
        opts,
        Box::new(FixedCatalog::new(catalog_with(&[
            "G01", "G07", "G11", "G17", "G23",
        ]))),
    );
    pipeline.add_model(model);
    pipeline.process().unwrap();

    assert!(output.exists());
}
