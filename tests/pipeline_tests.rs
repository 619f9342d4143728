// tests/pipeline_tests.rs
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};

use approx::assert_abs_diff_eq;
use chrono::{NaiveDate, TimeZone, Utc};
use tempfile::tempdir;

use raster_change::config::{AnalysisConfig, RegionConfig};
use raster_change::geometry::Region;
use raster_change::io::reader::read_band_native;
use raster_change::io::writer::{write_raster_native, RasterEncoding};
use raster_change::io::{
    Artifact, ArtifactPayload, ArtifactSink, CatalogSource, DirectorySink, ExportOptions,
    MemorySink, MemorySource, StoredArtifact,
};
use raster_change::processing::{
    IndexKind, Pipeline, Product, RunReport, RunSpec, Schedule, Stage, Stretch,
    TemporalCompositor,
};
use raster_change::raster::{BandBuffer, GridSpec, MultiBandRaster, RasterScene, SpectralBand, NODATA};
use raster_change::temporal::{Epoch, EventWindows};
use raster_change::{Error, Result};

const WIDTH: usize = 8;
const HEIGHT: usize = 4;

fn event_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()
}

/// 8x4 unit-pixel grid covering x 0..8, y 0..4
fn scene_grid() -> GridSpec {
    GridSpec::north_up(WIDTH, HEIGHT, 0.0, HEIGHT as f64, 1.0, 1.0)
}

/// Constant-valued scene; `reflectance` lists (band, value) on the 0..10000 scale
fn uniform_scene(id: &str, day: u32, cloud_cover: f32, reflectance: &[(SpectralBand, f32)]) -> RasterScene {
    let mut raster = MultiBandRaster::new(scene_grid());
    for (band, value) in reflectance {
        raster
            .insert_band(*band, BandBuffer::filled((WIDTH, HEIGHT), *value))
            .unwrap();
    }
    let acquired = Utc.with_ymd_and_hms(2025, 1, day, 18, 40, 0).unwrap();
    RasterScene::new(id, acquired, cloud_cover, raster)
}

fn pre_fire(nir: f32) -> Vec<(SpectralBand, f32)> {
    vec![
        (SpectralBand::Blue, 600.0),
        (SpectralBand::Green, 900.0),
        (SpectralBand::Red, 1000.0),
        (SpectralBand::Nir, nir),
        (SpectralBand::Swir1, 2000.0),
        (SpectralBand::Swir2, 1000.0),
    ]
}

fn post_fire(nir: f32) -> Vec<(SpectralBand, f32)> {
    vec![
        (SpectralBand::Blue, 700.0),
        (SpectralBand::Green, 800.0),
        (SpectralBand::Red, 1500.0),
        (SpectralBand::Nir, nir),
        (SpectralBand::Swir1, 3500.0),
        (SpectralBand::Swir2, 3000.0),
    ]
}

/// Pre-event scenes composite to NIR 5000; post-event to NIR 2000.
/// One cloudy scene per epoch must be ignored.
fn fire_source() -> MemorySource {
    MemorySource::new(vec![
        uniform_scene("S2A_20250102", 2, 3.0, &pre_fire(4000.0)),
        uniform_scene("S2B_20250105", 5, 8.0, &pre_fire(6000.0)),
        uniform_scene("S2A_20250107_cloudy", 7, 64.0, &pre_fire(100.0)),
        uniform_scene("S2B_20250112", 12, 1.0, &post_fire(2000.0)),
        uniform_scene("S2A_20250115", 15, 11.0, &post_fire(1800.0)),
        uniform_scene("S2A_20250117", 17, 2.0, &post_fire(2500.0)),
        uniform_scene("S2B_20250114_cloudy", 14, 35.0, &post_fire(9000.0)),
    ])
}

/// The default regional and urban runs, moved onto the test grid
fn test_specs() -> Vec<RunSpec> {
    let mut config = AnalysisConfig::default();
    config.runs[0].region = RegionConfig {
        name: "Main".to_string(),
        bbox: Some([0.0, 0.0, 8.0, 4.0]),
        vertices: None,
    };
    config.runs[1].region = RegionConfig {
        name: "Urban".to_string(),
        bbox: Some([4.0, 0.0, 6.0, 2.0]),
        vertices: None,
    };
    config.validate().unwrap();
    config.run_specs().unwrap()
}

fn pipeline<'a>(source: &'a MemorySource, sink: &'a MemorySink) -> Pipeline<'a> {
    Pipeline::new(source, sink, EventWindows::standard(event_date()).unwrap(), 20.0)
}

fn expected_dnbr() -> f32 {
    let pre = (5000.0 - 1000.0) / (5000.0 + 1000.0);
    let post = (2000.0 - 3000.0) / (2000.0 + 3000.0);
    pre - post
}

fn failure(report: &RunReport) -> (Stage, &Error) {
    let failure = report.failure().expect("run should have failed");
    (failure.stage, &failure.error)
}

/// Both runs derive and store every declared artifact
#[test]
fn test_regional_and_urban_runs() {
    let source = fire_source();
    let sink = MemorySink::new();
    let specs = test_specs();

    let reports = pipeline(&source, &sink).run_all(&specs, Schedule::Sequential);
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(RunReport::is_success));

    let regional = reports[0].outcome.as_ref().unwrap();
    assert_eq!(regional.scene_counts, vec![(Epoch::Pre, 2), (Epoch::Post, 3)]);
    assert_eq!(regional.stored.len(), 5);
    assert_eq!(regional.summaries.len(), 2);

    assert_eq!(
        sink.names(),
        vec![
            "LA_PreEvent_TrueColor",
            "LA_PostEvent_TrueColor",
            "LA_Burn_Severity_dNBR",
            "LA_Vegetation_Loss_dNDVI",
            "LA_MainBoundary",
            "LA_PreEvent_UrbanDamage_FalseColor_vis",
            "LA_PreEvent_UrbanDamage_FalseColor",
            "LA_PostEvent_UrbanDamage_FalseColor_vis",
            "LA_PostEvent_UrbanDamage_FalseColor",
            "LA_UrbanBoundary",
        ]
    );

    let dnbr = sink.get("LA_Burn_Severity_dNBR").unwrap();
    let ArtifactPayload::Raster(raster) = &dnbr.payload else {
        panic!("dNBR should be a raster artifact");
    };
    assert_eq!(raster.bands.len(), 1);
    assert_eq!(raster.bands[0].0, "dNBR");
    assert_eq!(raster.grid, scene_grid());
    for value in raster.bands[0].1.data() {
        assert_abs_diff_eq!(*value, expected_dnbr(), epsilon = 1e-5);
    }

    let true_color = sink.get("LA_PreEvent_TrueColor").unwrap();
    let ArtifactPayload::Raster(raster) = &true_color.payload else {
        panic!("true colour should be a raster artifact");
    };
    let labels: Vec<_> = raster.bands.iter().map(|(label, _)| label.as_str()).collect();
    assert_eq!(labels, vec!["B4", "B3", "B2"]);
}

/// Scene counts always list the pre-event composite before the post-event one
#[test]
fn test_scene_counts_in_epoch_order() {
    let source = fire_source();
    let specs = test_specs();
    for _ in 0..16 {
        let sink = MemorySink::new();
        let report = pipeline(&source, &sink).run(&specs[0]);
        let output = report.outcome.as_ref().unwrap();
        assert_eq!(output.scene_counts, vec![(Epoch::Pre, 2), (Epoch::Post, 3)]);
    }
}

/// The urban run keeps the clipped analytical raster next to its visualization
#[test]
fn test_urban_false_color_exports() {
    let source = fire_source();
    let sink = MemorySink::new();
    let specs = test_specs();
    let report = pipeline(&source, &sink).run(&specs[1]);
    assert!(report.is_success());

    let analytical = sink.get("LA_PostEvent_UrbanDamage_FalseColor").unwrap();
    let ArtifactPayload::Raster(raster) = &analytical.payload else {
        panic!("analytical artifact should be a raster");
    };
    // Cropped to the urban bounding box: columns 4..6, rows 2..4
    assert_eq!((raster.grid.width, raster.grid.height), (2, 2));
    assert_eq!(raster.grid.geo_transform[0], 4.0);
    assert_eq!(raster.grid.geo_transform[3], 2.0);
    let labels: Vec<_> = raster.bands.iter().map(|(label, _)| label.as_str()).collect();
    assert_eq!(labels, vec!["B12", "B11", "B4"]);
    assert_abs_diff_eq!(raster.bands[0].1.data()[0], 3000.0);

    let visualized = sink.get("LA_PostEvent_UrbanDamage_FalseColor_vis").unwrap();
    let ArtifactPayload::Visualization(image) = &visualized.payload else {
        panic!("visualized artifact should be an RGBA image");
    };
    assert_eq!((image.grid.width, image.grid.height), (2, 2));
    let stretch = Stretch::new(0.0, 10000.0).with_gamma(2.5);
    let expected = [
        stretch.to_byte(3000.0),
        stretch.to_byte(3500.0),
        stretch.to_byte(1500.0),
        255,
    ];
    assert_eq!(image.pixel(0, 0), expected);
    // Gamma above one brightens the dark SWIR response
    assert!(expected[0] > 77);
}

/// Running both regions concurrently gives the same artifacts as running them in turn
#[test]
fn test_concurrent_matches_sequential() {
    let source = fire_source();
    let specs = test_specs();

    let sequential_sink = MemorySink::new();
    let sequential = pipeline(&source, &sequential_sink).run_all(&specs, Schedule::Sequential);
    let concurrent_sink = MemorySink::new();
    let concurrent = pipeline(&source, &concurrent_sink).run_all(&specs, Schedule::Concurrent);

    let runs = |reports: &[RunReport]| reports.iter().map(|r| r.run.clone()).collect::<Vec<_>>();
    assert_eq!(runs(&sequential), runs(&concurrent));
    assert!(concurrent.iter().all(RunReport::is_success));

    let mut names = sequential_sink.names();
    names.sort();
    let mut concurrent_names = concurrent_sink.names();
    concurrent_names.sort();
    assert_eq!(names, concurrent_names);

    for name in &names {
        assert_eq!(
            sequential_sink.get(name),
            concurrent_sink.get(name),
            "artifact {} differs between schedules",
            name
        );
    }
}

/// An empty composite fails its own run only, and that run stores nothing
#[test]
fn test_failed_run_is_isolated() {
    let source = fire_source();
    let sink = MemorySink::new();
    let mut specs = test_specs();
    specs.insert(
        1,
        RunSpec {
            name: "offshore".to_string(),
            region: Region::rectangle("Offshore", 100.0, 30.0, 101.0, 31.0).unwrap(),
            boundary_artifact: "Offshore_Boundary".to_string(),
            products: vec![Product::Change {
                index: IndexKind::Burn,
                artifact: "Offshore_dNBR".to_string(),
                preview: None,
            }],
        },
    );

    let reports = pipeline(&source, &sink).run_all(&specs, Schedule::Concurrent);
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[1].run, "offshore");
    assert!(reports[0].is_success());
    assert!(reports[2].is_success());

    let (stage, error) = failure(&reports[1]);
    assert_eq!(stage, Stage::Composite);
    assert!(error.is_empty_composite());

    let names = sink.names();
    assert_eq!(names.len(), 10);
    assert!(!names.iter().any(|name| name.starts_with("Offshore")));
}

/// A successful pre-event composite is discarded when the post-event one is empty
#[test]
fn test_no_partial_export() {
    let pre_only = MemorySource::new(vec![
        uniform_scene("S2A_20250102", 2, 3.0, &pre_fire(4000.0)),
        uniform_scene("S2B_20250105", 5, 8.0, &pre_fire(6000.0)),
    ]);
    let sink = MemorySink::new();
    let specs = test_specs();

    let report = pipeline(&pre_only, &sink).run(&specs[0]);
    let (stage, error) = failure(&report);
    assert_eq!(stage, Stage::Composite);
    assert!(matches!(error, Error::EmptyComposite { .. }));
    assert!(sink.is_empty());
}

/// The pixel ceiling is checked for every staged artifact before the first store
#[test]
fn test_export_pixel_ceiling() {
    let source = fire_source();
    let sink = MemorySink::new();
    let specs = test_specs();
    let export = ExportOptions {
        max_pixels: 4,
        ..ExportOptions::default()
    };

    let reports = pipeline(&source, &sink)
        .with_export(export)
        .run_all(&specs, Schedule::Sequential);

    let (stage, error) = failure(&reports[0]);
    assert_eq!(stage, Stage::Export);
    assert!(matches!(
        error,
        Error::ExportTooLarge { pixels: 32, max_pixels: 4, .. }
    ));
    // The 2x2 urban exports fit
    assert!(reports[1].is_success());
    assert_eq!(sink.len(), 5);
}

/// Delegates to `inner` for the first `limit` stores, then reports the sink as unavailable
struct FailingSink<S> {
    inner: S,
    limit: usize,
    stores: AtomicUsize,
}

impl<S> FailingSink<S> {
    fn new(inner: S, limit: usize) -> Self {
        Self {
            inner,
            limit,
            stores: AtomicUsize::new(0),
        }
    }
}

impl<S: ArtifactSink> ArtifactSink for FailingSink<S> {
    fn store(&self, artifact: &Artifact, options: &ExportOptions) -> Result<StoredArtifact> {
        if self.stores.fetch_add(1, Ordering::SeqCst) >= self.limit {
            return Err(Error::sink_unavailable(format!("storing {}", artifact.name), "disk full"));
        }
        self.inner.store(artifact, options)
    }

    fn discard(&self, stored: &StoredArtifact, options: &ExportOptions) -> Result<()> {
        self.inner.discard(stored, options)
    }
}

/// A store failure midway through a run discards what the run already stored
#[test]
fn test_export_failure_discards_stored() {
    let source = fire_source();
    let sink = FailingSink::new(MemorySink::new(), 2);
    let specs = test_specs();

    let report = Pipeline::new(&source, &sink, EventWindows::standard(event_date()).unwrap(), 20.0)
        .run(&specs[0]);
    let failure = report.failure().expect("run should have failed");
    assert_eq!(failure.stage, Stage::Export);
    assert!(matches!(failure.error, Error::SinkUnavailable { .. }));
    assert!(failure.orphaned.is_empty());
    assert!(sink.inner.is_empty());
}

/// The directory sink removes files and sidecars of a discarded run
#[test]
fn test_directory_export_failure_leaves_no_files() {
    let source = fire_source();
    let dir = tempdir().unwrap();
    let sink = FailingSink::new(DirectorySink::new(dir.path()), 3);
    let specs = test_specs();

    let report = Pipeline::new(&source, &sink, EventWindows::standard(event_date()).unwrap(), 20.0)
        .run(&specs[0]);
    assert_eq!(report.failure().map(|f| f.stage), Some(Stage::Export));

    let destination = dir.path().join("LA Wildfire");
    let left: Vec<_> = fs::read_dir(&destination).unwrap().collect();
    assert!(left.is_empty(), "files left behind: {:?}", left);
}

/// Invalid run definitions fail in the validate stage
#[test]
fn test_validation_stage() {
    let source = fire_source();
    let sink = MemorySink::new();
    let mut spec = test_specs().remove(0);
    spec.boundary_artifact = "LA_Burn_Severity_dNBR".to_string();

    let report = pipeline(&source, &sink).run(&spec);
    let (stage, error) = failure(&report);
    assert_eq!(stage, Stage::Validate);
    assert!(matches!(error, Error::InvalidParameter { name: "artifact", .. }));

    let bad_ceiling = Pipeline::new(&source, &sink, EventWindows::standard(event_date()).unwrap(), 100.0);
    let report = bad_ceiling.run(&test_specs()[1]);
    assert_eq!(failure(&report).0, Stage::Validate);
    assert!(sink.is_empty());
}

/// GeoTIFFs, boundary vectors and sidecars land under the destination folder
#[test]
fn test_directory_sink_round_trip() {
    let source = fire_source();
    let dir = tempdir().unwrap();
    let sink = DirectorySink::new(dir.path());
    let specs = test_specs();

    let reports = Pipeline::new(&source, &sink, EventWindows::standard(event_date()).unwrap(), 20.0)
        .run_all(&specs, Schedule::Concurrent);
    assert!(reports.iter().all(RunReport::is_success));

    let destination = dir.path().join("LA Wildfire");
    let (grid, band) = read_band_native(&destination.join("LA_Burn_Severity_dNBR.tif")).unwrap();
    assert_eq!((grid.width, grid.height), (WIDTH, HEIGHT));
    assert_abs_diff_eq!(band.data()[0], expected_dnbr(), epsilon = 1e-5);

    // The urban crop starts at column 4, so its origin moves off the scene origin
    let (urban_grid, urban) =
        read_band_native(&destination.join("LA_PostEvent_UrbanDamage_FalseColor_B12.tif")).unwrap();
    assert_eq!(urban_grid, GridSpec::north_up(2, 2, 4.0, 2.0, 1.0, 1.0));
    assert_abs_diff_eq!(urban.data()[0], 3000.0);

    assert!(destination.join("LA_PreEvent_TrueColor_B4.tif").exists());
    assert!(destination.join("LA_PostEvent_UrbanDamage_FalseColor_vis.tif").exists());

    let kml = fs::read_to_string(destination.join("LA_UrbanBoundary.kml")).unwrap();
    assert!(kml.contains("<kml"));
    assert!(kml.contains("Boundary of Urban"));

    let sidecar: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(destination.join("LA_Burn_Severity_dNBR.json")).unwrap())
            .unwrap();
    assert_eq!(sidecar["format"], "GTiff/Float32");
    assert_eq!(sidecar["scale"], 10.0);
    assert_eq!(sidecar["nodata"], -999.0);
}

/// Fixed-point exports store round(value * scale) with the int16 sentinel
#[test]
fn test_directory_sink_fixed_point() {
    let source = fire_source();
    let dir = tempdir().unwrap();
    let sink = DirectorySink::new(dir.path());
    let export = ExportOptions {
        destination: "scaled".to_string(),
        fixed_point: true,
        vector_format: raster_change::io::VectorFormat::GeoJson,
        ..ExportOptions::default()
    };
    let specs = test_specs();

    let report = Pipeline::new(&source, &sink, EventWindows::standard(event_date()).unwrap(), 20.0)
        .with_export(export)
        .run(&specs[0]);
    assert!(report.is_success());

    let destination = dir.path().join("scaled");
    let (_, band) = read_band_native(&destination.join("LA_Burn_Severity_dNBR.tif")).unwrap();
    assert_abs_diff_eq!(band.data()[0], (expected_dnbr() * 10000.0).round(), epsilon = 1.0);
    assert!(destination.join("LA_MainBoundary.geojson").exists());

    let sidecar: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(destination.join("LA_Burn_Severity_dNBR.json")).unwrap())
            .unwrap();
    assert_eq!(sidecar["format"], "GTiff/Int16");
    assert_eq!(sidecar["value_scale"], 0.0001);
}

/// Catalog entries are filtered on metadata before any band file is opened
#[test]
fn test_catalog_source() {
    let dir = tempdir().unwrap();
    let grid = GridSpec::north_up(2, 2, -118.6, 34.06, 0.01, 0.01);
    let write = |name: &str, values: Vec<f32>| {
        write_raster_native(
            &dir.path().join(name),
            &grid,
            &BandBuffer::new((2, 2), values),
            RasterEncoding::Float32,
        )
        .unwrap();
    };
    write("a_nir.tif", vec![5000.0, 5000.0, NODATA, 4000.0]);
    write("a_swir2.tif", vec![1000.0, 1000.0, 1000.0, 1000.0]);
    write("b_nir.tif", vec![3000.0, 5000.0, 2000.0, NODATA]);
    write("b_swir2.tif", vec![1000.0, 1000.0, 1000.0, 1000.0]);

    let catalog = r#"{
        "scenes": [
            { "id": "a", "acquired": "2025-01-03T18:40:00Z", "cloud_cover": 4.5,
              "bands": { "nir": "a_nir.tif", "swir2": "a_swir2.tif" } },
            { "id": "b", "acquired": "2025-01-06T18:40:00Z", "cloud_cover": 0.0,
              "bands": { "nir": "b_nir.tif", "swir2": "b_swir2.tif" } },
            { "id": "cloudy", "acquired": "2025-01-04T18:40:00Z", "cloud_cover": 90.0,
              "bands": { "nir": "missing.tif", "swir2": "missing.tif" } }
        ]
    }"#;
    let catalog_path = dir.path().join("catalog.json");
    fs::write(&catalog_path, catalog).unwrap();

    let source = CatalogSource::open(&catalog_path).unwrap();
    let region = Region::rectangle("Urban", -118.6, 34.04, -118.58, 34.06).unwrap();
    let windows = EventWindows::standard(event_date()).unwrap();
    let compositor = TemporalCompositor::new(&source).with_bands(&[SpectralBand::Nir, SpectralBand::Swir2]);

    let composite = compositor.composite(windows.pre, &region, 20.0).unwrap();
    assert_eq!(composite.scene_count(), 2);
    assert_eq!(source.cached_bands(), 4);

    let nir = composite.raster().unwrap().band(SpectralBand::Nir).unwrap();
    assert_abs_diff_eq!(nir.data()[0], 4000.0);
    assert_abs_diff_eq!(nir.data()[1], 5000.0);
    // Single valid sample on each side
    assert_abs_diff_eq!(nir.data()[2], 2000.0);
    assert_abs_diff_eq!(nir.data()[3], 4000.0);

    let post = compositor.composite(windows.post, &region, 20.0).unwrap();
    assert!(post.is_empty());

    // A bounded cache still composites every band, keeping only the latest
    let bounded = CatalogSource::open(&catalog_path).unwrap().with_cache_capacity(1);
    let composite = TemporalCompositor::new(&bounded)
        .with_bands(&[SpectralBand::Nir, SpectralBand::Swir2])
        .composite(windows.pre, &region, 20.0)
        .unwrap();
    assert_eq!(composite.scene_count(), 2);
    assert_eq!(bounded.cached_bands(), 1);
    assert_abs_diff_eq!(
        composite.raster().unwrap().band(SpectralBand::Nir).unwrap().data()[0],
        4000.0
    );
}

/// A catalog entry pointing at a missing file surfaces as a source failure
#[test]
fn test_catalog_source_unavailable() {
    let dir = tempdir().unwrap();
    let catalog_path = dir.path().join("catalog.json");
    fs::write(
        &catalog_path,
        r#"{ "scenes": [ { "id": "gone", "acquired": "2025-01-03T00:00:00Z", "cloud_cover": 1.0,
             "bands": { "red": "gone.tif" } } ] }"#,
    )
    .unwrap();

    let source = CatalogSource::open(&catalog_path).unwrap();
    let region = Region::rectangle("AOI", 0.0, 0.0, 1.0, 1.0).unwrap();
    let windows = EventWindows::standard(event_date()).unwrap();
    let err = TemporalCompositor::new(&source)
        .with_bands(&[SpectralBand::Red])
        .composite(windows.pre, &region, 20.0)
        .unwrap_err();
    assert!(matches!(err, Error::SourceUnavailable { .. }));
}
