use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::DriverManager;
use lakesar::core::pipeline::PipelineConfig;
use lakesar::io::raster::RasterProfile;
use lakesar::types::RegionOfInterest;
use lakesar::{LakePipeline, StubPredictor};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Synthetic UTM scene (EPSG:32633, north-up) with a bright square on a
/// dark background.
fn write_scene<F>(path: &Path, width: usize, height: usize, resolution: f64, value: F)
where
    F: Fn(usize, usize) -> f32,
{
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let mut dataset = driver
        .create_with_band_type::<f32, _>(path, width as isize, height as isize, 1)
        .unwrap();
    dataset
        .set_geo_transform(&[500000.0, resolution, 0.0, 200000.0, 0.0, -resolution])
        .unwrap();
    dataset
        .set_spatial_ref(&SpatialRef::from_epsg(32633).unwrap())
        .unwrap();

    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push(value(row, col));
        }
    }
    let buffer = Buffer::new((width, height), data);
    dataset
        .rasterband(1)
        .unwrap()
        .write((0, 0), (width, height), &buffer)
        .unwrap();
}

fn pipeline_config(tmp: &Path) -> PipelineConfig {
    PipelineConfig {
        region_label: "testlake".to_string(),
        // Pixel cols 10..20 and rows 10..20 of the 20m scene
        roi: RegionOfInterest {
            wkt: "POLYGON((500200 199600, 500400 199600, 500400 199800, 500200 199800, 500200 199600))"
                .to_string(),
            epsg: 32633,
        },
        target_resolution: (20.0, 20.0),
        patch_dir: tmp.join("patches"),
        padded_dir: tmp.join("padded"),
        mask_dir: tmp.join("masks"),
    }
}

/// Scene with a 5x5 block of bright water inside the ROI window; the
/// identity-logit stub marks everything brighter than the patch mean as
/// foreground, reproducing the ground truth exactly.
fn write_ground_truth_scene(path: &Path) {
    write_scene(path, 100, 100, 20.0, |row, col| {
        if (12..17).contains(&row) && (12..17).contains(&col) {
            200.0
        } else {
            10.0
        }
    });
}

#[test]
fn test_end_to_end_area_matches_ground_truth() {
    let tmp = TempDir::new().unwrap();
    let scene = tmp.path().join("s1_scene.tif");
    write_ground_truth_scene(&scene);

    // Patch and model input are both 10x10, so the resize is identity
    let pipeline = LakePipeline::new(StubPredictor::new(10), pipeline_config(tmp.path()));
    let report = pipeline.process_scene(&scene).unwrap();

    // 25 foreground pixels at 20m x 20m
    assert_eq!(report.area.water_pixels, 25);
    assert_eq!(report.area.pixel_resolution, (20.0, 20.0));
    assert_eq!(report.area.square_meters, 25.0 * 400.0);
    assert_eq!(report.area.square_kilometers, 25.0 * 400.0 / 1_000_000.0);

    assert!(report.patch.exists());
    assert!(report.mask.exists());
    assert_eq!(
        report.mask.file_name().unwrap().to_str().unwrap(),
        "s1_scene_clipped_to_testlakeAOI_mask.tif"
    );
}

#[test]
fn test_mask_georeferencing_matches_patch() {
    let tmp = TempDir::new().unwrap();
    let scene = tmp.path().join("s1_scene.tif");
    write_ground_truth_scene(&scene);

    let pipeline = LakePipeline::new(StubPredictor::new(10), pipeline_config(tmp.path()));
    let report = pipeline.process_scene(&scene).unwrap();

    let patch_profile = RasterProfile::from_path(&report.patch).unwrap();
    let mask_profile = RasterProfile::from_path(&report.mask).unwrap();

    assert_eq!(mask_profile.geo_transform, patch_profile.geo_transform);
    assert_eq!(mask_profile.projection, patch_profile.projection);
    assert_eq!(
        (mask_profile.width, mask_profile.height),
        (patch_profile.width, patch_profile.height)
    );
}

#[test]
fn test_rerun_overwrites_mask_without_drift() {
    let tmp = TempDir::new().unwrap();
    let scene = tmp.path().join("s1_scene.tif");
    write_ground_truth_scene(&scene);

    let pipeline = LakePipeline::new(StubPredictor::new(10), pipeline_config(tmp.path()));
    let first = pipeline.process_scene(&scene).unwrap();
    let second = pipeline.process_scene(&scene).unwrap();

    assert_eq!(first.mask, second.mask);
    assert_eq!(first.area.water_pixels, second.area.water_pixels);
    assert_eq!(first.area.square_kilometers, second.area.square_kilometers);
}

#[test]
fn test_batch_continues_past_failed_scene() {
    let tmp = TempDir::new().unwrap();
    let good = tmp.path().join("good_scene.tif");
    write_ground_truth_scene(&good);
    let missing = tmp.path().join("missing_scene.tif");

    let pipeline = LakePipeline::new(StubPredictor::new(10), pipeline_config(tmp.path()));
    let summary = pipeline.run_batch(&[missing.clone(), good.clone()]);

    assert_eq!(summary.reports.len(), 1);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.reports[0].scene, good);
    assert_eq!(summary.skipped[0].scene, missing);
    assert!(!summary.skipped[0].reason.is_empty());
}

#[test]
fn test_batch_of_nothing_is_empty_summary() {
    let tmp = TempDir::new().unwrap();
    let pipeline = LakePipeline::new(StubPredictor::new(10), pipeline_config(tmp.path()));

    let summary = pipeline.run_batch(&[] as &[PathBuf]);
    assert!(summary.reports.is_empty());
    assert!(summary.skipped.is_empty());
}
