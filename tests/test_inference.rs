use gdal::spatial_ref::SpatialRef;
use lakesar::core::inference::InferenceEngine;
use lakesar::io::raster::{read_band_u8, write_f32_geotiff};
use lakesar::types::{GeoTransform, LakeError};
use lakesar::{Device, OnnxSegmentationModel, StubPredictor};
use ndarray::Array2;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_patch(dir: &Path, name: &str, samples: &Array2<f32>) -> PathBuf {
    let path = dir.join(name);
    let geo_transform = GeoTransform::from_gdal([500000.0, 20.0, 0.0, 200000.0, 0.0, -20.0]);
    let projection = SpatialRef::from_epsg(32633).unwrap().to_wkt().unwrap();
    write_f32_geotiff(&path, samples, &geo_transform, &projection, Some(0.0)).unwrap();
    path
}

fn bright_block_patch(size: usize) -> Array2<f32> {
    Array2::from_shape_fn((size, size), |(row, col)| {
        if row < size / 2 && col < size / 2 {
            220.0
        } else {
            15.0
        }
    })
}

#[test]
fn test_predict_emits_binary_mask() {
    let tmp = TempDir::new().unwrap();
    let patch = write_patch(tmp.path(), "patch.tif", &bright_block_patch(8));

    let engine = InferenceEngine::new(StubPredictor::new(8));
    let prediction = engine.predict(&patch).unwrap();

    assert_eq!(prediction.mask.dim(), (8, 8));
    assert!(prediction.mask.iter().all(|&v| v == 0 || v == 1));
    // Bright quadrant above the patch mean becomes foreground
    assert_eq!(prediction.mask.iter().filter(|&&v| v == 1).count(), 16);
    // Raw samples are kept unnormalized for later inspection
    assert_eq!(prediction.original[[0, 0]], 220.0);
    assert_eq!(prediction.original[[7, 7]], 15.0);
}

#[test]
fn test_predict_is_deterministic() {
    let tmp = TempDir::new().unwrap();
    let patch = write_patch(tmp.path(), "patch.tif", &bright_block_patch(8));

    let engine = InferenceEngine::new(StubPredictor::new(8));
    let first = engine.predict(&patch).unwrap();
    let second = engine.predict(&patch).unwrap();
    assert_eq!(first.mask, second.mask);
}

#[test]
fn test_saved_mask_roundtrips_values_and_georeferencing() {
    let tmp = TempDir::new().unwrap();
    let patch = write_patch(tmp.path(), "patch.tif", &bright_block_patch(8));

    let engine = InferenceEngine::new(StubPredictor::new(8));
    let prediction = engine.predict(&patch).unwrap();
    let mask_path = engine
        .save_mask(&prediction.mask, &patch, &tmp.path().join("masks"))
        .unwrap();

    assert_eq!(
        mask_path.file_name().unwrap().to_str().unwrap(),
        "patch_mask.tif"
    );

    let (labels, geo_transform) = read_band_u8(&mask_path).unwrap();
    assert_eq!(labels, prediction.mask);
    assert_eq!(geo_transform, prediction.geo_transform);
}

#[test]
fn test_save_mask_rejects_mismatched_dimensions() {
    let tmp = TempDir::new().unwrap();
    let patch = write_patch(tmp.path(), "patch.tif", &bright_block_patch(16));

    // Model output is 4x4 while the patch is 16x16; stamping the patch
    // profile onto that mask would misgeoreference every pixel.
    let engine = InferenceEngine::new(StubPredictor::new(4));
    let prediction = engine.predict(&patch).unwrap();
    assert_eq!(prediction.mask.dim(), (4, 4));

    let err = engine
        .save_mask(&prediction.mask, &patch, &tmp.path().join("masks"))
        .unwrap_err();
    assert!(matches!(err, LakeError::InferenceFailure { .. }));
    assert!(!err.is_fatal());
}

#[test]
fn test_missing_checkpoint_is_fatal_load_failure() {
    let err = OnnxSegmentationModel::load(Path::new("/nonexistent/best_lake_model.onnx"), Device::Cpu)
        .unwrap_err();
    match &err {
        LakeError::ModelLoadFailure(reason) => {
            assert!(reason.contains("best_lake_model.onnx"));
        }
        other => panic!("expected ModelLoadFailure, got {}", other),
    }
    // No valid model means no run at all
    assert!(err.is_fatal());
}

#[test]
fn test_unreadable_patch_is_inference_failure() {
    let tmp = TempDir::new().unwrap();
    let bogus = tmp.path().join("bogus.tif");
    fs::write(&bogus, b"definitely not a GeoTIFF").unwrap();

    let engine = InferenceEngine::new(StubPredictor::new(8));
    let err = engine.predict(&bogus).unwrap_err();

    match &err {
        LakeError::InferenceFailure { source_id, .. } => assert_eq!(source_id, "bogus.tif"),
        other => panic!("expected InferenceFailure, got {}", other),
    }
    assert!(!err.is_fatal());
}
