//! lakesar: A Modular Sentinel-1 Lake Surface Area Measurement Pipeline
//!
//! This library turns processed Sentinel-1 backscatter scenes into lake
//! surface area measurements: scenes are clipped to an AOI polygon on a
//! resolution-aligned grid, segmented by a trained single-channel model,
//! persisted as georeferenced binary masks and converted from foreground
//! pixel counts into physical area.

pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    AcquisitionRequest, AreaMeasurement, BoundingBox, GeoTransform, LakeError, LakeResult,
    MaskImage, Patch, RegionOfInterest, SarRealImage,
};

pub use crate::core::{
    collect_scenes, AoiClipper, AreaCalculator, ClipParams, Device, InferenceEngine, LakePipeline,
    MaskPredictor, OnnxSegmentationModel, PipelineConfig, StubPredictor,
};
