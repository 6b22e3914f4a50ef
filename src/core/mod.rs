//! Core measurement pipeline modules

pub mod area;
pub mod clip;
pub mod inference;
pub mod pipeline;

// Re-export main types
pub use area::AreaCalculator;
pub use clip::{AoiClipper, ClipParams};
pub use inference::{
    Device, InferenceEngine, MaskPredictor, OnnxSegmentationModel, Prediction, StubPredictor,
};
pub use pipeline::{
    collect_scenes, BatchSummary, IdentityNormalizer, LakePipeline, PatchNormalizer,
    PipelineConfig, SceneProvider, SceneReport, SkippedScene, UrlSceneProvider,
};
