use crate::io::raster::{self, RasterProfile};
use crate::types::{
    source_id, GeoTransform, LakeError, LakeResult, MaskImage, SarRealImage,
};
use image::{imageops, imageops::FilterType, ImageBuffer, Luma};
use ndarray::{s, Array2, Array4, ArrayView4, Axis};
use ort::execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider};
use ort::session::{builder::SessionBuilder, Session};
use ort::value::TensorRef;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

/// Fallback square input size when the checkpoint declares dynamic
/// spatial dimensions
const DEFAULT_INPUT_SIZE: usize = 256;

/// Raw sample scaling applied before standardization
const SAMPLE_SCALE: f32 = 255.0;

/// Guard against division by near-zero variance
const STD_EPSILON: f32 = 1e-6;

/// Inference device the model session is bound to at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(i32),
}

/// Seam between the pipeline and the numeric runtime.
///
/// The pipeline only needs a square input size and a logit map; tests
/// inject a stub instead of a real checkpoint.
pub trait MaskPredictor: Send + Sync {
    /// Square spatial size of the model input
    fn input_size(&self) -> usize;

    /// Forward pass on a (1, 1, S, S) tensor, returning the logit map
    fn predict_logits(&self, input: ArrayView4<f32>) -> LakeResult<Array2<f32>>;
}

/// Segmentation model backed by an ONNX Runtime session.
///
/// Loaded once per run and shared read-only; the session itself sits
/// behind a mutex because a forward pass needs exclusive access.
pub struct OnnxSegmentationModel {
    input_size: usize,
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

impl OnnxSegmentationModel {
    /// Load a checkpoint for inference.
    ///
    /// Loading is strict: a missing file, a non-single-channel input, or
    /// a warm-up pass rejecting the expected tensor shape all mean the
    /// checkpoint does not match the architecture this pipeline was
    /// trained with. That is a configuration error, fatal for the whole
    /// run, never retried.
    pub fn load(checkpoint: &Path, device: Device) -> LakeResult<Self> {
        if !checkpoint.exists() {
            return Err(LakeError::ModelLoadFailure(format!(
                "checkpoint not found: {}",
                checkpoint.display()
            )));
        }

        let builder = SessionBuilder::new()
            .map_err(|e| LakeError::ModelLoadFailure(format!("session setup failed: {}", e)))?;
        let builder = match device {
            Device::Cpu => builder,
            Device::Cuda(device_id) => builder
                .with_execution_providers([
                    TensorRTExecutionProvider::default()
                        .with_device_id(device_id)
                        .build(),
                    CUDAExecutionProvider::default()
                        .with_device_id(device_id)
                        .build(),
                ])
                .map_err(|e| {
                    LakeError::ModelLoadFailure(format!(
                        "execution provider setup failed: {}",
                        e
                    ))
                })?,
        };

        let mut session = builder.commit_from_file(checkpoint).map_err(|e| {
            LakeError::ModelLoadFailure(format!(
                "cannot load checkpoint {}: {}",
                checkpoint.display(),
                e
            ))
        })?;

        if session.inputs.is_empty() || session.outputs.is_empty() {
            return Err(LakeError::ModelLoadFailure(
                "checkpoint declares no inputs or outputs".to_string(),
            ));
        }
        let (channels, spatial) = {
            let shape = session.inputs[0].input_type.tensor_shape().ok_or_else(|| {
                LakeError::ModelLoadFailure("model input is not a tensor".to_string())
            })?;
            if shape.len() != 4 {
                return Err(LakeError::ModelLoadFailure(format!(
                    "model input must be a (N, C, H, W) tensor, got rank {}",
                    shape.len()
                )));
            }
            (shape[1], shape[2])
        };
        if channels > 0 && channels != 1 {
            return Err(LakeError::ModelLoadFailure(format!(
                "model expects {} input channels, this pipeline feeds 1",
                channels
            )));
        }
        let input_size = if spatial > 0 {
            spatial as usize
        } else {
            DEFAULT_INPUT_SIZE
        };

        let input_name = session.inputs[0].name.clone();
        let output_name = session.outputs[0].name.clone();

        // Warm-up pass: catches parameter-shape mismatches at load time
        // instead of on the first scene.
        let probe = Array4::<f32>::zeros((1, 1, input_size, input_size));
        session
            .run(ort::inputs![input_name.as_str() => TensorRef::from_array_view(&probe)
                .map_err(|e| LakeError::ModelLoadFailure(format!("probe tensor failed: {}", e)))?])
            .map_err(|e| {
                LakeError::ModelLoadFailure(format!(
                    "checkpoint rejects a (1, 1, {}, {}) input: {}",
                    input_size, input_size, e
                ))
            })?;

        log::info!(
            "Model loaded from {} (input {}x{}, device {:?})",
            checkpoint.display(),
            input_size,
            input_size,
            device
        );

        Ok(Self {
            input_size,
            input_name,
            output_name,
            session: Mutex::new(session),
        })
    }
}

impl MaskPredictor for OnnxSegmentationModel {
    fn input_size(&self) -> usize {
        self.input_size
    }

    fn predict_logits(&self, input: ArrayView4<f32>) -> LakeResult<Array2<f32>> {
        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() =>
                TensorRef::from_array_view(&input.as_standard_layout())
                    .map_err(|e| LakeError::Processing(format!("input tensor failed: {}", e)))?])
            .map_err(|e| LakeError::Processing(format!("forward pass failed: {}", e)))?;

        let logits = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(|e| LakeError::Processing(format!("output extraction failed: {}", e)))?;

        // The decoder emits (1, 1, S, S); collapse the singleton axes.
        let shape = logits.shape().to_vec();
        if shape.len() < 2 {
            return Err(LakeError::Processing(format!(
                "unexpected output rank {} from model",
                shape.len()
            )));
        }
        let (height, width) = (shape[shape.len() - 2], shape[shape.len() - 1]);
        let flat: Vec<f32> = logits.iter().cloned().collect();
        Array2::from_shape_vec((height, width), flat)
            .map_err(|e| LakeError::Processing(format!("failed to reshape logits: {}", e)))
    }
}

/// Scale raw samples into [0, 1] and standardize by the patch's own
/// statistics.
///
/// Adaptive per-patch normalization keeps the statistics the model sees
/// consistent across scenes with different radiometry. Pure function of
/// the input; no state leaks between patches.
pub fn standardize(samples: &SarRealImage) -> SarRealImage {
    let scaled = samples.mapv(|v| v / SAMPLE_SCALE);
    let mean = scaled.mean().unwrap_or(0.0);
    let std = scaled.std(0.0);
    scaled.mapv(|v| (v - mean) / (std + STD_EPSILON))
}

/// Logistic activation mapping a logit into (0, 1)
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Threshold a logit map into a binary mask.
///
/// Strictly greater-than: a probability of exactly `threshold` stays
/// background.
pub fn threshold_mask(logits: &Array2<f32>, threshold: f32) -> MaskImage {
    logits.mapv(|logit| u8::from(sigmoid(logit) > threshold))
}

/// Deterministic bilinear resize of a single-channel patch
pub fn resize_bilinear(
    input: &SarRealImage,
    width: usize,
    height: usize,
) -> LakeResult<SarRealImage> {
    let (in_height, in_width) = input.dim();
    if (in_width, in_height) == (width, height) {
        return Ok(input.clone());
    }

    let flat: Vec<f32> = input.iter().cloned().collect();
    let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(in_width as u32, in_height as u32, flat).ok_or_else(|| {
            LakeError::Processing("patch buffer does not match its dimensions".to_string())
        })?;

    let resized = imageops::resize(&buffer, width as u32, height as u32, FilterType::Triangle);
    Array2::from_shape_vec((height, width), resized.into_raw())
        .map_err(|e| LakeError::Processing(format!("failed to reshape resized patch: {}", e)))
}

/// Result of one forward pass over a patch
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Raw samples as read from the patch, before any normalization
    pub original: SarRealImage,
    /// Binary mask at the model's native output resolution
    pub mask: MaskImage,
    pub geo_transform: GeoTransform,
    pub projection: String,
}

/// Runs segmentation over patches with a model loaded once per run
pub struct InferenceEngine<M: MaskPredictor> {
    model: M,
}

impl<M: MaskPredictor> InferenceEngine<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Predict the water mask for one patch raster.
    ///
    /// Reads band 1, standardizes, resizes to the model input, runs the
    /// forward pass and thresholds sigmoid probabilities strictly above
    /// 0.5 into foreground. The mask comes back at the model's output
    /// resolution together with the patch georeferencing; nothing here
    /// is random, so reruns produce identical masks.
    pub fn predict(&self, patch_path: &Path) -> LakeResult<Prediction> {
        self.predict_inner(patch_path).map_err(|e| match e {
            already @ LakeError::InferenceFailure { .. } => already,
            other => LakeError::InferenceFailure {
                source_id: source_id(patch_path),
                reason: other.to_string(),
            },
        })
    }

    fn predict_inner(&self, patch_path: &Path) -> LakeResult<Prediction> {
        let (samples, geo_transform, projection) = raster::read_band_f32(patch_path)?;

        let standardized = standardize(&samples);
        let size = self.model.input_size();
        let resized = resize_bilinear(&standardized, size, size)?;
        let input = resized.insert_axis(Axis(0)).insert_axis(Axis(0));

        let logits = self.model.predict_logits(input.view())?;
        let mask = threshold_mask(&logits, 0.5);

        log::debug!(
            "Predicted {} foreground pixels for {}",
            mask.iter().filter(|&&v| v == 1).count(),
            patch_path.display()
        );

        Ok(Prediction {
            original: samples,
            mask,
            geo_transform,
            projection,
        })
    }

    /// Persist a mask with the georeferencing of its source patch.
    ///
    /// The full profile (dimensions, geotransform, projection, nodata)
    /// is copied from the patch; the band type becomes unsigned 8-bit
    /// with lossless LZW compression. The output name is deterministic
    /// (`{patch_stem}_mask.tif`) and an existing file is overwritten,
    /// last write wins. The padding stage upstream guarantees patches
    /// arrive at the model size; a mask whose dimensions disagree with
    /// the patch would carry a lying geotransform, so that case fails
    /// instead of writing.
    pub fn save_mask(
        &self,
        mask: &MaskImage,
        source_patch: &Path,
        output_dir: &Path,
    ) -> LakeResult<PathBuf> {
        let profile = RasterProfile::from_path(source_patch)?;
        let (mask_height, mask_width) = mask.dim();
        if (mask_width, mask_height) != (profile.width, profile.height) {
            return Err(LakeError::InferenceFailure {
                source_id: source_id(source_patch),
                reason: format!(
                    "mask is {}x{} but the source patch is {}x{}; pad patches to the model size before inference",
                    mask_width, mask_height, profile.width, profile.height
                ),
            });
        }

        let stem = source_patch
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| LakeError::Processing("patch path has no file stem".to_string()))?;

        std::fs::create_dir_all(output_dir)?;
        let output_path = output_dir.join(format!("{}_mask.tif", stem));

        raster::write_u8_geotiff(&output_path, mask, &profile, Some("LZW"))?;
        log::info!("Mask saved to {}", output_path.display());

        Ok(output_path)
    }
}

/// Identity-logit predictor for exercising the pipeline without a
/// trained checkpoint: foreground is everything brighter than the patch
/// mean after standardization.
#[derive(Debug, Clone)]
pub struct StubPredictor {
    pub input_size: usize,
}

impl StubPredictor {
    pub fn new(input_size: usize) -> Self {
        Self { input_size }
    }
}

impl MaskPredictor for StubPredictor {
    fn input_size(&self) -> usize {
        self.input_size
    }

    fn predict_logits(&self, input: ArrayView4<f32>) -> LakeResult<Array2<f32>> {
        let shape = input.shape();
        if shape[0] != 1 || shape[1] != 1 {
            return Err(LakeError::Processing(format!(
                "expected a (1, 1, S, S) tensor, got {:?}",
                shape
            )));
        }
        Ok(input.slice(s![0, 0, .., ..]).to_owned())
    }
}
