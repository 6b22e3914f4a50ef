use crate::core::area::AreaCalculator;
use crate::core::clip::{AoiClipper, ClipParams};
use crate::core::inference::{InferenceEngine, MaskPredictor};
use crate::io::{archive, download::ProductDownloader};
use crate::types::{
    source_id, AcquisitionRequest, AreaMeasurement, LakeError, LakeResult, RegionOfInterest,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Scene acquisition seam.
///
/// Search, job submission and polling against the remote processing
/// service live behind this trait; the pipeline only relies on "zero or
/// more raster files appear on local storage".
pub trait SceneProvider: Send + Sync {
    fn fetch_scenes(
        &self,
        request: &AcquisitionRequest,
        download_dir: &Path,
    ) -> LakeResult<Vec<PathBuf>>;
}

/// Padding/normalization seam.
///
/// Given a clipped patch and an output location, the collaborator must
/// produce a patch padded to the spatial shape the inference engine
/// expects.
pub trait PatchNormalizer: Send + Sync {
    fn normalize(&self, patch: &Path, output: &Path) -> LakeResult<PathBuf>;
}

/// Pass-through normalizer for patches that already match the model
/// input shape
pub struct IdentityNormalizer;

impl PatchNormalizer for IdentityNormalizer {
    fn normalize(&self, patch: &Path, output: &Path) -> LakeResult<PathBuf> {
        if patch == output {
            return Ok(patch.to_path_buf());
        }
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(patch, output)?;
        Ok(output.to_path_buf())
    }
}

/// Scene provider fed with pre-resolved product URLs: downloads each
/// archive and extracts its VV measurement raster, skipping products
/// that fail to download or unpack.
pub struct UrlSceneProvider {
    urls: Vec<String>,
    downloader: ProductDownloader,
}

impl UrlSceneProvider {
    pub fn new(urls: Vec<String>) -> LakeResult<Self> {
        Ok(Self {
            urls,
            downloader: ProductDownloader::new()?,
        })
    }
}

impl SceneProvider for UrlSceneProvider {
    fn fetch_scenes(
        &self,
        _request: &AcquisitionRequest,
        download_dir: &Path,
    ) -> LakeResult<Vec<PathBuf>> {
        let archives = self.downloader.download_all(&self.urls, download_dir);
        let scene_dir = download_dir.join("scenes");

        let mut scenes = Vec::new();
        for archive_path in archives {
            match archive::extract_measurement(&archive_path, &scene_dir) {
                Ok(scene) => scenes.push(scene),
                Err(e) => log::warn!("Product could not be prepared: {}", e),
            }
        }
        Ok(scenes)
    }
}

/// Pipeline configuration: where patches, padded patches and masks land
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Label embedded in patch file names, typically the lake name
    pub region_label: String,
    pub roi: RegionOfInterest,
    /// Target patch resolution (x, y) in raster CRS units
    pub target_resolution: (f64, f64),
    pub patch_dir: PathBuf,
    pub padded_dir: PathBuf,
    pub mask_dir: PathBuf,
}

/// Everything produced for one successfully processed scene
#[derive(Debug, Clone, Serialize)]
pub struct SceneReport {
    pub scene: PathBuf,
    pub patch: PathBuf,
    pub mask: PathBuf,
    pub area: AreaMeasurement,
}

/// A scene the batch driver gave up on, with enough context to rerun it
#[derive(Debug, Clone, Serialize)]
pub struct SkippedScene {
    pub scene: PathBuf,
    pub reason: String,
}

/// Outcome of a batch run
#[derive(Debug, Default, Serialize)]
pub struct BatchSummary {
    pub reports: Vec<SceneReport>,
    pub skipped: Vec<SkippedScene>,
}

/// End-to-end measurement pipeline: clip, normalize, segment, measure.
///
/// The model is loaded once and reused read-only across all scenes.
pub struct LakePipeline<M: MaskPredictor> {
    clipper: AoiClipper,
    engine: InferenceEngine<M>,
    normalizer: Box<dyn PatchNormalizer>,
    config: PipelineConfig,
}

impl<M: MaskPredictor> LakePipeline<M> {
    pub fn new(model: M, config: PipelineConfig) -> Self {
        let clipper = AoiClipper::new(ClipParams {
            target_resolution: config.target_resolution,
            nodata: 0.0,
        });
        Self {
            clipper,
            engine: InferenceEngine::new(model),
            normalizer: Box::new(IdentityNormalizer),
            config,
        }
    }

    /// Swap in a padding/normalization collaborator
    pub fn with_normalizer(mut self, normalizer: Box<dyn PatchNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one scene through the whole pipeline.
    ///
    /// Any stage failure surfaces as the stage's own error variant so a
    /// batch driver can log it and move on; nothing here aborts the
    /// process.
    pub fn process_scene(&self, scene: &Path) -> LakeResult<SceneReport> {
        log::info!("Processing {}", source_id(scene));

        let patch = self.clipper.clip(
            scene,
            &self.config.roi,
            &self.config.patch_dir,
            &self.config.region_label,
        )?;

        let padded_target = self.config.padded_dir.join(source_id(&patch.path));
        let padded = self.normalizer.normalize(&patch.path, &padded_target)?;

        let prediction = self.engine.predict(&padded)?;
        let mask = self
            .engine
            .save_mask(&prediction.mask, &padded, &self.config.mask_dir)?;

        let area = AreaCalculator::measure(&mask)?;

        Ok(SceneReport {
            scene: scene.to_path_buf(),
            patch: patch.path,
            mask,
            area,
        })
    }

    /// Process scenes in order, skipping failures.
    ///
    /// Per-scene failures are logged with the scene id and the failing
    /// stage's cause, then recorded in the summary; the batch never
    /// aborts on one bad scene. With the `parallel` feature scenes fan
    /// out over a rayon pool: patches are independent, the model is
    /// read-only and every output path is unique, so nothing races.
    pub fn run_batch(&self, scenes: &[PathBuf]) -> BatchSummary {
        #[cfg(feature = "parallel")]
        let outcomes: Vec<(PathBuf, LakeResult<SceneReport>)> = scenes
            .par_iter()
            .map(|scene| (scene.clone(), self.process_scene(scene)))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<(PathBuf, LakeResult<SceneReport>)> = scenes
            .iter()
            .map(|scene| (scene.clone(), self.process_scene(scene)))
            .collect();

        let mut summary = BatchSummary::default();
        for (scene, outcome) in outcomes {
            match outcome {
                Ok(report) => summary.reports.push(report),
                Err(e) => {
                    log::warn!("Skipping {}: {}", source_id(&scene), e);
                    summary.skipped.push(SkippedScene {
                        scene,
                        reason: e.to_string(),
                    });
                }
            }
        }

        log::info!(
            "Batch complete: {} processed, {} skipped",
            summary.reports.len(),
            summary.skipped.len()
        );
        summary
    }

    /// Fetch scenes through a provider, then run the batch over them
    pub fn run_request(
        &self,
        provider: &dyn SceneProvider,
        request: &AcquisitionRequest,
        download_dir: &Path,
    ) -> LakeResult<BatchSummary> {
        let scenes = provider.fetch_scenes(request, download_dir)?;
        if scenes.is_empty() {
            log::warn!("Provider returned no scenes for the request");
        }
        Ok(self.run_batch(&scenes))
    }
}

/// Resolve an input path into the list of scene rasters to process.
///
/// A file is taken as-is; a directory contributes its GeoTIFFs in name
/// order so batches are deterministic.
pub fn collect_scenes(input: &Path) -> LakeResult<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(LakeError::Processing(format!(
            "input {} is neither a file nor a directory",
            input.display()
        )));
    }

    let mut scenes: Vec<PathBuf> = fs::read_dir(input)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
                .unwrap_or(false)
        })
        .collect();
    scenes.sort();
    Ok(scenes)
}
