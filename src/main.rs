use std::fs;
use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::Parser;

use lakesar::{
    collect_scenes, Device, LakePipeline, OnnxSegmentationModel, PipelineConfig, RegionOfInterest,
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Scene GeoTIFF, or a directory of scenes
    input: PathBuf,

    /// Trained segmentation checkpoint (ONNX)
    #[arg(short, long)]
    model: PathBuf,

    /// AOI polygon as WKT, or @file to read it from disk
    #[arg(short, long)]
    wkt: String,

    /// Region label embedded in output file names
    #[arg(short, long, default_value = "lake")]
    region_label: String,

    /// Target patch resolution in meters
    #[arg(long, default_value_t = 20.0)]
    resolution: f64,

    /// Directory for clipped patches
    #[arg(long, default_value = "patches")]
    patch_dir: PathBuf,

    /// Directory for padded patches handed to the model
    #[arg(long, default_value = "padded")]
    padded_dir: PathBuf,

    /// Directory for predicted masks
    #[arg(long, default_value = "masks")]
    mask_dir: PathBuf,

    /// Run inference on this CUDA device instead of the CPU
    #[arg(long)]
    cuda_device: Option<i32>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    ensure!(cli.input.exists(), "input {} not found", cli.input.display());

    let wkt = if let Some(path) = cli.wkt.strip_prefix('@') {
        fs::read_to_string(path)
            .with_context(|| format!("failed to read WKT file {}", path))?
            .trim()
            .to_string()
    } else {
        cli.wkt.clone()
    };

    let device = match cli.cuda_device {
        Some(id) => Device::Cuda(id),
        None => Device::Cpu,
    };

    // A broken checkpoint makes every downstream step pointless; abort
    // right here with the load diagnostic.
    let model = OnnxSegmentationModel::load(&cli.model, device)
        .with_context(|| format!("cannot start without a model from {}", cli.model.display()))?;

    let config = PipelineConfig {
        region_label: cli.region_label,
        roi: RegionOfInterest::wgs84(wkt),
        target_resolution: (cli.resolution, cli.resolution),
        patch_dir: cli.patch_dir,
        padded_dir: cli.padded_dir,
        mask_dir: cli.mask_dir,
    };
    let pipeline = LakePipeline::new(model, config);

    let scenes = collect_scenes(&cli.input)?;
    ensure!(!scenes.is_empty(), "no scene rasters under {}", cli.input.display());

    let summary = pipeline.run_batch(&scenes);

    for report in &summary.reports {
        println!("{}", report.area);
        println!();
    }
    for skipped in &summary.skipped {
        eprintln!("skipped {}: {}", skipped.scene.display(), skipped.reason);
    }
    println!(
        "{} scene(s) processed, {} skipped",
        summary.reports.len(),
        summary.skipped.len()
    );

    Ok(())
}
