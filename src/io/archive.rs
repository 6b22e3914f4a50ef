use crate::types::{LakeError, LakeResult};
use regex::Regex;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Pull the VV measurement raster out of a downloaded RTC product archive.
///
/// Product archives are laid out as `<product>/<product>_VV.tif`; if the
/// conventional entry is absent the archive is scanned for any VV GeoTIFF.
/// The extracted file lands flat in `output_dir` under its own file name.
pub fn extract_measurement<P: AsRef<Path>, Q: AsRef<Path>>(
    zip_path: P,
    output_dir: Q,
) -> LakeResult<PathBuf> {
    let zip_path = zip_path.as_ref();
    let archive_name = zip_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| zip_path.display().to_string());

    let extraction_error = |reason: String| LakeError::ExtractionFailure {
        archive: archive_name.clone(),
        reason,
    };

    let file = File::open(zip_path).map_err(|e| extraction_error(format!("open failed: {}", e)))?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| extraction_error(format!("not a zip archive: {}", e)))?;

    let stem = zip_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| extraction_error("archive has no file stem".to_string()))?;
    let conventional = format!("{}/{}_VV.tif", stem, stem);

    let entry_name = if archive.file_names().any(|n| n == conventional) {
        conventional
    } else {
        let vv_pattern = Regex::new(r"_VV\.tiff?$")
            .map_err(|e| extraction_error(format!("bad entry pattern: {}", e)))?;
        archive
            .file_names()
            .find(|n| vv_pattern.is_match(n))
            .map(str::to_string)
            .ok_or_else(|| extraction_error("no VV measurement raster in archive".to_string()))?
    };

    log::info!("Extracting {} from {}", entry_name, archive_name);

    let mut entry = archive
        .by_name(&entry_name)
        .map_err(|e| extraction_error(format!("entry {} unreadable: {}", entry_name, e)))?;

    let out_name = Path::new(&entry_name)
        .file_name()
        .ok_or_else(|| extraction_error(format!("entry {} has no file name", entry_name)))?
        .to_owned();

    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir)?;
    let out_path = output_dir.join(out_name);

    let mut out = File::create(&out_path)?;
    io::copy(&mut entry, &mut out)
        .map_err(|e| extraction_error(format!("writing {} failed: {}", out_path.display(), e)))?;

    log::info!("Measurement raster extracted to {}", out_path.display());
    Ok(out_path)
}
