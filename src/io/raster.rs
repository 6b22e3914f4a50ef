use crate::types::{GeoTransform, LakeError, LakeResult, MaskImage, SarRealImage};
use gdal::raster::{Buffer, RasterCreationOption};
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use std::path::Path;

/// Raster metadata copied between datasets when a derived product must
/// carry the georeferencing of its source.
#[derive(Debug, Clone)]
pub struct RasterProfile {
    pub width: usize,
    pub height: usize,
    pub geo_transform: GeoTransform,
    /// Projection WKT, copied verbatim
    pub projection: String,
    pub nodata: Option<f64>,
}

impl RasterProfile {
    /// Capture the profile of an existing raster
    pub fn from_path<P: AsRef<Path>>(path: P) -> LakeResult<Self> {
        let dataset = Dataset::open(path.as_ref())?;
        let (width, height) = dataset.raster_size();
        let geo_transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let projection = dataset.projection();
        let nodata = dataset.rasterband(1)?.no_data_value();

        Ok(Self {
            width,
            height,
            geo_transform,
            projection,
            nodata,
        })
    }
}

/// Read band 1 of a raster as f32 samples with its georeferencing
pub fn read_band_f32<P: AsRef<Path>>(path: P) -> LakeResult<(SarRealImage, GeoTransform, String)> {
    let dataset = Dataset::open(path.as_ref())?;
    let (width, height) = dataset.raster_size();
    let geo_transform = GeoTransform::from_gdal(dataset.geo_transform()?);
    let projection = dataset.projection();

    log::debug!(
        "Reading {} ({}x{})",
        path.as_ref().display(),
        width,
        height
    );

    let band = dataset.rasterband(1)?;
    let buffer = band.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
    let samples = Array2::from_shape_vec((height, width), buffer.data)
        .map_err(|e| LakeError::Processing(format!("failed to reshape band data: {}", e)))?;

    Ok((samples, geo_transform, projection))
}

/// Read band 1 of a mask raster as u8 labels
pub fn read_band_u8<P: AsRef<Path>>(path: P) -> LakeResult<(MaskImage, GeoTransform)> {
    let dataset = Dataset::open(path.as_ref())?;
    let (width, height) = dataset.raster_size();
    let geo_transform = GeoTransform::from_gdal(dataset.geo_transform()?);

    let band = dataset.rasterband(1)?;
    let buffer = band.read_as::<u8>((0, 0), (width, height), (width, height), None)?;
    let labels = Array2::from_shape_vec((height, width), buffer.data)
        .map_err(|e| LakeError::Processing(format!("failed to reshape band data: {}", e)))?;

    Ok((labels, geo_transform))
}

/// Write a single-band f32 GeoTIFF
pub fn write_f32_geotiff<P: AsRef<Path>>(
    path: P,
    data: &SarRealImage,
    geo_transform: &GeoTransform,
    projection: &str,
    nodata: Option<f64>,
) -> LakeResult<()> {
    let (height, width) = data.dim();
    let driver = DriverManager::get_driver_by_name("GTiff")?;

    let mut dataset =
        driver.create_with_band_type::<f32, _>(path.as_ref(), width as isize, height as isize, 1)?;

    dataset.set_geo_transform(&geo_transform.to_gdal())?;
    dataset.set_projection(projection)?;

    let mut band = dataset.rasterband(1)?;
    let flat: Vec<f32> = data.iter().cloned().collect();
    let buffer = Buffer::new((width, height), flat);
    band.write((0, 0), (width, height), &buffer)?;
    band.set_no_data_value(nodata)?;

    Ok(())
}

/// Write a single-band u8 GeoTIFF with the georeferencing of `profile`.
///
/// The data dimensions must match the profile dimensions; the caller is
/// responsible for checking before handing the array over.
pub fn write_u8_geotiff<P: AsRef<Path>>(
    path: P,
    data: &MaskImage,
    profile: &RasterProfile,
    compression: Option<&str>,
) -> LakeResult<()> {
    let (height, width) = data.dim();
    let driver = DriverManager::get_driver_by_name("GTiff")?;

    let mut options = Vec::new();
    if let Some(comp) = compression {
        options.push(RasterCreationOption {
            key: "COMPRESS",
            value: comp,
        });
    }

    let mut dataset = driver.create_with_band_type_with_options::<u8, _>(
        path.as_ref(),
        width as isize,
        height as isize,
        1,
        &options,
    )?;

    dataset.set_geo_transform(&profile.geo_transform.to_gdal())?;
    dataset.set_projection(&profile.projection)?;

    let mut band = dataset.rasterband(1)?;
    let flat: Vec<u8> = data.iter().cloned().collect();
    let buffer = Buffer::new((width, height), flat);
    band.write((0, 0), (width, height), &buffer)?;
    band.set_no_data_value(profile.nodata)?;

    Ok(())
}
