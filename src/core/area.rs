use crate::io::raster;
use crate::types::{source_id, AreaMeasurement, LakeError, LakeResult};
use std::path::Path;

/// Label a foreground pixel carries in a binary water mask
const FOREGROUND: u8 = 1;

/// Converts binary water masks into physical surface area
pub struct AreaCalculator;

impl AreaCalculator {
    /// Measure the water surface area of a mask raster.
    ///
    /// The per-pixel footprint comes from the mask's own geotransform as
    /// the absolute product of the axis resolutions, so the result does
    /// not depend on the sign convention of the y axis. Only pixels that
    /// carry the foreground label exactly are counted; nodata,
    /// background and any stray value stay out of the sum.
    ///
    /// A missing mask is a skippable unit of work, reported as
    /// `MaskNotFound` rather than a hard fault.
    pub fn measure<P: AsRef<Path>>(mask_path: P) -> LakeResult<AreaMeasurement> {
        let mask_path = mask_path.as_ref();
        if !mask_path.exists() {
            return Err(LakeError::MaskNotFound(mask_path.to_path_buf()));
        }

        let (labels, geo_transform) = raster::read_band_u8(mask_path)?;
        let (res_x, res_y) = geo_transform.resolution();
        let pixel_area = geo_transform.pixel_area();
        if pixel_area == 0.0 {
            return Err(LakeError::Processing(format!(
                "mask {} has a degenerate pixel resolution {}x{}",
                mask_path.display(),
                res_x,
                res_y
            )));
        }

        let water_pixels = labels.iter().filter(|&&v| v == FOREGROUND).count() as u64;
        let square_meters = water_pixels as f64 * pixel_area;
        let square_kilometers = square_meters / 1_000_000.0;

        let measurement = AreaMeasurement {
            mask_name: source_id(mask_path),
            pixel_resolution: (res_x, res_y),
            water_pixels,
            square_meters,
            square_kilometers,
        };

        log::info!("{}", measurement);
        Ok(measurement)
    }
}
