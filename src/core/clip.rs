use crate::io::raster;
use crate::types::{
    source_id, BoundingBox, GeoTransform, LakeError, LakeResult, Patch, RegionOfInterest,
};
use gdal::raster::{rasterize, ResampleAlg};
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::vector::Geometry;
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use std::path::Path;

/// AOI clipping parameters
#[derive(Debug, Clone)]
pub struct ClipParams {
    /// Output pixel resolution (x, y) in raster CRS units
    pub target_resolution: (f64, f64),
    /// Fill value for pixels outside the polygon or source coverage
    pub nodata: f64,
}

impl Default for ClipParams {
    fn default() -> Self {
        Self {
            // RTC products are ordered at 20 m
            target_resolution: (20.0, 20.0),
            nodata: 0.0,
        }
    }
}

/// Clips source rasters to an AOI polygon on a resolution-aligned grid.
///
/// The polygon is reprojected into the raster CRS internally and the
/// output grid origin snaps to multiples of the target resolution, so
/// patches clipped from neighbouring scenes compose without fractional
/// pixel offsets.
pub struct AoiClipper {
    params: ClipParams,
}

impl AoiClipper {
    pub fn new(params: ClipParams) -> Self {
        Self { params }
    }

    /// Clipper with a square target resolution and nodata 0
    pub fn with_resolution(resolution: f64) -> Self {
        Self::new(ClipParams {
            target_resolution: (resolution, resolution),
            ..ClipParams::default()
        })
    }

    /// Clip `source` to the ROI polygon and write the patch GeoTIFF.
    ///
    /// Output naming is deterministic: `{stem}_clipped_to_{label}AOI.tif`
    /// inside `output_dir`, overwritten on rerun. Every failure surfaces
    /// as a `ClipFailure` carrying the source identifier; callers skip
    /// the scene and keep the batch alive.
    pub fn clip(
        &self,
        source: &Path,
        roi: &RegionOfInterest,
        output_dir: &Path,
        region_label: &str,
    ) -> LakeResult<Patch> {
        self.clip_inner(source, roi, output_dir, region_label)
            .map_err(|e| match e {
                already @ LakeError::ClipFailure { .. } => already,
                other => LakeError::ClipFailure {
                    source_id: source_id(source),
                    reason: other.to_string(),
                },
            })
    }

    fn clip_inner(
        &self,
        source: &Path,
        roi: &RegionOfInterest,
        output_dir: &Path,
        region_label: &str,
    ) -> LakeResult<Patch> {
        let (xres, yres) = self.params.target_resolution;
        if xres <= 0.0 || yres <= 0.0 {
            return Err(LakeError::Processing(format!(
                "target resolution must be positive, got {}x{}",
                xres, yres
            )));
        }

        let dataset = Dataset::open(source)?;
        let src_gt = GeoTransform::from_gdal(dataset.geo_transform()?);
        let projection = dataset.projection();
        if projection.is_empty() {
            return Err(LakeError::Processing(
                "source raster carries no CRS".to_string(),
            ));
        }
        let raster_srs = dataset.spatial_ref()?;

        let polygon = reproject_roi(roi, &raster_srs)?;
        let envelope = polygon.envelope();
        let bounds = align_bounds(
            BoundingBox {
                min_x: envelope.MinX,
                max_x: envelope.MaxX,
                min_y: envelope.MinY,
                max_y: envelope.MaxY,
            },
            xres,
            yres,
        )?;

        let out_width = (bounds.width() / xres).round() as usize;
        let out_height = (bounds.height() / yres).round() as usize;
        if out_width == 0 || out_height == 0 {
            return Err(LakeError::Processing(
                "ROI polygon collapses to an empty pixel grid".to_string(),
            ));
        }

        let out_gt = GeoTransform::from_gdal([bounds.min_x, xres, 0.0, bounds.max_y, 0.0, -yres]);
        log::debug!(
            "Clip grid: {}x{} px at {}x{} starting ({}, {})",
            out_width,
            out_height,
            xres,
            yres,
            bounds.min_x,
            bounds.max_y
        );

        let band = dataset.rasterband(1)?;
        let src_nodata = band.no_data_value();
        let (src_width, src_height) = dataset.raster_size();

        // Pixel window of the aligned bounds in the source grid
        let (px0, py0) = src_gt.geo_to_pixel(bounds.min_x, bounds.max_y);
        let (px1, py1) = src_gt.geo_to_pixel(bounds.max_x, bounds.min_y);
        let px0 = px0.round() as isize;
        let py0 = py0.round() as isize;
        let px1 = px1.round() as isize;
        let py1 = py1.round() as isize;

        let px0_clamped = px0.max(0);
        let py0_clamped = py0.max(0);
        let px1_clamped = px1.min(src_width as isize);
        let py1_clamped = py1.min(src_height as isize);
        if px0_clamped >= px1_clamped || py0_clamped >= py1_clamped {
            return Err(LakeError::Processing(
                "ROI polygon does not overlap the source raster coverage".to_string(),
            ));
        }

        // Portion of the output grid covered by source data; anything
        // outside stays nodata.
        let scale_x = src_gt.pixel_width / xres;
        let scale_y = src_gt.pixel_height.abs() / yres;
        let out_off_x = ((px0_clamped - px0) as f64 * scale_x).round() as usize;
        let out_off_y = ((py0_clamped - py0) as f64 * scale_y).round() as usize;
        let window_width = (px1_clamped - px0_clamped) as usize;
        let window_height = (py1_clamped - py0_clamped) as usize;
        let sub_width =
            (((window_width as f64) * scale_x).round() as usize).min(out_width - out_off_x);
        let sub_height =
            (((window_height as f64) * scale_y).round() as usize).min(out_height - out_off_y);
        if sub_width == 0 || sub_height == 0 {
            return Err(LakeError::Processing(
                "ROI polygon does not overlap the source raster coverage".to_string(),
            ));
        }

        let buffer = band.read_as::<f32>(
            (px0_clamped, py0_clamped),
            (window_width, window_height),
            (sub_width, sub_height),
            Some(ResampleAlg::NearestNeighbour),
        )?;
        let window = Array2::from_shape_vec((sub_height, sub_width), buffer.data)
            .map_err(|e| LakeError::Processing(format!("failed to reshape clip window: {}", e)))?;

        let nodata = self.params.nodata as f32;
        let mut data = Array2::<f32>::from_elem((out_height, out_width), nodata);
        for ((row, col), value) in window.indexed_iter() {
            let sample = match src_nodata {
                Some(nd) if (*value as f64) == nd => nodata,
                _ => *value,
            };
            data[[out_off_y + row, out_off_x + col]] = sample;
        }

        // Cutline crop: burn the polygon on the output grid and blank
        // everything outside it.
        let cutline = rasterize_cutline(polygon, &out_gt, &projection, out_width, out_height)?;
        for ((row, col), inside) in cutline.indexed_iter() {
            if *inside == 0 {
                data[[row, col]] = nodata;
            }
        }

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| LakeError::Processing("source path has no file stem".to_string()))?;
        std::fs::create_dir_all(output_dir)?;
        let output_path = output_dir.join(format!("{}_clipped_to_{}AOI.tif", stem, region_label));

        raster::write_f32_geotiff(
            &output_path,
            &data,
            &out_gt,
            &projection,
            Some(self.params.nodata),
        )?;
        log::info!("Clipped raster saved to {}", output_path.display());

        Ok(Patch {
            path: output_path,
            geo_transform: out_gt,
            projection,
            width: out_width,
            height: out_height,
            resolution: (xres, yres),
        })
    }
}

/// Parse the ROI polygon and reproject it into the raster CRS.
///
/// WKT polygons are written x/y (lon/lat for geographic CRS), so both
/// sides of the transform are forced to traditional GIS axis order.
fn reproject_roi(roi: &RegionOfInterest, raster_srs: &SpatialRef) -> LakeResult<Geometry> {
    let mut polygon = Geometry::from_wkt(&roi.wkt)
        .map_err(|e| LakeError::InvalidRoi(format!("unparseable WKT: {}", e)))?;

    let mut roi_srs = SpatialRef::from_epsg(roi.epsg)
        .map_err(|e| LakeError::InvalidRoi(format!("unknown EPSG:{}: {}", roi.epsg, e)))?;
    roi_srs.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);

    let mut target_srs = raster_srs.clone();
    target_srs
        .set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);

    let transform = CoordTransform::new(&roi_srs, &target_srs)?;
    polygon.transform_inplace(&transform)?;
    polygon.set_spatial_ref(target_srs);

    let envelope = polygon.envelope();
    if envelope.MaxX <= envelope.MinX || envelope.MaxY <= envelope.MinY {
        return Err(LakeError::InvalidRoi(
            "polygon has a degenerate extent".to_string(),
        ));
    }

    Ok(polygon)
}

/// Snap an envelope outward to multiples of the target resolution
pub(crate) fn align_bounds(bounds: BoundingBox, xres: f64, yres: f64) -> LakeResult<BoundingBox> {
    if xres <= 0.0 || yres <= 0.0 {
        return Err(LakeError::Processing(format!(
            "target resolution must be positive, got {}x{}",
            xres, yres
        )));
    }

    Ok(BoundingBox {
        min_x: (bounds.min_x / xres).floor() * xres,
        max_x: (bounds.max_x / xres).ceil() * xres,
        min_y: (bounds.min_y / yres).floor() * yres,
        max_y: (bounds.max_y / yres).ceil() * yres,
    })
}

/// Burn the polygon into a mask on the output grid (1 inside, 0 outside)
fn rasterize_cutline(
    polygon: Geometry,
    out_gt: &GeoTransform,
    projection: &str,
    width: usize,
    height: usize,
) -> LakeResult<Array2<u8>> {
    let driver = DriverManager::get_driver_by_name("MEM")?;
    let mut mask_ds =
        driver.create_with_band_type::<u8, _>("", width as isize, height as isize, 1)?;
    mask_ds.set_geo_transform(&out_gt.to_gdal())?;
    mask_ds.set_projection(projection)?;

    rasterize(
        &mut mask_ds,
        &[1],
        std::slice::from_ref(&polygon),
        &[1.0],
        None,
    )?;

    let buffer = mask_ds
        .rasterband(1)?
        .read_as::<u8>((0, 0), (width, height), (width, height), None)?;
    Array2::from_shape_vec((height, width), buffer.data)
        .map_err(|e| LakeError::Processing(format!("failed to reshape cutline mask: {}", e)))
}
