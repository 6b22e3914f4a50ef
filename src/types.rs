use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Real-valued backscatter sample data
pub type SarReal = f32;

/// 2D backscatter array (row x column)
pub type SarRealImage = Array2<SarReal>;

/// Binary water mask array, values in {0, 1}
pub type MaskImage = Array2<u8>;

/// Geospatial transformation parameters (pixel -> world affine mapping)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Build from the GDAL six-element coefficient array
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    /// Convert back to the GDAL coefficient array
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Convert pixel (col, row) to world coordinates
    pub fn pixel_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.top_left_x + col * self.pixel_width + row * self.rotation_x;
        let y = self.top_left_y + col * self.rotation_y + row * self.pixel_height;
        (x, y)
    }

    /// Convert world (x, y) to pixel (col, row), assuming a north-up grid
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let col = (x - self.top_left_x) / self.pixel_width;
        let row = (y - self.top_left_y) / self.pixel_height;
        (col, row)
    }

    /// Absolute pixel resolution (x, y) in CRS units
    pub fn resolution(&self) -> (f64, f64) {
        (self.pixel_width.abs(), self.pixel_height.abs())
    }

    /// Footprint of a single pixel in squared CRS units.
    ///
    /// Uses the absolute value of the axis product so the result is
    /// independent of the sign convention of the y resolution.
    pub fn pixel_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height).abs()
    }
}

/// Geospatial bounding box in an implied CRS
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Region of interest polygon used as the clip boundary.
///
/// The polygon carries its own CRS; the clipper reprojects it into the
/// raster CRS, callers never have to pre-reproject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionOfInterest {
    /// Polygon in well-known text
    pub wkt: String,
    /// EPSG code of the coordinate system the WKT is expressed in
    pub epsg: u32,
}

impl RegionOfInterest {
    /// ROI in geographic WGS84 coordinates, the CRS AOI polygons are
    /// delivered in
    pub fn wgs84(wkt: impl Into<String>) -> Self {
        Self {
            wkt: wkt.into(),
            epsg: 4326,
        }
    }
}

/// A clipped raster patch, the unit of inference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patch {
    pub path: PathBuf,
    pub geo_transform: GeoTransform,
    /// Projection copied verbatim from the source raster (WKT)
    pub projection: String,
    pub width: usize,
    pub height: usize,
    /// Absolute pixel resolution (x, y) in CRS units
    pub resolution: (f64, f64),
}

/// Surface area derived from a binary water mask.
///
/// Reported only, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaMeasurement {
    pub mask_name: String,
    /// Absolute pixel resolution (x, y) in meters
    pub pixel_resolution: (f64, f64),
    /// Pixels carrying the foreground label (1)
    pub water_pixels: u64,
    pub square_meters: f64,
    pub square_kilometers: f64,
}

impl std::fmt::Display for AreaMeasurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Analysis for: {}", self.mask_name)?;
        writeln!(
            f,
            "  - Pixel resolution: {:.2}m x {:.2}m",
            self.pixel_resolution.0, self.pixel_resolution.1
        )?;
        writeln!(f, "  - Detected water pixels: {}", self.water_pixels)?;
        write!(
            f,
            "  - Total surface area: {:.4} sq. km",
            self.square_kilometers
        )
    }
}

/// Acquisition window handed to a scene provider.
///
/// The remote search and job submission live outside this crate; the
/// request only carries what a provider needs to resolve products.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionRequest {
    /// AOI polygon the products must intersect
    pub roi: RegionOfInterest,
    /// Years to cover, one seasonal window per year
    pub years: Vec<i32>,
    /// Start of the seasonal window (month/day applied per year)
    pub season_start: NaiveDate,
    /// End of the seasonal window
    pub season_end: NaiveDate,
}

/// Error types for the lake measurement pipeline
#[derive(Debug, thiserror::Error)]
pub enum LakeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("clipping {source_id} failed: {reason}")]
    ClipFailure { source_id: String, reason: String },

    #[error("model load failed: {0}")]
    ModelLoadFailure(String),

    #[error("inference on {source_id} failed: {reason}")]
    InferenceFailure { source_id: String, reason: String },

    #[error("mask file not found: {0}")]
    MaskNotFound(PathBuf),

    #[error("extracting {archive} failed: {reason}")]
    ExtractionFailure { archive: String, reason: String },

    #[error("download failed: {0}")]
    Download(String),

    #[error("invalid region of interest: {0}")]
    InvalidRoi(String),

    #[error("processing error: {0}")]
    Processing(String),
}

impl LakeError {
    /// Whether the error invalidates the whole run.
    ///
    /// Only a failed model load is fatal; everything else is recoverable
    /// at the batch level by skipping the affected scene.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LakeError::ModelLoadFailure(_))
    }
}

/// Result type for lake measurement operations
pub type LakeResult<T> = Result<T, LakeError>;

/// Derive the source identifier used in per-scene error context
pub fn source_id(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
