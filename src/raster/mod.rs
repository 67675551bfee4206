pub mod file;
pub mod memory;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};
use crate::quadtree::key::{MAX_LEVEL, TileKey};
use crate::transform::ProjectionInfo;

pub use file::{FilePyramid, write_pyramid};
pub use memory::MemoryPyramid;

/// Pixel dimensions below this are treated as millimetre-scale terrain.
const SMALL_PIXEL: f64 = 0.0001;

/// Internal magnification applied to millimetre-scale terrain.
const SMALL_PIXEL_SCALE: f64 = 100.0;

/// Metadata describing an elevation pyramid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterInfo {
    /// Full-resolution raster size in pixels (padded to the pyramid).
    pub raster_width: usize,
    pub raster_length: usize,
    /// Samples per tile along each axis, identical at every level.
    pub tile_width: usize,
    pub tile_length: usize,
    /// Full-resolution pixel size in projected units.
    pub pixel_width: f64,
    pub pixel_length: f64,
    /// Sample value meaning "no data". NaN samples are always missing.
    #[serde(with = "nan_as_null")]
    pub fill_value: f32,
    pub min_elevation: f64,
    pub max_elevation: f64,
    /// Number of pyramid levels; the root is level 0.
    pub levels: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<ProjectionInfo>,
}

impl RasterInfo {
    pub fn validate(&self) -> Result<()> {
        if self.tile_width == 0 || self.tile_length == 0 {
            return Err(TerrainError::Raster(format!(
                "tile size must be non-zero, got {}x{}",
                self.tile_width, self.tile_length
            )));
        }
        if self.raster_width == 0 || self.raster_length == 0 {
            return Err(TerrainError::Raster("raster size must be non-zero".into()));
        }
        if !(self.pixel_width > 0.0 && self.pixel_length > 0.0) {
            return Err(TerrainError::Raster(format!(
                "pixel size must be positive, got {}x{}",
                self.pixel_width, self.pixel_length
            )));
        }
        if self.levels == 0 || self.levels > MAX_LEVEL + 1 {
            return Err(TerrainError::Raster(format!(
                "pyramid depth {} outside 1..={}",
                self.levels,
                MAX_LEVEL + 1
            )));
        }
        if self.min_elevation > self.max_elevation {
            return Err(TerrainError::Raster(format!(
                "minimum elevation {} above maximum {}",
                self.min_elevation, self.max_elevation
            )));
        }
        Ok(())
    }

    /// Level holding the full-resolution data.
    pub fn base_level(&self) -> usize {
        self.levels - 1
    }

    /// Whether a raw sample counts as missing data.
    pub fn is_missing(&self, sample: f32) -> bool {
        sample.is_nan() || sample == self.fill_value
    }

    /// Factor applied to horizontal and vertical coordinates so that
    /// millimetre-scale terrains keep usable precision in mesh and normal
    /// math.
    pub fn pixel_scale(&self) -> f64 {
        if self.pixel_width < SMALL_PIXEL || self.pixel_length < SMALL_PIXEL {
            SMALL_PIXEL_SCALE
        } else {
            1.0
        }
    }

    /// Terrain extent in the local (scaled) frame.
    pub fn scaled_extent(&self) -> (f64, f64) {
        let s = self.pixel_scale();
        (
            self.raster_width as f64 * self.pixel_width * s,
            self.raster_length as f64 * self.pixel_length * s,
        )
    }
}

/// JSON has no NaN; a NaN fill value is stored as `null`.
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        Ok(Option::<f32>::deserialize(deserializer)?.unwrap_or(f32::NAN))
    }
}

/// One tile of raw elevation samples, row-major from the north-west.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterTile {
    pub columns: usize,
    pub rows: usize,
    pub samples: Vec<f32>,
}

/// Supplier of pyramid tiles.
///
/// Implementations are shared between the caller thread and the
/// background build workers.
pub trait RasterSource: Send + Sync {
    fn info(&self) -> &RasterInfo;

    /// Cheap existence probe; must not materialize tile data.
    fn tile_exists(&self, key: &TileKey) -> bool;

    fn read_tile(&self, key: &TileKey) -> Result<RasterTile>;
}
