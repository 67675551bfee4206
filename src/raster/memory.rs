use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, info};

use super::{RasterInfo, RasterSource, RasterTile};
use crate::error::{Result, TerrainError};
use crate::quadtree::key::{MAX_LEVEL, TileKey};
use crate::transform::ProjectionInfo;

/// Tiling parameters for [`MemoryPyramid::from_grid`].
#[derive(Debug, Clone)]
pub struct PyramidLayout {
    pub tile_width: usize,
    pub tile_length: usize,
    pub pixel_width: f64,
    pub pixel_length: f64,
    pub fill_value: f32,
    pub projection: Option<ProjectionInfo>,
}

impl Default for PyramidLayout {
    fn default() -> Self {
        Self {
            tile_width: 256,
            tile_length: 256,
            pixel_width: 1.0,
            pixel_length: 1.0,
            fill_value: f32::NAN,
            projection: None,
        }
    }
}

/// Elevation pyramid held in memory, built by block-averaging a
/// full-resolution grid.
#[derive(Debug, Clone)]
pub struct MemoryPyramid {
    info: RasterInfo,
    tiles: HashMap<TileKey, RasterTile>,
}

impl MemoryPyramid {
    /// Tile a row-major `width x length` grid (row 0 = north) into a
    /// pyramid. The grid is padded with missing data up to
    /// `tile * 2^(levels-1)` on each axis.
    pub fn from_grid(
        grid: &[f32],
        width: usize,
        length: usize,
        layout: PyramidLayout,
    ) -> Result<Self> {
        if grid.len() != width * length {
            return Err(TerrainError::Raster(format!(
                "grid holds {} samples, expected {width}x{length}",
                grid.len()
            )));
        }
        if layout.tile_width == 0 || layout.tile_length == 0 {
            return Err(TerrainError::Raster("tile size must be non-zero".into()));
        }
        if width == 0 || length == 0 {
            return Err(TerrainError::Raster("grid must not be empty".into()));
        }

        let mut levels = 1;
        while layout.tile_width << (levels - 1) < width || layout.tile_length << (levels - 1) < length {
            levels += 1;
            if levels > MAX_LEVEL + 1 {
                return Err(TerrainError::Raster(format!(
                    "{width}x{length} grid needs more than {} levels",
                    MAX_LEVEL + 1
                )));
            }
        }
        let raster_width = layout.tile_width << (levels - 1);
        let raster_length = layout.tile_length << (levels - 1);

        // Missing samples become NaN in the padded working copy.
        let mut padded = vec![f32::NAN; raster_width * raster_length];
        let mut min_elevation = f64::INFINITY;
        let mut max_elevation = f64::NEG_INFINITY;
        for (row, src) in grid.chunks_exact(width).enumerate() {
            let dst = &mut padded[row * raster_width..row * raster_width + width];
            for (d, &s) in dst.iter_mut().zip(src) {
                if s.is_nan() || s == layout.fill_value {
                    continue;
                }
                *d = s;
                min_elevation = min_elevation.min(s as f64);
                max_elevation = max_elevation.max(s as f64);
            }
        }
        if !min_elevation.is_finite() {
            return Err(TerrainError::Raster("grid contains no valid elevation samples".into()));
        }

        let info = RasterInfo {
            raster_width,
            raster_length,
            tile_width: layout.tile_width,
            tile_length: layout.tile_length,
            pixel_width: layout.pixel_width,
            pixel_length: layout.pixel_length,
            fill_value: layout.fill_value,
            min_elevation,
            max_elevation,
            levels,
            projection: layout.projection,
        };
        info.validate()?;

        let mut tiles = HashMap::new();
        for level in 0..levels {
            let side = 1usize << level;
            let step = 1usize << (levels - 1 - level);
            let level_tiles = (0..side * side)
                .into_par_iter()
                .map(|index| {
                    let (row, column) = (index / side, index % side);
                    let key = TileKey::from_grid_index(level, row, column)?;
                    let tile = downsample(&padded, &info, row, column, step);
                    Ok((key, tile))
                })
                .collect::<Result<Vec<_>>>()?;
            debug!(level, tiles = level_tiles.len(), step, "Built pyramid level");
            tiles.extend(level_tiles);
        }

        info!(
            width,
            length,
            levels,
            tiles = tiles.len(),
            "Built in-memory elevation pyramid"
        );
        Ok(Self { info, tiles })
    }

    /// Drop a tile so that [`RasterSource::tile_exists`] reports it absent.
    pub fn remove_tile(&mut self, key: &TileKey) -> Option<RasterTile> {
        self.tiles.remove(key)
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }
}

/// Mean of the valid full-resolution samples under each tile sample;
/// blocks without any become the fill value.
fn downsample(padded: &[f32], info: &RasterInfo, row: usize, column: usize, step: usize) -> RasterTile {
    let (tw, tl) = (info.tile_width, info.tile_length);
    let mut samples = Vec::with_capacity(tw * tl);
    for r in 0..tl {
        let y0 = (row * tl + r) * step;
        for c in 0..tw {
            let x0 = (column * tw + c) * step;
            let mut sum = 0.0f64;
            let mut count = 0usize;
            for y in y0..y0 + step {
                let line = &padded[y * info.raster_width + x0..y * info.raster_width + x0 + step];
                for &v in line.iter().filter(|v| !v.is_nan()) {
                    sum += v as f64;
                    count += 1;
                }
            }
            samples.push(if count == 0 {
                info.fill_value
            } else {
                (sum / count as f64) as f32
            });
        }
    }
    RasterTile {
        columns: tw,
        rows: tl,
        samples,
    }
}

impl RasterSource for MemoryPyramid {
    fn info(&self) -> &RasterInfo {
        &self.info
    }

    fn tile_exists(&self, key: &TileKey) -> bool {
        self.tiles.contains_key(key)
    }

    fn read_tile(&self, key: &TileKey) -> Result<RasterTile> {
        self.tiles
            .get(key)
            .cloned()
            .ok_or_else(|| TerrainError::Raster(format!("tile {key} not in pyramid")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(tile: usize) -> PyramidLayout {
        PyramidLayout {
            tile_width: tile,
            tile_length: tile,
            fill_value: -9999.0,
            ..Default::default()
        }
    }

    #[test]
    fn single_tile_grid_has_one_level() {
        let grid: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let pyramid = MemoryPyramid::from_grid(&grid, 4, 4, layout(4)).unwrap();
        let info = pyramid.info();
        assert_eq!(info.levels, 1);
        assert_eq!(pyramid.tile_count(), 1);
        assert_eq!(info.min_elevation, 0.0);
        assert_eq!(info.max_elevation, 15.0);
        assert_eq!(pyramid.read_tile(&TileKey::root()).unwrap().samples, grid);
    }

    #[test]
    fn levels_and_block_means() {
        // 4x4 grid, 2x2 tiles: level 0 averages 2x2 blocks.
        let grid: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let pyramid = MemoryPyramid::from_grid(&grid, 4, 4, layout(2)).unwrap();
        assert_eq!(pyramid.info().levels, 2);
        assert_eq!(pyramid.tile_count(), 5);

        let root = pyramid.read_tile(&TileKey::root()).unwrap();
        assert_eq!(root.samples, vec![2.5, 4.5, 10.5, 12.5]);

        let ne = TileKey::from_grid_index(1, 0, 1).unwrap();
        assert_eq!(pyramid.read_tile(&ne).unwrap().samples, vec![2.0, 3.0, 6.0, 7.0]);
    }

    #[test]
    fn padding_is_fill_and_means_skip_missing() {
        // 3x2 grid padded to 4x4 with a 2x2 tile.
        let grid = vec![1.0, -9999.0, 3.0, 5.0, 7.0, 9.0];
        let pyramid = MemoryPyramid::from_grid(&grid, 3, 2, layout(2)).unwrap();
        let info = pyramid.info();
        assert_eq!((info.raster_width, info.raster_length), (4, 4));
        assert_eq!(info.min_elevation, 1.0);
        assert_eq!(info.max_elevation, 9.0);

        let root = pyramid.read_tile(&TileKey::root()).unwrap();
        // NW block {1, fill, 5, 7} averages the three valid samples.
        assert!((root.samples[0] - 13.0 / 3.0).abs() < 1e-6);
        // NE block {3, pad, 9, pad}.
        assert_eq!(root.samples[1], 6.0);
        // Southern half is padding only.
        assert_eq!(root.samples[2], -9999.0);
        assert_eq!(root.samples[3], -9999.0);

        let se = TileKey::from_grid_index(1, 1, 1).unwrap();
        let tile = pyramid.read_tile(&se).unwrap();
        assert!(tile.samples.iter().all(|&v| info.is_missing(v)));
    }

    #[test]
    fn remove_tile_hides_it() {
        let grid = vec![1.0f32; 16];
        let mut pyramid = MemoryPyramid::from_grid(&grid, 4, 4, layout(2)).unwrap();
        let key = TileKey::from_grid_index(1, 1, 0).unwrap();
        assert!(pyramid.tile_exists(&key));
        assert!(pyramid.remove_tile(&key).is_some());
        assert!(!pyramid.tile_exists(&key));
        assert!(pyramid.read_tile(&key).is_err());
    }

    #[test]
    fn rejects_bad_grids() {
        assert!(MemoryPyramid::from_grid(&[1.0; 3], 2, 2, layout(2)).is_err());
        assert!(MemoryPyramid::from_grid(&[f32::NAN; 4], 2, 2, layout(2)).is_err());
        assert!(MemoryPyramid::from_grid(&[1.0; 4], 2, 2, layout(0)).is_err());
    }
}
