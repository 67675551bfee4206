use std::fs::{self, File};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use rayon::prelude::*;
use tracing::{debug, info};

use super::{RasterInfo, RasterSource, RasterTile};
use crate::error::{Result, TerrainError};
use crate::quadtree::key::TileKey;

const MANIFEST: &str = "pyramid.json";
const TILE_DIR: &str = "tiles";
const TILE_FILE: &str = "tile.f32";

/// Storage location of a tile below a pyramid directory.
///
/// - root → `tiles/tile.f32`
/// - `1_3` → `tiles/1/3/tile.f32`
pub fn tile_path(dir: &Path, key: &TileKey) -> PathBuf {
    dir.join(TILE_DIR).join(key.to_relative_path()).join(TILE_FILE)
}

/// Elevation pyramid stored on disk: a `pyramid.json` manifest holding the
/// [`RasterInfo`] plus one raw native-endian `f32` file per tile.
#[derive(Debug)]
pub struct FilePyramid {
    dir: PathBuf,
    info: RasterInfo,
}

impl FilePyramid {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let manifest = dir.join(MANIFEST);
        let json = fs::read_to_string(&manifest).map_err(|e| {
            TerrainError::Raster(format!("Failed to read {}: {e}", manifest.display()))
        })?;
        let info: RasterInfo = serde_json::from_str(&json)?;
        info.validate()?;
        info!(
            path = %dir.display(),
            levels = info.levels,
            width = info.raster_width,
            length = info.raster_length,
            "Opened elevation pyramid"
        );
        Ok(Self { dir, info })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl RasterSource for FilePyramid {
    fn info(&self) -> &RasterInfo {
        &self.info
    }

    fn tile_exists(&self, key: &TileKey) -> bool {
        key.level() < self.info.levels && tile_path(&self.dir, key).is_file()
    }

    fn read_tile(&self, key: &TileKey) -> Result<RasterTile> {
        let path = tile_path(&self.dir, key);
        let file = File::open(&path)
            .map_err(|e| TerrainError::Raster(format!("Failed to open {}: {e}", path.display())))?;
        let (columns, rows) = (self.info.tile_width, self.info.tile_length);
        let expected = columns * rows * size_of::<f32>();
        let len = file.metadata()?.len() as usize;
        if len != expected {
            return Err(TerrainError::Raster(format!(
                "{} holds {len} bytes, expected {expected}",
                path.display()
            )));
        }

        // SAFETY: pyramid tiles are written once by `write_pyramid` and never
        // modified while a pyramid is open.
        let map = unsafe { Mmap::map(&file)? };
        let samples: &[f32] = bytemuck::try_cast_slice(&map[..]).map_err(|e| {
            TerrainError::Raster(format!("Failed to decode {}: {e}", path.display()))
        })?;
        debug!(key = %key, path = %path.display(), "Read raster tile");

        Ok(RasterTile {
            columns,
            rows,
            samples: samples.to_vec(),
        })
    }
}

/// Write every tile of `source` plus its manifest below `dir`.
///
/// Levels are written top-down, tiles of one level in parallel. Returns the
/// number of tiles written.
pub fn write_pyramid(source: &dyn RasterSource, dir: &Path) -> Result<usize> {
    let info = source.info();
    info.validate()?;
    fs::create_dir_all(dir)?;

    let mut frontier = Vec::new();
    if source.tile_exists(&TileKey::root()) {
        frontier.push(TileKey::root());
    }

    let mut written = 0;
    while !frontier.is_empty() {
        frontier.par_iter().try_for_each(|key| write_tile(source, dir, key))?;
        written += frontier.len();

        frontier = frontier
            .iter()
            .filter(|key| key.level() + 1 < info.levels)
            .filter_map(TileKey::children)
            .flatten()
            .filter(|key| source.tile_exists(key))
            .collect();
    }

    let manifest = dir.join(MANIFEST);
    fs::write(&manifest, serde_json::to_string_pretty(info)?)?;
    info!(
        tiles = written,
        path = %dir.display(),
        "Wrote elevation pyramid"
    );
    Ok(written)
}

fn write_tile(source: &dyn RasterSource, dir: &Path, key: &TileKey) -> Result<()> {
    let tile = source.read_tile(key)?;
    let info = source.info();
    if tile.columns != info.tile_width
        || tile.rows != info.tile_length
        || tile.samples.len() != tile.columns * tile.rows
    {
        return Err(TerrainError::Raster(format!(
            "tile {key} is {}x{} with {} samples, expected {}x{}",
            tile.columns,
            tile.rows,
            tile.samples.len(),
            info.tile_width,
            info.tile_length
        )));
    }
    let path = tile_path(dir, key);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, bytemuck::cast_slice::<f32, u8>(&tile.samples))
        .map_err(|e| TerrainError::Raster(format!("Failed to write {}: {e}", path.display())))
}
