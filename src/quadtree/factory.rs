use std::sync::{Arc, Mutex, PoisonError, RwLock};

use glam::{DVec2, DVec3};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::builder::TileBuilder;
use super::cache::TileCache;
use super::key::{Quadrant, TileKey};
use super::tile::Tile;
use super::workers::WorkerPool;
use crate::config::TerrainConfig;
use crate::error::Result;
use crate::layer::{LayerSlot, layer_bytes_per_tile};
use crate::raster::RasterSource;
use crate::types::Texture;

/// Outcome of [`TileFactory::fetch`].
#[derive(Debug, Clone)]
pub enum TileFetch {
    /// Content is built.
    Ready(Arc<Tile>),
    /// A placeholder is cached and a build is queued or running.
    Pending(Arc<Tile>),
    /// The tile cannot be built now: its raster failed to load, or the
    /// build queue was saturated. A later fetch retries.
    Unavailable,
}

impl TileFetch {
    pub fn ready(self) -> Option<Arc<Tile>> {
        match self {
            TileFetch::Ready(tile) => Some(tile),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, TileFetch::Ready(_))
    }
}

/// State shared between the factory and its build workers.
struct Shared {
    cache: TileCache,
    builder: TileBuilder,
    surface_color: RwLock<[f32; 4]>,
}

impl Shared {
    /// Build (or join the build of) `tile`. Failed tiles leave the cache so
    /// a later fetch can retry.
    fn load(&self, tile: &Arc<Tile>) -> bool {
        if tile.resolve(|| self.builder.build(tile)).is_some() {
            return true;
        }
        if self.cache.remove_if_same(tile.key(), tile) {
            debug!(key = %tile.key(), "Dropped failed tile from cache");
        }
        false
    }
}

/// Creates, caches and asynchronously builds quadtree tiles.
pub struct TileFactory {
    shared: Arc<Shared>,
    workers: Mutex<Option<WorkerPool<Arc<Tile>>>>,
    levels: usize,
    tile_width: usize,
    tile_length: usize,
    /// Local-frame extent of the root tile.
    extent: DVec2,
    tile_bytes: usize,
}

impl TileFactory {
    pub fn new(source: Arc<dyn RasterSource>, layers: Vec<LayerSlot>, config: &TerrainConfig) -> Result<Self> {
        let info = source.info().clone();
        info.validate()?;
        let (width, length) = info.scaled_extent();
        let (tw, tl) = (info.tile_width, info.tile_length);
        // Vertex, normal and texture-coordinate buffers plus skirts.
        let tile_bytes = (tw * tl * 14 + 2 * tw + 2 * tl) * 4 + layer_bytes_per_tile(&layers);

        let shared = Arc::new(Shared {
            cache: TileCache::new(),
            builder: TileBuilder::new(source, layers),
            surface_color: RwLock::new(config.surface_color),
        });

        let worker_shared = Arc::clone(&shared);
        let workers = WorkerPool::spawn("tile-builder", config.workers, config.queue_capacity, move |tile: Arc<Tile>| {
            worker_shared.load(&tile);
        })?;

        info!(
            levels = info.levels,
            tile_width = tw,
            tile_length = tl,
            workers = config.workers,
            "Created tile factory"
        );

        Ok(Self {
            shared,
            workers: Mutex::new(Some(workers)),
            levels: info.levels,
            tile_width: tw,
            tile_length: tl,
            extent: DVec2::new(width, length),
            tile_bytes,
        })
    }

    /// Fetch the tile at `key`, creating it if needed. `offset` is the tile
    /// centre relative to its parent's, `pixel_*` its sample spacing.
    ///
    /// With `wait` the content is built (or an in-flight build joined) on
    /// the calling thread; otherwise a build is queued and the placeholder
    /// returned.
    pub fn fetch(&self, key: &TileKey, offset: DVec3, pixel_width: f64, pixel_length: f64, wait: bool) -> TileFetch {
        let (tile, created) = self.shared.cache.get_or_insert_with(key.clone(), || {
            Arc::new(Tile::new(
                key.clone(),
                offset,
                self.key_center(key),
                pixel_width,
                pixel_length,
                DVec2::new(pixel_width * self.tile_width as f64, pixel_length * self.tile_length as f64),
                self.tile_bytes,
                self.surface_color(),
            ))
        });

        if tile.is_ready() {
            return TileFetch::Ready(tile);
        }
        if tile.is_failed() {
            return TileFetch::Unavailable;
        }
        if wait {
            return if self.shared.load(&tile) {
                TileFetch::Ready(tile)
            } else {
                TileFetch::Unavailable
            };
        }
        if !created {
            return TileFetch::Pending(tile);
        }

        let queued = {
            let workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            match workers.as_ref() {
                Some(pool) => pool.try_submit(Arc::clone(&tile)).is_ok(),
                None => false,
            }
        };
        if queued {
            debug!(key = %key, "Queued tile build");
            TileFetch::Pending(tile)
        } else {
            warn!(key = %key, "Tile build queue unavailable, will retry");
            self.shared.cache.remove_if_same(key, &tile);
            TileFetch::Unavailable
        }
    }

    /// [`TileFactory::fetch`] with offset and pixel size derived from the key.
    pub fn fetch_key(&self, key: &TileKey, wait: bool) -> TileFetch {
        let (pixel_width, pixel_length) = self.pixel_size(key.level());
        self.fetch(key, self.key_offset(key), pixel_width, pixel_length, wait)
    }

    /// All four children of `parent` if every one is ready, else `None`.
    /// Every child is requested either way, so missing ones get queued.
    pub fn fetch_children(&self, parent: &Tile, wait: bool) -> Option<[Arc<Tile>; 4]> {
        let keys = parent.key().children()?;
        let pixel_width = parent.pixel_width() / 2.0;
        let pixel_length = parent.pixel_length() / 2.0;
        let half = DVec2::new(
            pixel_width * self.tile_width as f64 / 2.0,
            pixel_length * self.tile_length as f64 / 2.0,
        );

        let ready: Vec<Arc<Tile>> = keys
            .iter()
            .zip(Quadrant::ALL)
            .filter_map(|(key, q)| {
                let (sx, sy) = q.signs();
                let offset = DVec3::new(sx * half.x, sy * half.y, 0.0);
                self.fetch(key, offset, pixel_width, pixel_length, wait).ready()
            })
            .collect();
        ready.try_into().ok()
    }

    /// Centre of `key`'s footprint in the local frame.
    pub fn key_center(&self, key: &TileKey) -> DVec2 {
        let mut center = DVec2::ZERO;
        let mut half = self.extent / 2.0;
        for q in key.path() {
            half /= 2.0;
            let (sx, sy) = q.signs();
            center += DVec2::new(sx * half.x, sy * half.y);
        }
        center
    }

    /// Key at `level` whose footprint holds local `(x, y)`; `None` outside
    /// the terrain or past the pyramid depth.
    pub fn key_at(&self, x: f64, y: f64, level: usize) -> Option<TileKey> {
        if level >= self.levels || !self.in_bounds(x, y) {
            return None;
        }
        let mut key = TileKey::root();
        let mut center = DVec2::ZERO;
        let mut half = self.extent / 2.0;
        for _ in 0..level {
            let q = Quadrant::containing(x - center.x, y - center.y);
            half /= 2.0;
            let (sx, sy) = q.signs();
            center += DVec2::new(sx * half.x, sy * half.y);
            key = key.child(q)?;
        }
        Some(key)
    }

    /// Deepest existing key whose footprint holds local `(x, y)`.
    pub fn deepest_key(&self, x: f64, y: f64) -> Option<TileKey> {
        let mut key = self.key_at(x, y, 0)?;
        let source = self.shared.builder.source();
        for level in 1..self.levels {
            let Some(next) = self.key_at(x, y, level) else {
                break;
            };
            if !source.tile_exists(&next) {
                break;
            }
            key = next;
        }
        Some(key)
    }

    /// Whether the pyramid holds the child of `parent` in `quadrant`.
    pub fn child_exists(&self, parent: &TileKey, quadrant: Quadrant) -> bool {
        parent
            .child(quadrant)
            .is_some_and(|key| key.level() < self.levels && self.shared.builder.source().tile_exists(&key))
    }

    /// Synchronously build every existing tile of `level`. Returns how many
    /// are ready.
    pub fn preload_level(&self, level: usize) -> usize {
        let source = self.shared.builder.source();
        let mut keys = vec![TileKey::root()];
        for _ in 0..level.min(self.levels.saturating_sub(1)) {
            keys = keys
                .iter()
                .filter_map(TileKey::children)
                .flatten()
                .filter(|key| source.tile_exists(key))
                .collect();
        }
        let ready = keys
            .par_iter()
            .filter(|key| self.fetch_key(key, true).is_ready())
            .count();
        info!(level, tiles = keys.len(), ready, "Preloaded level");
        ready
    }

    /// Sample spacing of tiles at `level` in the local frame.
    pub fn pixel_size(&self, level: usize) -> (f64, f64) {
        let scale = (1u64 << level.min(63)) as f64;
        (
            self.extent.x / self.tile_width as f64 / scale,
            self.extent.y / self.tile_length as f64 / scale,
        )
    }

    fn key_offset(&self, key: &TileKey) -> DVec3 {
        let Some(parent) = key.parent() else {
            return DVec3::ZERO;
        };
        let d = self.key_center(key) - self.key_center(&parent);
        DVec3::new(d.x, d.y, 0.0)
    }

    fn in_bounds(&self, x: f64, y: f64) -> bool {
        let half = self.extent / 2.0;
        x.abs() <= half.x && y.abs() <= half.y
    }

    pub fn cache(&self) -> &TileCache {
        &self.shared.cache
    }

    pub fn layers(&self) -> &[LayerSlot] {
        self.shared.builder.layers()
    }

    pub fn placeholder_texture(&self) -> Arc<Texture> {
        self.shared.builder.placeholder_texture()
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn surface_color(&self) -> [f32; 4] {
        *self.shared.surface_color.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `color` to every cached tile and to tiles created later.
    pub fn set_surface_color(&self, color: [f32; 4]) {
        *self.shared.surface_color.write().unwrap_or_else(PoisonError::into_inner) = color;
        self.shared.cache.broadcast_surface_color(color);
    }

    /// Stop the workers and drop every cached tile. Idempotent.
    pub fn shutdown(&self) {
        let pool = self.workers.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut pool) = pool {
            pool.shutdown();
            let tiles = self.shared.cache.len();
            self.shared.cache.clear();
            info!(tiles, "Tile factory shut down");
        }
    }
}

impl Drop for TileFactory {
    fn drop(&mut self) {
        self.shutdown();
    }
}
