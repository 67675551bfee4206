use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::key::TileKey;
use super::tile::Tile;

/// Concurrent map of every tile created so far, pending or ready.
///
/// Insertion is first-writer-wins: a racing insert for a resident key gets
/// the resident tile back. Tiles are never evicted; [`TileCache::clear`]
/// drops everything at shutdown.
#[derive(Debug, Default)]
pub struct TileCache {
    tiles: RwLock<HashMap<TileKey, Arc<Tile>>>,
}

impl TileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &TileKey) -> Option<Arc<Tile>> {
        self.tiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Insert `tile` unless `key` is already present. Returns the resident
    /// tile, which is `tile` itself only if it was inserted.
    pub fn put(&self, key: TileKey, tile: Arc<Tile>) -> Arc<Tile> {
        self.get_or_insert_with(key, || tile).0
    }

    /// Like [`TileCache::put`], creating the tile only when the key is
    /// absent. The flag is `true` if this call inserted.
    pub fn get_or_insert_with(
        &self,
        key: TileKey,
        make: impl FnOnce() -> Arc<Tile>,
    ) -> (Arc<Tile>, bool) {
        if let Some(tile) = self.get(&key) {
            return (tile, false);
        }
        let mut tiles = self.tiles.write().unwrap_or_else(PoisonError::into_inner);
        match tiles.get(&key) {
            Some(tile) => (Arc::clone(tile), false),
            None => {
                let tile = make();
                tiles.insert(key, Arc::clone(&tile));
                (tile, true)
            }
        }
    }

    /// Remove `key` only while it still maps to this very tile.
    pub fn remove_if_same(&self, key: &TileKey, tile: &Arc<Tile>) -> bool {
        let mut tiles = self.tiles.write().unwrap_or_else(PoisonError::into_inner);
        if tiles.get(key).is_some_and(|resident| Arc::ptr_eq(resident, tile)) {
            tiles.remove(key);
            true
        } else {
            false
        }
    }

    pub fn clear(&self) {
        self.tiles.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.tiles.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push a surface colour to every resident tile.
    pub fn broadcast_surface_color(&self, color: [f32; 4]) {
        for tile in self.tiles.read().unwrap_or_else(PoisonError::into_inner).values() {
            tile.set_surface_color(color);
        }
    }

    /// Sum of the per-tile memory estimates.
    pub fn estimated_bytes(&self) -> usize {
        self.tiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|tile| tile.byte_estimate())
            .sum()
    }
}
