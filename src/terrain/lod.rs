use std::collections::HashMap;
use std::sync::Arc;

use glam::DVec3;
use tracing::debug;

use super::Terrain;
use crate::quadtree::{Quadrant, Tile, TileKey};

/// Viewer state driving tile refinement. Positions are in the local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: DVec3,
    /// Vertical field of view in radians.
    pub fov_y: f64,
    /// Viewport height in screen pixels.
    pub viewport_height: f64,
}

impl Camera {
    pub fn new(position: DVec3, fov_y: f64, viewport_height: f64) -> Self {
        Self {
            position,
            fov_y,
            viewport_height,
        }
    }

    /// Screen pixels covered by a length `size` seen from `distance`.
    pub fn projected_size(&self, size: f64, distance: f64) -> f64 {
        if distance <= 0.0 {
            return f64::INFINITY;
        }
        size * self.viewport_height / (2.0 * (self.fov_y / 2.0).tan() * distance)
    }
}

impl Terrain {
    /// Re-run tile selection for `camera`. Tiles refine while their sample
    /// spacing projects above the configured pixel error and all four
    /// children are ready; missing children are queued for a later frame.
    /// Returns whether the selection changed.
    pub fn update(&mut self, camera: &Camera) -> bool {
        let mut selection = HashMap::with_capacity(self.selection.len());
        let root = Arc::clone(&self.root);
        self.select(&root, camera, &mut selection);

        let changed = selection.len() != self.selection.len()
            || selection.keys().any(|key| !self.selection.contains_key(key));
        if changed {
            debug!(
                tiles = selection.len(),
                cached = self.factory.cache().len(),
                "Selection changed"
            );
        }
        self.selection = selection;
        changed
    }

    fn select(&self, tile: &Arc<Tile>, camera: &Camera, out: &mut HashMap<TileKey, Arc<Tile>>) {
        match self.refine(tile, camera) {
            Some(children) => {
                for child in &children {
                    self.select(child, camera, out);
                }
            }
            None => {
                out.insert(tile.key().clone(), Arc::clone(tile));
            }
        }
    }

    fn refine(&self, tile: &Tile, camera: &Camera) -> Option<[Arc<Tile>; 4]> {
        if tile.level() >= self.base_map_level() {
            return None;
        }
        let content = tile.content()?;
        if content.mesh.empty {
            return None;
        }
        let bounds = content.bounds.as_ref()?;
        let distance = bounds.distance_to(camera.position.to_array(), self.vertical_exaggeration);
        let spacing = tile.pixel_width().max(tile.pixel_length());
        if camera.projected_size(spacing, distance) <= self.config.lod.max_pixel_error {
            return None;
        }
        if !Quadrant::ALL
            .iter()
            .all(|&q| self.factory.child_exists(tile.key(), q))
        {
            return None;
        }
        self.factory.fetch_children(tile, false)
    }
}
