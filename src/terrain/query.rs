use std::sync::Arc;

use glam::{DVec2, DVec3};

use super::Terrain;
use crate::quadtree::{Quadrant, Tile, TileKey};

/// Last full-resolution tile used by a run of nearby queries.
#[derive(Default)]
pub(crate) struct TileCursor {
    tile: Option<Arc<Tile>>,
}

impl Terrain {
    /// Whether local `(x, y)` lies within the terrain footprint.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let b = self.bounds();
        x >= b.min[0] && x <= b.max[0] && y >= b.min[1] && y <= b.max[1]
    }

    /// Tile of the current selection covering local `(x, y)`.
    pub fn selected_tile(&self, x: f64, y: f64) -> Option<&Arc<Tile>> {
        if !self.contains(x, y) {
            return None;
        }
        if self.selection.is_empty() {
            return Some(&self.root);
        }
        let mut key = TileKey::root();
        loop {
            if let Some(tile) = self.selection.get(&key) {
                return Some(tile);
            }
            let center = self.factory.key_center(&key);
            key = key.child(Quadrant::containing(x - center.x, y - center.y))?;
        }
    }

    /// Elevation at the current level of detail; NaN outside the terrain
    /// or where data is missing.
    pub fn elevation(&self, x: f64, y: f64) -> f64 {
        self.selected_tile(x, y)
            .map_or(f64::NAN, |tile| tile.elevation_at(x, y) / self.frame.pixel_scale)
    }

    /// Local-frame z at the current level of detail.
    pub fn z(&self, x: f64, y: f64) -> f64 {
        self.frame.height_to_local(self.elevation(x, y))
    }

    /// Elevation from the deepest tile covering `(x, y)`, built
    /// synchronously if needed.
    pub fn elevation_at_full_resolution(&self, x: f64, y: f64) -> f64 {
        self.full_resolution_tile(x, y)
            .map_or(f64::NAN, |tile| tile.elevation_at(x, y) / self.frame.pixel_scale)
    }

    /// Elevation from the tile of `level` covering `(x, y)`.
    pub fn elevation_at_level(&self, x: f64, y: f64, level: usize) -> f64 {
        self.level_tile(x, y, level)
            .map_or(f64::NAN, |tile| tile.elevation_at(x, y) / self.frame.pixel_scale)
    }

    /// Surface normal at the current level of detail.
    pub fn normal(&self, x: f64, y: f64) -> Option<DVec3> {
        self.selected_tile(x, y)?.normal_at(x, y)
    }

    pub fn normal_at_full_resolution(&self, x: f64, y: f64) -> Option<DVec3> {
        self.full_resolution_tile(x, y)?.normal_at(x, y)
    }

    /// Sample the straight segment `p0 -> p1` (local frame, z ignored) once
    /// per full-resolution pixel. The first and last points sit exactly on
    /// `p0` and `p1`. Points carry local z with `display_frame`, elevation
    /// otherwise. `None` if either endpoint is off the terrain.
    pub fn rasterize_segment(
        &self,
        p0: DVec3,
        p1: DVec3,
        full_resolution: bool,
        display_frame: bool,
    ) -> Option<Vec<DVec3>> {
        if !self.contains(p0.x, p0.y) || !self.contains(p1.x, p1.y) {
            return None;
        }
        let start = p0.truncate();
        let end = p1.truncate();
        let step = self.pixel_width().min(self.pixel_length());
        let delta = end - start;
        let length = delta.length();
        let count = ((length / step).ceil() as usize).max(2);
        let direction = delta.normalize_or_zero();

        let mut cursor = TileCursor::default();
        let mut sample = |p: DVec2| {
            let elevation = if full_resolution {
                self.elevation_near(&mut cursor, p.x, p.y)
            } else {
                self.elevation(p.x, p.y)
            };
            let z = if display_frame {
                self.frame.height_to_local(elevation)
            } else {
                elevation
            };
            p.extend(z)
        };

        let mut points: Vec<DVec3> = (0..count - 1)
            .map(|i| sample(start + direction * (step * i as f64)))
            .collect();
        points.push(sample(end));
        Some(points)
    }

    fn full_resolution_tile(&self, x: f64, y: f64) -> Option<Arc<Tile>> {
        let key = self.factory.deepest_key(x, y)?;
        self.factory.fetch_key(&key, true).ready()
    }

    /// Deepest tile covering `(x, y)`, reusing the cursor's tile when it
    /// still covers the point. A reused tile costs at most one existence
    /// check (its child under the point) instead of one per level.
    pub(crate) fn full_resolution_tile_near(&self, cursor: &mut TileCursor, x: f64, y: f64) -> Option<Arc<Tile>> {
        if let Some(tile) = &cursor.tile {
            let level = tile.level();
            let covers = self.factory.key_at(x, y, level).as_ref() == Some(tile.key());
            if covers && !self.finer_tile_exists(x, y, level) {
                return Some(Arc::clone(tile));
            }
        }
        let tile = self.full_resolution_tile(x, y)?;
        cursor.tile = Some(Arc::clone(&tile));
        Some(tile)
    }

    pub(crate) fn elevation_near(&self, cursor: &mut TileCursor, x: f64, y: f64) -> f64 {
        self.full_resolution_tile_near(cursor, x, y)
            .map_or(f64::NAN, |tile| tile.elevation_at(x, y) / self.frame.pixel_scale)
    }

    pub(crate) fn normal_near(&self, cursor: &mut TileCursor, x: f64, y: f64) -> Option<DVec3> {
        self.full_resolution_tile_near(cursor, x, y)?.normal_at(x, y)
    }

    fn finer_tile_exists(&self, x: f64, y: f64, level: usize) -> bool {
        self.factory
            .key_at(x, y, level + 1)
            .is_some_and(|key| self.source.tile_exists(&key))
    }

    fn level_tile(&self, x: f64, y: f64, level: usize) -> Option<Arc<Tile>> {
        let key = self.factory.key_at(x, y, level)?;
        if !self.source.tile_exists(&key) {
            return None;
        }
        self.factory.fetch_key(&key, true).ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::tests::terrain_from;
    use approx::assert_relative_eq;

    #[test]
    fn nan_outside_bounds() {
        let terrain = terrain_from(8, 4, |_, _| 3.0);
        assert!(terrain.elevation(4.5, 0.0).is_nan());
        assert!(terrain.elevation_at_full_resolution(0.0, -4.01).is_nan());
        assert!(terrain.elevation_at_level(100.0, 0.0, 0).is_nan());
        assert!(terrain.z(-10.0, -10.0).is_nan());
        assert!(terrain.normal(9.0, 9.0).is_none());
        assert!(terrain.normal_at_full_resolution(9.0, 9.0).is_none());
    }

    #[test]
    fn levels_differ_by_resolution() {
        // Column-valued ramp: each root sample averages two columns.
        let terrain = terrain_from(8, 4, |c, _| c as f32);
        // Pixel centre of column 0 at full resolution.
        assert_relative_eq!(terrain.elevation_at_full_resolution(-3.5, 0.5), 0.0, epsilon = 1e-6);
        assert_relative_eq!(terrain.elevation_at_level(-3.5, 0.5, 1), 0.0, epsilon = 1e-6);
        // Root pixels are 2 wide; the first centre is at x = -3 with mean 0.5.
        assert_relative_eq!(terrain.elevation_at_level(-3.0, 0.5, 0), 0.5, epsilon = 1e-6);
        // Before any LOD update the selection is the root.
        assert_relative_eq!(terrain.elevation(-3.0, 0.5), 0.5, epsilon = 1e-6);
        assert!(terrain.elevation_at_level(0.0, 0.0, 2).is_nan());
    }

    #[test]
    fn z_is_relative_to_minimum() {
        let terrain = terrain_from(4, 4, |c, _| 10.0 + c as f32);
        assert_relative_eq!(terrain.z(-1.5, 0.0), 0.0, epsilon = 1e-6);
        assert_relative_eq!(terrain.z(1.5, 0.0), 3.0, epsilon = 1e-6);
    }

    #[test]
    fn normals_from_full_resolution() {
        let terrain = terrain_from(8, 4, |c, _| 2.0 * c as f32);
        let n = terrain.normal_at_full_resolution(0.2, 0.3).unwrap();
        let expected = DVec3::new(-2.0, 0.0, 1.0).normalize();
        assert_relative_eq!(n.x, expected.x, epsilon = 1e-6);
        assert_relative_eq!(n.z, expected.z, epsilon = 1e-6);
        assert!(terrain.normal(0.2, 0.3).is_some());
    }

    #[test]
    fn segment_endpoints_exact() {
        let terrain = terrain_from(8, 4, |c, r| (c * r) as f32);
        let p0 = DVec3::new(-3.3, -2.2, 0.0);
        let p1 = DVec3::new(2.9, 3.1, 0.0);
        let points = terrain.rasterize_segment(p0, p1, true, false).unwrap();
        let expected = ((p1 - p0).truncate().length() / 1.0).ceil() as usize;
        assert_eq!(points.len(), expected);
        assert_eq!(points[0].truncate(), p0.truncate());
        assert_eq!(points.last().unwrap().truncate(), p1.truncate());
        assert_relative_eq!(
            points[0].z,
            terrain.elevation_at_full_resolution(p0.x, p0.y),
            epsilon = 1e-9
        );
    }

    #[test]
    fn short_segment_has_two_points() {
        let terrain = terrain_from(4, 4, |_, _| 5.0);
        let p0 = DVec3::new(0.1, 0.1, 0.0);
        let p1 = DVec3::new(0.2, 0.15, 0.0);
        let points = terrain.rasterize_segment(p0, p1, false, true).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].truncate(), p0.truncate());
        assert_eq!(points[1].truncate(), p1.truncate());
        // Display frame: local z of a flat terrain is zero.
        assert_eq!(points[0].z, 0.0);

        let degenerate = terrain.rasterize_segment(p0, p0, true, false).unwrap();
        assert_eq!(degenerate.len(), 2);
        assert_eq!(degenerate[1].z, 5.0);
    }

    #[test]
    fn segment_off_terrain_fails() {
        let terrain = terrain_from(4, 4, |_, _| 5.0);
        assert!(terrain
            .rasterize_segment(DVec3::ZERO, DVec3::new(10.0, 0.0, 0.0), true, false)
            .is_none());
    }
}
