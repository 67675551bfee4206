use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use glam::{DVec2, DVec3};

use super::key::TileKey;
use crate::types::{BoundingBox, TileMesh, Texture};

/// Geometry and textures of a built tile.
#[derive(Debug)]
pub struct TileContent {
    pub mesh: TileMesh,
    /// One texture per layer slot, placeholder where a slot has nothing.
    pub textures: Vec<Arc<Texture>>,
    /// Local-frame bounds of the valid samples; `None` for an empty tile.
    pub bounds: Option<BoundingBox>,
    /// `(min, max)` elevation of the valid samples, raster units.
    pub elevation_range: Option<(f64, f64)>,
}

/// A quadtree node. Created as a pending placeholder; its content is
/// filled exactly once, on a build worker or by a synchronous caller.
#[derive(Debug)]
pub struct Tile {
    key: TileKey,
    /// Centre offset from the parent's centre.
    offset: DVec3,
    /// Centre in the local frame.
    center: DVec2,
    pixel_width: f64,
    pixel_length: f64,
    /// NW, NE, SW, SE corners in the local frame.
    corners: [DVec2; 4],
    byte_estimate: usize,
    content: OnceLock<Option<TileContent>>,
    surface_color: RwLock<[f32; 4]>,
}

impl Tile {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        key: TileKey,
        offset: DVec3,
        center: DVec2,
        pixel_width: f64,
        pixel_length: f64,
        extent: DVec2,
        byte_estimate: usize,
        surface_color: [f32; 4],
    ) -> Self {
        let half = extent / 2.0;
        let corners = [
            DVec2::new(center.x - half.x, center.y + half.y),
            DVec2::new(center.x + half.x, center.y + half.y),
            DVec2::new(center.x - half.x, center.y - half.y),
            DVec2::new(center.x + half.x, center.y - half.y),
        ];
        Self {
            key,
            offset,
            center,
            pixel_width,
            pixel_length,
            corners,
            byte_estimate,
            content: OnceLock::new(),
            surface_color: RwLock::new(surface_color),
        }
    }

    pub fn key(&self) -> &TileKey {
        &self.key
    }

    pub fn level(&self) -> usize {
        self.key.level()
    }

    pub fn offset(&self) -> DVec3 {
        self.offset
    }

    pub fn center(&self) -> DVec2 {
        self.center
    }

    pub fn pixel_width(&self) -> f64 {
        self.pixel_width
    }

    pub fn pixel_length(&self) -> f64 {
        self.pixel_length
    }

    pub fn corners(&self) -> [DVec2; 4] {
        self.corners
    }

    pub fn byte_estimate(&self) -> usize {
        self.byte_estimate
    }

    /// Built content; `None` while pending or after a failed build.
    pub fn content(&self) -> Option<&TileContent> {
        self.content.get().and_then(Option::as_ref)
    }

    pub fn is_ready(&self) -> bool {
        self.content().is_some()
    }

    /// A build ran and produced nothing.
    pub fn is_failed(&self) -> bool {
        matches!(self.content.get(), Some(None))
    }

    /// Ready and every sample missing.
    pub fn is_empty(&self) -> bool {
        self.content().is_some_and(|c| c.mesh.empty)
    }

    /// Run `build` unless the content is already set, joining any build in
    /// progress on another thread.
    pub(crate) fn resolve(&self, build: impl FnOnce() -> Option<TileContent>) -> Option<&TileContent> {
        self.content.get_or_init(build).as_ref()
    }

    pub fn surface_color(&self) -> [f32; 4] {
        *self.surface_color.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_surface_color(&self, color: [f32; 4]) {
        *self.surface_color.write().unwrap_or_else(PoisonError::into_inner) = color;
    }

    /// Whether `(x, y)` lies within the tile footprint, edges included.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let [nw, _, _, se] = self.corners;
        x >= nw.x && x <= se.x && y >= se.y && y <= nw.y
    }

    /// Bilinear mesh height at local `(x, y)`; NaN if the tile is not ready,
    /// is empty, or a contributing sample is missing. Points outside the
    /// sample grid clamp to its edge.
    pub fn elevation_at(&self, x: f64, y: f64) -> f64 {
        let Some(mesh) = self.ready_mesh() else {
            return f64::NAN;
        };
        let (u, v) = self.grid_coords(mesh, x, y);
        let c0 = u.floor() as usize;
        let r0 = v.floor() as usize;
        let c1 = (c0 + 1).min(mesh.columns - 1);
        let r1 = (r0 + 1).min(mesh.rows - 1);
        let fu = u - c0 as f64;
        let fv = v - r0 as f64;

        let mut z = 0.0;
        for (c, r, w) in [
            (c0, r0, (1.0 - fu) * (1.0 - fv)),
            (c1, r0, fu * (1.0 - fv)),
            (c0, r1, (1.0 - fu) * fv),
            (c1, r1, fu * fv),
        ] {
            if w == 0.0 {
                continue;
            }
            let h = mesh.height(c, r) as f64;
            if h.is_nan() {
                return f64::NAN;
            }
            z += w * h;
        }
        z
    }

    /// Unit surface normal of the grid cell containing `(x, y)`; `None` if
    /// any of its corner samples is missing.
    pub fn normal_at(&self, x: f64, y: f64) -> Option<DVec3> {
        let mesh = self.ready_mesh()?;
        if mesh.columns < 2 || mesh.rows < 2 {
            return None;
        }
        let (u, v) = self.grid_coords(mesh, x, y);
        let c = (u.floor() as usize).min(mesh.columns - 2);
        let r = (v.floor() as usize).min(mesh.rows - 2);

        let nw = mesh.height(c, r) as f64;
        let ne = mesh.height(c + 1, r) as f64;
        let sw = mesh.height(c, r + 1) as f64;
        let se = mesh.height(c + 1, r + 1) as f64;
        if [nw, ne, sw, se].iter().any(|h| h.is_nan()) {
            return None;
        }
        // Rows advance southwards, so +y runs from the south row to the north.
        let dzdx = ((ne - nw) + (se - sw)) / (2.0 * mesh.pixel_width);
        let dzdy = ((nw - sw) + (ne - se)) / (2.0 * mesh.pixel_length);
        Some(DVec3::new(-dzdx, -dzdy, 1.0).normalize())
    }

    fn ready_mesh(&self) -> Option<&TileMesh> {
        let mesh = &self.content()?.mesh;
        (!mesh.empty && mesh.columns > 0 && mesh.rows > 0).then_some(mesh)
    }

    /// Fractional `(column, row)` of `(x, y)` clamped to the sample grid.
    fn grid_coords(&self, mesh: &TileMesh, x: f64, y: f64) -> (f64, f64) {
        let (width, length) = mesh.extent();
        let u = (x - (self.center.x - width / 2.0)) / mesh.pixel_width - 0.5;
        let v = ((self.center.y + length / 2.0) - y) / mesh.pixel_length - 0.5;
        (
            u.clamp(0.0, (mesh.columns - 1) as f64),
            v.clamp(0.0, (mesh.rows - 1) as f64),
        )
    }
}
