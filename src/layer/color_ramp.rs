use std::sync::atomic::{AtomicBool, Ordering};

use image::{Rgba, RgbaImage};

use super::Layer;
use crate::quadtree::key::TileKey;
use crate::raster::RasterInfo;
use crate::types::{TileMesh, Texture};

/// Colours each tile sample by height, linearly between two colours.
/// Missing samples stay transparent.
#[derive(Debug)]
pub struct ColorRampLayer {
    name: String,
    /// Mesh-height range mapped onto the ramp.
    low: f64,
    high: f64,
    low_color: [u8; 4],
    high_color: [u8; 4],
    texture_size: usize,
    enabled: AtomicBool,
}

impl ColorRampLayer {
    /// Ramp over mesh heights `low..high`. `texture_size` is the tile
    /// width in samples, used for the memory estimate.
    pub fn new(name: impl Into<String>, low: f64, high: f64, texture_size: usize) -> Self {
        Self {
            name: name.into(),
            low,
            high,
            low_color: [0, 0, 0, 255],
            high_color: [255, 255, 255, 255],
            texture_size,
            enabled: AtomicBool::new(true),
        }
    }

    /// Grey ramp over the raster's full elevation range.
    pub fn for_raster(name: impl Into<String>, info: &RasterInfo) -> Self {
        let scale = info.pixel_scale();
        Self::new(
            name,
            info.min_elevation * scale,
            info.max_elevation * scale,
            info.tile_width.max(info.tile_length),
        )
    }

    pub fn with_colors(mut self, low: [u8; 4], high: [u8; 4]) -> Self {
        self.low_color = low;
        self.high_color = high;
        self
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn color(&self, height: f32) -> Rgba<u8> {
        if height.is_nan() {
            return Rgba([0, 0, 0, 0]);
        }
        let span = self.high - self.low;
        let t = if span > 0.0 {
            ((height as f64 - self.low) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let mut out = [0u8; 4];
        for (o, (&a, &b)) in out.iter_mut().zip(self.low_color.iter().zip(&self.high_color)) {
            *o = (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        }
        Rgba(out)
    }
}

impl Layer for ColorRampLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn texture(&self, _key: &TileKey, mesh: &TileMesh) -> Option<Texture> {
        if mesh.empty || mesh.columns == 0 || mesh.rows == 0 {
            return None;
        }
        let image = RgbaImage::from_fn(mesh.columns as u32, mesh.rows as u32, |x, y| {
            self.color(mesh.height(x as usize, y as usize))
        });
        Some(Texture::new(self.name.clone(), image))
    }

    fn bytes_per_tile(&self) -> usize {
        self.texture_size * self.texture_size * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh(heights: &[f32]) -> TileMesh {
        TileMesh {
            columns: 2,
            rows: 2,
            pixel_width: 1.0,
            pixel_length: 1.0,
            positions: heights.iter().flat_map(|&h| [0.0, 0.0, h]).collect(),
            empty: heights.iter().all(|h| h.is_nan()),
        }
    }

    #[test]
    fn ramps_between_colors() {
        let layer = ColorRampLayer::new("height", 0.0, 10.0, 2);
        let tex = layer
            .texture(&TileKey::root(), &mesh(&[0.0, 5.0, 10.0, f32::NAN]))
            .unwrap();
        assert_eq!(tex.dimensions(), (2, 2));
        assert_eq!(tex.image.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(tex.image.get_pixel(1, 0).0, [128, 128, 128, 255]);
        assert_eq!(tex.image.get_pixel(0, 1).0, [255, 255, 255, 255]);
        assert_eq!(tex.image.get_pixel(1, 1).0, [0, 0, 0, 0]);
    }

    #[test]
    fn empty_mesh_has_no_texture() {
        let layer = ColorRampLayer::new("height", 0.0, 10.0, 2);
        assert!(layer.texture(&TileKey::root(), &mesh(&[f32::NAN; 4])).is_none());
    }

    #[test]
    fn enable_toggle_and_budget() {
        let layer = ColorRampLayer::new("height", 0.0, 1.0, 256);
        assert!(layer.is_enabled());
        layer.set_enabled(false);
        assert!(!layer.is_enabled());
        assert_eq!(layer.bytes_per_tile(), 256 * 256 * 4);
    }

    #[test]
    fn custom_colors_clamp_out_of_range() {
        let layer = ColorRampLayer::new("height", 0.0, 1.0, 2).with_colors([10, 0, 0, 255], [20, 0, 0, 255]);
        let tex = layer
            .texture(&TileKey::root(), &mesh(&[-5.0, 5.0, 0.5, 0.5]))
            .unwrap();
        assert_eq!(tex.image.get_pixel(0, 0).0, [10, 0, 0, 255]);
        assert_eq!(tex.image.get_pixel(1, 0).0, [20, 0, 0, 255]);
        assert_eq!(tex.image.get_pixel(0, 1).0, [15, 0, 0, 255]);
    }
}
