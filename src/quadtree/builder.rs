use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use super::tile::{Tile, TileContent};
use crate::error::{Result, TerrainError};
use crate::layer::{LayerSlot, PLACEHOLDER_SIZE};
use crate::raster::{RasterSource, RasterTile};
use crate::types::{BoundingBox, TileMesh, Texture};

/// Turns raster tiles into meshes and composites the layer textures.
pub(crate) struct TileBuilder {
    source: Arc<dyn RasterSource>,
    layers: Vec<LayerSlot>,
    pixel_scale: f64,
    placeholder: OnceLock<Arc<Texture>>,
}

impl TileBuilder {
    pub(crate) fn new(source: Arc<dyn RasterSource>, layers: Vec<LayerSlot>) -> Self {
        let pixel_scale = source.info().pixel_scale();
        Self {
            source,
            layers,
            pixel_scale,
            placeholder: OnceLock::new(),
        }
    }

    pub(crate) fn source(&self) -> &Arc<dyn RasterSource> {
        &self.source
    }

    pub(crate) fn layers(&self) -> &[LayerSlot] {
        &self.layers
    }

    /// Shared transparent texture for slots with nothing to show.
    pub(crate) fn placeholder_texture(&self) -> Arc<Texture> {
        Arc::clone(
            self.placeholder
                .get_or_init(|| Arc::new(Texture::transparent("empty", PLACEHOLDER_SIZE))),
        )
    }

    /// Build the content of `tile`; `None` if its raster cannot be read.
    pub(crate) fn build(&self, tile: &Tile) -> Option<TileContent> {
        match self.try_build(tile) {
            Ok(content) => {
                debug!(
                    key = %tile.key(),
                    vertices = content.mesh.vertex_count(),
                    empty = content.mesh.empty,
                    "Built tile"
                );
                Some(content)
            }
            Err(e) => {
                warn!(key = %tile.key(), "Failed to build tile: {e}");
                None
            }
        }
    }

    fn try_build(&self, tile: &Tile) -> Result<TileContent> {
        let raster = self.source.read_tile(tile.key())?;
        let mesh = self.build_mesh(&raster, tile.pixel_width(), tile.pixel_length())?;

        let info = self.source.info();
        let base_z = info.min_elevation * self.pixel_scale;
        let center = tile.center();
        let bounds = BoundingBox::from_points(mesh.positions.chunks_exact(3).map(|p| {
            [
                p[0] as f64 + center.x,
                p[1] as f64 + center.y,
                p[2] as f64 - base_z,
            ]
        }));
        let elevation_range = mesh
            .heights()
            .filter(|h| !h.is_nan())
            .map(|h| h as f64 / self.pixel_scale)
            .fold(None, |range: Option<(f64, f64)>, h| match range {
                None => Some((h, h)),
                Some((lo, hi)) => Some((lo.min(h), hi.max(h))),
            });

        let textures = self.composite(tile, &mesh);
        Ok(TileContent {
            mesh,
            textures,
            bounds,
            elevation_range,
        })
    }

    /// Pixel-centred vertex grid relative to the tile centre, heights
    /// scaled and missing samples set to NaN.
    fn build_mesh(&self, raster: &RasterTile, pixel_width: f64, pixel_length: f64) -> Result<TileMesh> {
        let (columns, rows) = (raster.columns, raster.rows);
        if raster.samples.len() != columns * rows {
            return Err(TerrainError::Raster(format!(
                "raster tile holds {} samples, expected {columns}x{rows}",
                raster.samples.len()
            )));
        }
        let info = self.source.info();
        let half_width = columns as f64 * pixel_width / 2.0;
        let half_length = rows as f64 * pixel_length / 2.0;

        let mut positions = Vec::with_capacity(columns * rows * 3);
        let mut empty = true;
        for (row, line) in raster.samples.chunks_exact(columns.max(1)).enumerate() {
            let y = half_length - (row as f64 + 0.5) * pixel_length;
            for (col, &sample) in line.iter().enumerate() {
                let x = -half_width + (col as f64 + 0.5) * pixel_width;
                let z = if info.is_missing(sample) {
                    f32::NAN
                } else {
                    empty = false;
                    (sample as f64 * self.pixel_scale) as f32
                };
                positions.extend([x as f32, y as f32, z]);
            }
        }

        Ok(TileMesh {
            columns,
            rows,
            pixel_width,
            pixel_length,
            positions,
            empty,
        })
    }

    /// One texture per layer slot. Empty tiles, empty or disabled slots,
    /// and layers without data all get the placeholder.
    /// Runs inside the tile's one-shot initializer and must not wait on the
    /// rayon pool, whose threads may be blocked on that same initializer.
    fn composite(&self, tile: &Tile, mesh: &TileMesh) -> Vec<Arc<Texture>> {
        self.layers
            .iter()
            .map(|slot| {
                if mesh.empty {
                    return self.placeholder_texture();
                }
                slot.as_ref()
                    .filter(|layer| layer.is_enabled())
                    .and_then(|layer| layer.texture(tile.key(), mesh))
                    .map(|texture| Arc::new(texture.with_tile_sampling()))
                    .unwrap_or_else(|| self.placeholder_texture())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{ColorRampLayer, Layer};
    use crate::quadtree::key::TileKey;
    use crate::raster::{MemoryPyramid, memory::PyramidLayout};
    use glam::{DVec2, DVec3};

    fn source(grid: &[f32]) -> Arc<dyn RasterSource> {
        let layout = PyramidLayout {
            tile_width: 2,
            tile_length: 2,
            pixel_width: 1.0,
            pixel_length: 1.0,
            fill_value: -1.0,
            projection: None,
        };
        Arc::new(MemoryPyramid::from_grid(grid, 2, 2, layout).unwrap())
    }

    fn root_tile() -> Tile {
        Tile::new(
            TileKey::root(),
            DVec3::ZERO,
            DVec2::ZERO,
            1.0,
            1.0,
            DVec2::splat(2.0),
            0,
            [1.0; 4],
        )
    }

    #[test]
    fn mesh_is_pixel_centred_with_missing_as_nan() {
        let builder = TileBuilder::new(source(&[1.0, 2.0, -1.0, 4.0]), Vec::new());
        let content = builder.build(&root_tile()).unwrap();
        let mesh = &content.mesh;
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(&mesh.positions[0..3], &[-0.5, 0.5, 1.0]);
        assert_eq!(&mesh.positions[3..6], &[0.5, 0.5, 2.0]);
        assert!(mesh.height(0, 1).is_nan());
        assert!(!mesh.empty);

        assert_eq!(content.elevation_range, Some((1.0, 4.0)));
        let bounds = content.bounds.unwrap();
        // Local z is measured from the raster minimum.
        assert_eq!(bounds.min[2], 0.0);
        assert_eq!(bounds.max[2], 3.0);
    }

    #[test]
    fn slots_fall_back_to_shared_placeholder() {
        let src = source(&[1.0, 2.0, 3.0, 4.0]);
        let ramp = Arc::new(ColorRampLayer::for_raster("height", src.info()));
        let disabled = Arc::new(ColorRampLayer::for_raster("off", src.info()));
        disabled.set_enabled(false);
        let layers: Vec<LayerSlot> = vec![Some(ramp), None, Some(disabled)];

        let builder = TileBuilder::new(src, layers);
        let content = builder.build(&root_tile()).unwrap();
        assert_eq!(content.textures.len(), 3);
        let placeholder = builder.placeholder_texture();
        assert!(!Arc::ptr_eq(&content.textures[0], &placeholder));
        assert_eq!(content.textures[0].dimensions(), (2, 2));
        assert!(Arc::ptr_eq(&content.textures[1], &placeholder));
        assert!(Arc::ptr_eq(&content.textures[2], &placeholder));
    }

    #[test]
    fn unreadable_tile_fails() {
        let builder = TileBuilder::new(source(&[1.0; 4]), Vec::new());
        let missing = Tile::new(
            "1_1".parse().unwrap(),
            DVec3::ZERO,
            DVec2::ZERO,
            0.5,
            0.5,
            DVec2::ONE,
            0,
            [1.0; 4],
        );
        assert!(builder.build(&missing).is_none());
    }

    #[test]
    fn placeholder_is_four_by_four_transparent() {
        let builder = TileBuilder::new(source(&[1.0; 4]), Vec::new());
        let tex = builder.placeholder_texture();
        assert_eq!(tex.dimensions(), (4, 4));
        assert!(tex.image.as_raw().iter().all(|&b| b == 0));
        assert!(ColorRampLayer::new("x", 0.0, 1.0, 1).is_enabled());
    }
}
