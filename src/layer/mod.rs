pub mod color_ramp;

use std::sync::Arc;

use crate::quadtree::key::TileKey;
use crate::types::{TileMesh, Texture};

pub use color_ramp::ColorRampLayer;

/// Side of the transparent texture standing in for absent layer data.
pub const PLACEHOLDER_SIZE: u32 = 4;

/// Supplier of one texture unit per tile.
///
/// Layers are queried from the background build workers, so they must be
/// shareable across threads.
pub trait Layer: Send + Sync {
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }

    /// Texture for the tile at `key`, given its freshly built mesh. `None`
    /// when the layer has nothing to show there.
    fn texture(&self, key: &TileKey, mesh: &TileMesh) -> Option<Texture>;

    /// Approximate memory one tile's texture occupies.
    fn bytes_per_tile(&self) -> usize;
}

/// One texture unit of the terrain. `None` leaves the unit empty.
pub type LayerSlot = Option<Arc<dyn Layer>>;

/// Total per-tile texture budget of a layer stack.
pub fn layer_bytes_per_tile(layers: &[LayerSlot]) -> usize {
    layers.iter().flatten().map(|layer| layer.bytes_per_tile()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(usize);

    impl Layer for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn texture(&self, _key: &TileKey, _mesh: &TileMesh) -> Option<Texture> {
            None
        }

        fn bytes_per_tile(&self) -> usize {
            self.0
        }
    }

    #[test]
    fn budget_skips_empty_slots() {
        let layers: Vec<LayerSlot> = vec![Some(Arc::new(Fixed(100))), None, Some(Arc::new(Fixed(28)))];
        assert_eq!(layer_bytes_per_tile(&layers), 128);
        assert_eq!(layer_bytes_per_tile(&[]), 0);
        assert!(Fixed(1).is_enabled());
    }
}
