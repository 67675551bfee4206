//! Terrain facade: owns the tile factory session, the LOD selection and
//! the raster metadata; coordinate, query and sampling APIs live in the
//! submodules.

pub mod coords;
pub mod lod;
pub mod query;
pub mod sampling;

use std::collections::HashMap;
use std::sync::Arc;

use glam::DVec3;
use tracing::info;

use crate::config::{DisplayFormat, TerrainConfig};
use crate::error::{Result, TerrainError};
use crate::layer::LayerSlot;
use crate::quadtree::{Tile, TileFactory, TileKey};
use crate::raster::{RasterInfo, RasterSource};
use crate::transform::ProjectionTransform;
use crate::types::{BoundingBox, Texture};

pub use coords::LocalFrame;
pub use lod::Camera;
pub use sampling::{CancelToken, DifferenceGrid, Volume};

pub struct Terrain {
    source: Arc<dyn RasterSource>,
    info: RasterInfo,
    projection: Option<Box<dyn ProjectionTransform>>,
    config: TerrainConfig,
    factory: TileFactory,
    root: Arc<Tile>,
    /// Tiles chosen by the last LOD walk; they partition the terrain.
    selection: HashMap<TileKey, Arc<Tile>>,
    frame: LocalFrame,
    display: DisplayFormat,
    vertical_exaggeration: f64,
    layers_enabled: bool,
}

impl Terrain {
    /// Open a terrain over `source` with one texture unit per layer slot.
    /// Fails if the raster metadata is invalid, its projection cannot be
    /// set up, or the root tile cannot be built.
    pub fn new(source: Arc<dyn RasterSource>, layers: Vec<LayerSlot>, config: TerrainConfig) -> Result<Self> {
        let info = source.info().clone();
        info.validate()?;
        let projection = info.projection.as_ref().map(|p| p.build()).transpose()?;

        let factory = TileFactory::new(Arc::clone(&source), layers, &config)?;
        let root = Self::load_root(&factory)?;

        let frame = LocalFrame {
            pixel_scale: info.pixel_scale(),
            min_elevation: info.min_elevation,
        };
        let display_format = DisplayFormat::for_extent(
            (info.raster_width as f64 * info.pixel_width).max(info.raster_length as f64 * info.pixel_length),
        );

        info!(
            width = %display_format.format(info.raster_width as f64 * info.pixel_width),
            length = %display_format.format(info.raster_length as f64 * info.pixel_length),
            min_elevation = %display_format.format(info.min_elevation),
            max_elevation = %display_format.format(info.max_elevation),
            levels = info.levels,
            pixel_scale = frame.pixel_scale,
            "Opened terrain"
        );

        let selection = HashMap::from([(TileKey::root(), Arc::clone(&root))]);
        Ok(Self {
            source,
            info,
            projection,
            config,
            factory,
            root,
            selection,
            frame,
            display: display_format,
            vertical_exaggeration: 1.0,
            layers_enabled: true,
        })
    }

    /// Replace the spatial reference taken from the raster metadata.
    pub fn with_projection(mut self, projection: Box<dyn ProjectionTransform>) -> Self {
        self.projection = Some(projection);
        self
    }

    fn load_root(factory: &TileFactory) -> Result<Arc<Tile>> {
        factory
            .fetch_key(&TileKey::root(), true)
            .ready()
            .ok_or_else(|| TerrainError::Tile("root tile could not be built".into()))
    }

    /// Tear down the tile session and rebuild it with a new layer stack.
    pub fn reset_layers(&mut self, layers: Vec<LayerSlot>) -> Result<()> {
        self.factory.shutdown();
        let factory = TileFactory::new(Arc::clone(&self.source), layers, &self.config)?;
        let root = Self::load_root(&factory)?;
        self.factory = factory;
        self.selection = HashMap::from([(TileKey::root(), Arc::clone(&root))]);
        self.root = root;
        info!(layers = self.factory.layers().len(), "Reset terrain layers");
        Ok(())
    }

    /// Stop the build workers and release every tile.
    pub fn dispose(mut self) {
        self.selection.clear();
        self.factory.shutdown();
    }

    /// Synchronously build all existing tiles of `level`.
    pub fn preload_level(&self, level: usize) -> usize {
        self.factory.preload_level(level)
    }

    pub fn set_surface_color(&mut self, color: [f32; 4]) {
        self.config.surface_color = color;
        self.factory.set_surface_color(color);
    }

    pub fn surface_color(&self) -> [f32; 4] {
        self.config.surface_color
    }

    pub fn enable_layers(&mut self, enabled: bool) {
        self.layers_enabled = enabled;
    }

    pub fn layers_enabled(&self) -> bool {
        self.layers_enabled
    }

    /// Textures to bind for `tile`: its composited layers, or placeholders
    /// for every slot while layers are disabled or the tile is pending.
    pub fn textures(&self, tile: &Tile) -> Vec<Arc<Texture>> {
        match tile.content() {
            Some(content) if self.layers_enabled => content.textures.clone(),
            _ => vec![self.factory.placeholder_texture(); self.factory.layers().len()],
        }
    }

    pub fn set_vertical_exaggeration(&mut self, exaggeration: f64) {
        self.vertical_exaggeration = exaggeration;
    }

    pub fn vertical_exaggeration(&self) -> f64 {
        self.vertical_exaggeration
    }

    pub fn info(&self) -> &RasterInfo {
        &self.info
    }

    pub fn factory(&self) -> &TileFactory {
        &self.factory
    }

    pub fn root(&self) -> &Arc<Tile> {
        &self.root
    }

    /// Tiles chosen by the last [`Terrain::update`].
    pub fn selection(&self) -> impl Iterator<Item = &Arc<Tile>> {
        self.selection.values()
    }

    pub fn frame(&self) -> LocalFrame {
        self.frame
    }

    pub fn pixel_scale(&self) -> f64 {
        self.frame.pixel_scale
    }

    pub fn display_format(&self) -> DisplayFormat {
        self.display
    }

    /// Full-resolution pixel width in the local frame.
    pub fn pixel_width(&self) -> f64 {
        self.info.pixel_width * self.frame.pixel_scale
    }

    pub fn pixel_length(&self) -> f64 {
        self.info.pixel_length * self.frame.pixel_scale
    }

    pub fn raster_width(&self) -> usize {
        self.info.raster_width
    }

    pub fn raster_length(&self) -> usize {
        self.info.raster_length
    }

    pub fn min_elevation(&self) -> f64 {
        self.info.min_elevation
    }

    pub fn max_elevation(&self) -> f64 {
        self.info.max_elevation
    }

    /// Deepest level the LOD walk selects.
    pub fn base_map_level(&self) -> usize {
        let base = self.info.base_level();
        self.config.lod.max_level.map_or(base, |max| max.min(base))
    }

    /// Terrain extent in the local frame: `[-W/2, -L/2, 0]` to
    /// `[W/2, L/2, (max - min) * scale]`.
    pub fn bounds(&self) -> BoundingBox {
        let w = self.info.raster_width as f64 * self.pixel_width();
        let l = self.info.raster_length as f64 * self.pixel_length();
        let top = self.frame.height_to_local(self.info.max_elevation);
        BoundingBox {
            min: [-w / 2.0, -l / 2.0, 0.0],
            max: [w / 2.0, l / 2.0, top],
        }
    }

    /// Local-frame centre, on the surface where it has data.
    pub fn center(&self) -> DVec3 {
        let z = self.z(0.0, 0.0);
        DVec3::new(0.0, 0.0, if z.is_nan() { 0.0 } else { z })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::layer::ColorRampLayer;
    use crate::raster::{MemoryPyramid, memory::PyramidLayout};

    /// Terrain over a `size x size` grid of unit pixels filled by `f(col, row)`.
    pub(crate) fn terrain_from(size: usize, tile: usize, f: impl Fn(usize, usize) -> f32) -> Terrain {
        let grid: Vec<f32> = (0..size * size).map(|i| f(i % size, i / size)).collect();
        let layout = PyramidLayout {
            tile_width: tile,
            tile_length: tile,
            fill_value: -9999.0,
            ..Default::default()
        };
        let source = Arc::new(MemoryPyramid::from_grid(&grid, size, size, layout).unwrap());
        Terrain::new(source, Vec::new(), TerrainConfig::default()).unwrap()
    }

    #[test]
    fn metadata_accessors() {
        let terrain = terrain_from(8, 4, |c, r| (c + r) as f32);
        assert_eq!(terrain.raster_width(), 8);
        assert_eq!(terrain.raster_length(), 8);
        assert_eq!(terrain.pixel_scale(), 1.0);
        assert_eq!(terrain.pixel_width(), 1.0);
        assert_eq!(terrain.min_elevation(), 0.0);
        assert_eq!(terrain.max_elevation(), 14.0);
        assert_eq!(terrain.base_map_level(), 1);

        let bounds = terrain.bounds();
        assert_eq!(bounds.min, [-4.0, -4.0, 0.0]);
        assert_eq!(bounds.max, [4.0, 4.0, 14.0]);
        assert_eq!(terrain.display_format().decimals, 5);
        assert_eq!(terrain.selection().count(), 1);
        assert!(terrain.root().is_ready());
    }

    #[test]
    fn root_failure_is_fatal() {
        let grid = vec![1.0f32; 16];
        let layout = PyramidLayout {
            tile_width: 2,
            tile_length: 2,
            ..Default::default()
        };
        let mut pyramid = MemoryPyramid::from_grid(&grid, 4, 4, layout).unwrap();
        pyramid.remove_tile(&TileKey::root());
        let result = Terrain::new(Arc::new(pyramid), Vec::new(), TerrainConfig::default());
        assert!(matches!(result, Err(TerrainError::Tile(_))));
    }

    #[test]
    fn max_level_caps_base_map_level() {
        let grid = vec![1.0f32; 64];
        let layout = PyramidLayout {
            tile_width: 2,
            tile_length: 2,
            ..Default::default()
        };
        let source = Arc::new(MemoryPyramid::from_grid(&grid, 8, 8, layout).unwrap());
        let mut config = TerrainConfig::default();
        config.lod.max_level = Some(1);
        let terrain = Terrain::new(source, Vec::new(), config).unwrap();
        assert_eq!(terrain.info().base_level(), 2);
        assert_eq!(terrain.base_map_level(), 1);
    }

    #[test]
    fn layers_toggle_and_reset() {
        let mut terrain = terrain_from(4, 4, |c, _| c as f32);
        assert!(terrain.textures(terrain.root()).is_empty());

        let ramp = Arc::new(ColorRampLayer::for_raster("height", terrain.info()));
        terrain.reset_layers(vec![Some(ramp), None]).unwrap();
        let root = Arc::clone(terrain.root());
        let textures = terrain.textures(&root);
        assert_eq!(textures.len(), 2);
        let placeholder = terrain.factory().placeholder_texture();
        assert!(!Arc::ptr_eq(&textures[0], &placeholder));
        assert!(Arc::ptr_eq(&textures[1], &placeholder));

        terrain.enable_layers(false);
        assert!(!terrain.layers_enabled());
        assert!(terrain.textures(&root).iter().all(|t| Arc::ptr_eq(t, &placeholder)));
    }

    #[test]
    fn surface_color_and_exaggeration() {
        let mut terrain = terrain_from(4, 4, |_, _| 1.0);
        terrain.set_surface_color([0.5, 0.6, 0.7, 1.0]);
        assert_eq!(terrain.surface_color(), [0.5, 0.6, 0.7, 1.0]);
        assert_eq!(terrain.root().surface_color(), [0.5, 0.6, 0.7, 1.0]);

        terrain.set_vertical_exaggeration(2.5);
        assert_eq!(terrain.vertical_exaggeration(), 2.5);
    }

    #[test]
    fn center_sits_on_surface() {
        let terrain = terrain_from(4, 4, |_, _| 7.0);
        assert_eq!(terrain.center(), DVec3::new(0.0, 0.0, 0.0));
        let sloped = terrain_from(4, 4, |c, _| c as f32);
        assert!((sloped.center().z - 1.5).abs() < 1e-6);
    }

    #[test]
    fn dispose_stops_session() {
        let terrain = terrain_from(4, 4, |_, _| 1.0);
        terrain.dispose();
    }
}
