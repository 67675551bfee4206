pub mod commands;
pub mod config;
pub mod error;
pub mod geometry;
pub mod layer;
pub mod quadtree;
pub mod raster;
pub mod terrain;
pub mod transform;
pub mod types;

pub use config::{DisplayFormat, Globe, LodConfig, TerrainConfig};
pub use error::{Result, TerrainError};
pub use quadtree::{TileFactory, TileFetch, TileKey};
pub use raster::{RasterInfo, RasterSource};
pub use terrain::{Camera, CancelToken, Terrain};
