mod builder;
pub mod cache;
pub mod factory;
pub mod key;
pub mod tile;
mod workers;

pub use cache::TileCache;
pub use factory::{TileFactory, TileFetch};
pub use key::{MAX_LEVEL, Quadrant, TileKey};
pub use tile::{Tile, TileContent};
