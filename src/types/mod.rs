pub mod bounds;
pub mod mesh;
pub mod texture;

pub use bounds::BoundingBox;
pub use mesh::TileMesh;
pub use texture::{ApplyMode, FilterMode, Texture, WrapMode};
