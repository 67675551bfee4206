use std::io;

/// All error types for the terrain tile engine.
#[derive(thiserror::Error, Debug)]
pub enum TerrainError {
    #[error("Raster error: {0}")]
    Raster(String),
    #[error("Projection error: {0}")]
    Projection(String),
    #[error("Tile error: {0}")]
    Tile(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TerrainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_strings() {
        let e = TerrainError::Raster("no tile".into());
        assert_eq!(e.to_string(), "Raster error: no tile");

        let e = TerrainError::Projection("latitude out of range".into());
        assert_eq!(e.to_string(), "Projection error: latitude out of range");

        let e = TerrainError::Tile("root is empty".into());
        assert_eq!(e.to_string(), "Tile error: root is empty");

        let e = TerrainError::Config("zero workers".into());
        assert_eq!(e.to_string(), "Configuration error: zero workers");
    }

    #[test]
    fn from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "pyramid.json missing");
        let e: TerrainError = io_err.into();
        assert!(matches!(e, TerrainError::Io(_)));
        assert!(e.to_string().contains("pyramid.json missing"));
    }

    #[test]
    fn from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let e: TerrainError = json_err.into();
        assert!(matches!(e, TerrainError::Json(_)));
    }
}
