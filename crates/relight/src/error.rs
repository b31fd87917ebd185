//! Error types for the relight engine.

use relight_tiles::TileError;
use thiserror::Error;

/// Errors raised by the overlay engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Tile metadata could not be turned into tile sets.
    #[error("tile metadata error: {0}")]
    Tiles(#[from] TileError),

    /// The host has no tile source loaded.
    #[error("host has no tile source")]
    MissingTileSource,

    /// A decoded tile image has the wrong buffer length.
    #[error("tile image is {width}x{height} but has {len} bytes")]
    InvalidImage { width: u32, height: u32, len: usize },

    /// The configuration could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
