//! Error types for the reference viewer.

use relight_tiles::TileError;
use thiserror::Error;

/// Errors raised while fetching and decoding viewer data.
#[derive(Debug, Error)]
pub enum LoadError {
    /// HTTP request failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Tile bytes could not be decoded.
    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),

    /// Manifest or `info.json` could not be used.
    #[error("metadata error: {0}")]
    Tiles(#[from] TileError),

    /// The engine rejected the data.
    #[error("engine error: {0}")]
    Engine(#[from] relight::Error),

    /// Reading a local file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The canvas has no resource with an image service to display.
    #[error("canvas has no image service")]
    NoImageService,
}
