//! Error types for tile synthesis.

use thiserror::Error;

/// Errors raised while building tile grids or reading image metadata.
#[derive(Debug, Error)]
pub enum TileError {
    /// The image metadata has no `tiles` entry.
    #[error("image metadata has no tile description")]
    MissingTiles,

    /// The tile description has no scale factors.
    #[error("tile description has no scale factors")]
    MissingScaleFactors,

    /// A tile dimension is zero.
    #[error("invalid tile size {width}x{height}")]
    InvalidTileSize { width: u32, height: u32 },

    /// A scale factor is zero.
    #[error("scale factor must be positive")]
    InvalidScaleFactor,

    /// The image has a zero dimension.
    #[error("invalid image size {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },

    /// The requested level does not exist in the pyramid.
    #[error("level {level} out of range (max level {max_level})")]
    LevelOutOfRange { level: u32, max_level: u32 },

    /// The minimum level is above the maximum level.
    #[error("empty level range {min}..={max}")]
    EmptyLevelRange { min: u32, max: u32 },

    /// A tile URL does not follow the
    /// `{base}/{region}/{size}/{rotation}/{quality}.{format}` grammar.
    #[error("malformed tile url: {0}")]
    MalformedUrl(String),

    /// The manifest does not have the expected structure.
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    /// JSON parsing failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for tile operations.
pub type TileResult<T> = Result<T, TileError>;
