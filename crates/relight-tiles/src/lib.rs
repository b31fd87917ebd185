//! Tile pyramid synthesis for IIIF deep-zoom images.
//!
//! This crate provides pure synchronous functions for reconstructing the
//! complete tile grid of every resolution level of a IIIF image from its
//! `info.json` metadata, and for resolving the albedo and normal lighting maps
//! of a manifest canvas. A deep-zoom viewer only materializes tiles lazily, so
//! the relight overlay rebuilds the full grid itself.
//!
//! # Design principles
//!
//! - **Synchronous**: No async, no threading primitives
//! - **Deterministic**: The same metadata always yields the same tiles, in the
//!   same order
//! - **Web-compatible**: Compiles to WASM
//!
//! # Key functions
//!
//! - [`generate_tile_grid`]: Enumerate the tiles of one resolution level
//! - [`build_tile_sets`]: Albedo/normal tile layouts for every level
//! - [`parse_tile_url`]: Recover region and size from a tile request URL
//! - [`manifest::canvas_resources`]: Extract lighting-map image resources

mod error;

pub mod grid;
pub mod info;
pub mod manifest;
pub mod tileset;
pub mod url;

pub use error::{TileError, TileResult};
pub use grid::{TileRect, generate_tile_grid};
pub use info::{ImageInfo, TileSpec};
pub use manifest::{ImageResource, LightingMaps, MapType};
pub use tileset::{LevelTileSet, TileSetCollection, build_tile_sets};
pub use url::{ImageFormat, Region, SizeConvention, TileKey, TileUrl, UrlOptions, parse_tile_url};

/// Default tile format when the image service does not list a preferred one.
pub const DEFAULT_FORMAT: &str = "jpg";
