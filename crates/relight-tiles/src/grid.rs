//! Tile grid generation for one pyramid level.

use crate::error::{TileError, TileResult};
use crate::info::TileSpec;
use crate::url::{ImageFormat, Region, TileKey, UrlOptions, source_identifier};

/// One tile of a pyramid level.
///
/// `x`, `y`, `width` and `height` give the tile's extent in full-resolution
/// image pixels; `pixel_width` and `pixel_height` give the size requested from
/// the image server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRect {
    /// Region segment of the request.
    pub region: Region,
    /// Left edge in full-resolution pixels.
    pub x: u32,
    /// Top edge in full-resolution pixels.
    pub y: u32,
    /// Extent width in full-resolution pixels.
    pub width: u32,
    /// Extent height in full-resolution pixels.
    pub height: u32,
    /// Requested tile width.
    pub pixel_width: u32,
    /// Requested tile height.
    pub pixel_height: u32,
    /// Request URL.
    pub url: String,
}

impl TileRect {
    /// Texture cache key for this tile.
    #[must_use]
    pub fn key(&self, base: &str) -> TileKey {
        TileKey {
            source: source_identifier(base).to_string(),
            region: self.region,
            width: self.pixel_width,
        }
    }

    /// Whether two tiles cover the same extent at the same resolution.
    #[must_use]
    pub fn same_geometry(&self, other: &Self) -> bool {
        self.x == other.x
            && self.y == other.y
            && self.width == other.width
            && self.height == other.height
            && self.pixel_width == other.pixel_width
            && self.pixel_height == other.pixel_height
    }
}

/// Enumerate every tile of `level` for an image of `width` x `height` pixels.
///
/// Tiles are returned row-major, top to bottom and left to right. Albedo and
/// normal grids are zipped index for index, so the order is part of the
/// contract.
pub fn generate_tile_grid(
    base_url: &str,
    width: u32,
    height: u32,
    spec: &TileSpec,
    level: u32,
    options: &UrlOptions,
    format: &ImageFormat,
) -> TileResult<Vec<TileRect>> {
    if width == 0 || height == 0 {
        return Err(TileError::InvalidImageSize { width, height });
    }
    let scale = spec.scale_for_level(level)?;
    let tile_width = spec.width;
    let tile_height = spec.tile_height();

    let region_width = scale.saturating_mul(tile_width);
    let region_height = scale.saturating_mul(tile_height);
    let single = width.div_ceil(scale) <= tile_width && height.div_ceil(scale) <= tile_height;

    if single {
        let pixel_width = width.div_ceil(scale);
        let pixel_height = height.div_ceil(scale);
        return Ok(vec![TileRect {
            region: Region::Full,
            x: 0,
            y: 0,
            width,
            height,
            pixel_width,
            pixel_height,
            url: options.tile_url(base_url, Region::Full, pixel_width, pixel_height, format),
        }]);
    }

    let columns = width.div_ceil(region_width);
    let rows = height.div_ceil(region_height);
    let mut tiles = Vec::with_capacity((columns as usize) * (rows as usize));

    let mut y = 0;
    while y < height {
        let extent_height = region_height.min(height - y);
        let pixel_height = tile_height.min((height - y).div_ceil(scale));
        let mut x = 0;
        while x < width {
            let extent_width = region_width.min(width - x);
            let pixel_width = tile_width.min((width - x).div_ceil(scale));
            let region = Region::Rect {
                x,
                y,
                width: extent_width,
                height: extent_height,
            };
            tiles.push(TileRect {
                region,
                x,
                y,
                width: extent_width,
                height: extent_height,
                pixel_width,
                pixel_height,
                url: options.tile_url(base_url, region, pixel_width, pixel_height, format),
            });
            x += extent_width;
        }
        y += extent_height;
    }

    tracing::debug!(
        "Generated {} tiles for level {} (scale {}, {}x{} grid)",
        tiles.len(),
        level,
        scale,
        columns,
        rows
    );

    Ok(tiles)
}
