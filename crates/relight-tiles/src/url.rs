//! IIIF tile request URLs.
//!
//! Tiles are requested as `{base}/{region}/{size}/{rotation}/{quality}.{format}`.
//! Generated URLs always use rotation `0` and quality `default`. The size
//! segment follows [`SizeConvention`]; parsing accepts every convention a host
//! viewer is likely to emit, so cache keys still line up when the host builds
//! its URLs differently.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::DEFAULT_FORMAT;
use crate::error::{TileError, TileResult};

/// Region segment of a tile request, in full-resolution pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Region {
    /// The whole image.
    Full,
    /// An `x,y,w,h` rectangle.
    Rect {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("full"),
            Self::Rect {
                x,
                y,
                width,
                height,
            } => write!(f, "{x},{y},{width},{height}"),
        }
    }
}

impl Region {
    /// Parse a region segment. Only `full` and pixel rectangles are supported.
    pub fn parse(segment: &str) -> TileResult<Self> {
        if segment == "full" {
            return Ok(Self::Full);
        }
        let parts: Vec<&str> = segment.split(',').collect();
        let [x, y, width, height] = parts.as_slice() else {
            return Err(TileError::MalformedUrl(format!("region '{segment}'")));
        };
        let parse = |value: &str| {
            value
                .parse::<u32>()
                .map_err(|_| TileError::MalformedUrl(format!("region '{segment}'")))
        };
        Ok(Self::Rect {
            x: parse(x)?,
            y: parse(y)?,
            width: parse(width)?,
            height: parse(height)?,
        })
    }
}

/// How the size segment of generated URLs is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SizeConvention {
    /// `w,h`: both dimensions explicit.
    #[default]
    WidthHeight,
    /// `w,`: the server derives the height from the region aspect ratio.
    WidthOnly,
}

impl SizeConvention {
    /// Format the size segment.
    #[must_use]
    pub fn format(self, width: u32, height: u32) -> String {
        match self {
            Self::WidthHeight => format!("{width},{height}"),
            Self::WidthOnly => format!("{width},"),
        }
    }
}

/// Tile image format (file extension).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageFormat(String);

impl ImageFormat {
    /// Create a format from an extension, with or without a leading dot.
    #[must_use]
    pub fn new(extension: &str) -> Self {
        Self(extension.trim_start_matches('.').to_ascii_lowercase())
    }

    /// File extension without the dot.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.0
    }
}

impl Default for ImageFormat {
    fn default() -> Self {
        Self(DEFAULT_FORMAT.to_string())
    }
}

/// Options for generated tile URLs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UrlOptions {
    /// Size segment convention.
    pub size_convention: SizeConvention,
    /// Overrides the format advertised by the image service.
    pub format: Option<ImageFormat>,
}

impl UrlOptions {
    /// Build the request URL for one tile.
    #[must_use]
    pub fn tile_url(
        &self,
        base: &str,
        region: Region,
        width: u32,
        height: u32,
        format: &ImageFormat,
    ) -> String {
        let format = self.format.as_ref().unwrap_or(format);
        format!(
            "{}/{}/{}/0/default.{}",
            base.trim_end_matches('/'),
            region,
            self.size_convention.format(width, height),
            format.extension()
        )
    }
}

/// A tile request URL split into its IIIF segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileUrl {
    /// Image service base URL.
    pub base: String,
    /// Region segment.
    pub region: Region,
    /// Requested width, when the size segment states one.
    pub width: Option<u32>,
    /// Requested height, when the size segment states one.
    pub height: Option<u32>,
    /// Rotation segment, verbatim.
    pub rotation: String,
    /// Quality, e.g. `default` or `color`.
    pub quality: String,
    /// Format extension.
    pub format: ImageFormat,
}

impl TileUrl {
    /// Identifier of the source image: the last path segment of the base URL.
    #[must_use]
    pub fn source(&self) -> &str {
        source_identifier(&self.base)
    }

    /// Cache key for the tile this URL requests.
    ///
    /// `delivered_width` is the width of the decoded image. It stands in for
    /// the requested width when the size segment is `,h`, `full` or `max`.
    #[must_use]
    pub fn key(&self, delivered_width: u32) -> TileKey {
        TileKey {
            source: self.source().to_string(),
            region: self.region,
            width: self.width.unwrap_or(delivered_width),
        }
    }
}

/// Parse a tile URL of the form `{base}/{region}/{size}/{rotation}/{quality}.{format}`.
pub fn parse_tile_url(url: &str) -> TileResult<TileUrl> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let mut segments = path.rsplitn(5, '/');
    let (Some(quality_format), Some(rotation), Some(size), Some(region), Some(base)) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(TileError::MalformedUrl(url.to_string()));
    };
    if base.is_empty() || source_identifier(base).is_empty() {
        return Err(TileError::MalformedUrl(url.to_string()));
    }

    let (quality, format) = quality_format
        .split_once('.')
        .ok_or_else(|| TileError::MalformedUrl(url.to_string()))?;
    let region = Region::parse(region)?;
    let (width, height) = parse_size(size)?;

    Ok(TileUrl {
        base: base.to_string(),
        region,
        width,
        height,
        rotation: rotation.to_string(),
        quality: quality.to_string(),
        format: ImageFormat::new(format),
    })
}

/// Parse a size segment into optional width and height.
fn parse_size(segment: &str) -> TileResult<(Option<u32>, Option<u32>)> {
    if segment == "full" || segment == "max" || segment.starts_with("pct:") {
        return Ok((None, None));
    }
    let segment = segment.trim_start_matches(['^', '!']);
    let Some((width, height)) = segment.split_once(',') else {
        return Err(TileError::MalformedUrl(format!("size '{segment}'")));
    };
    let parse = |value: &str| -> TileResult<Option<u32>> {
        if value.is_empty() {
            return Ok(None);
        }
        value
            .parse::<u32>()
            .map(Some)
            .map_err(|_| TileError::MalformedUrl(format!("size '{segment}'")))
    };
    Ok((parse(width)?, parse(height)?))
}

/// Last path segment of an image service id.
#[must_use]
pub fn source_identifier(base: &str) -> &str {
    let trimmed = base.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Texture cache key: unique per source image and tile geometry.
///
/// The width is part of the key because a clipped edge region, or the `full`
/// region, can repeat across levels at a different resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    /// Source image identifier.
    pub source: String,
    /// Requested region.
    pub region: Region,
    /// Tile width in pixels.
    pub width: u32,
}

impl TileKey {
    /// Parse a key from a tile URL and the width of the image it returned.
    pub fn from_url(url: &str, delivered_width: u32) -> TileResult<Self> {
        parse_tile_url(url).map(|parsed| parsed.key(delivered_width))
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.source, self.region, self.width)
    }
}
