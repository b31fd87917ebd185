//! IIIF image information (`info.json`).

use serde::{Deserialize, Serialize};

use crate::error::{TileError, TileResult};
use crate::url::ImageFormat;

/// Image service metadata for one IIIF image.
///
/// Only the fields needed to rebuild the tile pyramid are kept. Both Image API
/// 2 (`@id`) and 3 (`id`) identifiers are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    /// Image service identifier (base URL for tile requests).
    #[serde(default, alias = "@id")]
    pub id: Option<String>,
    /// Full-resolution width in pixels.
    #[serde(default)]
    pub width: u32,
    /// Full-resolution height in pixels.
    #[serde(default)]
    pub height: u32,
    /// Tile descriptions. Servers in practice publish a single entry.
    #[serde(default)]
    pub tiles: Vec<TileSpec>,
    /// Formats the server prefers, most preferred first.
    #[serde(default)]
    pub preferred_formats: Vec<String>,
}

/// Tile size and scale factors for a pyramid.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileSpec {
    /// Tile width in pixels at the tile's own scale.
    pub width: u32,
    /// Tile height; defaults to `width` when absent.
    #[serde(default)]
    pub height: Option<u32>,
    /// Downsampling factors, one per level, in no guaranteed order.
    #[serde(default)]
    pub scale_factors: Vec<u32>,
}

impl ImageInfo {
    /// Parse `info.json` bytes.
    pub fn from_json(bytes: &[u8]) -> TileResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// The tile description used for the pyramid.
    pub fn tile_spec(&self) -> TileResult<&TileSpec> {
        let spec = self.tiles.first().ok_or(TileError::MissingTiles)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Highest (finest) level index.
    pub fn max_level(&self) -> TileResult<u32> {
        let spec = self.tile_spec()?;
        let count = u32::try_from(spec.scale_factors.len()).unwrap_or(u32::MAX);
        Ok(count - 1)
    }

    /// Format used for tile requests: the first preferred format, or `jpg`.
    #[must_use]
    pub fn format(&self) -> ImageFormat {
        self.preferred_formats
            .first()
            .map_or_else(ImageFormat::default, |format| ImageFormat::new(format))
    }

    /// Check that the image has usable dimensions.
    pub fn validate_size(&self) -> TileResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(TileError::InvalidImageSize {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

impl TileSpec {
    /// Create a square-tile spec.
    #[must_use]
    pub fn new(width: u32, scale_factors: Vec<u32>) -> Self {
        Self {
            width,
            height: None,
            scale_factors,
        }
    }

    /// Tile height, falling back to the width.
    #[must_use]
    pub fn tile_height(&self) -> u32 {
        self.height.unwrap_or(self.width)
    }

    /// Scale factors sorted from coarsest to finest.
    ///
    /// Level `n` of the pyramid is index `n` of this list.
    #[must_use]
    pub fn sorted_scale_factors(&self) -> Vec<u32> {
        let mut factors = self.scale_factors.clone();
        factors.sort_unstable_by(|a, b| b.cmp(a));
        factors
    }

    /// Scale factor for a level index.
    pub fn scale_for_level(&self, level: u32) -> TileResult<u32> {
        self.validate()?;
        let factors = self.sorted_scale_factors();
        let max_level = u32::try_from(factors.len() - 1).unwrap_or(u32::MAX);
        let scale = factors
            .get(level as usize)
            .copied()
            .ok_or(TileError::LevelOutOfRange { level, max_level })?;
        if scale == 0 {
            return Err(TileError::InvalidScaleFactor);
        }
        Ok(scale)
    }

    /// Reject zero-sized tiles and empty scale factor lists.
    pub fn validate(&self) -> TileResult<()> {
        if self.width == 0 || self.tile_height() == 0 {
            return Err(TileError::InvalidTileSize {
                width: self.width,
                height: self.tile_height(),
            });
        }
        if self.scale_factors.is_empty() {
            return Err(TileError::MissingScaleFactors);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO_V2: &str = r#"{
        "@context": "http://iiif.io/api/image/2/context.json",
        "@id": "https://iiif.example.org/iiif/image/a469e838",
        "protocol": "http://iiif.io/api/image",
        "width": 3208,
        "height": 4260,
        "tiles": [{ "width": 256, "height": 256, "scaleFactors": [1, 2, 4, 8, 16, 32] }],
        "profile": ["http://iiif.io/api/image/2/level2.json"]
    }"#;

    #[test]
    fn parses_v2_info() {
        let info = ImageInfo::from_json(INFO_V2.as_bytes()).unwrap();
        assert_eq!(
            info.id.as_deref(),
            Some("https://iiif.example.org/iiif/image/a469e838")
        );
        assert_eq!((info.width, info.height), (3208, 4260));
        assert_eq!(info.max_level().unwrap(), 5);
        assert_eq!(info.format().extension(), "jpg");
    }

    #[test]
    fn parses_v3_info_with_preferred_formats() {
        let json = r#"{
            "id": "https://iiif.example.org/v3/normal",
            "type": "ImageService3",
            "width": 100,
            "height": 50,
            "tiles": [{ "width": 512, "scaleFactors": [4, 1, 2] }],
            "preferredFormats": ["webp", "png"]
        }"#;
        let info = ImageInfo::from_json(json.as_bytes()).unwrap();
        let spec = info.tile_spec().unwrap();
        assert_eq!(spec.tile_height(), 512);
        assert_eq!(spec.sorted_scale_factors(), vec![4, 2, 1]);
        assert_eq!(info.format().extension(), "webp");
    }

    #[test]
    fn scale_factors_are_sorted_before_indexing() {
        let spec = TileSpec::new(256, vec![1, 32, 4, 16, 2, 8]);
        assert_eq!(spec.scale_for_level(0).unwrap(), 32);
        assert_eq!(spec.scale_for_level(5).unwrap(), 1);
        assert!(matches!(
            spec.scale_for_level(6),
            Err(TileError::LevelOutOfRange {
                level: 6,
                max_level: 5
            })
        ));
    }

    #[test]
    fn missing_tiles_is_an_error() {
        let info = ImageInfo::from_json(br#"{"width": 10, "height": 10}"#).unwrap();
        assert!(matches!(info.tile_spec(), Err(TileError::MissingTiles)));
        assert!(matches!(info.max_level(), Err(TileError::MissingTiles)));
    }

    #[test]
    fn missing_scale_factors_is_an_error() {
        let info =
            ImageInfo::from_json(br#"{"width": 10, "height": 10, "tiles": [{"width": 256}]}"#)
                .unwrap();
        assert!(matches!(
            info.tile_spec(),
            Err(TileError::MissingScaleFactors)
        ));
    }

    #[test]
    fn zero_scale_factor_is_rejected() {
        let spec = TileSpec::new(256, vec![0]);
        assert!(matches!(
            spec.scale_for_level(0),
            Err(TileError::InvalidScaleFactor)
        ));
    }
}
