//! Engine configuration.

use relight_tiles::{MapType, UrlOptions};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::light::LightState;

/// Overlay configuration. Every field has a default, so partial JSON is
/// accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RelightConfig {
    /// Light state at startup and after a reset.
    pub light: LightState,
    /// Tile URL generation.
    pub urls: UrlOptions,
    /// First pyramid level to build.
    pub min_level: u32,
    /// Layers hidden as soon as a relightable canvas loads.
    pub hidden_on_load: Vec<MapType>,
    /// Layers hidden while the overlay is active.
    pub hidden_while_active: Vec<MapType>,
}

impl Default for RelightConfig {
    fn default() -> Self {
        Self {
            light: LightState::default(),
            urls: UrlOptions::default(),
            min_level: 0,
            hidden_on_load: vec![MapType::Depth, MapType::Shaded],
            hidden_while_active: vec![MapType::Composite],
        }
    }
}

impl RelightConfig {
    /// Parse JSON config. Light values are clamped into range.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let mut config: Self = serde_json::from_slice(bytes)?;
        config.light = config.light.clamped();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relight_tiles::SizeConvention;

    #[test]
    fn empty_object_is_default() {
        assert_eq!(RelightConfig::from_json(b"{}").unwrap(), RelightConfig::default());
    }

    #[test]
    fn partial_config_overrides_fields() {
        let config = RelightConfig::from_json(
            br#"{
                "light": { "ambientIntensity": 3.0 },
                "urls": { "sizeConvention": "width-only", "format": "png" },
                "minLevel": 1,
                "hiddenWhileActive": ["composite", "shaded"]
            }"#,
        )
        .unwrap();
        assert!((config.light.ambient_intensity - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.urls.size_convention, SizeConvention::WidthOnly);
        assert_eq!(
            config.urls.format.as_ref().map(|format| format.extension()),
            Some("png")
        );
        assert_eq!(config.min_level, 1);
        assert_eq!(
            config.hidden_while_active,
            vec![MapType::Composite, MapType::Shaded]
        );
        assert_eq!(config.hidden_on_load, vec![MapType::Depth, MapType::Shaded]);
    }

    #[test]
    fn malformed_config_is_an_error() {
        assert!(RelightConfig::from_json(b"{\"minLevel\": -1}").is_err());
    }
}
