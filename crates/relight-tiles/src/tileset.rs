//! Per-level albedo/normal tile layouts.

use std::collections::BTreeMap;

use crate::error::{TileError, TileResult};
use crate::grid::{TileRect, generate_tile_grid};
use crate::info::ImageInfo;
use crate::url::UrlOptions;

/// Albedo and normal tiles of one level.
///
/// `albedo_tiles[i]` and `normal_tiles[i]` cover the same extent; only their
/// URLs differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelTileSet {
    pub level: u32,
    pub albedo_tiles: Vec<TileRect>,
    pub normal_tiles: Vec<TileRect>,
}

impl LevelTileSet {
    /// Number of tile pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.albedo_tiles.len()
    }

    /// Whether the level has no tiles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.albedo_tiles.is_empty()
    }

    /// Iterate over matching albedo/normal pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (&TileRect, &TileRect)> {
        self.albedo_tiles.iter().zip(&self.normal_tiles)
    }
}

/// Tile layouts for every level of a session, keyed by level index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileSetCollection {
    /// Image width in full-resolution pixels.
    pub width: u32,
    /// Image height in full-resolution pixels.
    pub height: u32,
    /// Albedo image service base URL.
    pub albedo_base: String,
    /// Normal image service base URL.
    pub normal_base: String,
    levels: BTreeMap<u32, LevelTileSet>,
}

impl TileSetCollection {
    /// Tile set for `level`, if built.
    #[must_use]
    pub fn level(&self, level: u32) -> Option<&LevelTileSet> {
        self.levels.get(&level)
    }

    /// All levels, coarsest first.
    pub fn levels(&self) -> impl Iterator<Item = &LevelTileSet> {
        self.levels.values()
    }

    /// Lowest built level.
    #[must_use]
    pub fn min_level(&self) -> Option<u32> {
        self.levels.keys().next().copied()
    }

    /// Highest built level.
    #[must_use]
    pub fn max_level(&self) -> Option<u32> {
        self.levels.keys().next_back().copied()
    }

    /// Number of levels.
    #[must_use]
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Total number of tile pairs across levels.
    #[must_use]
    pub fn tile_count(&self) -> usize {
        self.levels.values().map(LevelTileSet::len).sum()
    }
}

/// Build albedo and normal tile layouts for levels `min_level..=max_level`.
///
/// Both maps share the dimensions and tiling of the albedo `info`. The maximum
/// level is `scale_factors.len() - 1`.
pub fn build_tile_sets(
    min_level: u32,
    info: &ImageInfo,
    albedo_base: &str,
    normal_base: &str,
    options: &UrlOptions,
) -> TileResult<TileSetCollection> {
    info.validate_size()?;
    let spec = info.tile_spec()?;
    let max_level = info.max_level()?;
    if min_level > max_level {
        return Err(TileError::EmptyLevelRange {
            min: min_level,
            max: max_level,
        });
    }
    let format = info.format();

    let mut levels = BTreeMap::new();
    for level in min_level..=max_level {
        let albedo_tiles = generate_tile_grid(
            albedo_base,
            info.width,
            info.height,
            spec,
            level,
            options,
            &format,
        )?;
        let normal_tiles = generate_tile_grid(
            normal_base,
            info.width,
            info.height,
            spec,
            level,
            options,
            &format,
        )?;
        levels.insert(
            level,
            LevelTileSet {
                level,
                albedo_tiles,
                normal_tiles,
            },
        );
    }

    let collection = TileSetCollection {
        width: info.width,
        height: info.height,
        albedo_base: albedo_base.to_string(),
        normal_base: normal_base.to_string(),
        levels,
    };
    tracing::info!(
        "Built tile sets for levels {}..={} ({} tile pairs)",
        min_level,
        max_level,
        collection.tile_count()
    );
    Ok(collection)
}
