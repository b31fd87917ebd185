//! Texture cache for albedo and normal tiles.
//!
//! Keyed by [`TileKey`], so a tile loaded once is reused by every level that
//! references the same source region at the same resolution. Only tiles of
//! the two lighting-map sources are kept.

use std::collections::HashMap;

use relight_tiles::{LightingMaps, TileKey, url::source_identifier};

use crate::backend::{MapKind, RenderBackend};
use crate::host::{LoadedTile, TileImage};

/// Result of offering a tile to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new texture was created.
    Inserted,
    /// A texture for the key already exists.
    Duplicate,
    /// The tile is not from a lighting-map source.
    Ignored,
}

/// Session texture cache.
#[derive(Debug)]
pub struct TextureCache<T> {
    albedo_source: String,
    normal_source: String,
    textures: HashMap<TileKey, T>,
}

impl<T> TextureCache<T> {
    /// Cache accepting tiles of the given maps.
    #[must_use]
    pub fn new(maps: &LightingMaps) -> Self {
        Self {
            albedo_source: source_identifier(&maps.albedo).to_string(),
            normal_source: source_identifier(&maps.normal).to_string(),
            textures: HashMap::new(),
        }
    }

    /// Which map a source identifier belongs to.
    #[must_use]
    pub fn map_kind(&self, source: &str) -> Option<MapKind> {
        if source == self.albedo_source {
            Some(MapKind::Albedo)
        } else if source == self.normal_source {
            Some(MapKind::Normal)
        } else {
            None
        }
    }

    /// Create a texture for `key` unless one exists.
    pub fn ingest<B>(&mut self, key: TileKey, image: &TileImage, backend: &mut B) -> IngestOutcome
    where
        B: RenderBackend<Texture = T>,
    {
        let Some(kind) = self.map_kind(&key.source) else {
            return IngestOutcome::Ignored;
        };
        if self.textures.contains_key(&key) {
            return IngestOutcome::Duplicate;
        }
        let texture = backend.create_texture(image, kind);
        tracing::trace!("Cached {:?} texture {}", kind, key);
        self.textures.insert(key, texture);
        IngestOutcome::Inserted
    }

    /// Ingest a tile reported by the host, keyed by its URL and the width of
    /// the decoded image.
    pub fn ingest_loaded<B>(&mut self, tile: &LoadedTile, backend: &mut B) -> IngestOutcome
    where
        B: RenderBackend<Texture = T>,
    {
        match TileKey::from_url(&tile.url, tile.image.width()) {
            Ok(key) => self.ingest(key, &tile.image, backend),
            Err(e) => {
                tracing::debug!("Ignoring tile with unparseable url: {}", e);
                IngestOutcome::Ignored
            }
        }
    }

    /// Ingest tiles the host loaded before the session started. Returns the
    /// number of textures created.
    pub fn prime<B>(&mut self, tiles: &[LoadedTile], backend: &mut B) -> usize
    where
        B: RenderBackend<Texture = T>,
    {
        let inserted = tiles
            .iter()
            .filter(|tile| self.ingest_loaded(tile, backend) == IngestOutcome::Inserted)
            .count();
        if inserted > 0 {
            tracing::debug!("Primed texture cache with {} tiles", inserted);
        }
        inserted
    }

    #[must_use]
    pub fn get(&self, key: &TileKey) -> Option<&T> {
        self.textures.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &TileKey) -> bool {
        self.textures.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Dispose every texture. Returns how many were released; repeated calls
    /// release nothing.
    pub fn release_all<B>(&mut self, backend: &mut B) -> usize
    where
        B: RenderBackend<Texture = T>,
    {
        let count = self.textures.len();
        for (_, texture) in self.textures.drain() {
            backend.dispose_texture(texture);
        }
        if count > 0 {
            tracing::debug!("Released {} textures", count);
        }
        count
    }
}
