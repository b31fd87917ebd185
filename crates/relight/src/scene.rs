//! Scene and material management.
//!
//! Geometry, material and mesh for every tile of every level are built once
//! when a session starts. Afterwards the scene only binds textures as they
//! arrive, toggles visibility and pushes camera and light changes. A mesh is
//! shown only when its level is current and both of its textures are cached.

use relight_tiles::{TileKey, TileSetCollection};

use crate::backend::{MaterialParams, RenderBackend};
use crate::texture_cache::TextureCache;
use crate::viewport::{LightRig, ViewportFrame, image_to_scene};

#[allow(clippy::cast_precision_loss)]
fn to_f32(value: u32) -> f32 {
    value as f32
}

struct TileMesh<B: RenderBackend> {
    level: u32,
    albedo_key: TileKey,
    normal_key: TileKey,
    geometry: B::Geometry,
    material: B::Material,
    mesh: B::Mesh,
    textured: bool,
    visible: bool,
}

/// Pre-built meshes for a session.
pub struct SceneManager<B: RenderBackend> {
    tiles: Vec<TileMesh<B>>,
    level: Option<u32>,
    params: MaterialParams,
    rig: Option<LightRig>,
    disposed: bool,
}

impl<B: RenderBackend> SceneManager<B> {
    /// Build geometry, material and hidden mesh for every tile pair.
    pub fn build_all(
        collection: &TileSetCollection,
        params: MaterialParams,
        backend: &mut B,
    ) -> Self {
        let content_width = f64::from(collection.width);
        let content_height = f64::from(collection.height);
        let mut tiles = Vec::with_capacity(collection.tile_count());

        for set in collection.levels() {
            for (albedo, normal) in set.pairs() {
                let center = glam::DVec2::new(
                    f64::from(albedo.x) + f64::from(albedo.width) / 2.0,
                    f64::from(albedo.y) + f64::from(albedo.height) / 2.0,
                );
                let geometry = backend.create_geometry(to_f32(albedo.width), to_f32(albedo.height));
                let material = backend.create_material(&params);
                let mesh = backend.create_mesh(
                    &geometry,
                    &material,
                    image_to_scene(center, content_width, content_height),
                );
                tiles.push(TileMesh {
                    level: set.level,
                    albedo_key: albedo.key(&collection.albedo_base),
                    normal_key: normal.key(&collection.normal_base),
                    geometry,
                    material,
                    mesh,
                    textured: false,
                    visible: false,
                });
            }
        }

        tracing::info!(
            "Built {} tile meshes over {} levels",
            tiles.len(),
            collection.level_count()
        );

        Self {
            tiles,
            level: None,
            params,
            rig: None,
            disposed: false,
        }
    }

    /// Bind textures to meshes whose albedo and normal tiles are both cached.
    /// Returns the number of meshes that became textured.
    pub fn update_textures(&mut self, cache: &TextureCache<B::Texture>, backend: &mut B) -> usize {
        let mut bound = 0;
        for tile in self.tiles.iter_mut().filter(|tile| !tile.textured) {
            let (Some(albedo), Some(normal)) =
                (cache.get(&tile.albedo_key), cache.get(&tile.normal_key))
            else {
                continue;
            };
            backend.bind_textures(&tile.material, albedo, normal);
            tile.textured = true;
            bound += 1;
        }
        if bound > 0 {
            self.refresh_visibility(backend);
        }
        bound
    }

    /// Make `level` the displayed level.
    pub fn set_level(&mut self, level: u32, backend: &mut B) {
        if self.level == Some(level) {
            return;
        }
        tracing::debug!("Switching to level {}", level);
        self.level = Some(level);
        self.refresh_visibility(backend);
    }

    #[must_use]
    pub fn level(&self) -> Option<u32> {
        self.level
    }

    /// Apply material parameters and the light rig.
    ///
    /// A change of shading model replaces every material; a change within the
    /// model updates materials in place. Replacement materials of textured
    /// meshes are bound from `cache` before they are attached.
    pub fn set_light_params(
        &mut self,
        params: MaterialParams,
        rig: &LightRig,
        cache: &TextureCache<B::Texture>,
        backend: &mut B,
    ) {
        if self.disposed {
            return;
        }
        if !params.model.same_kind(&self.params.model) {
            self.rebuild_materials(params, cache, backend);
        } else if params != self.params {
            for tile in &self.tiles {
                backend.update_material(&tile.material, &params);
            }
        }
        self.params = params;

        if self.rig.as_ref() != Some(rig) {
            backend.set_lights(rig);
            self.rig = Some(*rig);
        }
    }

    fn rebuild_materials(
        &mut self,
        params: MaterialParams,
        cache: &TextureCache<B::Texture>,
        backend: &mut B,
    ) {
        tracing::debug!("Rebuilding {} materials", self.tiles.len());
        for tile in &mut self.tiles {
            let material = backend.create_material(&params);
            if tile.textured {
                match (cache.get(&tile.albedo_key), cache.get(&tile.normal_key)) {
                    (Some(albedo), Some(normal)) => {
                        backend.bind_textures(&material, albedo, normal);
                    }
                    _ => tile.textured = false,
                }
            }
            backend.set_mesh_material(&tile.mesh, &material);
            let old = std::mem::replace(&mut tile.material, material);
            backend.dispose_material(old);
        }
        self.refresh_visibility(backend);
    }

    /// Push the camera for a frame.
    pub fn set_view(&mut self, frame: &ViewportFrame, backend: &mut B) {
        if !self.disposed {
            backend.set_camera(&frame.camera());
        }
    }

    /// Draw a frame.
    pub fn render(&mut self, backend: &mut B) {
        if !self.disposed {
            backend.render();
        }
    }

    fn refresh_visibility(&mut self, backend: &mut B) {
        for tile in &mut self.tiles {
            let visible = tile.textured && Some(tile.level) == self.level;
            if visible != tile.visible {
                backend.set_mesh_visible(&tile.mesh, visible);
                tile.visible = visible;
            }
        }
    }

    /// Number of meshes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Number of meshes currently shown.
    #[must_use]
    pub fn visible_count(&self) -> usize {
        self.tiles.iter().filter(|tile| tile.visible).count()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Free every mesh, material and geometry. Returns the number of tiles
    /// freed; repeated calls free nothing.
    pub fn dispose(&mut self, backend: &mut B) -> usize {
        if self.disposed {
            return 0;
        }
        self.disposed = true;
        let count = self.tiles.len();
        for tile in self.tiles.drain(..) {
            backend.dispose_mesh(tile.mesh);
            backend.dispose_material(tile.material);
            backend.dispose_geometry(tile.geometry);
        }
        tracing::debug!("Disposed {} tile meshes", count);
        count
    }
}
