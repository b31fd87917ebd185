//! Overlay controller: the activation state machine.
//!
//! The controller resolves the lighting maps of the host's current canvas and,
//! when the overlay is switched on, builds a [`Session`]: tile sets, texture
//! cache, scene, event handlers, overlay surface and animation-frame request.
//! Everything a session acquires is released again by
//! [`OverlayController::deactivate`], in reverse dependency order.

use std::collections::BTreeMap;

use relight_tiles::manifest::layer_types;
use relight_tiles::{LightingMaps, MapType, TileSetCollection, build_tile_sets};

use crate::backend::RenderBackend;
use crate::config::RelightConfig;
use crate::error::{Error, Result};
use crate::host::{
    FrameRequestId, HandlerId, HostEvent, HostEventKind, HostViewer, LoadedTile, OverlayId,
};
use crate::layers::{LayerStore, set_visibility};
use crate::light::LightState;
use crate::scene::SceneManager;
use crate::texture_cache::TextureCache;
use crate::viewport::{LightRig, ViewportSync};

/// Activation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Inactive,
    Activating,
    Active,
}

/// Result of [`OverlayController::activate`].
#[derive(Debug)]
pub enum ActivationOutcome {
    Activated,
    AlreadyActive,
    /// The canvas lacks an albedo or normal map. Not an error.
    MapsUnavailable,
    /// Tile metadata could not be used; the controller stayed inactive.
    Failed(Error),
}

/// Lighting maps and layers of the loaded canvas.
#[derive(Debug, Clone)]
struct CanvasMaps {
    id: String,
    maps: Option<LightingMaps>,
    layer_types: BTreeMap<String, MapType>,
}

/// Resources of one activation.
pub struct Session<B: RenderBackend> {
    pub tile_sets: TileSetCollection,
    pub cache: TextureCache<B::Texture>,
    pub scene: SceneManager<B>,
    pub viewport: ViewportSync,
    handlers: BTreeMap<HostEventKind, HandlerId>,
    overlay: OverlayId,
    frame_request: Option<FrameRequestId>,
}

impl<B: RenderBackend> Session<B> {
    /// Handlers registered with the host.
    pub fn handlers(&self) -> impl Iterator<Item = (HostEventKind, HandlerId)> + '_ {
        self.handlers.iter().map(|(kind, id)| (*kind, *id))
    }

    #[must_use]
    pub fn overlay(&self) -> OverlayId {
        self.overlay
    }

    #[must_use]
    pub fn frame_request(&self) -> Option<FrameRequestId> {
        self.frame_request
    }

    fn clamp_level(&self, level: u32) -> Option<u32> {
        let min = self.tile_sets.min_level()?;
        let max = self.tile_sets.max_level()?;
        Some(level.clamp(min, max))
    }

    /// Recompute the frame from the host and push it to the overlay, camera
    /// and light. Without an intersection nothing changes.
    fn sync_view(&mut self, host: &mut impl HostViewer, backend: &mut B, light: &LightState) {
        let Some(frame) = self.viewport.update(&host.viewport()) else {
            tracing::debug!("Viewport does not overlap the image, keeping previous frame");
            return;
        };
        host.update_overlay(self.overlay, frame.intersection);
        self.scene.set_view(&frame, backend);
        self.apply_light(light, backend);
    }

    fn apply_light(&mut self, light: &LightState, backend: &mut B) {
        let Some(frame) = self.viewport.last() else {
            return;
        };
        let rig = LightRig::derive(light, frame);
        self.scene
            .set_light_params(light.material_params(), &rig, &self.cache, backend);
    }
}

/// Composition root of the overlay.
pub struct OverlayController<B: RenderBackend> {
    config: RelightConfig,
    light: LightState,
    light_dirty: bool,
    canvas: Option<CanvasMaps>,
    state: ControllerState,
    session: Option<Session<B>>,
}

impl<B: RenderBackend> OverlayController<B> {
    #[must_use]
    pub fn new(config: RelightConfig) -> Self {
        Self {
            light: config.light,
            config,
            light_dirty: false,
            canvas: None,
            state: ControllerState::Inactive,
            session: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RelightConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == ControllerState::Active
    }

    /// Whether the loaded canvas has both lighting maps.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.maps().is_some()
    }

    #[must_use]
    pub fn maps(&self) -> Option<&LightingMaps> {
        self.canvas.as_ref().and_then(|canvas| canvas.maps.as_ref())
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session<B>> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn light(&self) -> &LightState {
        &self.light
    }

    /// Change the light. The scene picks the change up on the next frame.
    pub fn update_light(&mut self, update: impl FnOnce(&mut LightState)) {
        let before = self.light;
        update(&mut self.light);
        if self.light != before {
            self.light_dirty = true;
        }
    }

    /// Restore the configured light defaults.
    pub fn reset_lights(&mut self) {
        let defaults = self.config.light;
        self.update_light(|light| *light = defaults);
    }

    /// Read the lighting maps of the host's current canvas. Deactivates any
    /// running session first. Returns whether the overlay is available.
    pub fn load_canvas<H, L>(
        &mut self,
        host: &mut H,
        backend: &mut B,
        layers: &mut L,
        canvas_id: &str,
    ) -> bool
    where
        H: HostViewer,
        L: LayerStore,
    {
        self.deactivate(host, backend, layers);

        let resources = host.canvas_resources();
        let maps = LightingMaps::resolve(&resources);
        let canvas = CanvasMaps {
            id: canvas_id.to_string(),
            maps,
            layer_types: layer_types(&resources),
        };

        let available = canvas.maps.is_some();
        if available {
            tracing::info!("Canvas {} has albedo and normal maps", canvas_id);
            set_visibility(
                layers,
                &canvas.id,
                &canvas.layer_types,
                &self.config.hidden_on_load,
                false,
            );
        } else {
            tracing::debug!("Canvas {} is not relightable", canvas_id);
        }
        self.canvas = Some(canvas);
        available
    }

    fn tile_sets(&self, host: &impl HostViewer, maps: &LightingMaps) -> Result<TileSetCollection> {
        let info = host.tile_source().ok_or(Error::MissingTileSource)?;
        Ok(build_tile_sets(
            self.config.min_level,
            &info,
            &maps.albedo,
            &maps.normal,
            &self.config.urls,
        )?)
    }

    /// Switch the overlay on.
    pub fn activate<H, L>(
        &mut self,
        host: &mut H,
        backend: &mut B,
        layers: &mut L,
    ) -> ActivationOutcome
    where
        H: HostViewer,
        L: LayerStore,
    {
        if self.session.is_some() {
            return ActivationOutcome::AlreadyActive;
        }
        let Some(canvas) = self.canvas.clone() else {
            return ActivationOutcome::MapsUnavailable;
        };
        let Some(maps) = canvas.maps.as_ref() else {
            return ActivationOutcome::MapsUnavailable;
        };

        self.state = ControllerState::Activating;
        let tile_sets = match self.tile_sets(&*host, maps) {
            Ok(tile_sets) => tile_sets,
            Err(e) => {
                tracing::error!("Failed to activate relight overlay: {}", e);
                self.state = ControllerState::Inactive;
                return ActivationOutcome::Failed(e);
            }
        };

        let overlay = host.add_overlay();
        let handlers = HostEventKind::ALL
            .iter()
            .map(|&kind| (kind, host.add_handler(kind)))
            .collect();

        let scene = SceneManager::build_all(&tile_sets, self.light.material_params(), backend);
        let mut session = Session {
            tile_sets,
            cache: TextureCache::new(maps),
            scene,
            viewport: ViewportSync::default(),
            handlers,
            overlay,
            frame_request: None,
        };

        let loaded = host.loaded_tiles();
        session.cache.prime(&loaded, backend);
        if let Some(level) = initial_level(&session, host.current_level(), &loaded) {
            session.scene.set_level(level, backend);
        }

        set_visibility(
            layers,
            &canvas.id,
            &canvas.layer_types,
            &self.config.hidden_while_active,
            false,
        );

        session.sync_view(host, backend, &self.light);
        session.scene.update_textures(&session.cache, backend);
        host.force_redraw();
        session.frame_request = Some(host.request_animation_frame());

        self.session = Some(session);
        self.light_dirty = false;
        self.state = ControllerState::Active;
        tracing::info!("Relight overlay activated");
        ActivationOutcome::Activated
    }

    /// Switch the overlay off. Returns `false` when it was not active.
    pub fn deactivate<H, L>(&mut self, host: &mut H, backend: &mut B, layers: &mut L) -> bool
    where
        H: HostViewer,
        L: LayerStore,
    {
        let Some(mut session) = self.session.take() else {
            return false;
        };

        if let Some(request) = session.frame_request.take() {
            host.cancel_animation_frame(request);
        }
        for handler in std::mem::take(&mut session.handlers).into_values() {
            host.remove_handler(handler);
        }
        session.scene.dispose(backend);
        session.cache.release_all(backend);
        host.remove_overlay(session.overlay);
        if let Some(canvas) = &self.canvas {
            set_visibility(
                layers,
                &canvas.id,
                &canvas.layer_types,
                &self.config.hidden_while_active,
                true,
            );
        }

        self.state = ControllerState::Inactive;
        tracing::info!("Relight overlay deactivated");
        true
    }

    /// Toggle the overlay. Returns whether it is active afterwards.
    pub fn toggle<H, L>(&mut self, host: &mut H, backend: &mut B, layers: &mut L) -> bool
    where
        H: HostViewer,
        L: LayerStore,
    {
        if self.session.is_some() {
            self.deactivate(host, backend, layers);
            false
        } else {
            matches!(
                self.activate(host, backend, layers),
                ActivationOutcome::Activated
            )
        }
    }

    /// Handle an event forwarded by the host. Events of kinds the session has
    /// not registered are dropped. Close always forgets the canvas.
    pub fn handle_event<H, L>(
        &mut self,
        host: &mut H,
        backend: &mut B,
        layers: &mut L,
        event: HostEvent,
    ) where
        H: HostViewer,
        L: LayerStore,
    {
        if matches!(event, HostEvent::Close) {
            self.deactivate(host, backend, layers);
            self.canvas = None;
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.handlers.contains_key(&event.kind()) {
            return;
        }

        match event {
            HostEvent::TileLoaded(tile) => {
                session.cache.ingest_loaded(&tile, backend);
            }
            HostEvent::TileDrawn { level } => {
                if let Some(level) = session.clamp_level(level) {
                    session.scene.set_level(level, backend);
                }
            }
            HostEvent::ViewportChange
            | HostEvent::Rotate { .. }
            | HostEvent::Flip { .. }
            | HostEvent::Resize => {
                session.sync_view(host, backend, &self.light);
            }
            HostEvent::Close => {}
        }
    }

    /// Per-frame work: apply light changes, bind arrived textures, render and
    /// request the next frame.
    pub fn on_animation_frame<H: HostViewer>(&mut self, host: &mut H, backend: &mut B) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.frame_request = None;
        if self.light_dirty {
            session.apply_light(&self.light, backend);
            self.light_dirty = false;
        }
        session.scene.update_textures(&session.cache, backend);
        session.scene.render(backend);
        session.frame_request = Some(host.request_animation_frame());
    }
}

/// Level to show on activation: the host's current level, else the finest
/// level among its loaded tiles, else the coarsest built level.
fn initial_level<B: RenderBackend>(
    session: &Session<B>,
    current: Option<u32>,
    loaded: &[LoadedTile],
) -> Option<u32> {
    current
        .or_else(|| loaded.iter().map(|tile| tile.level).max())
        .and_then(|level| session.clamp_level(level))
        .or_else(|| session.tile_sets.min_level())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::geometry::Rect;
    use crate::light::RenderMode;
    use crate::test_support::{
        Journal, RecordingBackend, RecordingHost, RecordingLayers, albedo_only_resources,
        tile_image, tile_sets,
    };

    struct Harness {
        journal: Journal,
        host: RecordingHost,
        backend: RecordingBackend,
        layers: RecordingLayers,
        controller: OverlayController<RecordingBackend>,
    }

    impl Harness {
        fn new() -> Self {
            let _ = tracing_subscriber::fmt().with_test_writer().try_init();
            let journal = Journal::default();
            Self {
                host: RecordingHost::new(journal.clone()),
                backend: RecordingBackend::new(journal.clone()),
                layers: RecordingLayers::new(journal.clone()),
                journal,
                controller: OverlayController::new(RelightConfig::default()),
            }
        }

        fn load(&mut self) -> bool {
            self.controller.load_canvas(
                &mut self.host,
                &mut self.backend,
                &mut self.layers,
                "canvas-1",
            )
        }

        fn activate(&mut self) -> ActivationOutcome {
            self.controller
                .activate(&mut self.host, &mut self.backend, &mut self.layers)
        }

        fn deactivate(&mut self) -> bool {
            self.controller
                .deactivate(&mut self.host, &mut self.backend, &mut self.layers)
        }

        fn event(&mut self, event: HostEvent) {
            self.controller
                .handle_event(&mut self.host, &mut self.backend, &mut self.layers, event);
        }

        fn frame(&mut self) {
            self.host.pending_frame = None;
            self.controller
                .on_animation_frame(&mut self.host, &mut self.backend);
        }

        fn tile_loaded(&mut self, url: &str, level: u32) {
            self.event(HostEvent::TileLoaded(LoadedTile {
                url: url.to_string(),
                level,
                image: Arc::new(tile_image()),
            }));
        }
    }

    #[test]
    fn albedo_only_canvas_stays_inactive() {
        let mut h = Harness::new();
        h.host.resources = albedo_only_resources();
        assert!(!h.load());
        assert!(matches!(h.activate(), ActivationOutcome::MapsUnavailable));
        assert_eq!(h.controller.state(), ControllerState::Inactive);
        assert!(h.host.live_overlays.is_empty());
        assert!(h.host.handler_adds.is_empty());
        assert_eq!(h.backend.meshes_created, 0);
    }

    #[test]
    fn loading_a_canvas_hides_depth_and_shaded_layers() {
        let mut h = Harness::new();
        assert!(h.load());
        assert!(!h.layers.is_visible("canvas-1", "https://example.org/depth.jpg"));
        assert!(h.layers.is_visible("canvas-1", "https://example.org/composite.jpg"));
    }

    #[test]
    fn activation_builds_session_and_registers_each_handler_once() {
        let mut h = Harness::new();
        h.load();
        assert!(matches!(h.activate(), ActivationOutcome::Activated));
        assert_eq!(h.controller.state(), ControllerState::Active);

        let session = h.controller.session().unwrap();
        assert_eq!(session.scene.len(), tile_sets().tile_count());
        let kinds: Vec<HostEventKind> = session.handlers().map(|(kind, _)| kind).collect();
        assert_eq!(kinds.len(), HostEventKind::ALL.len());
        assert_eq!(h.host.handler_adds, HostEventKind::ALL.to_vec());

        assert_eq!(h.host.live_overlays.len(), 1);
        assert_eq!(h.host.redraws, 1);
        assert!(h.host.pending_frame.is_some());
        assert_eq!(h.backend.cameras.len(), 1);
        assert!(!h.layers.is_visible("canvas-1", "https://example.org/composite.jpg"));

        assert!(matches!(h.activate(), ActivationOutcome::AlreadyActive));
        assert_eq!(h.host.handler_adds.len(), HostEventKind::ALL.len());
    }

    #[test]
    fn repeated_cycles_never_leak_handlers() {
        let mut h = Harness::new();
        h.load();
        for cycle in 1..=3 {
            assert!(matches!(h.activate(), ActivationOutcome::Activated));
            assert_eq!(h.host.live_handlers.len(), HostEventKind::ALL.len());
            assert!(h.deactivate());
            assert!(h.host.live_handlers.is_empty());
            assert_eq!(h.host.handler_adds.len(), HostEventKind::ALL.len() * cycle);
            for kind in HostEventKind::ALL {
                let added = h.host.handler_adds.iter().filter(|k| **k == kind).count();
                assert_eq!(added, cycle);
            }
        }
        assert!(!h.deactivate());
    }

    #[test]
    fn deactivation_releases_in_order() {
        let mut h = Harness::new();
        h.load();
        h.host.loaded = vec![
            LoadedTile {
                url: tile_sets().level(0).unwrap().albedo_tiles[0].url.clone(),
                level: 0,
                image: Arc::new(tile_image()),
            },
            LoadedTile {
                url: tile_sets().level(0).unwrap().normal_tiles[0].url.clone(),
                level: 0,
                image: Arc::new(tile_image()),
            },
        ];
        h.activate();
        h.journal.clear();

        assert!(h.deactivate());
        assert_eq!(
            h.journal.collapsed(),
            vec![
                "cancel_frame",
                "remove_handler",
                "dispose_mesh",
                "dispose_texture",
                "remove_overlay",
                "update_layers",
            ]
        );
        assert!(h.host.pending_frame.is_none());
        assert!(h.host.live_overlays.is_empty());
        assert!(h.backend.live_meshes.is_empty());
        assert!(h.backend.live_materials.is_empty());
        assert!(h.backend.live_geometries.is_empty());
        assert!(h.backend.live_textures.is_empty());
        assert!(h.layers.is_visible("canvas-1", "https://example.org/composite.jpg"));
        assert_eq!(h.controller.state(), ControllerState::Inactive);
    }

    #[test]
    fn primed_tiles_render_immediately() {
        let mut h = Harness::new();
        h.load();
        let coarsest = tile_sets().level(0).unwrap().clone();
        h.host.loaded = vec![
            LoadedTile {
                url: coarsest.albedo_tiles[0].url.clone(),
                level: 0,
                image: Arc::new(tile_image()),
            },
            LoadedTile {
                url: coarsest.normal_tiles[0].url.clone(),
                level: 0,
                image: Arc::new(tile_image()),
            },
        ];
        h.activate();
        let session = h.controller.session().unwrap();
        assert_eq!(session.cache.len(), 2);
        assert_eq!(session.scene.visible_count(), 1);
    }

    #[test]
    fn tile_events_fill_cache_and_select_level() {
        let mut h = Harness::new();
        h.load();
        h.activate();
        let finest = tile_sets().level(2).unwrap().clone();

        h.tile_loaded(&finest.albedo_tiles[3].url, 2);
        h.tile_loaded(&finest.normal_tiles[3].url, 2);
        h.tile_loaded(&finest.normal_tiles[3].url, 2);
        h.tile_loaded("https://example.org/iiif/depth/full/10,10/0/default.jpg", 2);
        h.event(HostEvent::TileDrawn { level: 7 });
        h.frame();

        let session = h.controller.session().unwrap();
        assert_eq!(session.cache.len(), 2);
        assert_eq!(session.scene.level(), Some(2));
        assert_eq!(session.scene.visible_count(), 1);
        assert_eq!(h.backend.frames_rendered, 1);
        assert!(h.host.pending_frame.is_some());
    }

    #[test]
    fn empty_intersection_keeps_camera() {
        let mut h = Harness::new();
        h.load();
        h.activate();
        let camera = *h.backend.cameras.last().unwrap();
        let overlay_updates = h.host.overlay_updates.len();

        h.host.viewport.visible = Rect::new(200.0, 100.0, 0.0, 300.0);
        h.event(HostEvent::ViewportChange);

        assert_eq!(h.backend.cameras.len(), 1);
        assert_eq!(*h.backend.cameras.last().unwrap(), camera);
        assert_eq!(h.host.overlay_updates.len(), overlay_updates);

        h.host.viewport.visible = Rect::new(200.0, 100.0, 300.0, 300.0);
        h.event(HostEvent::ViewportChange);
        assert_eq!(h.backend.cameras.len(), 2);
        assert_eq!(
            h.host.overlay_updates.last(),
            Some(&Rect::new(200.0, 100.0, 300.0, 300.0))
        );
    }

    #[test]
    fn rotation_remaps_light() {
        let mut h = Harness::new();
        h.load();
        h.controller
            .update_light(|light| light.set_direction(glam::Vec2::new(0.0, 1.0)));
        h.activate();
        let upright = h.backend.last_rig.unwrap();

        h.host.viewport.rotation = 90.0;
        h.event(HostEvent::Rotate { degrees: 90.0 });
        let rotated = h.backend.last_rig.unwrap();
        assert_eq!(upright.position - upright.target, glam::Vec3::new(0.0, 1.0, 1.0));
        assert_eq!(rotated.position - rotated.target, glam::Vec3::new(-1.0, 0.0, 1.0));
        assert_eq!(
            h.backend.cameras.last().unwrap().orientation.rotation,
            crate::geometry::Rotation::Deg90
        );
    }

    #[test]
    fn light_changes_apply_on_next_frame() {
        let mut h = Harness::new();
        h.load();
        h.activate();
        let materials = h.backend.materials_created;
        let tiles = h.controller.session().unwrap().scene.len();

        h.controller
            .update_light(|light| light.set_render_mode(RenderMode::Specular));
        assert_eq!(h.backend.materials_created, materials);
        h.frame();
        assert_eq!(h.backend.materials_created, materials + tiles);
        assert_eq!(h.backend.materials_disposed, tiles);

        h.controller.update_light(|light| light.set_ambient_intensity(0.7));
        h.frame();
        assert!((h.backend.last_rig.unwrap().ambient_intensity - 0.7).abs() < f32::EPSILON);

        h.controller.reset_lights();
        assert_eq!(*h.controller.light(), LightState::default());
    }

    #[test]
    fn close_event_deactivates() {
        let mut h = Harness::new();
        h.load();
        h.activate();
        h.event(HostEvent::Close);
        assert_eq!(h.controller.state(), ControllerState::Inactive);
        assert!(!h.controller.is_available());
        assert!(h.host.live_handlers.is_empty());
        assert!(h.backend.live_meshes.is_empty());

        h.event(HostEvent::ViewportChange);
        assert!(matches!(h.activate(), ActivationOutcome::MapsUnavailable));
    }

    #[test]
    fn close_while_inactive_forgets_canvas() {
        let mut h = Harness::new();
        assert!(h.load());
        assert!(h.controller.is_available());
        h.journal.clear();

        h.event(HostEvent::Close);
        assert!(!h.controller.is_available());
        assert_eq!(h.controller.state(), ControllerState::Inactive);
        assert!(h.journal.collapsed().is_empty());
        assert!(matches!(h.activate(), ActivationOutcome::MapsUnavailable));
    }

    #[test]
    fn activation_starts_at_host_level() {
        let mut h = Harness::new();
        h.load();
        let finest = tile_sets().level(2).unwrap().clone();
        h.host.loaded = vec![LoadedTile {
            url: finest.albedo_tiles[0].url.clone(),
            level: 2,
            image: Arc::new(tile_image()),
        }];
        h.host.level = Some(1);
        h.activate();
        assert_eq!(h.controller.session().unwrap().scene.level(), Some(1));

        h.deactivate();
        h.host.level = Some(9);
        h.activate();
        assert_eq!(h.controller.session().unwrap().scene.level(), Some(2));

        h.deactivate();
        h.host.level = None;
        h.activate();
        assert_eq!(h.controller.session().unwrap().scene.level(), Some(2));
    }

    #[test]
    fn malformed_metadata_fails_without_side_effects() {
        let mut h = Harness::new();
        h.load();
        if let Some(info) = h.host.info.as_mut() {
            info.tiles.clear();
        }
        assert!(matches!(
            h.activate(),
            ActivationOutcome::Failed(Error::Tiles(_))
        ));
        assert_eq!(h.controller.state(), ControllerState::Inactive);
        assert!(h.host.live_overlays.is_empty());
        assert!(h.host.handler_adds.is_empty());

        h.host.info = None;
        assert!(matches!(
            h.activate(),
            ActivationOutcome::Failed(Error::MissingTileSource)
        ));
    }

    #[test]
    fn toggle_switches_state() {
        let mut h = Harness::new();
        h.load();
        assert!(h.controller.toggle(&mut h.host, &mut h.backend, &mut h.layers));
        assert!(h.controller.is_active());
        assert!(!h.controller.toggle(&mut h.host, &mut h.backend, &mut h.layers));
        assert!(!h.controller.is_active());
    }
}
