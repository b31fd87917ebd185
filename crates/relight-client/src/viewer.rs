//! A minimal deep-zoom viewer acting as the overlay host.
//!
//! The viewer keeps pan, zoom, rotation and flip state, picks the pyramid
//! level for the zoom, decides which tiles to fetch and draws the albedo tiles
//! it receives as unlit quads. It implements [`HostViewer`] for the engine and
//! forwards events only for kinds the engine has registered a handler for.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use glam::DVec2;
use relight::{
    FrameRequestId, HandlerId, HostEvent, HostEventKind, HostViewer, LayerState, LayerStore,
    LayerUpdate, LoadedTile, OverlayId, Rect, RelightConfig, Rotation, TileImage, ViewportState,
};
use relight::geometry::Orientation;
use relight::viewport::image_to_scene;
use relight_tiles::{
    ImageInfo, ImageResource, MapType, TileRect, TileSpec, UrlOptions, generate_tile_grid,
};

use crate::error::LoadError;
use crate::{CAMERA_DISTANCE, Relight, RelightSet};

/// Smallest zoom as a fraction of the zoom that fits the image.
const MIN_ZOOM_FRACTION: f64 = 0.25;
/// Largest zoom, in screen pixels per image pixel.
pub const MAX_ZOOM: f64 = 8.0;
/// Depth step between host pyramid levels, finer levels on top.
const LEVEL_DEPTH: f32 = 0.01;

/// Plugin for the host viewer systems.
pub struct ViewerPlugin;

impl Plugin for ViewerPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, spawn_host_camera)
            .add_systems(
                Update,
                (
                    sync_window_size,
                    draw_host_tiles,
                    dispatch_host_events,
                    run_animation_frame,
                )
                    .chain()
                    .in_set(RelightSet::Host),
            )
            .add_systems(
                Update,
                (update_host_tiles, sync_host_camera).in_set(RelightSet::Render),
            );
    }
}

/// Marker for the camera that draws the host's own tiles.
#[derive(Component)]
pub struct HostCamera;

/// A drawn albedo tile.
#[derive(Component)]
pub struct HostTile {
    level: u32,
    generation: u64,
}

/// Pan, zoom and orientation of the view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    /// Image pixel under the window center.
    pub center: DVec2,
    /// Screen pixels per image pixel.
    pub zoom: f64,
    pub rotation: Rotation,
    pub flipped: bool,
    /// Window size in logical pixels.
    pub window: DVec2,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            center: DVec2::ZERO,
            zoom: 1.0,
            rotation: Rotation::Deg0,
            flipped: false,
            window: DVec2::new(1280.0, 720.0),
        }
    }
}

impl ViewState {
    #[must_use]
    pub fn orientation(&self) -> Orientation {
        Orientation::new(self.rotation, self.flipped)
    }

    /// Image region under the window, unrotated.
    #[must_use]
    pub fn visible(&self) -> Rect {
        let (width, height) = self
            .orientation()
            .display_size(self.window.x / self.zoom, self.window.y / self.zoom);
        Rect::new(
            self.center.x - width / 2.0,
            self.center.y - height / 2.0,
            width,
            height,
        )
    }

    /// Zoom at which a `width` x `height` image fills the window.
    #[must_use]
    pub fn fit_zoom(&self, width: f64, height: f64) -> f64 {
        let (width, height) = self.orientation().display_size(width, height);
        (self.window.x / width).min(self.window.y / height)
    }

    /// Window rectangle, in logical pixels, covered by an image rectangle.
    #[must_use]
    pub fn image_to_window(&self, rect: &Rect, width: f64, height: f64) -> Rect {
        let orientation = self.orientation();
        let display = orientation.map_rect(rect, width, height);
        let center = orientation
            .map_rect(&Rect::new(self.center.x, self.center.y, 0.0, 0.0), width, height)
            .origin();
        let origin = self.window / 2.0 + (display.origin() - center) * self.zoom;
        Rect::new(
            origin.x,
            origin.y,
            display.width * self.zoom,
            display.height * self.zoom,
        )
    }

    /// Move the view so the image follows a drag of `delta` screen pixels
    /// (`y` down).
    #[allow(clippy::cast_possible_truncation)]
    pub fn pan_by(&mut self, delta: DVec2) {
        let screen = Vec2::new(delta.x as f32, -delta.y as f32);
        let image = self.orientation().screen_to_image(screen);
        self.center -= DVec2::new(f64::from(image.x), -f64::from(image.y)) / self.zoom;
    }
}

/// Pick the level whose resolution best covers `zoom`: the coarsest level
/// that still has at least one tile pixel per screen pixel.
#[must_use]
pub fn level_for_zoom(spec: &TileSpec, zoom: f64, min_level: u32) -> u32 {
    let factors = spec.sorted_scale_factors();
    let target = 1.0 / zoom;
    let finest = u32::try_from(factors.len().saturating_sub(1)).unwrap_or(0);
    let level = factors
        .iter()
        .position(|&scale| f64::from(scale) <= target)
        .and_then(|index| u32::try_from(index).ok())
        .unwrap_or(finest);
    level.clamp(min_level.min(finest), finest)
}

/// The service the viewer displays: the albedo map, or else the first
/// resource with an image service.
#[must_use]
pub fn display_resource(resources: &[ImageResource]) -> Option<&ImageResource> {
    resources
        .iter()
        .filter(|resource| resource.service_id.is_some())
        .find(|resource| resource.map_type == Some(MapType::Albedo))
        .or_else(|| resources.iter().find(|resource| resource.service_id.is_some()))
}

/// A tile the viewer wants fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRequest {
    pub url: String,
    pub level: u32,
    /// Extent of the tile in image pixels.
    pub rect: TileRect,
    /// Whether the viewer draws the tile itself.
    pub draw: bool,
    /// Canvas generation the request belongs to.
    pub generation: u64,
}

/// A received tile waiting to be drawn.
#[derive(Debug, Clone)]
pub struct HostDraw {
    pub level: u32,
    pub rect: TileRect,
    pub image: Arc<TileImage>,
    pub generation: u64,
}

struct LevelGrid {
    albedo: Vec<TileRect>,
    normal: Vec<TileRect>,
}

struct OpenCanvas {
    id: String,
    resources: Vec<ImageResource>,
    info: ImageInfo,
    albedo_layer: String,
    albedo_base: String,
    normal_base: Option<String>,
    grids: BTreeMap<u32, LevelGrid>,
}

/// The host viewer.
pub struct DeepZoomViewer {
    view: ViewState,
    urls: UrlOptions,
    min_level: u32,
    canvas: Option<OpenCanvas>,
    level: Option<u32>,
    loaded: Vec<LoadedTile>,
    requested: HashSet<String>,
    drawn: HashSet<String>,
    in_flight: usize,
    handlers: BTreeMap<HandlerId, HostEventKind>,
    overlays: BTreeMap<OverlayId, Option<Rect>>,
    frame_request: Option<FrameRequestId>,
    events: VecDeque<HostEvent>,
    draws: Vec<HostDraw>,
    generation: u64,
    next_id: u64,
}

impl DeepZoomViewer {
    #[must_use]
    pub fn new(config: &RelightConfig) -> Self {
        Self {
            view: ViewState::default(),
            urls: config.urls.clone(),
            min_level: config.min_level,
            canvas: None,
            level: None,
            loaded: Vec::new(),
            requested: HashSet::new(),
            drawn: HashSet::new(),
            in_flight: 0,
            handlers: BTreeMap::new(),
            overlays: BTreeMap::new(),
            frame_request: None,
            events: VecDeque::new(),
            draws: Vec::new(),
            generation: 0,
            next_id: 0,
        }
    }

    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Queue an event if the engine listens for its kind.
    fn emit(&mut self, event: HostEvent) {
        let kind = event.kind();
        if self.handlers.values().any(|registered| *registered == kind) {
            self.events.push_back(event);
        }
    }

    /// Show a canvas, fitted to the window.
    pub fn open(
        &mut self,
        canvas_id: &str,
        resources: Vec<ImageResource>,
        info: ImageInfo,
    ) -> Result<(), LoadError> {
        info.validate_size()?;
        info.tile_spec()?;
        let display = display_resource(&resources).ok_or(LoadError::NoImageService)?;
        let albedo_layer = display.id.clone();
        let albedo_base = display.service_id.clone().ok_or(LoadError::NoImageService)?;
        let normal_base = resources
            .iter()
            .filter(|resource| resource.map_type == Some(MapType::Normal))
            .find_map(|resource| resource.service_id.clone());

        self.close_canvas();
        self.view.rotation = Rotation::Deg0;
        self.view.flipped = false;
        self.view.center = DVec2::new(f64::from(info.width), f64::from(info.height)) / 2.0;
        self.view.zoom = self
            .view
            .fit_zoom(f64::from(info.width), f64::from(info.height));

        tracing::info!(
            "Opened canvas {}: {}x{}, normal map {}",
            canvas_id,
            info.width,
            info.height,
            if normal_base.is_some() { "present" } else { "absent" }
        );
        self.canvas = Some(OpenCanvas {
            id: canvas_id.to_string(),
            resources,
            info,
            albedo_layer,
            albedo_base,
            normal_base,
            grids: BTreeMap::new(),
        });
        self.update_level();
        Ok(())
    }

    /// Close the displayed canvas. Returns `false` when nothing was open.
    pub fn close(&mut self) -> bool {
        if self.canvas.is_none() {
            return false;
        }
        self.emit(HostEvent::Close);
        self.close_canvas();
        tracing::info!("Closed canvas");
        true
    }

    fn close_canvas(&mut self) {
        self.canvas = None;
        self.level = None;
        self.loaded.clear();
        self.requested.clear();
        self.drawn.clear();
        self.draws.clear();
        self.generation += 1;
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.canvas.is_some()
    }

    #[must_use]
    pub fn canvas_id(&self) -> Option<&str> {
        self.canvas.as_ref().map(|canvas| canvas.id.as_str())
    }

    /// Layer id of the displayed albedo resource.
    #[must_use]
    pub fn albedo_layer(&self) -> Option<&str> {
        self.canvas.as_ref().map(|canvas| canvas.albedo_layer.as_str())
    }

    #[must_use]
    pub fn view(&self) -> &ViewState {
        &self.view
    }

    #[must_use]
    pub fn level(&self) -> Option<u32> {
        self.level
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Image size, when a canvas is open.
    #[must_use]
    pub fn content_size(&self) -> Option<(f64, f64)> {
        self.canvas
            .as_ref()
            .map(|canvas| (f64::from(canvas.info.width), f64::from(canvas.info.height)))
    }

    pub fn resize(&mut self, window: DVec2) {
        if window == self.view.window {
            return;
        }
        self.view.window = window;
        self.update_level();
        self.emit(HostEvent::Resize);
    }

    pub fn pan_by(&mut self, delta: DVec2) {
        if delta == DVec2::ZERO || self.canvas.is_none() {
            return;
        }
        self.view.pan_by(delta);
        self.emit(HostEvent::ViewportChange);
    }

    /// Multiply the zoom around the window center.
    pub fn zoom_by(&mut self, factor: f64) {
        let Some((width, height)) = self.content_size() else {
            return;
        };
        let min = self.view.fit_zoom(width, height) * MIN_ZOOM_FRACTION;
        let zoom = (self.view.zoom * factor).clamp(min.min(MAX_ZOOM), MAX_ZOOM);
        if (zoom - self.view.zoom).abs() < f64::EPSILON {
            return;
        }
        self.view.zoom = zoom;
        self.update_level();
        self.emit(HostEvent::ViewportChange);
    }

    /// Rotate the display a quarter turn clockwise.
    pub fn rotate_cw(&mut self) {
        self.view.rotation = self.view.rotation.rotated_cw();
        let degrees = f64::from(self.view.rotation.degrees());
        tracing::debug!("Rotated view to {} degrees", degrees);
        self.emit(HostEvent::Rotate { degrees });
    }

    pub fn toggle_flip(&mut self) {
        self.view.flipped = !self.view.flipped;
        let flipped = self.view.flipped;
        self.emit(HostEvent::Flip { flipped });
    }

    fn update_level(&mut self) {
        let Some(canvas) = &self.canvas else {
            return;
        };
        let Ok(spec) = canvas.info.tile_spec() else {
            return;
        };
        let level = level_for_zoom(spec, self.view.zoom, self.min_level);
        if self.level == Some(level) {
            return;
        }
        tracing::debug!("Host level {}", level);
        self.level = Some(level);
        self.prune_loaded(level);
        if self.loaded.iter().any(|tile| tile.level == level) {
            self.emit(HostEvent::TileDrawn { level });
        }
    }

    /// Drop loaded tiles of other levels. They are fetched again when their
    /// level returns.
    fn prune_loaded(&mut self, level: u32) {
        let requested = &mut self.requested;
        let before = self.loaded.len();
        self.loaded.retain(|tile| {
            if tile.level == level {
                return true;
            }
            requested.remove(&tile.url);
            false
        });
        if self.loaded.len() < before {
            tracing::trace!("Dropped {} tiles of other levels", before - self.loaded.len());
        }
    }

    fn grid(&mut self, level: u32) -> Option<&LevelGrid> {
        let canvas = self.canvas.as_mut()?;
        if !canvas.grids.contains_key(&level) {
            let spec = canvas.info.tile_spec().ok()?;
            let format = canvas.info.format();
            let (width, height) = (canvas.info.width, canvas.info.height);
            let build = |base: &str| {
                generate_tile_grid(base, width, height, spec, level, &self.urls, &format)
            };
            let albedo = match build(canvas.albedo_base.as_str()) {
                Ok(tiles) => tiles,
                Err(e) => {
                    tracing::error!("Failed to build tile grid for level {}: {}", level, e);
                    return None;
                }
            };
            let normal = match canvas.normal_base.as_deref().map(build).transpose() {
                Ok(tiles) => tiles.unwrap_or_default(),
                Err(e) => {
                    tracing::error!("Failed to build normal tile grid for level {}: {}", level, e);
                    Vec::new()
                }
            };
            canvas.grids.insert(level, LevelGrid { albedo, normal });
        }
        canvas.grids.get(&level)
    }

    /// Visible tiles of the current level that were not requested yet, at
    /// most enough to bring the in-flight count up to `max_in_flight`.
    pub fn next_requests(&mut self, max_in_flight: usize) -> Vec<TileRequest> {
        let budget = max_in_flight.saturating_sub(self.in_flight);
        let Some(level) = self.level else {
            return Vec::new();
        };
        if budget == 0 {
            return Vec::new();
        }
        let visible = self.view.visible();
        let generation = self.generation;
        let Some(grid) = self.grid(level) else {
            return Vec::new();
        };

        let overlaps = |tile: &TileRect| {
            Rect::new(
                f64::from(tile.x),
                f64::from(tile.y),
                f64::from(tile.width),
                f64::from(tile.height),
            )
            .intersection(&visible)
            .is_some()
        };
        let candidates: Vec<TileRequest> = grid
            .albedo
            .iter()
            .map(|tile| (tile, true))
            .chain(grid.normal.iter().map(|tile| (tile, false)))
            .filter(|(tile, _)| overlaps(tile))
            .map(|(tile, draw)| TileRequest {
                url: tile.url.clone(),
                level,
                rect: tile.clone(),
                draw,
                generation,
            })
            .collect();

        let requests: Vec<TileRequest> = candidates
            .into_iter()
            .filter(|request| !self.requested.contains(&request.url))
            .take(budget)
            .map(|mut request| {
                request.draw &= !self.drawn.contains(&request.url);
                request
            })
            .collect();
        for request in &requests {
            self.requested.insert(request.url.clone());
        }
        self.in_flight += requests.len();
        requests
    }

    /// A fetch finished. Stale responses from a closed canvas are dropped.
    pub fn tile_loaded(&mut self, request: TileRequest, image: TileImage) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if request.generation != self.generation {
            return;
        }
        let image = Arc::new(image);
        let tile = LoadedTile {
            url: request.url,
            level: request.level,
            image: Arc::clone(&image),
        };
        self.loaded.push(tile.clone());
        self.emit(HostEvent::TileLoaded(tile));
        if request.draw {
            self.drawn.insert(request.rect.url.clone());
            self.draws.push(HostDraw {
                level: request.level,
                rect: request.rect,
                image,
                generation: request.generation,
            });
        }
    }

    /// A fetch failed. The tile is not retried.
    pub fn tile_failed(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Tiles waiting to be drawn.
    pub fn take_draws(&mut self) -> Vec<HostDraw> {
        std::mem::take(&mut self.draws)
    }

    /// A tile of `level` was drawn.
    pub fn tile_drawn(&mut self, level: u32) {
        if self.level == Some(level) {
            self.emit(HostEvent::TileDrawn { level });
        }
    }

    pub fn next_event(&mut self) -> Option<HostEvent> {
        self.events.pop_front()
    }

    /// Take the pending animation-frame request, if any.
    pub fn take_frame_request(&mut self) -> Option<FrameRequestId> {
        self.frame_request.take()
    }

    /// Window rectangle of the first placed overlay, in logical pixels.
    #[must_use]
    pub fn overlay_rect(&self) -> Option<Rect> {
        let (width, height) = self.content_size()?;
        let bounds = self.overlays.values().find_map(|bounds| *bounds)?;
        Some(self.view.image_to_window(&bounds, width, height))
    }

    /// Number of registered event handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl HostViewer for DeepZoomViewer {
    fn viewport(&self) -> ViewportState {
        let (content_width, content_height) = self.content_size().unwrap_or((0.0, 0.0));
        ViewportState {
            visible: self.view.visible(),
            content_width,
            content_height,
            zoom: self.view.zoom,
            rotation: f64::from(self.view.rotation.degrees()),
            flipped: self.view.flipped,
        }
    }

    fn canvas_resources(&self) -> Vec<ImageResource> {
        self.canvas
            .as_ref()
            .map(|canvas| canvas.resources.clone())
            .unwrap_or_default()
    }

    fn tile_source(&self) -> Option<ImageInfo> {
        self.canvas.as_ref().map(|canvas| canvas.info.clone())
    }

    fn loaded_tiles(&self) -> Vec<LoadedTile> {
        self.loaded.clone()
    }

    fn current_level(&self) -> Option<u32> {
        self.level
    }

    fn add_overlay(&mut self) -> OverlayId {
        let id = OverlayId(self.id());
        self.overlays.insert(id, None);
        id
    }

    fn remove_overlay(&mut self, id: OverlayId) {
        if self.overlays.remove(&id).is_none() {
            tracing::warn!("Removing unknown overlay {:?}", id);
        }
    }

    fn update_overlay(&mut self, id: OverlayId, bounds: Rect) {
        if let Some(slot) = self.overlays.get_mut(&id) {
            *slot = Some(bounds);
        }
    }

    fn force_redraw(&mut self) {
        if let Some(level) = self.level {
            self.emit(HostEvent::TileDrawn { level });
        }
    }

    fn add_handler(&mut self, kind: HostEventKind) -> HandlerId {
        let id = HandlerId(self.id());
        self.handlers.insert(id, kind);
        id
    }

    fn remove_handler(&mut self, id: HandlerId) {
        if self.handlers.remove(&id).is_none() {
            tracing::warn!("Removing unknown handler {:?}", id);
        }
    }

    fn request_animation_frame(&mut self) -> FrameRequestId {
        let id = FrameRequestId(self.id());
        self.frame_request = Some(id);
        id
    }

    fn cancel_animation_frame(&mut self, id: FrameRequestId) {
        if self.frame_request == Some(id) {
            self.frame_request = None;
        }
    }
}

/// Per-canvas layer visibility of the viewer.
#[derive(Debug, Default)]
pub struct ViewerLayers {
    canvases: BTreeMap<String, BTreeMap<String, LayerState>>,
}

impl ViewerLayers {
    /// Register every resource of a canvas as a visible layer, keeping the
    /// state of layers already known.
    pub fn init_canvas(&mut self, canvas_id: &str, resources: &[ImageResource]) {
        let layers = self.canvases.entry(canvas_id.to_string()).or_default();
        for (index, resource) in resources.iter().enumerate() {
            layers.entry(resource.id.clone()).or_insert(LayerState {
                visibility: true,
                index,
            });
        }
    }

    /// Unknown layers count as visible.
    #[must_use]
    pub fn is_visible(&self, canvas_id: &str, layer_id: &str) -> bool {
        self.canvases
            .get(canvas_id)
            .and_then(|layers| layers.get(layer_id))
            .is_none_or(|state| state.visibility)
    }
}

impl LayerStore for ViewerLayers {
    fn layers(&self, canvas_id: &str) -> BTreeMap<String, LayerState> {
        self.canvases.get(canvas_id).cloned().unwrap_or_default()
    }

    fn update_layers(&mut self, canvas_id: &str, update: LayerUpdate) {
        self.canvases
            .entry(canvas_id.to_string())
            .or_default()
            .extend(update);
    }
}

/// Spawn the camera that draws host tiles.
fn spawn_host_camera(mut commands: Commands) {
    commands.spawn((
        Camera3d::default(),
        Camera {
            order: 0,
            ..default()
        },
        Projection::Orthographic(OrthographicProjection {
            scaling_mode: bevy::camera::ScalingMode::WindowSize,
            ..OrthographicProjection::default_3d()
        }),
        Transform::from_xyz(0.0, 0.0, CAMERA_DISTANCE),
        bevy::core_pipeline::tonemapping::Tonemapping::None,
        HostCamera,
    ));
}

/// Camera transform for a view: rolled by the display rotation and mirrored
/// horizontally when flipped.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn oriented_transform(orientation: Orientation, translation: Vec3) -> Transform {
    let angle = f64::from(orientation.rotation.degrees()).to_radians() as f32;
    let scale = if orientation.flipped {
        Vec3::new(-1.0, 1.0, 1.0)
    } else {
        Vec3::ONE
    };
    Transform {
        translation,
        rotation: Quat::from_rotation_z(angle),
        scale,
    }
}

/// Track the window size.
#[allow(clippy::needless_pass_by_value)]
fn sync_window_size(window: Single<&Window, With<PrimaryWindow>>, mut relight: ResMut<Relight>) {
    let size = DVec2::new(f64::from(window.width()), f64::from(window.height()));
    if size.x > 0.0 && size.y > 0.0 {
        relight.viewer.resize(size);
    }
}

/// Unlit material for a host tile. Both faces are drawn so the quad survives
/// the mirrored camera of a flipped view.
#[must_use]
pub fn host_tile_material(texture: Handle<Image>) -> StandardMaterial {
    StandardMaterial {
        base_color_texture: Some(texture),
        unlit: true,
        cull_mode: None,
        ..default()
    }
}

/// Spawn quads for received albedo tiles.
#[allow(clippy::needless_pass_by_value, clippy::cast_precision_loss)]
fn draw_host_tiles(
    mut commands: Commands,
    mut relight: ResMut<Relight>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut images: ResMut<Assets<Image>>,
) {
    let Some((width, height)) = relight.viewer.content_size() else {
        return;
    };
    for draw in relight.viewer.take_draws() {
        let rect = &draw.rect;
        let center = DVec2::new(
            f64::from(rect.x) + f64::from(rect.width) / 2.0,
            f64::from(rect.y) + f64::from(rect.height) / 2.0,
        );
        let position =
            image_to_scene(center, width, height) + Vec3::Z * (draw.level as f32 * LEVEL_DEPTH);
        let texture = images.add(crate::render::tile_texture(
            &draw.image,
            bevy::render::render_resource::TextureFormat::Rgba8UnormSrgb,
        ));
        let material = materials.add(host_tile_material(texture));
        commands.spawn((
            Mesh3d(meshes.add(Rectangle::new(rect.width as f32, rect.height as f32))),
            MeshMaterial3d(material),
            Transform::from_translation(position),
            Visibility::Hidden,
            HostTile {
                level: draw.level,
                generation: draw.generation,
            },
        ));
        relight.viewer.tile_drawn(draw.level);
    }
}

/// Forward queued host events to the engine.
#[allow(clippy::needless_pass_by_value)]
fn dispatch_host_events(mut relight: ResMut<Relight>) {
    let Relight {
        controller,
        viewer,
        layers,
        backend,
    } = &mut *relight;
    while let Some(event) = viewer.next_event() {
        controller.handle_event(viewer, backend, layers, event);
    }
}

/// Run the engine's animation frame when one was requested.
#[allow(clippy::needless_pass_by_value)]
fn run_animation_frame(mut relight: ResMut<Relight>) {
    let Relight {
        controller,
        viewer,
        backend,
        ..
    } = &mut *relight;
    if viewer.take_frame_request().is_some() {
        controller.on_animation_frame(viewer, backend);
    }
}

/// Show host tiles up to the current level while the albedo layer is
/// visible, and drop tiles of closed canvases.
#[allow(clippy::needless_pass_by_value)]
fn update_host_tiles(
    mut commands: Commands,
    relight: Res<Relight>,
    mut query: Query<(Entity, &HostTile, &mut Visibility)>,
) {
    let viewer = &relight.viewer;
    let layer_visible = viewer
        .canvas_id()
        .zip(viewer.albedo_layer())
        .is_some_and(|(canvas, layer)| relight.layers.is_visible(canvas, layer));
    for (entity, tile, mut visibility) in &mut query {
        if tile.generation != viewer.generation() {
            commands.entity(entity).despawn();
            continue;
        }
        let shown = layer_visible && viewer.level().is_some_and(|level| tile.level <= level);
        let wanted = if shown {
            Visibility::Visible
        } else {
            Visibility::Hidden
        };
        if *visibility != wanted {
            *visibility = wanted;
        }
    }
}

/// Point the host camera at the view.
#[allow(clippy::needless_pass_by_value, clippy::cast_possible_truncation)]
fn sync_host_camera(
    relight: Res<Relight>,
    camera: Single<(&mut Transform, &mut Projection), With<HostCamera>>,
) {
    let viewer = &relight.viewer;
    let Some((width, height)) = viewer.content_size() else {
        return;
    };
    let view = viewer.view();
    let (mut transform, mut projection) = camera.into_inner();
    let center = image_to_scene(view.center, width, height);
    *transform = oriented_transform(
        view.orientation(),
        Vec3::new(center.x, center.y, CAMERA_DISTANCE),
    );
    if let Projection::Orthographic(orthographic) = &mut *projection {
        orthographic.scale = (1.0 / view.zoom) as f32;
    }
}
