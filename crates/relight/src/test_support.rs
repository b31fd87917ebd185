//! Recording host, backend and layer store for engine tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use glam::Vec3;
use relight_tiles::{
    ImageInfo, ImageResource, LightingMaps, MapType, TileSetCollection, TileSpec, UrlOptions,
    build_tile_sets,
};

use crate::backend::{MapKind, MaterialParams, RenderBackend};
use crate::geometry::Rect;
use crate::host::{
    FrameRequestId, HandlerId, HostEventKind, HostViewer, LoadedTile, OverlayId, TileImage,
    ViewportState,
};
use crate::layers::{LayerState, LayerStore, LayerUpdate};
use crate::viewport::{CameraState, LightRig};

pub const ALBEDO: &str = "https://example.org/iiif/albedo";
pub const NORMAL: &str = "https://example.org/iiif/normal";

/// Ordered log of teardown-relevant calls, shared by the fakes.
#[derive(Debug, Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<&'static str>>>);

impl Journal {
    pub fn record(&self, entry: &'static str) {
        self.0.borrow_mut().push(entry);
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    /// Entries with consecutive repeats collapsed.
    pub fn collapsed(&self) -> Vec<&'static str> {
        let mut entries = self.0.borrow().clone();
        entries.dedup();
        entries
    }
}

pub fn maps() -> LightingMaps {
    LightingMaps {
        albedo: ALBEDO.to_string(),
        normal: NORMAL.to_string(),
    }
}

pub fn tile_image() -> TileImage {
    TileImage::new(2, 2, vec![128; 16]).unwrap()
}

/// 1000x600 image, 256 pixel tiles, three levels.
pub fn info() -> ImageInfo {
    ImageInfo {
        id: Some(ALBEDO.to_string()),
        width: 1000,
        height: 600,
        tiles: vec![TileSpec::new(256, vec![1, 2, 4])],
        preferred_formats: Vec::new(),
    }
}

pub fn tile_sets() -> TileSetCollection {
    build_tile_sets(0, &info(), ALBEDO, NORMAL, &UrlOptions::default()).unwrap()
}

fn resource(id: &str, map_type: MapType, service: Option<&str>) -> ImageResource {
    ImageResource {
        id: id.to_string(),
        map_type: Some(map_type),
        service_id: service.map(str::to_string),
    }
}

pub fn resources() -> Vec<ImageResource> {
    vec![
        resource("https://example.org/albedo.jpg", MapType::Albedo, Some(ALBEDO)),
        resource("https://example.org/normal.jpg", MapType::Normal, Some(NORMAL)),
        resource("https://example.org/depth.jpg", MapType::Depth, None),
        resource("https://example.org/composite.jpg", MapType::Composite, None),
    ]
}

pub fn albedo_only_resources() -> Vec<ImageResource> {
    resources()
        .into_iter()
        .filter(|resource| resource.map_type != Some(MapType::Normal))
        .collect()
}

pub struct RecordingHost {
    journal: Journal,
    next_id: u64,
    pub viewport: ViewportState,
    pub resources: Vec<ImageResource>,
    pub info: Option<ImageInfo>,
    pub loaded: Vec<LoadedTile>,
    pub level: Option<u32>,
    pub live_overlays: HashSet<OverlayId>,
    pub overlay_updates: Vec<Rect>,
    pub live_handlers: HashSet<HandlerId>,
    pub handler_adds: Vec<HostEventKind>,
    pub pending_frame: Option<FrameRequestId>,
    pub redraws: usize,
}

impl RecordingHost {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            next_id: 0,
            viewport: ViewportState {
                visible: Rect::from_size(1000.0, 600.0),
                content_width: 1000.0,
                content_height: 600.0,
                zoom: 1.0,
                rotation: 0.0,
                flipped: false,
            },
            resources: resources(),
            info: Some(info()),
            loaded: Vec::new(),
            level: None,
            live_overlays: HashSet::new(),
            overlay_updates: Vec::new(),
            live_handlers: HashSet::new(),
            handler_adds: Vec::new(),
            pending_frame: None,
            redraws: 0,
        }
    }

    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl HostViewer for RecordingHost {
    fn viewport(&self) -> ViewportState {
        self.viewport
    }

    fn canvas_resources(&self) -> Vec<ImageResource> {
        self.resources.clone()
    }

    fn tile_source(&self) -> Option<ImageInfo> {
        self.info.clone()
    }

    fn loaded_tiles(&self) -> Vec<LoadedTile> {
        self.loaded.clone()
    }

    fn current_level(&self) -> Option<u32> {
        self.level
    }

    fn add_overlay(&mut self) -> OverlayId {
        let id = OverlayId(self.id());
        self.live_overlays.insert(id);
        id
    }

    fn remove_overlay(&mut self, id: OverlayId) {
        assert!(self.live_overlays.remove(&id), "overlay removed twice");
        self.journal.record("remove_overlay");
    }

    fn update_overlay(&mut self, id: OverlayId, bounds: Rect) {
        assert!(self.live_overlays.contains(&id), "update of removed overlay");
        self.overlay_updates.push(bounds);
    }

    fn force_redraw(&mut self) {
        self.redraws += 1;
    }

    fn add_handler(&mut self, kind: HostEventKind) -> HandlerId {
        let id = HandlerId(self.id());
        self.live_handlers.insert(id);
        self.handler_adds.push(kind);
        id
    }

    fn remove_handler(&mut self, id: HandlerId) {
        assert!(self.live_handlers.remove(&id), "handler removed twice");
        self.journal.record("remove_handler");
    }

    fn request_animation_frame(&mut self) -> FrameRequestId {
        assert!(self.pending_frame.is_none(), "frame requested twice");
        let id = FrameRequestId(self.id());
        self.pending_frame = Some(id);
        id
    }

    fn cancel_animation_frame(&mut self, id: FrameRequestId) {
        assert_eq!(self.pending_frame.take(), Some(id));
        self.journal.record("cancel_frame");
    }
}

/// Backend whose handles are plain ids. Double disposal panics.
pub struct RecordingBackend {
    journal: Journal,
    next_id: u64,
    pub kinds: Vec<MapKind>,
    pub textures_created: usize,
    pub textures_disposed: usize,
    pub geometries_created: usize,
    pub geometries_disposed: usize,
    pub materials_created: usize,
    pub materials_disposed: usize,
    pub material_updates: usize,
    pub meshes_created: usize,
    pub meshes_disposed: usize,
    pub bindings: usize,
    pub live_textures: HashSet<u64>,
    pub live_geometries: HashSet<u64>,
    pub live_materials: HashSet<u64>,
    pub live_meshes: HashSet<u64>,
    pub last_material_params: Option<MaterialParams>,
    pub cameras: Vec<CameraState>,
    pub last_rig: Option<LightRig>,
    pub light_updates: usize,
    pub frames_rendered: usize,
}

impl RecordingBackend {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            next_id: 0,
            kinds: Vec::new(),
            textures_created: 0,
            textures_disposed: 0,
            geometries_created: 0,
            geometries_disposed: 0,
            materials_created: 0,
            materials_disposed: 0,
            material_updates: 0,
            meshes_created: 0,
            meshes_disposed: 0,
            bindings: 0,
            live_textures: HashSet::new(),
            live_geometries: HashSet::new(),
            live_materials: HashSet::new(),
            live_meshes: HashSet::new(),
            last_material_params: None,
            cameras: Vec::new(),
            last_rig: None,
            light_updates: 0,
            frames_rendered: 0,
        }
    }

    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl RenderBackend for RecordingBackend {
    type Texture = u64;
    type Geometry = u64;
    type Material = u64;
    type Mesh = u64;

    fn create_texture(&mut self, _image: &TileImage, kind: MapKind) -> u64 {
        let id = self.id();
        self.kinds.push(kind);
        self.textures_created += 1;
        self.live_textures.insert(id);
        id
    }

    fn dispose_texture(&mut self, texture: u64) {
        assert!(self.live_textures.remove(&texture), "texture disposed twice");
        self.textures_disposed += 1;
        self.journal.record("dispose_texture");
    }

    fn create_geometry(&mut self, width: f32, height: f32) -> u64 {
        assert!(width > 0.0 && height > 0.0);
        let id = self.id();
        self.geometries_created += 1;
        self.live_geometries.insert(id);
        id
    }

    fn dispose_geometry(&mut self, geometry: u64) {
        assert!(self.live_geometries.remove(&geometry), "geometry disposed twice");
        self.geometries_disposed += 1;
    }

    fn create_material(&mut self, params: &MaterialParams) -> u64 {
        let id = self.id();
        self.materials_created += 1;
        self.live_materials.insert(id);
        self.last_material_params = Some(*params);
        id
    }

    fn update_material(&mut self, material: &u64, params: &MaterialParams) {
        assert!(self.live_materials.contains(material));
        self.material_updates += 1;
        self.last_material_params = Some(*params);
    }

    fn bind_textures(&mut self, material: &u64, albedo: &u64, normal: &u64) {
        assert!(self.live_materials.contains(material));
        assert!(self.live_textures.contains(albedo) && self.live_textures.contains(normal));
        self.bindings += 1;
    }

    fn dispose_material(&mut self, material: u64) {
        assert!(self.live_materials.remove(&material), "material disposed twice");
        self.materials_disposed += 1;
    }

    fn create_mesh(&mut self, geometry: &u64, material: &u64, _position: Vec3) -> u64 {
        assert!(self.live_geometries.contains(geometry));
        assert!(self.live_materials.contains(material));
        let id = self.id();
        self.meshes_created += 1;
        self.live_meshes.insert(id);
        id
    }

    fn set_mesh_material(&mut self, mesh: &u64, material: &u64) {
        assert!(self.live_meshes.contains(mesh));
        assert!(self.live_materials.contains(material));
    }

    fn set_mesh_visible(&mut self, mesh: &u64, _visible: bool) {
        assert!(self.live_meshes.contains(mesh));
    }

    fn dispose_mesh(&mut self, mesh: u64) {
        assert!(self.live_meshes.remove(&mesh), "mesh disposed twice");
        self.meshes_disposed += 1;
        self.journal.record("dispose_mesh");
    }

    fn set_camera(&mut self, camera: &CameraState) {
        self.cameras.push(*camera);
    }

    fn set_lights(&mut self, rig: &LightRig) {
        self.last_rig = Some(*rig);
        self.light_updates += 1;
    }

    fn render(&mut self) {
        self.frames_rendered += 1;
    }
}

/// In-memory layer store. Unknown layers count as visible.
pub struct RecordingLayers {
    journal: Journal,
    canvases: BTreeMap<String, BTreeMap<String, LayerState>>,
}

impl RecordingLayers {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            canvases: BTreeMap::new(),
        }
    }

    pub fn is_visible(&self, canvas_id: &str, layer_id: &str) -> bool {
        self.canvases
            .get(canvas_id)
            .and_then(|layers| layers.get(layer_id))
            .is_none_or(|state| state.visibility)
    }
}

impl LayerStore for RecordingLayers {
    fn layers(&self, canvas_id: &str) -> BTreeMap<String, LayerState> {
        self.canvases.get(canvas_id).cloned().unwrap_or_default()
    }

    fn update_layers(&mut self, canvas_id: &str, update: LayerUpdate) {
        self.canvases
            .entry(canvas_id.to_string())
            .or_default()
            .extend(update);
        self.journal.record("update_layers");
    }
}
