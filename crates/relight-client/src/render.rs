//! Bevy implementation of the render backend.
//!
//! The engine runs inside plain method calls without access to the ECS, so
//! [`BevyBackend`] hands out ids and records operations. The
//! `apply_render_ops` system replays them against Bevy assets and entities
//! each frame. The overlay is drawn by its own orthographic camera whose
//! viewport is the overlay's window rectangle and whose sub-camera view cuts
//! the visible window out of the full frustum.

use std::collections::HashMap;

use bevy::asset::RenderAssetUsages;
use bevy::camera::visibility::RenderLayers;
use bevy::camera::{ClearColorConfig, ScalingMode, SubCameraView, Viewport};
use bevy::core_pipeline::tonemapping::Tonemapping;
use bevy::prelude::*;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};
use bevy::window::PrimaryWindow;
use relight::normal_map::{scale_normal_image, scale_normal_map};
use relight::{
    CameraState, LightRig, MapKind, MaterialModel, MaterialParams, Rect, RenderBackend, TileImage,
    ViewOffset,
};

use crate::viewer::oriented_transform;
use crate::{CAMERA_DISTANCE, Relight, RelightSet};

/// Render layer of overlay meshes, camera and light.
const OVERLAY_LAYER: usize = 1;
/// Illuminance for a directional intensity of 1 at the default exposure.
const LUX_PER_UNIT: f32 = 3_000.0;
/// Emissive luminance for an ambient intensity of 1 at the default exposure.
const NITS_PER_UNIT: f32 = 1_000.0;

/// Plugin for the overlay renderer.
pub struct RelightRenderPlugin;

impl Plugin for RelightRenderPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<RenderRegistry>()
            .add_systems(Startup, spawn_overlay_rig)
            .add_systems(
                Update,
                (apply_render_ops, place_overlay_camera)
                    .chain()
                    .in_set(RelightSet::Render),
            );
    }
}

/// Marker for the overlay camera.
#[derive(Component)]
pub struct OverlayCamera;

/// Marker for the overlay's directional light.
#[derive(Component)]
pub struct OverlayLight;

/// Marker for overlay tile meshes.
#[derive(Component)]
pub struct OverlayTile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(u64);

/// A recorded backend call.
#[derive(Debug, Clone)]
pub enum RenderOp {
    CreateTexture {
        id: TextureId,
        image: TileImage,
        kind: MapKind,
    },
    DisposeTexture(TextureId),
    CreateGeometry {
        id: GeometryId,
        width: f32,
        height: f32,
    },
    DisposeGeometry(GeometryId),
    CreateMaterial {
        id: MaterialId,
        params: MaterialParams,
    },
    UpdateMaterial {
        id: MaterialId,
        params: MaterialParams,
    },
    BindTextures {
        material: MaterialId,
        albedo: TextureId,
        normal: TextureId,
    },
    DisposeMaterial(MaterialId),
    CreateMesh {
        id: MeshId,
        geometry: GeometryId,
        material: MaterialId,
        position: Vec3,
    },
    SetMeshMaterial {
        mesh: MeshId,
        material: MaterialId,
    },
    SetMeshVisible {
        mesh: MeshId,
        visible: bool,
    },
    DisposeMesh(MeshId),
    SetCamera(CameraState),
    SetLights(LightRig),
    Render,
}

/// Records backend calls for [`apply_render_ops`].
#[derive(Debug, Default)]
pub struct BevyBackend {
    next_id: u64,
    ops: Vec<RenderOp>,
}

impl BevyBackend {
    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Take the recorded operations, oldest first.
    pub fn take_ops(&mut self) -> Vec<RenderOp> {
        std::mem::take(&mut self.ops)
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.ops.len()
    }
}

impl RenderBackend for BevyBackend {
    type Texture = TextureId;
    type Geometry = GeometryId;
    type Material = MaterialId;
    type Mesh = MeshId;

    fn create_texture(&mut self, image: &TileImage, kind: MapKind) -> TextureId {
        let id = TextureId(self.id());
        self.ops.push(RenderOp::CreateTexture {
            id,
            image: image.clone(),
            kind,
        });
        id
    }

    fn dispose_texture(&mut self, texture: TextureId) {
        self.ops.push(RenderOp::DisposeTexture(texture));
    }

    fn create_geometry(&mut self, width: f32, height: f32) -> GeometryId {
        let id = GeometryId(self.id());
        self.ops.push(RenderOp::CreateGeometry { id, width, height });
        id
    }

    fn dispose_geometry(&mut self, geometry: GeometryId) {
        self.ops.push(RenderOp::DisposeGeometry(geometry));
    }

    fn create_material(&mut self, params: &MaterialParams) -> MaterialId {
        let id = MaterialId(self.id());
        self.ops.push(RenderOp::CreateMaterial {
            id,
            params: *params,
        });
        id
    }

    fn update_material(&mut self, material: &MaterialId, params: &MaterialParams) {
        self.ops.push(RenderOp::UpdateMaterial {
            id: *material,
            params: *params,
        });
    }

    fn bind_textures(&mut self, material: &MaterialId, albedo: &TextureId, normal: &TextureId) {
        self.ops.push(RenderOp::BindTextures {
            material: *material,
            albedo: *albedo,
            normal: *normal,
        });
    }

    fn dispose_material(&mut self, material: MaterialId) {
        self.ops.push(RenderOp::DisposeMaterial(material));
    }

    fn create_mesh(
        &mut self,
        geometry: &GeometryId,
        material: &MaterialId,
        position: Vec3,
    ) -> MeshId {
        let id = MeshId(self.id());
        self.ops.push(RenderOp::CreateMesh {
            id,
            geometry: *geometry,
            material: *material,
            position,
        });
        id
    }

    fn set_mesh_material(&mut self, mesh: &MeshId, material: &MaterialId) {
        self.ops.push(RenderOp::SetMeshMaterial {
            mesh: *mesh,
            material: *material,
        });
    }

    fn set_mesh_visible(&mut self, mesh: &MeshId, visible: bool) {
        self.ops.push(RenderOp::SetMeshVisible {
            mesh: *mesh,
            visible,
        });
    }

    fn dispose_mesh(&mut self, mesh: MeshId) {
        self.ops.push(RenderOp::DisposeMesh(mesh));
    }

    fn set_camera(&mut self, camera: &CameraState) {
        self.ops.push(RenderOp::SetCamera(*camera));
    }

    fn set_lights(&mut self, rig: &LightRig) {
        self.ops.push(RenderOp::SetLights(*rig));
    }

    fn render(&mut self) {
        // One frame in flight is enough; Bevy draws every frame anyway.
        if !matches!(self.ops.last(), Some(RenderOp::Render)) {
            self.ops.push(RenderOp::Render);
        }
    }
}

struct MaterialSlot {
    handle: Handle<StandardMaterial>,
}

/// Bevy handles and entities behind backend ids.
#[derive(Resource, Default)]
pub struct RenderRegistry {
    textures: HashMap<TextureId, Handle<Image>>,
    normal_sources: HashMap<TextureId, TileImage>,
    geometries: HashMap<GeometryId, Handle<Mesh>>,
    materials: HashMap<MaterialId, MaterialSlot>,
    meshes: HashMap<MeshId, Entity>,
    camera: Option<CameraState>,
    normal_depth: Option<f32>,
    ambient: f32,
    rendered: bool,
}

impl RenderRegistry {
    fn normal_depth(&self) -> f32 {
        self.normal_depth.unwrap_or(1.0)
    }

    /// Rescale every normal texture when the depth changes.
    fn set_normal_depth(&mut self, depth: f32, images: &mut Assets<Image>) {
        if self
            .normal_depth
            .is_some_and(|current| (current - depth).abs() < f32::EPSILON)
        {
            return;
        }
        self.normal_depth = Some(depth);
        for (id, source) in &self.normal_sources {
            let Some(handle) = self.textures.get(id) else {
                continue;
            };
            if let Some(mut image) = images.get_mut(handle) {
                replace_pixels(&mut image, scale_normal_map(source.pixels(), depth));
            }
        }
        tracing::debug!(
            "Rescaled {} normal textures to depth {}",
            self.normal_sources.len(),
            depth
        );
    }

    fn set_ambient(&mut self, ambient: f32, materials: &mut Assets<StandardMaterial>) {
        if (self.ambient - ambient).abs() < f32::EPSILON {
            return;
        }
        self.ambient = ambient;
        for slot in self.materials.values() {
            if let Some(mut material) = materials.get_mut(&slot.handle) {
                apply_ambient(&mut material, ambient);
            }
        }
    }
}

fn replace_pixels(image: &mut Image, pixels: Vec<u8>) {
    image.data = Some(pixels);
}

/// GPU image for an RGBA8 tile.
#[must_use]
pub fn tile_texture(image: &TileImage, format: TextureFormat) -> Image {
    Image::new(
        Extent3d {
            width: image.width(),
            height: image.height(),
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        image.pixels().to_vec(),
        format,
        RenderAssetUsages::default(),
    )
}

/// A `width` x `height` plane facing `+z` with tangents for normal mapping.
fn plane_mesh(width: f32, height: f32) -> Mesh {
    let mut mesh = Mesh::from(Rectangle::new(width, height));
    mesh.insert_attribute(Mesh::ATTRIBUTE_TANGENT, vec![[1.0_f32, 0.0, 0.0, 1.0]; 4]);
    mesh
}

/// Perceptual roughness matching a Blinn-Phong shininess exponent.
#[must_use]
pub fn shininess_to_roughness(shininess: f32) -> f32 {
    let alpha = (2.0 / (shininess.max(0.0) + 2.0)).sqrt();
    alpha.sqrt().clamp(0.0, 1.0)
}

fn apply_params(material: &mut StandardMaterial, params: &MaterialParams) {
    match params.model {
        MaterialModel::Physical {
            metalness,
            roughness,
        } => {
            material.metallic = metalness;
            material.perceptual_roughness = roughness;
        }
        MaterialModel::Specular { shininess } => {
            material.metallic = 0.0;
            material.perceptual_roughness = shininess_to_roughness(shininess);
        }
    }
}

/// Ambient light as emission of the albedo.
fn apply_ambient(material: &mut StandardMaterial, ambient: f32) {
    let level = ambient * NITS_PER_UNIT;
    material.emissive = LinearRgba::rgb(level, level, level);
}

fn new_material(params: &MaterialParams, ambient: f32) -> StandardMaterial {
    let mut material = StandardMaterial {
        base_color: Color::WHITE,
        cull_mode: None,
        ..default()
    };
    apply_params(&mut material, params);
    apply_ambient(&mut material, ambient);
    material
}

fn with_material(
    materials: &mut Assets<StandardMaterial>,
    slot: &MaterialSlot,
    update: impl FnOnce(&mut StandardMaterial),
) {
    if let Some(mut material) = materials.get_mut(&slot.handle) {
        update(&mut material);
    }
}

/// Spawn the overlay camera and light.
fn spawn_overlay_rig(mut commands: Commands) {
    commands.spawn((
        Camera3d::default(),
        Camera {
            order: 1,
            is_active: false,
            clear_color: ClearColorConfig::None,
            ..default()
        },
        Projection::Orthographic(OrthographicProjection {
            scaling_mode: ScalingMode::Fixed {
                width: 1.0,
                height: 1.0,
            },
            ..OrthographicProjection::default_3d()
        }),
        Transform::from_xyz(0.0, 0.0, CAMERA_DISTANCE),
        Tonemapping::None,
        AmbientLight {
            brightness: 0.0,
            ..default()
        },
        RenderLayers::layer(OVERLAY_LAYER),
        OverlayCamera,
    ));
    commands.spawn((
        DirectionalLight {
            illuminance: LUX_PER_UNIT,
            ..default()
        },
        Transform::from_xyz(0.0, 0.0, 1.0).looking_at(Vec3::ZERO, Vec3::Y),
        RenderLayers::layer(OVERLAY_LAYER),
        OverlayLight,
    ));
}

/// Replay recorded backend calls.
#[allow(clippy::needless_pass_by_value, clippy::too_many_lines)]
fn apply_render_ops(
    mut commands: Commands,
    mut relight: ResMut<Relight>,
    mut registry: ResMut<RenderRegistry>,
    mut images: ResMut<Assets<Image>>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    light: Single<(&mut DirectionalLight, &mut Transform), With<OverlayLight>>,
) {
    if relight.backend.pending() == 0 {
        return;
    }
    let ops = relight.backend.take_ops();
    let (mut light, mut light_transform) = light.into_inner();
    let registry = &mut *registry;

    for op in ops {
        match op {
            RenderOp::CreateTexture { id, image, kind } => {
                let texture = match kind {
                    MapKind::Albedo => tile_texture(&image, TextureFormat::Rgba8UnormSrgb),
                    MapKind::Normal => {
                        let scaled = scale_normal_image(&image, registry.normal_depth());
                        registry.normal_sources.insert(id, image);
                        tile_texture(&scaled, TextureFormat::Rgba8Unorm)
                    }
                };
                registry.textures.insert(id, images.add(texture));
            }
            RenderOp::DisposeTexture(id) => {
                registry.textures.remove(&id);
                registry.normal_sources.remove(&id);
            }
            RenderOp::CreateGeometry { id, width, height } => {
                registry.geometries.insert(id, meshes.add(plane_mesh(width, height)));
            }
            RenderOp::DisposeGeometry(id) => {
                registry.geometries.remove(&id);
            }
            RenderOp::CreateMaterial { id, params } => {
                registry.set_normal_depth(params.normal_depth, &mut images);
                let handle = materials.add(new_material(&params, registry.ambient));
                registry.materials.insert(id, MaterialSlot { handle });
            }
            RenderOp::UpdateMaterial { id, params } => {
                registry.set_normal_depth(params.normal_depth, &mut images);
                if let Some(slot) = registry.materials.get(&id) {
                    with_material(&mut materials, slot, |material| {
                        apply_params(material, &params);
                    });
                }
            }
            RenderOp::BindTextures {
                material,
                albedo,
                normal,
            } => {
                let (Some(slot), Some(albedo), Some(normal)) = (
                    registry.materials.get(&material),
                    registry.textures.get(&albedo),
                    registry.textures.get(&normal),
                ) else {
                    tracing::warn!("Binding textures to unknown material {:?}", material);
                    continue;
                };
                with_material(&mut materials, slot, |material| {
                    material.base_color_texture = Some(albedo.clone());
                    material.emissive_texture = Some(albedo.clone());
                    material.normal_map_texture = Some(normal.clone());
                });
            }
            RenderOp::DisposeMaterial(id) => {
                registry.materials.remove(&id);
            }
            RenderOp::CreateMesh {
                id,
                geometry,
                material,
                position,
            } => {
                let (Some(geometry), Some(slot)) = (
                    registry.geometries.get(&geometry),
                    registry.materials.get(&material),
                ) else {
                    tracing::warn!("Creating mesh {:?} from unknown resources", id);
                    continue;
                };
                let entity = commands
                    .spawn((
                        Mesh3d(geometry.clone()),
                        MeshMaterial3d(slot.handle.clone()),
                        Transform::from_translation(position),
                        Visibility::Hidden,
                        RenderLayers::layer(OVERLAY_LAYER),
                        OverlayTile,
                    ))
                    .id();
                registry.meshes.insert(id, entity);
            }
            RenderOp::SetMeshMaterial { mesh, material } => {
                if let (Some(entity), Some(slot)) =
                    (registry.meshes.get(&mesh), registry.materials.get(&material))
                {
                    commands
                        .entity(*entity)
                        .insert(MeshMaterial3d(slot.handle.clone()));
                }
            }
            RenderOp::SetMeshVisible { mesh, visible } => {
                if let Some(entity) = registry.meshes.get(&mesh) {
                    let visibility = if visible {
                        Visibility::Visible
                    } else {
                        Visibility::Hidden
                    };
                    commands.entity(*entity).insert(visibility);
                }
            }
            RenderOp::DisposeMesh(id) => {
                if let Some(entity) = registry.meshes.remove(&id) {
                    commands.entity(entity).despawn();
                }
            }
            RenderOp::SetCamera(camera) => {
                registry.camera = Some(camera);
            }
            RenderOp::SetLights(rig) => {
                *light_transform =
                    Transform::from_translation(rig.position).looking_at(rig.target, Vec3::Y);
                light.illuminance = rig.directional_intensity * LUX_PER_UNIT;
                light.color = Color::linear_rgb(rig.color.x, rig.color.y, rig.color.z);
                registry.set_ambient(rig.ambient_intensity, &mut materials);
            }
            RenderOp::Render => {
                registry.rendered = true;
            }
        }
    }

    if registry.meshes.is_empty() {
        registry.rendered = false;
    }
}

/// Physical viewport for a logical window rectangle, clipped to the window.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn physical_viewport(rect: &Rect, scale_factor: f64, window: UVec2) -> Option<Viewport> {
    let left = (rect.x * scale_factor).round().max(0.0);
    let top = (rect.y * scale_factor).round().max(0.0);
    let right = (rect.right() * scale_factor).round().min(f64::from(window.x));
    let bottom = (rect.bottom() * scale_factor).round().min(f64::from(window.y));
    if right - left < 1.0 || bottom - top < 1.0 {
        return None;
    }
    Some(Viewport {
        physical_position: UVec2::new(left as u32, top as u32),
        physical_size: UVec2::new((right - left) as u32, (bottom - top) as u32),
        ..default()
    })
}

/// Sub-camera view selecting a view offset's window.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn sub_camera_view(offset: &ViewOffset) -> SubCameraView {
    let size = |value: f64| value.round().max(1.0) as u32;
    SubCameraView {
        full_size: UVec2::new(size(offset.full_width), size(offset.full_height)),
        offset: Vec2::new(offset.x as f32, offset.y as f32),
        size: UVec2::new(size(offset.width), size(offset.height)),
    }
}

/// Place the overlay camera over the overlay's window rectangle.
#[allow(clippy::needless_pass_by_value, clippy::cast_possible_truncation)]
fn place_overlay_camera(
    relight: Res<Relight>,
    registry: Res<RenderRegistry>,
    window: Single<&Window, With<PrimaryWindow>>,
    camera: Single<(&mut Camera, &mut Transform, &mut Projection), With<OverlayCamera>>,
) {
    let (mut camera, mut transform, mut projection) = camera.into_inner();
    let placement = registry
        .camera
        .filter(|_| registry.rendered)
        .zip(relight.viewer.overlay_rect())
        .and_then(|(state, rect)| {
            let size = UVec2::new(window.physical_width(), window.physical_height());
            physical_viewport(&rect, f64::from(window.scale_factor()), size)
                .map(|viewport| (state, viewport))
        });
    let Some((state, viewport)) = placement else {
        if camera.is_active {
            camera.is_active = false;
        }
        return;
    };

    camera.viewport = Some(viewport);
    camera.sub_camera_view = Some(sub_camera_view(&state.display_offset));
    camera.is_active = true;
    *transform = oriented_transform(state.orientation, Vec3::new(0.0, 0.0, CAMERA_DISTANCE));
    if let Projection::Orthographic(orthographic) = &mut *projection {
        let (width, height) = state
            .orientation
            .display_size(state.content_width, state.content_height);
        orthographic.scaling_mode = ScalingMode::Fixed {
            width: width as f32,
            height: height as f32,
        };
    }
}
