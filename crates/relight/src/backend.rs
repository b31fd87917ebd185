//! The render backend seam.
//!
//! A backend owns the GPU resources behind opaque handles. The engine decides
//! what exists and when it is freed; every handle it creates is handed back to
//! exactly one `dispose_*` call.

use glam::Vec3;

use crate::host::TileImage;
use crate::viewport::{CameraState, LightRig};

/// Which lighting map a texture holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapKind {
    Albedo,
    Normal,
}

/// Shading model parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaterialModel {
    Physical { metalness: f32, roughness: f32 },
    Specular { shininess: f32 },
}

impl MaterialModel {
    /// Whether both models use the same shading kind. Switching kind needs new
    /// materials; changing parameters within a kind does not.
    #[must_use]
    pub fn same_kind(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Parameters applied to every tile material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialParams {
    pub model: MaterialModel,
    /// Normal map strength, `1..=10`.
    pub normal_depth: f32,
}

/// GPU resource operations used by the scene manager.
pub trait RenderBackend {
    type Texture;
    type Geometry;
    type Material;
    type Mesh;

    fn create_texture(&mut self, image: &TileImage, kind: MapKind) -> Self::Texture;

    fn dispose_texture(&mut self, texture: Self::Texture);

    /// A `width` x `height` plane facing `+z`, centered on its origin.
    fn create_geometry(&mut self, width: f32, height: f32) -> Self::Geometry;

    fn dispose_geometry(&mut self, geometry: Self::Geometry);

    fn create_material(&mut self, params: &MaterialParams) -> Self::Material;

    /// Change parameters of an existing material of the same model kind.
    fn update_material(&mut self, material: &Self::Material, params: &MaterialParams);

    fn bind_textures(
        &mut self,
        material: &Self::Material,
        albedo: &Self::Texture,
        normal: &Self::Texture,
    );

    fn dispose_material(&mut self, material: Self::Material);

    /// A hidden mesh at `position` in scene coordinates.
    fn create_mesh(
        &mut self,
        geometry: &Self::Geometry,
        material: &Self::Material,
        position: Vec3,
    ) -> Self::Mesh;

    fn set_mesh_material(&mut self, mesh: &Self::Mesh, material: &Self::Material);

    fn set_mesh_visible(&mut self, mesh: &Self::Mesh, visible: bool);

    fn dispose_mesh(&mut self, mesh: Self::Mesh);

    fn set_camera(&mut self, camera: &CameraState);

    fn set_lights(&mut self, rig: &LightRig);

    /// Draw one frame.
    fn render(&mut self);
}
