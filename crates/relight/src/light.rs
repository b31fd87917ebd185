//! User-controlled light and material state.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::backend::{MaterialModel, MaterialParams};

/// Shading model used for tile materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderMode {
    /// Metalness/roughness shading.
    #[default]
    Physical,
    /// Blinn-Phong style shininess shading.
    Specular,
}

impl RenderMode {
    /// The other mode.
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Physical => Self::Specular,
            Self::Specular => Self::Physical,
        }
    }
}

/// Light direction, intensities and material parameters.
///
/// The direction is stored in the light control's own screen frame (`y` up,
/// inside the unit disk). It is remapped through the display orientation
/// whenever the light rig is derived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LightState {
    pub direction_x: f32,
    pub direction_y: f32,
    pub directional_intensity: f32,
    pub ambient_intensity: f32,
    pub normal_depth: f32,
    pub metalness: f32,
    pub roughness: f32,
    pub shininess: f32,
    pub render_mode: RenderMode,
}

impl LightState {
    pub const DIRECTIONAL_RANGE: (f32, f32) = (0.1, 1.0);
    pub const AMBIENT_RANGE: (f32, f32) = (0.0, 1.0);
    pub const NORMAL_DEPTH_RANGE: (f32, f32) = (1.0, 10.0);
    pub const METALNESS_RANGE: (f32, f32) = (0.0, 1.0);
    pub const ROUGHNESS_RANGE: (f32, f32) = (0.0, 1.0);
    pub const SHININESS_RANGE: (f32, f32) = (0.0, 40.0);

    /// Light direction in the control frame.
    #[must_use]
    pub fn direction(&self) -> Vec2 {
        Vec2::new(self.direction_x, self.direction_y)
    }

    /// Set the direction, clamped to the unit disk.
    pub fn set_direction(&mut self, direction: Vec2) {
        let clamped = if direction.is_finite() {
            direction.clamp_length_max(1.0)
        } else {
            Vec2::ZERO
        };
        self.direction_x = clamped.x;
        self.direction_y = clamped.y;
    }

    /// Set the direction from a pointer position inside a square control of
    /// side `extent`, `y` down.
    pub fn set_direction_from_pointer(&mut self, pointer: Vec2, extent: f32) {
        self.set_direction(pointer_to_direction(pointer, extent));
    }

    pub fn set_directional_intensity(&mut self, value: f32) {
        self.directional_intensity = clamp(value, Self::DIRECTIONAL_RANGE);
    }

    pub fn set_ambient_intensity(&mut self, value: f32) {
        self.ambient_intensity = clamp(value, Self::AMBIENT_RANGE);
    }

    pub fn set_normal_depth(&mut self, value: f32) {
        self.normal_depth = clamp(value, Self::NORMAL_DEPTH_RANGE);
    }

    pub fn set_metalness(&mut self, value: f32) {
        self.metalness = clamp(value, Self::METALNESS_RANGE);
    }

    pub fn set_roughness(&mut self, value: f32) {
        self.roughness = clamp(value, Self::ROUGHNESS_RANGE);
    }

    pub fn set_shininess(&mut self, value: f32) {
        self.shininess = clamp(value, Self::SHININESS_RANGE);
    }

    pub fn set_render_mode(&mut self, mode: RenderMode) {
        self.render_mode = mode;
    }

    /// Clamp every field into range. Used after deserializing.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.set_direction(self.direction());
        self.set_directional_intensity(self.directional_intensity);
        self.set_ambient_intensity(self.ambient_intensity);
        self.set_normal_depth(self.normal_depth);
        self.set_metalness(self.metalness);
        self.set_roughness(self.roughness);
        self.set_shininess(self.shininess);
        self
    }

    /// Material parameters for the current render mode.
    #[must_use]
    pub fn material_params(&self) -> MaterialParams {
        let model = match self.render_mode {
            RenderMode::Physical => MaterialModel::Physical {
                metalness: self.metalness,
                roughness: self.roughness,
            },
            RenderMode::Specular => MaterialModel::Specular {
                shininess: self.shininess,
            },
        };
        MaterialParams {
            model,
            normal_depth: self.normal_depth,
        }
    }
}

impl Default for LightState {
    fn default() -> Self {
        Self {
            direction_x: 0.0,
            direction_y: 0.0,
            directional_intensity: 1.0,
            ambient_intensity: 0.1,
            normal_depth: 1.0,
            metalness: 0.0,
            roughness: 0.1,
            shininess: 32.0,
            render_mode: RenderMode::Physical,
        }
    }
}

/// Map a pointer inside a square control to a `y`-up direction in the unit
/// disk: `x = 2px/extent - 1`, `y = -(2py/extent - 1)`.
#[must_use]
pub fn pointer_to_direction(pointer: Vec2, extent: f32) -> Vec2 {
    if extent <= 0.0 {
        return Vec2::ZERO;
    }
    let x = 2.0 * pointer.x / extent - 1.0;
    let y = -(2.0 * pointer.y / extent - 1.0);
    let direction = Vec2::new(x, y);
    if direction.is_finite() {
        direction.clamp_length_max(1.0)
    } else {
        Vec2::ZERO
    }
}

fn clamp(value: f32, (min, max): (f32, f32)) -> f32 {
    if value.is_nan() { min } else { value.clamp(min, max) }
}
