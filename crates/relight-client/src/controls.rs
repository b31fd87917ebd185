//! Keyboard and mouse controls for the view and the light.
//!
//! Left drag pans, the wheel zooms and right drag points the light. Keys:
//!
//! | Key | Action |
//! |---|---|
//! | T | toggle relighting |
//! | R / F | rotate clockwise / flip |
//! | M | switch physical and specular shading |
//! | `[` / `]` | directional intensity |
//! | `-` / `=` | ambient intensity |
//! | `,` / `.` | roughness, or shininess in specular mode |
//! | `;` / `'` | metalness |
//! | N | cycle normal depth |
//! | Backspace | reset the light |
//! | Escape / O | close / reopen the canvas |

use bevy::ecs::message::MessageReader;
use bevy::input::mouse::{MouseMotion, MouseWheel};
use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use relight::{LightState, RenderMode};

use crate::loader::LoaderState;
use crate::{Relight, RelightSet};

/// Normal depths cycled through with N.
const NORMAL_DEPTHS: [f32; 6] = [1.0, 2.0, 4.0, 6.0, 8.0, 10.0];

/// Plugin for view and light controls.
pub struct ControlsPlugin;

impl Plugin for ControlsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ControlSettings>().add_systems(
            Update,
            (keyboard_controls, pan_and_zoom, point_light)
                .chain()
                .in_set(RelightSet::Input),
        );
    }
}

/// Step sizes for the controls.
#[derive(Resource)]
pub struct ControlSettings {
    /// Zoom factor per wheel notch.
    pub zoom_step: f64,
    /// Directional intensity change per key press.
    pub intensity_step: f32,
    /// Ambient intensity change per key press.
    pub ambient_step: f32,
    /// Metalness and roughness change per key press.
    pub surface_step: f32,
    /// Shininess change per key press.
    pub shininess_step: f32,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            zoom_step: 1.1,
            intensity_step: 0.1,
            ambient_step: 0.05,
            surface_step: 0.05,
            shininess_step: 4.0,
        }
    }
}

/// The next normal depth after `current`, wrapping to the first.
#[must_use]
pub fn next_normal_depth(current: f32) -> f32 {
    NORMAL_DEPTHS
        .iter()
        .copied()
        .find(|&depth| depth > current + f32::EPSILON)
        .unwrap_or(NORMAL_DEPTHS[0])
}

/// Map a cursor position to the light control: a square of side
/// `min(width, height)` centered in the window. Returns the pointer inside
/// the square and its side.
#[must_use]
pub fn light_pointer(cursor: Vec2, window: Vec2) -> (Vec2, f32) {
    let extent = window.x.min(window.y);
    let origin = (window - Vec2::splat(extent)) / 2.0;
    (cursor - origin, extent)
}

/// Adjust the surface parameter of the current render mode by `steps`.
pub fn adjust_surface(light: &mut LightState, steps: f32, settings: &ControlSettings) {
    match light.render_mode {
        RenderMode::Physical => {
            light.set_roughness(light.roughness + steps * settings.surface_step);
        }
        RenderMode::Specular => {
            light.set_shininess(light.shininess + steps * settings.shininess_step);
        }
    }
}

/// Change the light from the keyboard.
fn light_keys(
    keyboard: &ButtonInput<KeyCode>,
    settings: &ControlSettings,
    light: &mut LightState,
) {
    let step = |decrease: KeyCode, increase: KeyCode| {
        f32::from(u8::from(keyboard.just_pressed(increase)))
            - f32::from(u8::from(keyboard.just_pressed(decrease)))
    };

    let intensity = step(KeyCode::BracketLeft, KeyCode::BracketRight);
    if intensity != 0.0 {
        light.set_directional_intensity(
            light.directional_intensity + intensity * settings.intensity_step,
        );
    }
    let ambient = step(KeyCode::Minus, KeyCode::Equal);
    if ambient != 0.0 {
        light.set_ambient_intensity(light.ambient_intensity + ambient * settings.ambient_step);
    }
    let surface = step(KeyCode::Comma, KeyCode::Period);
    if surface != 0.0 {
        adjust_surface(light, surface, settings);
    }
    let metalness = step(KeyCode::Semicolon, KeyCode::Quote);
    if metalness != 0.0 {
        light.set_metalness(light.metalness + metalness * settings.surface_step);
    }
    if keyboard.just_pressed(KeyCode::KeyM) {
        light.set_render_mode(light.render_mode.toggled());
    }
    if keyboard.just_pressed(KeyCode::KeyN) {
        light.set_normal_depth(next_normal_depth(light.normal_depth));
    }
}

/// Handle key presses.
#[allow(clippy::needless_pass_by_value)]
fn keyboard_controls(
    keyboard: Res<ButtonInput<KeyCode>>,
    settings: Res<ControlSettings>,
    mut relight: ResMut<Relight>,
    mut loader: ResMut<LoaderState>,
) {
    let Relight {
        controller,
        viewer,
        layers,
        backend,
    } = &mut *relight;

    if keyboard.just_pressed(KeyCode::KeyT) && viewer.is_open() {
        let active = controller.toggle(viewer, backend, layers);
        tracing::info!("Relighting {}", if active { "on" } else { "off" });
        tracing::debug!("{} host handlers registered", viewer.handler_count());
    }
    if keyboard.just_pressed(KeyCode::KeyR) {
        viewer.rotate_cw();
    }
    if keyboard.just_pressed(KeyCode::KeyF) {
        viewer.toggle_flip();
    }
    if keyboard.just_pressed(KeyCode::Escape) {
        viewer.close();
    }
    if keyboard.just_pressed(KeyCode::KeyO) {
        loader.request_reload();
    }
    if keyboard.just_pressed(KeyCode::Backspace) {
        controller.reset_lights();
    }

    controller.update_light(|light| light_keys(&keyboard, &settings, light));
}

/// Pan with the left button and zoom with the wheel.
#[allow(clippy::needless_pass_by_value)]
fn pan_and_zoom(
    mouse: Res<ButtonInput<MouseButton>>,
    settings: Res<ControlSettings>,
    mut motion: MessageReader<MouseMotion>,
    mut scroll: MessageReader<MouseWheel>,
    mut relight: ResMut<Relight>,
) {
    let mut delta = Vec2::ZERO;
    for event in motion.read() {
        delta += event.delta;
    }
    if mouse.pressed(MouseButton::Left) && delta != Vec2::ZERO {
        relight.viewer.pan_by(delta.as_dvec2());
    }

    let notches: f32 = scroll.read().map(|event| event.y).sum();
    if notches != 0.0 {
        relight
            .viewer
            .zoom_by(settings.zoom_step.powf(f64::from(notches)));
    }
}

/// Point the light at the cursor while the right button is held.
#[allow(clippy::needless_pass_by_value)]
fn point_light(
    mouse: Res<ButtonInput<MouseButton>>,
    window: Single<&Window, With<PrimaryWindow>>,
    mut relight: ResMut<Relight>,
) {
    if !mouse.pressed(MouseButton::Right) {
        return;
    }
    let Some(cursor) = window.cursor_position() else {
        return;
    };
    let (pointer, extent) = light_pointer(cursor, window.size());
    relight
        .controller
        .update_light(|light| light.set_direction_from_pointer(pointer, extent));
}
