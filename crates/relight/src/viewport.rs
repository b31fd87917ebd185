//! Viewport synchronization.
//!
//! The scene is viewed through one orthographic frustum covering the whole
//! image. Each frame only the part under the host's visible region is drawn,
//! using a view offset: the full frustum is scaled to `content * zoom` screen
//! pixels and a `intersection * zoom` window is cut out of it at
//! `intersection.origin * zoom`. This keeps the overlay in pixel registration
//! with the host at any pan and zoom.
//!
//! Scene coordinates put the image center at the origin with `y` up.

use glam::{DVec2, Vec3};

use crate::geometry::{Orientation, Rect};
use crate::host::ViewportState;
use crate::light::LightState;

/// Host viewport state reduced to what the overlay needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportFrame {
    /// Visible region clipped to the image, in image pixels.
    pub intersection: Rect,
    /// Screen pixels per image pixel.
    pub zoom: f64,
    pub content_width: f64,
    pub content_height: f64,
    /// Raw rotation reported by the host, in degrees.
    pub rotation_degrees: f64,
    pub orientation: Orientation,
}

/// Sub-rectangle of a virtual full-size view, as in a camera view offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewOffset {
    pub full_width: f64,
    pub full_height: f64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ViewOffset {
    /// The same window for a display rotated and mirrored by `orientation`.
    #[must_use]
    pub fn oriented(&self, orientation: Orientation) -> Self {
        let window = orientation.map_rect(
            &Rect::new(self.x, self.y, self.width, self.height),
            self.full_width,
            self.full_height,
        );
        let (full_width, full_height) = orientation.display_size(self.full_width, self.full_height);
        Self {
            full_width,
            full_height,
            x: window.x,
            y: window.y,
            width: window.width,
            height: window.height,
        }
    }
}

/// Camera parameters pushed to the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    /// Frustum width in scene units.
    pub content_width: f64,
    /// Frustum height in scene units.
    pub content_height: f64,
    /// View offset in image orientation.
    pub view_offset: ViewOffset,
    /// View offset in display orientation.
    pub display_offset: ViewOffset,
    pub orientation: Orientation,
}

impl CameraState {
    /// Overlay size in screen pixels.
    #[must_use]
    pub fn screen_size(&self) -> (f64, f64) {
        (self.display_offset.width, self.display_offset.height)
    }
}

/// Directional light and its target, plus ambient intensity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightRig {
    pub position: Vec3,
    pub target: Vec3,
    pub color: Vec3,
    pub directional_intensity: f32,
    pub ambient_intensity: f32,
}

impl LightRig {
    /// Rig for `light` over the visible part of the image.
    ///
    /// The target sits at the center of the visible content and the light at
    /// `target + (dx, dy, 1)`, with `(dx, dy)` the control direction mapped
    /// into the image frame.
    #[must_use]
    pub fn derive(light: &LightState, frame: &ViewportFrame) -> Self {
        let direction = frame.orientation.screen_to_image(light.direction());
        let target = image_to_scene(
            frame.intersection.center(),
            frame.content_width,
            frame.content_height,
        );
        Self {
            position: target + Vec3::new(direction.x, direction.y, 1.0),
            target,
            color: Vec3::ONE,
            directional_intensity: light.directional_intensity,
            ambient_intensity: light.ambient_intensity,
        }
    }
}

impl ViewportFrame {
    /// View offset in image orientation.
    #[must_use]
    pub fn view_offset(&self) -> ViewOffset {
        let window = self.intersection.scaled(self.zoom);
        ViewOffset {
            full_width: self.content_width * self.zoom,
            full_height: self.content_height * self.zoom,
            x: window.x,
            y: window.y,
            width: window.width,
            height: window.height,
        }
    }

    #[must_use]
    pub fn camera(&self) -> CameraState {
        let view_offset = self.view_offset();
        CameraState {
            content_width: self.content_width,
            content_height: self.content_height,
            view_offset,
            display_offset: view_offset.oriented(self.orientation),
            orientation: self.orientation,
        }
    }
}

/// Compute the frame for a viewport. `None` iff the visible region does not
/// overlap the image.
#[must_use]
pub fn compute_frame(viewport: &ViewportState) -> Option<ViewportFrame> {
    let intersection = viewport.visible.intersection(&viewport.image_bounds())?;
    Some(ViewportFrame {
        intersection,
        zoom: viewport.zoom,
        content_width: viewport.content_width,
        content_height: viewport.content_height,
        rotation_degrees: viewport.rotation,
        orientation: viewport.orientation(),
    })
}

/// Map an image-pixel point to scene coordinates.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn image_to_scene(point: DVec2, content_width: f64, content_height: f64) -> Vec3 {
    Vec3::new(
        (point.x - content_width / 2.0) as f32,
        (content_height / 2.0 - point.y) as f32,
        0.0,
    )
}

/// Last valid frame of a session.
#[derive(Debug, Clone, Default)]
pub struct ViewportSync {
    last: Option<ViewportFrame>,
}

impl ViewportSync {
    /// Recompute from the host. Returns the new frame, or `None` when there is
    /// no intersection, in which case the previous frame is kept.
    pub fn update(&mut self, viewport: &ViewportState) -> Option<ViewportFrame> {
        let frame = compute_frame(viewport)?;
        self.last = Some(frame);
        Some(frame)
    }

    #[must_use]
    pub fn last(&self) -> Option<&ViewportFrame> {
        self.last.as_ref()
    }
}
