//! Rectangles and display orientation.
//!
//! Image-space coordinates are full-resolution pixels with `y` pointing down.
//! The display shows the image rotated clockwise by a multiple of 90 degrees
//! and then, optionally, mirrored horizontally.

use glam::{DVec2, Vec2};
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in pixels, `y` down.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle at the origin.
    #[must_use]
    pub const fn from_size(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    #[must_use]
    pub fn origin(&self) -> DVec2 {
        DVec2::new(self.x, self.y)
    }

    #[must_use]
    pub fn size(&self) -> DVec2 {
        DVec2::new(self.width, self.height)
    }

    #[must_use]
    pub fn center(&self) -> DVec2 {
        DVec2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    #[must_use]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Whether the rectangle has zero or negative area.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Overlap of two rectangles, or `None` when it has no area.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let width = self.right().min(other.right()) - x;
        let height = self.bottom().min(other.bottom()) - y;
        let rect = Self::new(x, y, width, height);
        (!rect.is_empty()).then_some(rect)
    }

    /// Scale every component.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }
}

/// Clockwise display rotation, bucketed to quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Bucket an arbitrary angle to the nearest quarter turn.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_degrees(degrees: f64) -> Self {
        if !degrees.is_finite() {
            return Self::Deg0;
        }
        let turns = (degrees.rem_euclid(360.0) / 90.0).round() as i64;
        match turns.rem_euclid(4) {
            1 => Self::Deg90,
            2 => Self::Deg180,
            3 => Self::Deg270,
            _ => Self::Deg0,
        }
    }

    #[must_use]
    pub fn degrees(self) -> u32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Rotation by a further quarter turn clockwise.
    #[must_use]
    pub fn rotated_cw(self) -> Self {
        match self {
            Self::Deg0 => Self::Deg90,
            Self::Deg90 => Self::Deg180,
            Self::Deg180 => Self::Deg270,
            Self::Deg270 => Self::Deg0,
        }
    }

    /// Whether width and height swap on screen.
    #[must_use]
    pub fn is_transposed(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

/// Display orientation of the image: rotation followed by an optional mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub rotation: Rotation,
    pub flipped: bool,
}

impl Orientation {
    #[must_use]
    pub const fn new(rotation: Rotation, flipped: bool) -> Self {
        Self { rotation, flipped }
    }

    /// Size of a `width` x `height` image on screen.
    #[must_use]
    pub fn display_size(&self, width: f64, height: f64) -> (f64, f64) {
        if self.rotation.is_transposed() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Map a rectangle of a `width` x `height` image to display space.
    #[must_use]
    pub fn map_rect(&self, rect: &Rect, width: f64, height: f64) -> Rect {
        let rotated = match self.rotation {
            Rotation::Deg0 => *rect,
            Rotation::Deg90 => Rect::new(height - rect.bottom(), rect.x, rect.height, rect.width),
            Rotation::Deg180 => Rect::new(
                width - rect.right(),
                height - rect.bottom(),
                rect.width,
                rect.height,
            ),
            Rotation::Deg270 => Rect::new(rect.y, width - rect.right(), rect.height, rect.width),
        };
        if self.flipped {
            let (display_width, _) = self.display_size(width, height);
            Rect::new(
                display_width - rotated.right(),
                rotated.y,
                rotated.width,
                rotated.height,
            )
        } else {
            rotated
        }
    }

    /// Map a `y`-up screen direction into the image frame.
    #[must_use]
    pub fn screen_to_image(&self, direction: Vec2) -> Vec2 {
        let x = if self.flipped { -direction.x } else { direction.x };
        let y = direction.y;
        match self.rotation {
            Rotation::Deg0 => Vec2::new(x, y),
            Rotation::Deg90 => Vec2::new(-y, x),
            Rotation::Deg180 => Vec2::new(-x, -y),
            Rotation::Deg270 => Vec2::new(y, -x),
        }
    }

    /// Inverse of [`Self::screen_to_image`].
    #[must_use]
    pub fn image_to_screen(&self, direction: Vec2) -> Vec2 {
        let Vec2 { x, y } = direction;
        let unrotated = match self.rotation {
            Rotation::Deg0 => Vec2::new(x, y),
            Rotation::Deg90 => Vec2::new(y, -x),
            Rotation::Deg180 => Vec2::new(-x, -y),
            Rotation::Deg270 => Vec2::new(-y, x),
        };
        if self.flipped {
            Vec2::new(-unrotated.x, unrotated.y)
        } else {
            unrotated
        }
    }
}
