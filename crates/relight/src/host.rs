//! The host viewer seam.
//!
//! The host is a deep-zoom viewer that owns tile fetching, the viewport and
//! its own event loop. The engine only reaches it through [`HostViewer`] and
//! only hears from it through [`HostEvent`]s that the host forwards to
//! [`crate::OverlayController::handle_event`] for kinds the controller has
//! registered.

use std::sync::Arc;

use relight_tiles::{ImageInfo, ImageResource};

use crate::error::{Error, Result};
use crate::geometry::{Orientation, Rect, Rotation};

/// Id of a registered event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u64);

/// Id of an overlay surface added to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverlayId(pub u64);

/// Id of a pending animation-frame request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequestId(pub u64);

/// Event kinds the controller subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HostEventKind {
    ViewportChange,
    Rotate,
    Flip,
    Resize,
    Close,
    TileLoaded,
    TileDrawn,
}

impl HostEventKind {
    /// Every kind, in registration order.
    pub const ALL: [Self; 7] = [
        Self::ViewportChange,
        Self::Rotate,
        Self::Flip,
        Self::Resize,
        Self::Close,
        Self::TileLoaded,
        Self::TileDrawn,
    ];
}

/// An event forwarded by the host.
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// A tile image finished loading.
    TileLoaded(LoadedTile),
    /// The host drew a tile of `level`.
    TileDrawn { level: u32 },
    /// Pan or zoom changed.
    ViewportChange,
    /// Display rotation changed.
    Rotate { degrees: f64 },
    /// Horizontal mirroring changed.
    Flip { flipped: bool },
    /// The viewer container was resized.
    Resize,
    /// The host closed the image.
    Close,
}

impl HostEvent {
    #[must_use]
    pub fn kind(&self) -> HostEventKind {
        match self {
            Self::TileLoaded(_) => HostEventKind::TileLoaded,
            Self::TileDrawn { .. } => HostEventKind::TileDrawn,
            Self::ViewportChange => HostEventKind::ViewportChange,
            Self::Rotate { .. } => HostEventKind::Rotate,
            Self::Flip { .. } => HostEventKind::Flip,
            Self::Resize => HostEventKind::Resize,
            Self::Close => HostEventKind::Close,
        }
    }
}

/// Decoded RGBA8 tile pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TileImage {
    /// Wrap RGBA8 pixels, checking the buffer length.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = (width as usize) * (height as usize) * 4;
        if pixels.len() != expected {
            return Err(Error::InvalidImage {
                width,
                height,
                len: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// RGBA8 pixels, row-major.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[must_use]
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Same dimensions with the pixels rewritten by a length-preserving map.
    pub(crate) fn map_pixels(&self, map: impl FnOnce(&[u8]) -> Vec<u8>) -> Self {
        let pixels = map(&self.pixels);
        debug_assert_eq!(pixels.len(), self.pixels.len());
        Self {
            width: self.width,
            height: self.height,
            pixels,
        }
    }
}

/// A tile the host has loaded.
#[derive(Debug, Clone)]
pub struct LoadedTile {
    /// Request URL the tile was loaded from.
    pub url: String,
    /// Pyramid level of the tile.
    pub level: u32,
    pub image: Arc<TileImage>,
}

/// Snapshot of the host viewport, in full-resolution image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    /// Visible region, unrotated. May extend past the image.
    pub visible: Rect,
    /// Image width.
    pub content_width: f64,
    /// Image height.
    pub content_height: f64,
    /// Screen pixels per image pixel.
    pub zoom: f64,
    /// Clockwise display rotation in degrees.
    pub rotation: f64,
    /// Whether the display is mirrored horizontally.
    pub flipped: bool,
}

impl ViewportState {
    /// Image bounds.
    #[must_use]
    pub fn image_bounds(&self) -> Rect {
        Rect::from_size(self.content_width, self.content_height)
    }

    #[must_use]
    pub fn orientation(&self) -> Orientation {
        Orientation::new(Rotation::from_degrees(self.rotation), self.flipped)
    }
}

/// Operations the engine needs from the host viewer.
pub trait HostViewer {
    /// Current viewport.
    fn viewport(&self) -> ViewportState;

    /// Image resources of the current canvas.
    fn canvas_resources(&self) -> Vec<ImageResource>;

    /// Image metadata of the displayed tile source.
    fn tile_source(&self) -> Option<ImageInfo>;

    /// Tiles the host already holds.
    fn loaded_tiles(&self) -> Vec<LoadedTile>;

    /// Pyramid level the host is displaying, if it has picked one.
    fn current_level(&self) -> Option<u32>;

    fn add_overlay(&mut self) -> OverlayId;

    fn remove_overlay(&mut self, id: OverlayId);

    /// Place the overlay over `bounds` (image pixels, unrotated).
    fn update_overlay(&mut self, id: OverlayId, bounds: Rect);

    /// Redraw the host so a new overlay shows without waiting for input.
    fn force_redraw(&mut self);

    /// Start forwarding events of `kind`.
    fn add_handler(&mut self, kind: HostEventKind) -> HandlerId;

    fn remove_handler(&mut self, id: HandlerId);

    /// Ask for [`crate::OverlayController::on_animation_frame`] on the next frame.
    fn request_animation_frame(&mut self) -> FrameRequestId;

    fn cancel_animation_frame(&mut self, id: FrameRequestId);
}
