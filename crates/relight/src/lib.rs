//! Relighting overlay engine for deep-zoom image viewers.
//!
//! The engine keeps a GPU-rendered plane mesh in pixel-exact registration with
//! a host viewer that displays a tiled IIIF image. The mesh is textured with
//! the image's albedo map, shaded per pixel from its normal map, and lit by a
//! user-controlled directional light plus ambient light.
//!
//! The host viewer and the renderer are reached through traits:
//!
//! - [`HostViewer`]: viewport queries, overlay placement, event handler
//!   registration and the animation-frame loop
//! - [`RenderBackend`]: textures, geometry, materials, meshes, camera, lights
//! - [`LayerStore`]: the host's per-canvas layer visibility
//!
//! [`OverlayController`] is the composition root. It owns the activation state
//! machine and drives the [`TextureCache`], viewport synchronization and the
//! [`SceneManager`] from host events.
//!
//! Everything runs on one thread, inside host callbacks.

mod error;

pub mod backend;
pub mod config;
pub mod controller;
pub mod geometry;
pub mod host;
pub mod layers;
pub mod light;
pub mod normal_map;
pub mod scene;
pub mod texture_cache;
pub mod viewport;

#[cfg(test)]
mod test_support;

pub use backend::{MapKind, MaterialModel, MaterialParams, RenderBackend};
pub use config::RelightConfig;
pub use controller::{ActivationOutcome, ControllerState, OverlayController, Session};
pub use error::{Error, Result};
pub use geometry::{Orientation, Rect, Rotation};
pub use host::{
    FrameRequestId, HandlerId, HostEvent, HostEventKind, HostViewer, LoadedTile, OverlayId,
    TileImage, ViewportState,
};
pub use layers::{LayerState, LayerStore, LayerUpdate};
pub use light::{LightState, RenderMode};
pub use scene::SceneManager;
pub use texture_cache::{IngestOutcome, TextureCache};
pub use viewport::{CameraState, LightRig, ViewOffset, ViewportFrame, ViewportSync, compute_frame};

pub use relight_tiles as tiles;
