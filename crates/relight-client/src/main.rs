//! Reference viewer for the relight overlay.
//!
//! Shows one canvas of a IIIF presentation manifest in a small deep-zoom
//! viewer and drives the relight engine against it.
//!
//! ```text
//! relight-client <manifest-url> [canvas-index]
//! ```
//!
//! `RELIGHT_CONFIG` may name a JSON file with engine configuration.

mod controls;
mod error;
mod loader;
mod render;
mod viewer;

use bevy::prelude::*;
#[cfg(not(target_family = "wasm"))]
use bevy_tokio_tasks::TokioTasksPlugin;
use relight::{OverlayController, RelightConfig};

use crate::controls::ControlsPlugin;
use crate::error::LoadError;
use crate::loader::{LoaderPlugin, LoaderState};
use crate::render::{BevyBackend, RelightRenderPlugin};
use crate::viewer::{DeepZoomViewer, ViewerLayers, ViewerPlugin};

/// Distance of both cameras from the image plane.
pub const CAMERA_DISTANCE: f32 = 1_000.0;

/// Ordering of the per-frame work.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelightSet {
    /// Keyboard and mouse.
    Input,
    /// Finished fetches.
    Load,
    /// Host events and the engine's animation frame.
    Host,
    /// Bevy entities from recorded render operations.
    Render,
}

/// The engine together with its host, layer store and backend.
#[derive(Resource)]
pub struct Relight {
    pub controller: OverlayController<BevyBackend>,
    pub viewer: DeepZoomViewer,
    pub layers: ViewerLayers,
    pub backend: BevyBackend,
}

impl Relight {
    #[must_use]
    pub fn new(config: RelightConfig) -> Self {
        Self {
            viewer: DeepZoomViewer::new(&config),
            controller: OverlayController::new(config),
            layers: ViewerLayers::default(),
            backend: BevyBackend::default(),
        }
    }
}

/// Command-line arguments.
#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    manifest_url: Option<String>,
    canvas_index: usize,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Self {
        let manifest_url = args
            .next()
            .or_else(|| option_env!("RELIGHT_MANIFEST").map(str::to_string));
        let canvas_index = match args.next().map(|value| value.parse::<usize>()) {
            Some(Ok(index)) => index,
            Some(Err(e)) => {
                tracing::warn!("Invalid canvas index, using 0: {}", e);
                0
            }
            None => 0,
        };
        Self {
            manifest_url,
            canvas_index,
        }
    }
}

fn read_config(path: &str) -> Result<RelightConfig, LoadError> {
    let bytes = std::fs::read(path)?;
    Ok(RelightConfig::from_json(&bytes)?)
}

/// Configuration from the file named by `RELIGHT_CONFIG`, or the defaults.
fn load_config() -> RelightConfig {
    let Ok(path) = std::env::var("RELIGHT_CONFIG") else {
        return RelightConfig::default();
    };
    match read_config(&path) {
        Ok(config) => {
            tracing::info!("Loaded config from {}", path);
            config
        }
        Err(e) => {
            tracing::error!("Failed to load config {}: {}", path, e);
            RelightConfig::default()
        }
    }
}

fn main() {
    #[cfg(target_family = "wasm")]
    {
        console_error_panic_hook::set_once();
        tracing_wasm::set_as_global_default();
    }
    #[cfg(not(target_family = "wasm"))]
    tracing_subscriber::fmt::init();

    let args = Args::parse(std::env::args().skip(1));
    if args.manifest_url.is_none() {
        tracing::warn!("No manifest URL given. Usage: relight-client <manifest-url> [index]");
    }
    let config = load_config();

    let mut app = App::new();
    app.add_plugins(DefaultPlugins.set(WindowPlugin {
        primary_window: Some(Window {
            title: "Relight".to_string(),
            ..default()
        }),
        ..default()
    }));
    #[cfg(not(target_family = "wasm"))]
    app.add_plugins(TokioTasksPlugin::default());

    app.insert_resource(ClearColor(Color::BLACK))
        .insert_resource(Relight::new(config))
        .insert_resource(LoaderState::new(args.manifest_url, args.canvas_index))
        .configure_sets(
            Update,
            (
                RelightSet::Input,
                RelightSet::Load,
                RelightSet::Host,
                RelightSet::Render,
            )
                .chain(),
        )
        .add_plugins((
            ViewerPlugin,
            LoaderPlugin,
            ControlsPlugin,
            RelightRenderPlugin,
        ))
        .run();
}
