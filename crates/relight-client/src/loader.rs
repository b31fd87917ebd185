//! Async loading of the manifest, `info.json` and tiles.
//!
//! Uses platform-agnostic `async_channel` for communication between async tasks
//! and the main thread. The spawn mechanism differs by platform:
//! - Native: `bevy-tokio-tasks` for Tokio runtime (reqwest requires it)
//! - WASM: Bevy's built-in `AsyncComputeTaskPool` (reqwest uses browser fetch)

use std::future::Future;

use bevy::prelude::*;
#[cfg(target_family = "wasm")]
use bevy::tasks::AsyncComputeTaskPool;
#[cfg(not(target_family = "wasm"))]
use bevy_tokio_tasks::TokioTasksRuntime;
use relight::TileImage;
use relight_tiles::manifest::canvas_resources_from_json;
use relight_tiles::{ImageInfo, ImageResource};

use crate::error::LoadError;
use crate::viewer::{TileRequest, display_resource};
use crate::{Relight, RelightSet};

/// Most tile fetches running at once.
pub const MAX_IN_FLIGHT: usize = 16;

/// Plugin for loading canvases and tiles.
pub struct LoaderPlugin;

impl Plugin for LoaderPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LoaderChannels>().add_systems(
            Update,
            (
                start_manifest_load,
                poll_manifest_task,
                poll_info_task,
                request_tiles,
                poll_tile_tasks,
            )
                .chain()
                .in_set(RelightSet::Load),
        );
    }
}

/// A canvas ready to open.
type LoadedCanvas = (Vec<ImageResource>, ImageInfo);

/// State for the loader.
#[derive(Resource)]
pub struct LoaderState {
    /// The HTTP client for fetching data.
    pub client: reqwest::Client,
    /// Presentation manifest to show.
    pub manifest_url: Option<String>,
    /// Canvas of the manifest to show.
    pub canvas_index: usize,
    reload: bool,
}

impl LoaderState {
    #[must_use]
    pub fn new(manifest_url: Option<String>, canvas_index: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            reload: manifest_url.is_some(),
            manifest_url,
            canvas_index,
        }
    }

    /// Load the manifest again on the next frame.
    pub fn request_reload(&mut self) {
        if self.manifest_url.is_some() {
            self.reload = true;
        }
    }

    /// Identifier of the loaded canvas.
    #[must_use]
    pub fn canvas_id(&self) -> Option<String> {
        self.manifest_url
            .as_ref()
            .map(|url| format!("{url}#canvas-{}", self.canvas_index))
    }
}

/// Channels for receiving loaded data from background tasks.
#[derive(Resource)]
pub struct LoaderChannels {
    manifest_rx: async_channel::Receiver<Result<Vec<ImageResource>, LoadError>>,
    manifest_tx: async_channel::Sender<Result<Vec<ImageResource>, LoadError>>,
    info_rx: async_channel::Receiver<Result<LoadedCanvas, LoadError>>,
    info_tx: async_channel::Sender<Result<LoadedCanvas, LoadError>>,
    tile_rx: async_channel::Receiver<(TileRequest, Result<TileImage, LoadError>)>,
    tile_tx: async_channel::Sender<(TileRequest, Result<TileImage, LoadError>)>,
}

impl Default for LoaderChannels {
    fn default() -> Self {
        let (manifest_tx, manifest_rx) = async_channel::bounded(1);
        let (info_tx, info_rx) = async_channel::bounded(1);
        let (tile_tx, tile_rx) = async_channel::unbounded();
        Self {
            manifest_rx,
            manifest_tx,
            info_rx,
            info_tx,
            tile_rx,
            tile_tx,
        }
    }
}

#[cfg(not(target_family = "wasm"))]
fn spawn_task<F>(runtime: &TokioTasksRuntime, task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    runtime.spawn_background_task(move |_ctx| task);
}

#[cfg(target_family = "wasm")]
fn spawn_task<F>(task: F)
where
    F: Future<Output = ()> + 'static,
{
    AsyncComputeTaskPool::get().spawn(task).detach();
}

/// `GET` a URL and return the body.
async fn fetch_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, LoadError> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}

/// Decode a JPEG or PNG tile into RGBA8.
pub fn decode_tile(bytes: &[u8]) -> Result<TileImage, LoadError> {
    let rgba = image::load_from_memory(bytes)?.into_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(TileImage::new(width, height, rgba.into_raw())?)
}

async fn fetch_tile(client: &reqwest::Client, url: &str) -> Result<TileImage, LoadError> {
    let bytes = fetch_bytes(client, url).await?;
    decode_tile(&bytes)
}

/// `info.json` URL of an image service.
#[must_use]
pub fn info_url(service_id: &str) -> String {
    format!("{}/info.json", service_id.trim_end_matches('/'))
}

/// Start loading the manifest when a load was requested.
#[allow(clippy::needless_pass_by_value)]
fn start_manifest_load(
    mut state: ResMut<LoaderState>,
    channels: Res<LoaderChannels>,
    #[cfg(not(target_family = "wasm"))] runtime: Res<TokioTasksRuntime>,
) {
    if !state.reload {
        return;
    }
    state.reload = false;
    let Some(url) = state.manifest_url.clone() else {
        return;
    };

    let client = state.client.clone();
    let index = state.canvas_index;
    let tx = channels.manifest_tx.clone();
    let task = async move {
        let result = match fetch_bytes(&client, &url).await {
            Ok(bytes) => canvas_resources_from_json(&bytes, index).map_err(LoadError::from),
            Err(e) => Err(e),
        };
        let _ = tx.send(result).await;
    };

    #[cfg(not(target_family = "wasm"))]
    spawn_task(&runtime, task);
    #[cfg(target_family = "wasm")]
    spawn_task(task);

    tracing::info!("Started loading manifest canvas {}", index);
}

/// Poll the manifest task and start loading the image service description.
#[allow(clippy::needless_pass_by_value)]
fn poll_manifest_task(
    state: Res<LoaderState>,
    channels: Res<LoaderChannels>,
    #[cfg(not(target_family = "wasm"))] runtime: Res<TokioTasksRuntime>,
) {
    let Ok(result) = channels.manifest_rx.try_recv() else {
        return;
    };

    let resources = match result {
        Ok(resources) => resources,
        Err(e) => {
            tracing::error!("Failed to load manifest: {}", e);
            return;
        }
    };
    tracing::info!("Loaded canvas with {} image resources", resources.len());

    let service = display_resource(&resources).and_then(|resource| resource.service_id.clone());
    let Some(service) = service else {
        tracing::error!("Failed to load canvas: {}", LoadError::NoImageService);
        return;
    };

    let client = state.client.clone();
    let tx = channels.info_tx.clone();
    let task = async move {
        let result = match fetch_bytes(&client, &info_url(&service)).await {
            Ok(bytes) => ImageInfo::from_json(&bytes)
                .map(|info| (resources, info))
                .map_err(LoadError::from),
            Err(e) => Err(e),
        };
        let _ = tx.send(result).await;
    };

    #[cfg(not(target_family = "wasm"))]
    spawn_task(&runtime, task);
    #[cfg(target_family = "wasm")]
    spawn_task(task);
}

/// Poll the `info.json` task and open the canvas.
#[allow(clippy::needless_pass_by_value)]
fn poll_info_task(
    state: Res<LoaderState>,
    channels: Res<LoaderChannels>,
    mut relight: ResMut<Relight>,
) {
    let Ok(result) = channels.info_rx.try_recv() else {
        return;
    };
    let (resources, info) = match result {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to load image info: {}", e);
            return;
        }
    };
    let Some(canvas_id) = state.canvas_id() else {
        return;
    };

    let Relight {
        controller,
        viewer,
        layers,
        backend,
    } = &mut *relight;
    if let Err(e) = viewer.open(&canvas_id, resources.clone(), info) {
        tracing::error!("Failed to open canvas {}: {}", canvas_id, e);
        return;
    }
    layers.init_canvas(&canvas_id, &resources);
    if controller.load_canvas(viewer, backend, layers, &canvas_id) {
        tracing::info!("Press T to toggle relighting");
    }
}

/// Start fetches for tiles the viewer wants.
#[allow(clippy::needless_pass_by_value)]
fn request_tiles(
    state: Res<LoaderState>,
    channels: Res<LoaderChannels>,
    mut relight: ResMut<Relight>,
    #[cfg(not(target_family = "wasm"))] runtime: Res<TokioTasksRuntime>,
) {
    for request in relight.viewer.next_requests(MAX_IN_FLIGHT) {
        let client = state.client.clone();
        let tx = channels.tile_tx.clone();
        let task = async move {
            let result = fetch_tile(&client, &request.url).await;
            let _ = tx.send((request, result)).await;
        };

        #[cfg(not(target_family = "wasm"))]
        spawn_task(&runtime, task);
        #[cfg(target_family = "wasm")]
        spawn_task(task);
    }
}

/// Hand finished tile fetches to the viewer.
#[allow(clippy::needless_pass_by_value)]
fn poll_tile_tasks(channels: Res<LoaderChannels>, mut relight: ResMut<Relight>) {
    while let Ok((request, result)) = channels.tile_rx.try_recv() {
        match result {
            Ok(image) => relight.viewer.tile_loaded(request, image),
            Err(e) => {
                tracing::warn!("Failed to load tile {}: {}", request.url, e);
                relight.viewer.tile_failed();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgba, RgbaImage};

    use super::*;

    #[test]
    fn decodes_png_to_rgba() {
        let source = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        source
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let tile = decode_tile(&bytes).unwrap();
        assert_eq!((tile.width(), tile.height()), (3, 2));
        assert_eq!(tile.pixels().len(), 3 * 2 * 4);
        assert_eq!(&tile.pixels()[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn garbage_is_an_image_error() {
        assert!(matches!(
            decode_tile(b"not an image"),
            Err(LoadError::Image(_))
        ));
    }

    #[test]
    fn info_url_has_one_separator() {
        assert_eq!(
            info_url("https://example.org/iiif/albedo/"),
            "https://example.org/iiif/albedo/info.json"
        );
        assert_eq!(
            info_url("https://example.org/iiif/albedo"),
            "https://example.org/iiif/albedo/info.json"
        );
    }

    #[test]
    fn canvas_id_names_manifest_and_index() {
        let state = LoaderState::new(Some("https://example.org/manifest.json".to_string()), 2);
        assert_eq!(
            state.canvas_id().as_deref(),
            Some("https://example.org/manifest.json#canvas-2")
        );
        assert!(LoaderState::new(None, 0).canvas_id().is_none());
    }

    #[test]
    fn reload_needs_a_manifest() {
        let mut state = LoaderState::new(None, 0);
        state.request_reload();
        assert!(!state.reload);

        let mut state = LoaderState::new(Some("https://example.org/m.json".to_string()), 0);
        assert!(state.reload);
        state.reload = false;
        state.request_reload();
        assert!(state.reload);
    }
}
