//! Host layer visibility.
//!
//! The host shows each image resource of a canvas as a layer. While the
//! relight overlay is available, some of those layers are hidden: depth and
//! shaded maps as soon as the canvas loads, the composite while the overlay is
//! active.

use std::collections::BTreeMap;

use relight_tiles::MapType;
use serde::{Deserialize, Serialize};

/// Visibility and stacking index of one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LayerState {
    pub visibility: bool,
    pub index: usize,
}

/// Layer id to new state.
pub type LayerUpdate = BTreeMap<String, LayerState>;

/// The host's per-canvas layer store.
pub trait LayerStore {
    /// Current layer states of a canvas.
    fn layers(&self, canvas_id: &str) -> BTreeMap<String, LayerState>;

    /// Apply an update to a canvas.
    fn update_layers(&mut self, canvas_id: &str, update: LayerUpdate);
}

/// Build an update that sets `visibility` on every layer whose map type is in
/// `map_types`. Stacking indices come from `current`, or from the layer's
/// position in `layer_types` when the store does not know it yet.
#[must_use]
pub fn visibility_update(
    layer_types: &BTreeMap<String, MapType>,
    current: &BTreeMap<String, LayerState>,
    map_types: &[MapType],
    visibility: bool,
) -> LayerUpdate {
    layer_types
        .iter()
        .enumerate()
        .filter(|(_, (_, map_type))| map_types.contains(map_type))
        .map(|(position, (id, _))| {
            let index = current.get(id).map_or(position, |state| state.index);
            (id.clone(), LayerState { visibility, index })
        })
        .collect()
}

/// Apply [`visibility_update`] to a store. Returns the number of layers changed.
pub fn set_visibility(
    store: &mut impl LayerStore,
    canvas_id: &str,
    layer_types: &BTreeMap<String, MapType>,
    map_types: &[MapType],
    visibility: bool,
) -> usize {
    let update = visibility_update(
        layer_types,
        &store.layers(canvas_id),
        map_types,
        visibility,
    );
    let count = update.len();
    if count > 0 {
        tracing::debug!(
            "Setting visibility={} on {} layers of {}",
            visibility,
            count,
            canvas_id
        );
        store.update_layers(canvas_id, update);
    }
    count
}
