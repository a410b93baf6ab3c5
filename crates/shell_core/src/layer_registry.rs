use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use shared::{
    domain::{BlendMode, Epoch, LayerId},
    error::ShellError,
    protocol::{clamp_opacity, Layer, LayerEvent, LayerSpec, PanelIntent},
};
use tracing::{debug, info};

use crate::hosts::LayerObserver;

struct LayerState {
    /// Render order: index 0 is drawn first (bottom-most).
    layers: Vec<Layer>,
    next_id: u64,
    /// Newest project load that cleared the stack. Survives [`LayerRegistry::clear`].
    owner: Option<Epoch>,
}

impl Default for LayerState {
    fn default() -> Self {
        Self {
            layers: Vec::new(),
            next_id: LayerId::FIRST.0,
            owner: None,
        }
    }
}

impl LayerState {
    fn push(&mut self, spec: LayerSpec) -> Layer {
        let id = LayerId(self.next_id);
        self.next_id += 1;
        let layer = Layer::from_spec(id, spec);
        self.layers.push(layer.clone());
        layer
    }

    fn reset(&mut self) {
        self.layers.clear();
        self.next_id = LayerId::FIRST.0;
    }
}

/// Ordered collection of the active project's layers.
///
/// Every mutation is applied under the internal lock and observers are
/// notified after it has been released. Mutating the registry from inside an
/// observer callback is allowed but the caller gets no ordering guarantee
/// relative to the notification that triggered it.
#[derive(Default)]
pub struct LayerRegistry {
    state: Mutex<LayerState>,
    observers: Mutex<Vec<Arc<dyn LayerObserver>>>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observers(observers: Vec<Arc<dyn LayerObserver>>) -> Self {
        Self {
            state: Mutex::default(),
            observers: Mutex::new(observers),
        }
    }

    pub fn subscribe(&self, observer: Arc<dyn LayerObserver>) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    fn state(&self) -> MutexGuard<'_, LayerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: LayerEvent) {
        let observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer.on_layer_event(&event);
        }
    }

    /// Appends a layer on top of the stack and returns its id.
    pub fn add(&self, spec: LayerSpec) -> LayerId {
        let layer = self.state().push(spec);
        self.announce_added(layer)
    }

    /// Adds on behalf of the project load `epoch`. Refused with `None` once a
    /// newer load has cleared the stack.
    pub(crate) fn add_for_load(&self, epoch: Epoch, spec: LayerSpec) -> Option<LayerId> {
        let layer = {
            let mut state = self.state();
            if state.owner != Some(epoch) {
                debug!(
                    epoch = epoch.0,
                    owner = ?state.owner.map(|owner| owner.0),
                    title = ?spec.title,
                    "layer from superseded project load dropped"
                );
                return None;
            }
            state.push(spec)
        };
        Some(self.announce_added(layer))
    }

    fn announce_added(&self, layer: Layer) -> LayerId {
        info!(layer = %layer.id, title = %layer.title, "layer added");
        let id = layer.id;
        self.notify(LayerEvent::Added(layer));
        id
    }

    /// Drops a layer from the stack. Ids are never handed out again before the
    /// next [`LayerRegistry::clear`].
    pub fn remove(&self, id: LayerId) -> Result<(), ShellError> {
        {
            let mut state = self.state();
            let index = state
                .layers
                .iter()
                .position(|layer| layer.id == id)
                .ok_or(ShellError::UnknownLayer { id })?;
            state.layers.remove(index);
        }
        info!(layer = %id, "layer removed");
        self.notify(LayerEvent::Removed(id));
        Ok(())
    }

    /// Replaces the order wholesale. `new_order` lists every current id
    /// exactly once, bottom-most first.
    pub fn reorder(&self, new_order: &[LayerId]) -> Result<(), ShellError> {
        {
            let mut state = self.state();
            validate_permutation(&state.layers, new_order)?;

            let unchanged = state
                .layers
                .iter()
                .map(|layer| layer.id)
                .eq(new_order.iter().copied());
            if unchanged {
                debug!("reorder with identical order ignored");
                return Ok(());
            }

            let mut previous = std::mem::take(&mut state.layers);
            for id in new_order {
                if let Some(index) = previous.iter().position(|layer| layer.id == *id) {
                    state.layers.push(previous.swap_remove(index));
                }
            }
        }
        debug!(order = ?new_order, "layers reordered");
        self.notify(LayerEvent::Reordered(new_order.to_vec()));
        Ok(())
    }

    /// Empties the stack and restarts the id sequence.
    pub fn clear(&self) {
        self.state().reset();
        debug!("layer registry cleared");
        self.notify(LayerEvent::Cleared);
    }

    /// Clears the stack for the project load `epoch`, which from then on is
    /// the only load whose adds are accepted. An older epoch changes nothing.
    pub(crate) fn clear_for_load(&self, epoch: Epoch) -> bool {
        {
            let mut state = self.state();
            if state.owner.is_some_and(|owner| owner > epoch) {
                debug!(epoch = epoch.0, "clear from superseded project load ignored");
                return false;
            }
            state.reset();
            state.owner = Some(epoch);
        }
        debug!(epoch = epoch.0, "layer registry cleared for project load");
        self.notify(LayerEvent::Cleared);
        true
    }

    pub fn set_opacity(&self, id: LayerId, opacity: f64) -> Result<(), ShellError> {
        self.update(id, |layer| layer.opacity = clamp_opacity(opacity))
            .map(drop)
    }

    pub fn set_visible(&self, id: LayerId, visible: bool) -> Result<(), ShellError> {
        self.update(id, |layer| layer.visible = visible).map(drop)
    }

    pub fn set_blend_mode(&self, id: LayerId, blend_mode: BlendMode) -> Result<(), ShellError> {
        self.update(id, |layer| layer.blend_mode = blend_mode)
            .map(drop)
    }

    pub fn toggle_blend_mode(&self, id: LayerId) -> Result<BlendMode, ShellError> {
        self.update(id, |layer| layer.blend_mode = layer.blend_mode.toggled())
            .map(|layer| layer.blend_mode)
    }

    fn update(&self, id: LayerId, apply: impl FnOnce(&mut Layer)) -> Result<Layer, ShellError> {
        let layer = {
            let mut state = self.state();
            let layer = state
                .layers
                .iter_mut()
                .find(|layer| layer.id == id)
                .ok_or(ShellError::UnknownLayer { id })?;
            apply(layer);
            layer.clone()
        };
        self.notify(LayerEvent::Updated(layer.clone()));
        Ok(layer)
    }

    /// Applies a user intent coming from the layer panel.
    pub fn apply_intent(&self, intent: PanelIntent) -> Result<(), ShellError> {
        match intent {
            PanelIntent::SetVisible { id, visible } => self.set_visible(id, visible),
            PanelIntent::SetOpacity { id, opacity } => self.set_opacity(id, opacity),
            PanelIntent::SetBlendMode { id, blend_mode } => self.set_blend_mode(id, blend_mode),
            PanelIntent::ToggleBlendMode { id } => self.toggle_blend_mode(id).map(drop),
            PanelIntent::Reorder { top_first } => {
                let bottom_first: Vec<LayerId> = top_first.into_iter().rev().collect();
                self.reorder(&bottom_first)
            }
            PanelIntent::Remove { id } => self.remove(id),
        }
    }

    /// Snapshot in render order, bottom-most first.
    pub fn layers(&self) -> Vec<Layer> {
        self.state().layers.clone()
    }

    pub fn ids(&self) -> Vec<LayerId> {
        self.state().layers.iter().map(|layer| layer.id).collect()
    }

    pub fn get(&self, id: LayerId) -> Option<Layer> {
        self.state()
            .layers
            .iter()
            .find(|layer| layer.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state().layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().layers.is_empty()
    }
}

impl fmt::Debug for LayerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("LayerRegistry")
            .field("layers", &state.layers.len())
            .field("next_id", &state.next_id)
            .finish()
    }
}

fn validate_permutation(layers: &[Layer], new_order: &[LayerId]) -> Result<(), ShellError> {
    if new_order.len() != layers.len() {
        return Err(ShellError::InvalidOrder {
            reason: format!(
                "expected {} layer ids, got {}",
                layers.len(),
                new_order.len()
            ),
        });
    }

    let mut seen = HashSet::with_capacity(new_order.len());
    for id in new_order {
        if !seen.insert(*id) {
            return Err(ShellError::InvalidOrder {
                reason: format!("layer {id} listed twice"),
            });
        }
        if !layers.iter().any(|layer| layer.id == *id) {
            return Err(ShellError::InvalidOrder {
                reason: format!("layer {id} is not in the registry"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/layer_registry_tests.rs"]
mod tests;
