use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use shared::domain::{Epoch, LoadSetId, PluginId};
use tracing::{debug, info, warn};

/// Callback fired once when a load-set has no pending plugins left.
pub type Completion = Box<dyn FnOnce() + Send + 'static>;
pub type PluginInitHook = Box<dyn Fn() + Send + Sync + 'static>;

/// What a plugin hands over when it registers itself.
#[derive(Default)]
pub struct PluginModule {
    init: Option<PluginInitHook>,
}

impl PluginModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_init(init: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            init: Some(Box::new(init)),
        }
    }

    pub fn has_init(&self) -> bool {
        self.init.is_some()
    }
}

impl fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginModule")
            .field("has_init", &self.has_init())
            .finish()
    }
}

/// Snapshot of a load-set that is still waiting on plugins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLoadSet {
    pub id: LoadSetId,
    pub epoch: Option<Epoch>,
    pub pending: Vec<PluginId>,
}

pub(crate) struct OpenedLoadSet {
    pub id: LoadSetId,
    /// Ids the caller must fetch; every other pending id is already in flight.
    pub to_fetch: Vec<PluginId>,
    /// Handed back when nothing was pending so the caller fires it right away.
    pub immediate: Option<Completion>,
}

struct LoadSetEntry {
    id: LoadSetId,
    epoch: Option<Epoch>,
    pending: Vec<PluginId>,
    on_complete: Option<Completion>,
}

#[derive(Default)]
struct RegistryState {
    modules: HashMap<PluginId, Arc<PluginModule>>,
    in_flight: HashSet<PluginId>,
    load_sets: Vec<LoadSetEntry>,
    next_load_set: u64,
}

/// Session-wide record of loaded plugins and of the load-sets waiting on them.
///
/// Append-only: a plugin, once registered, stays loaded for the lifetime of the
/// registry. Completions run after the internal lock is released, so they may
/// call back into the registry or the loader.
#[derive(Default)]
pub struct PluginRegistry {
    state: Mutex<RegistryState>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_loaded(&self, id: &PluginId) -> bool {
        self.state().modules.contains_key(id)
    }

    pub fn loaded_ids(&self) -> Vec<PluginId> {
        let mut ids: Vec<_> = self.state().modules.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_in_flight(&self, id: &PluginId) -> bool {
        self.state().in_flight.contains(id)
    }

    pub fn pending_sets(&self) -> Vec<PendingLoadSet> {
        self.state()
            .load_sets
            .iter()
            .map(|set| PendingLoadSet {
                id: set.id,
                epoch: set.epoch,
                pending: set.pending.clone(),
            })
            .collect()
    }

    /// Records `module` under `id`, runs its init hook and satisfies `id` in
    /// every outstanding load-set.
    ///
    /// Registering the same id twice replaces the module and notifies again;
    /// load-sets that already completed are not invoked a second time.
    pub fn register(&self, id: impl Into<PluginId>, module: PluginModule) {
        let id = id.into();
        let module = Arc::new(module);
        let replaced = {
            let mut state = self.state();
            state.in_flight.remove(&id);
            state.modules.insert(id.clone(), Arc::clone(&module)).is_some()
        };
        if replaced {
            warn!(plugin = %id, "plugin registered twice; replacing module");
        }

        if let Some(init) = &module.init {
            init();
        }

        let completed = {
            let mut state = self.state();
            for set in &mut state.load_sets {
                set.pending.retain(|pending| pending != &id);
            }
            let (done, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.load_sets)
                .into_iter()
                .partition(|set| set.pending.is_empty());
            state.load_sets = waiting;
            done
        };
        info!(plugin = %id, completed_sets = completed.len(), "plugin registered");

        for mut set in completed {
            debug!(load_set = set.id.0, "plugin load-set complete");
            if let Some(on_complete) = set.on_complete.take() {
                on_complete();
            }
        }
    }

    /// Opens a load-set for the not-yet-loaded subset of `requested` and marks
    /// the ids nobody is fetching yet as in flight.
    pub(crate) fn open_load_set(
        &self,
        requested: &[PluginId],
        epoch: Option<Epoch>,
        on_complete: Completion,
    ) -> OpenedLoadSet {
        let mut state = self.state();
        let id = LoadSetId(state.next_load_set);
        state.next_load_set += 1;

        let mut pending: Vec<PluginId> = Vec::new();
        for plugin in requested {
            if !state.modules.contains_key(plugin) && !pending.contains(plugin) {
                pending.push(plugin.clone());
            }
        }

        if pending.is_empty() {
            return OpenedLoadSet {
                id,
                to_fetch: Vec::new(),
                immediate: Some(on_complete),
            };
        }

        let to_fetch: Vec<PluginId> = pending
            .iter()
            .filter(|plugin| state.in_flight.insert((*plugin).clone()))
            .cloned()
            .collect();

        state.load_sets.push(LoadSetEntry {
            id,
            epoch,
            pending,
            on_complete: Some(on_complete),
        });

        OpenedLoadSet {
            id,
            to_fetch,
            immediate: None,
        }
    }

    /// Releases the in-flight mark of a fetch that failed so a later load
    /// may try again.
    pub(crate) fn end_fetch(&self, id: &PluginId) {
        self.state().in_flight.remove(id);
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("PluginRegistry")
            .field("loaded", &state.modules.len())
            .field("in_flight", &state.in_flight.len())
            .field("pending_sets", &state.load_sets.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/plugin_registry_tests.rs"]
mod tests;
