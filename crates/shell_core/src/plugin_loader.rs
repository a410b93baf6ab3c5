use std::{fmt, sync::Arc};

use anyhow::Context;
use shared::domain::{Epoch, LoadSetId, PluginId};
use tokio::{runtime::Handle, sync::oneshot};
use tracing::{debug, warn};

use crate::{
    hosts::PluginFetcher,
    plugin_registry::{Completion, PluginRegistry},
};

/// Issues plugin fetches and tracks each request as one load-set.
///
/// Fetches run as tokio tasks on the current runtime; a fetch that fails or
/// whose plugin never registers leaves its load-set pending forever (there is
/// no timeout). A plugin stays in flight until it registers, so a late
/// registration is never fetched twice. Only a failed fetch may be retried.
#[derive(Clone)]
pub struct PluginLoader {
    registry: Arc<PluginRegistry>,
    fetcher: Arc<dyn PluginFetcher>,
    plugin_base: String,
}

impl PluginLoader {
    pub fn new(
        registry: Arc<PluginRegistry>,
        fetcher: Arc<dyn PluginFetcher>,
        plugin_base: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            fetcher,
            plugin_base: plugin_base.into(),
        }
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn plugin_url(&self, id: &PluginId) -> String {
        format!("{}{}", self.plugin_base, id)
    }

    /// Loads every id of `ids` that is not registered yet and calls
    /// `on_complete` once all of them have registered.
    ///
    /// With nothing left to load, `on_complete` runs before this returns.
    pub fn load(
        &self,
        ids: &[PluginId],
        on_complete: impl FnOnce() + Send + 'static,
    ) -> LoadSetId {
        self.load_with_epoch(ids, None, Box::new(on_complete))
    }

    pub(crate) fn load_with_epoch(
        &self,
        ids: &[PluginId],
        epoch: Option<Epoch>,
        on_complete: Completion,
    ) -> LoadSetId {
        let opened = self.registry.open_load_set(ids, epoch, on_complete);
        if let Some(on_complete) = opened.immediate {
            debug!(load_set = opened.id.0, "all requested plugins already loaded");
            on_complete();
            return opened.id;
        }

        debug!(
            load_set = opened.id.0,
            fetching = opened.to_fetch.len(),
            "opened plugin load-set"
        );
        for id in opened.to_fetch {
            self.spawn_fetch(id);
        }
        opened.id
    }

    /// Future flavour of [`PluginLoader::load`].
    pub async fn load_async(&self, ids: &[PluginId]) -> anyhow::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.load(ids, move || {
            let _ = tx.send(());
        });
        rx.await
            .context("plugin registry dropped before the load-set completed")
    }

    fn spawn_fetch(&self, id: PluginId) {
        let Ok(runtime) = Handle::try_current() else {
            warn!(plugin = %id, "no async runtime available; plugin fetch not started");
            self.registry.end_fetch(&id);
            return;
        };

        let url = self.plugin_url(&id);
        let registry = Arc::clone(&self.registry);
        let fetcher = Arc::clone(&self.fetcher);
        runtime.spawn(async move {
            debug!(plugin = %id, url = %url, "fetching plugin");
            match fetcher
                .fetch_and_execute(&id, &url, Arc::clone(&registry))
                .await
            {
                Ok(()) if !registry.is_loaded(&id) => {
                    warn!(plugin = %id, "plugin executed without registering itself yet");
                }
                Ok(()) => {}
                Err(err) => {
                    warn!(
                        plugin = %id,
                        error = %err,
                        "plugin fetch failed; dependent load-sets stay pending"
                    );
                    registry.end_fetch(&id);
                }
            }
        });
    }
}

impl fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginLoader")
            .field("registry", &self.registry)
            .field("plugin_base", &self.plugin_base)
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/plugin_loader_tests.rs"]
mod tests;
