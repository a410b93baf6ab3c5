//! Seams to the collaborators the core drives but does not own: the map view,
//! the layer panel, user notifications and the script fetch/evaluate step.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use shared::{
    domain::{LayerId, PluginId},
    error::UserNotice,
    protocol::{LayerEvent, ViewConfig},
};

use crate::{plugin_registry::PluginRegistry, project::Project};

pub trait LayerObserver: Send + Sync {
    fn on_layer_event(&self, event: &LayerEvent);
}

/// Owner of the map canvas and viewport.
pub trait ViewHost: LayerObserver {
    fn apply_view(&self, view: &ViewConfig);
    fn fit_layer(&self, id: LayerId);
    fn center_on(&self, lon: f64, lat: f64, resolution: f64);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSummary {
    pub title: String,
    pub description: String,
    pub plugins: Vec<PluginId>,
}

/// The layer list panel.
pub trait PanelHost: LayerObserver {
    fn show_project(&self, summary: &ProjectSummary);
}

/// Blocking user notifications (alert / confirm dialogs).
pub trait Notifier: Send + Sync {
    fn alert(&self, notice: &UserNotice);
    fn confirm(&self, question: &str) -> bool;
}

/// Fetches a plugin's code and executes it. The executed plugin is expected to
/// call [`PluginRegistry::register`] with its own id once it has finished.
#[async_trait]
pub trait PluginFetcher: Send + Sync {
    async fn fetch_and_execute(
        &self,
        id: &PluginId,
        url: &str,
        registry: Arc<PluginRegistry>,
    ) -> anyhow::Result<()>;
}

/// Two-phase access to project scripts: fetch the raw text, then evaluate it
/// into a [`Project`] in a separate controlled step.
#[async_trait]
pub trait ScriptHost: Send + Sync {
    async fn fetch_script(&self, url: &str) -> anyhow::Result<String>;

    /// `origin` is the URL or the file path the text came from.
    fn evaluate(&self, origin: &str, text: &str) -> anyhow::Result<Project>;
}

pub(crate) fn origin_of(path: &Path) -> String {
    path.display().to_string()
}
