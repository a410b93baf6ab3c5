use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use geocoding::{GeocodeHit, Geocoder};
use shared::{
    domain::LayerId,
    error::{ErrorCode, ShellError, UserNotice},
    projection::resolution_from_zoom_level,
    protocol::PanelIntent,
};
use tracing::{info, warn};

pub mod entry;
pub mod hosts;
pub mod import;
pub mod layer_registry;
pub mod lifecycle;
pub mod plugin_loader;
pub mod plugin_registry;
pub mod project;

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

pub use entry::{classify_drop, parse_url_params, resolve_project_param, DropAction, LoaderPaths};
pub use hosts::{
    LayerObserver, Notifier, PanelHost, PluginFetcher, ProjectSummary, ScriptHost, ViewHost,
};
pub use import::{candidate_formats, import_text, FeatureFormat, FeatureReader};
pub use layer_registry::LayerRegistry;
pub use lifecycle::{LifecyclePhase, LoadStatus, ProjectLifecycle, ProjectSource};
pub use plugin_loader::PluginLoader;
pub use plugin_registry::{PendingLoadSet, PluginModule, PluginRegistry};
pub use project::{Project, ProjectBuilder, ProjectHandle};

/// Zoom level the view jumps to after a confirmed search hit.
pub const SEARCH_ZOOM_LEVEL: f64 = 15.0;

/// Collaborators a [`MapShell`] drives.
pub struct ShellHosts<V, P> {
    pub view: Arc<V>,
    pub panel: Arc<P>,
    pub notifier: Arc<dyn Notifier>,
    pub fetcher: Arc<dyn PluginFetcher>,
    pub scripts: Arc<dyn ScriptHost>,
    pub reader: Arc<dyn FeatureReader>,
}

/// The application shell: owns the registries and the project lifecycle, and
/// turns boot parameters, dropped files, panel intents and searches into
/// calls on them. Failures the user should see are raised through the
/// [`Notifier`].
#[derive(Clone)]
pub struct MapShell {
    lifecycle: ProjectLifecycle,
    view: Arc<dyn ViewHost>,
    notifier: Arc<dyn Notifier>,
    reader: Arc<dyn FeatureReader>,
    paths: LoaderPaths,
}

impl MapShell {
    pub fn new<V, P>(hosts: ShellHosts<V, P>, paths: LoaderPaths) -> Self
    where
        V: ViewHost + 'static,
        P: PanelHost + 'static,
    {
        let layers = Arc::new(LayerRegistry::with_observers(vec![
            hosts.view.clone() as Arc<dyn LayerObserver>,
            hosts.panel.clone() as Arc<dyn LayerObserver>,
        ]));
        let registry = Arc::new(PluginRegistry::new());
        let loader = PluginLoader::new(registry, hosts.fetcher, paths.plugin_base.clone());
        let view: Arc<dyn ViewHost> = hosts.view;
        let lifecycle = ProjectLifecycle::new(
            layers,
            loader,
            Arc::clone(&view),
            hosts.panel,
            hosts.scripts,
        );
        Self {
            lifecycle,
            view,
            notifier: hosts.notifier,
            reader: hosts.reader,
            paths,
        }
    }

    pub fn lifecycle(&self) -> &ProjectLifecycle {
        &self.lifecycle
    }

    pub fn layers(&self) -> &Arc<LayerRegistry> {
        self.lifecycle.layers()
    }

    pub fn plugins(&self) -> &Arc<PluginRegistry> {
        self.lifecycle.loader().registry()
    }

    pub fn paths(&self) -> &LoaderPaths {
        &self.paths
    }

    fn alert(&self, notice: UserNotice) {
        warn!(code = ?notice.code, message = %notice.message, "user notice");
        self.notifier.alert(&notice);
    }

    fn alert_load_failure(&self, err: &anyhow::Error) {
        match err.downcast_ref::<ShellError>() {
            Some(shell_err) => self.alert(shell_err.into()),
            None => self.alert(UserNotice::new(ErrorCode::LoadFailed, format!("{err:#}"))),
        }
    }

    /// Starts the application from the page URL: the `project` parameter
    /// names a project script, otherwise `default_project` is loaded.
    ///
    /// Returns `None` when nothing was loaded; the user has been alerted.
    pub async fn boot(&self, url: &str, default_project: Project) -> Option<LoadStatus> {
        let params = parse_url_params(url).unwrap_or_else(|err| {
            warn!(url, error = %err, "could not parse boot url; ignoring parameters");
            HashMap::new()
        });

        let source = match params.get(entry::PROJECT_PARAM) {
            Some(name) => match resolve_project_param(name, &self.paths) {
                Ok(script_url) => ProjectSource::Url(script_url),
                Err(err) => {
                    self.alert((&err).into());
                    return None;
                }
            },
            None => ProjectSource::Project(default_project),
        };
        info!(source = source.kind(), "booting");

        match self.lifecycle.load(source, None).await {
            Ok(status) => Some(status),
            Err(err) => {
                self.alert_load_failure(&err);
                None
            }
        }
    }

    pub async fn handle_drop(&self, files: Vec<PathBuf>) {
        match classify_drop(files) {
            DropAction::LoadProject(path) => {
                if let Err(err) = self.lifecycle.load(ProjectSource::File(path), None).await {
                    self.alert_load_failure(&err);
                }
            }
            DropAction::ImportLayers(paths) => {
                for path in paths {
                    self.import_layer_file(&path).await;
                }
            }
        }
    }

    /// Reads a vector data file into a new top-most layer and fits the view
    /// to it.
    pub async fn import_layer_file(&self, path: &Path) -> Option<LayerId> {
        if !self.lifecycle.has_project() {
            self.alert((&ShellError::NoProject).into());
            return None;
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(err) => {
                self.alert(UserNotice::new(
                    ErrorCode::LoadFailed,
                    format!("failed to read '{}': {err}", path.display()),
                ));
                return None;
            }
        };

        match import_text(self.reader.as_ref(), &file_name, &text) {
            Ok(spec) => {
                let id = self.layers().add(spec);
                self.view.fit_layer(id);
                Some(id)
            }
            Err(err) => {
                self.alert((&err).into());
                None
            }
        }
    }

    pub fn apply_intent(&self, intent: PanelIntent) -> Result<(), ShellError> {
        self.layers().apply_intent(intent).inspect_err(|err| {
            self.alert(err.into());
        })
    }

    /// Looks `query` up and, if the user agrees, centres the view on the
    /// first hit. Returns the hit the view jumped to.
    pub async fn search(&self, geocoder: &dyn Geocoder, query: &str) -> Option<GeocodeHit> {
        let hit = match geocoder.search(query).await {
            Ok(Some(hit)) => hit,
            Ok(None) => {
                self.alert(UserNotice::new(
                    ErrorCode::SearchFailed,
                    format!("No search results for '{query}'."),
                ));
                return None;
            }
            Err(err) => {
                self.alert(UserNotice::new(
                    ErrorCode::SearchFailed,
                    format!("Search failed: {err:#}"),
                ));
                return None;
            }
        };

        let question = format!(
            "Jump to {} ({}, {}) ?\n  Search result provided by Nominatim.",
            hit.display_name, hit.lon, hit.lat
        );
        if !self.notifier.confirm(&question) {
            return None;
        }
        self.view
            .center_on(hit.lon, hit.lat, resolution_from_zoom_level(SEARCH_ZOOM_LEVEL));
        Some(hit)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
