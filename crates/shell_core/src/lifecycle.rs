use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use anyhow::{bail, Context, Result};
use shared::{domain::Epoch, error::ShellError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::{
    hosts::{origin_of, PanelHost, ProjectSummary, ScriptHost, ViewHost},
    layer_registry::LayerRegistry,
    plugin_loader::PluginLoader,
    plugin_registry::Completion,
    project::{Project, ProjectHandle, ProjectInit},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Idle,
    /// Waiting on a remote script or a local file before there is a project.
    Fetching,
    Clearing,
    AwaitingPlugins,
    Initializing,
}

/// Where a project comes from.
pub enum ProjectSource {
    Project(Project),
    /// Remote project script, fetched then evaluated.
    Url(String),
    /// Local project script, read then evaluated.
    File(PathBuf),
    /// Declarative (JSON) definition. Not supported.
    Definition(serde_json::Value),
}

impl ProjectSource {
    pub fn kind(&self) -> &'static str {
        match self {
            ProjectSource::Project(_) => "project",
            ProjectSource::Url(_) => "url",
            ProjectSource::File(_) => "file",
            ProjectSource::Definition(_) => "definition",
        }
    }
}

impl fmt::Debug for ProjectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectSource::Project(project) => f.debug_tuple("Project").field(project).finish(),
            ProjectSource::Url(url) => f.debug_tuple("Url").field(url).finish(),
            ProjectSource::File(path) => f.debug_tuple("File").field(path).finish(),
            ProjectSource::Definition(_) => f.write_str("Definition(..)"),
        }
    }
}

/// What a load request did by the time the call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Init ran and the completions fired before returning.
    Completed(Epoch),
    /// Waiting on plugins; init runs when the load-set completes.
    AwaitingPlugins(Epoch),
    /// A newer request arrived before this one cleared the layer stack.
    Superseded(Epoch),
}

impl LoadStatus {
    pub fn epoch(self) -> Epoch {
        match self {
            LoadStatus::Completed(epoch)
            | LoadStatus::AwaitingPlugins(epoch)
            | LoadStatus::Superseded(epoch) => epoch,
        }
    }
}

struct DefaultCompletion {
    /// Load request that parked the callback here, if any.
    owner: Option<Epoch>,
    callback: Completion,
}

struct PendingScript {
    url: String,
    epoch: Epoch,
}

struct LifecycleState {
    epoch: Epoch,
    phase: LifecyclePhase,
    current: Option<ProjectSummary>,
    pending_script: Option<PendingScript>,
    default_completion: Option<DefaultCompletion>,
}

struct LifecycleInner {
    layers: Arc<LayerRegistry>,
    loader: PluginLoader,
    view: Arc<dyn ViewHost>,
    panel: Arc<dyn PanelHost>,
    scripts: Arc<dyn ScriptHost>,
    state: Mutex<LifecycleState>,
}

/// Runs "clear → wait for plugins → init → completion" for each load request.
///
/// Every request bumps the epoch. Work started for an older epoch (a plugin
/// load-set, a script fetch) is discarded when it resumes instead of touching
/// the current project.
#[derive(Clone)]
pub struct ProjectLifecycle {
    inner: Arc<LifecycleInner>,
}

impl ProjectLifecycle {
    pub fn new(
        layers: Arc<LayerRegistry>,
        loader: PluginLoader,
        view: Arc<dyn ViewHost>,
        panel: Arc<dyn PanelHost>,
        scripts: Arc<dyn ScriptHost>,
    ) -> Self {
        Self {
            inner: Arc::new(LifecycleInner {
                layers,
                loader,
                view,
                panel,
                scripts,
                state: Mutex::new(LifecycleState {
                    epoch: Epoch(0),
                    phase: LifecyclePhase::Idle,
                    current: None,
                    pending_script: None,
                    default_completion: None,
                }),
            }),
        }
    }

    pub fn layers(&self) -> &Arc<LayerRegistry> {
        &self.inner.layers
    }

    pub fn loader(&self) -> &PluginLoader {
        &self.inner.loader
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.inner.state().phase
    }

    pub fn epoch(&self) -> Epoch {
        self.inner.state().epoch
    }

    pub fn current_project(&self) -> Option<ProjectSummary> {
        self.inner.state().current.clone()
    }

    pub fn has_project(&self) -> bool {
        self.inner.state().current.is_some()
    }

    /// Parks a callback that fires after the next load completes, at most once.
    pub fn set_default_completion(&self, callback: impl FnOnce() + Send + 'static) {
        self.inner.state().default_completion = Some(DefaultCompletion {
            owner: None,
            callback: Box::new(callback),
        });
    }

    pub async fn load(
        &self,
        source: ProjectSource,
        on_loaded: Option<Completion>,
    ) -> Result<LoadStatus> {
        match source {
            ProjectSource::Project(project) => Ok(self.load_project(project, on_loaded)),
            ProjectSource::Url(url) => self.load_url(url, on_loaded).await,
            ProjectSource::File(path) => self.load_file(&path, on_loaded).await,
            ProjectSource::Definition(_) => Err(ShellError::UnsupportedProjectSource {
                kind: "definition".to_string(),
            }
            .into()),
        }
    }

    /// Loads and resolves once the project's init has run.
    ///
    /// Never resolves while a required plugin stays unregistered.
    pub async fn load_and_wait(&self, source: ProjectSource) -> Result<Epoch> {
        let (tx, rx) = oneshot::channel();
        let status = self
            .load(
                source,
                Some(Box::new(move || {
                    let _ = tx.send(());
                })),
            )
            .await?;
        if let LoadStatus::Superseded(epoch) = status {
            bail!("project load {} was superseded by a newer request", epoch.0);
        }
        rx.await
            .context("project load was superseded before it completed")?;
        Ok(status.epoch())
    }

    /// In-memory project: proceeds without suspending except for plugin fetches.
    pub fn load_project(&self, project: Project, on_loaded: Option<Completion>) -> LoadStatus {
        let epoch = self.inner.begin_request();
        LifecycleInner::start(&self.inner, project, epoch, on_loaded)
    }

    async fn load_url(&self, url: String, on_loaded: Option<Completion>) -> Result<LoadStatus> {
        let epoch = self.inner.begin_request();
        {
            let mut state = self.inner.state();
            if let Some(previous) = state.pending_script.replace(PendingScript {
                url: url.clone(),
                epoch,
            }) {
                debug!(url = %previous.url, "dropping pending project script");
            }
            state.phase = LifecyclePhase::Fetching;
            park_completion(&mut state, epoch, on_loaded);
        }
        info!(url = %url, epoch = epoch.0, "fetching project script");

        let fetched = self.inner.scripts.fetch_script(&url).await;
        let still_current = {
            let mut state = self.inner.state();
            let ours = state
                .pending_script
                .as_ref()
                .is_some_and(|pending| pending.epoch == epoch);
            if ours {
                state.pending_script = None;
            }
            ours && state.epoch == epoch
        };
        if !still_current {
            debug!(url = %url, epoch = epoch.0, "project script superseded; discarding");
            self.inner.drop_parked_completion(epoch);
            return Ok(LoadStatus::Superseded(epoch));
        }

        let text = match fetched {
            Ok(text) => text,
            Err(err) => {
                self.inner.abandon(epoch);
                return Err(err.context(format!("failed to fetch project script '{url}'")));
            }
        };
        self.evaluate_and_start(&url, &text, epoch)
    }

    async fn load_file(&self, path: &Path, on_loaded: Option<Completion>) -> Result<LoadStatus> {
        let epoch = self.inner.begin_request();
        {
            let mut state = self.inner.state();
            state.phase = LifecyclePhase::Fetching;
            park_completion(&mut state, epoch, on_loaded);
        }
        let origin = origin_of(path);
        info!(file = %origin, epoch = epoch.0, "reading project file");

        let read = tokio::fs::read_to_string(path).await;
        if self.inner.state().epoch != epoch {
            debug!(file = %origin, "project file superseded; discarding");
            self.inner.drop_parked_completion(epoch);
            return Ok(LoadStatus::Superseded(epoch));
        }

        let text = match read {
            Ok(text) => text,
            Err(err) => {
                self.inner.abandon(epoch);
                return Err(anyhow::Error::new(err)
                    .context(format!("failed to read project file '{origin}'")));
            }
        };
        self.evaluate_and_start(&origin, &text, epoch)
    }

    fn evaluate_and_start(&self, origin: &str, text: &str, epoch: Epoch) -> Result<LoadStatus> {
        let project = match self.inner.scripts.evaluate(origin, text) {
            Ok(project) => project,
            Err(err) => {
                self.inner.abandon(epoch);
                return Err(err.context(format!("project script '{origin}' failed to evaluate")));
            }
        };
        Ok(LifecycleInner::start(&self.inner, project, epoch, None))
    }
}

impl fmt::Debug for ProjectLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state();
        f.debug_struct("ProjectLifecycle")
            .field("epoch", &state.epoch)
            .field("phase", &state.phase)
            .field("current", &state.current)
            .finish()
    }
}

/// Stores a script request's completion in the default slot. Without one, a
/// callback installed with [`ProjectLifecycle::set_default_completion`] is
/// kept.
fn park_completion(state: &mut LifecycleState, epoch: Epoch, on_loaded: Option<Completion>) {
    if let Some(callback) = on_loaded {
        state.default_completion = Some(DefaultCompletion {
            owner: Some(epoch),
            callback,
        });
    }
}

impl LifecycleInner {
    fn state(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bumps the epoch. A completion parked by an older request goes with it.
    fn begin_request(&self) -> Epoch {
        let mut state = self.state();
        state.epoch = state.epoch.next();
        if state
            .default_completion
            .as_ref()
            .is_some_and(|parked| parked.owner.is_some())
        {
            debug!(epoch = state.epoch.0, "dropping completion of superseded load");
            state.default_completion = None;
        }
        debug!(epoch = state.epoch.0, "project load requested");
        state.epoch
    }

    /// A fetch or evaluation failed for `epoch`; go back to idle if nothing
    /// newer has started meanwhile.
    fn abandon(&self, epoch: Epoch) {
        let mut state = self.state();
        if state.epoch == epoch {
            state.phase = LifecyclePhase::Idle;
        }
        if state
            .default_completion
            .as_ref()
            .is_some_and(|parked| parked.owner == Some(epoch))
        {
            state.default_completion = None;
        }
        warn!(epoch = epoch.0, "project load abandoned");
    }

    fn drop_parked_completion(&self, epoch: Epoch) {
        let mut state = self.state();
        if state
            .default_completion
            .as_ref()
            .is_some_and(|parked| parked.owner == Some(epoch))
        {
            state.default_completion = None;
        }
    }

    fn start(
        this: &Arc<Self>,
        project: Project,
        epoch: Epoch,
        on_loaded: Option<Completion>,
    ) -> LoadStatus {
        let summary = project.summary();
        {
            let mut state = this.state();
            if state.epoch != epoch {
                debug!(
                    project = %summary.title,
                    epoch = epoch.0,
                    "project superseded before it was cleared in"
                );
                return LoadStatus::Superseded(epoch);
            }
            state.phase = LifecyclePhase::Clearing;
            state.current = Some(summary.clone());
        }
        info!(project = %summary.title, epoch = epoch.0, "loading project");

        if !this.layers.clear_for_load(epoch) {
            return LoadStatus::Superseded(epoch);
        }
        if let Some(view) = &project.view {
            this.view.apply_view(view);
        }
        this.panel.show_project(&summary);

        let Project { plugins, init, .. } = project;
        if plugins.is_empty() {
            return if this.initialize(epoch, init, on_loaded) {
                LoadStatus::Completed(epoch)
            } else {
                LoadStatus::Superseded(epoch)
            };
        }

        {
            let mut state = this.state();
            if state.epoch == epoch {
                state.phase = LifecyclePhase::AwaitingPlugins;
            }
        }
        let inner = Arc::clone(this);
        this.loader.load_with_epoch(
            &plugins,
            Some(epoch),
            Box::new(move || {
                inner.initialize(epoch, init, on_loaded);
            }),
        );

        let state = this.state();
        if state.epoch == epoch && state.phase == LifecyclePhase::Idle {
            LoadStatus::Completed(epoch)
        } else {
            LoadStatus::AwaitingPlugins(epoch)
        }
    }

    /// Runs init for `epoch` and then the completions. Returns false when the
    /// load turned out to be stale.
    fn initialize(
        &self,
        epoch: Epoch,
        init: Option<ProjectInit>,
        on_loaded: Option<Completion>,
    ) -> bool {
        {
            let mut state = self.state();
            if state.epoch != epoch {
                debug!(
                    epoch = epoch.0,
                    current = state.epoch.0,
                    "discarding stale project completion"
                );
                return false;
            }
            state.phase = LifecyclePhase::Initializing;
        }

        let mut handle = ProjectHandle::new(&self.layers, epoch);
        if let Some(init) = init {
            init(&mut handle);
        }
        let added = handle.into_added();
        info!(epoch = epoch.0, layers = added.len(), "project initialized");

        let parked = {
            let mut state = self.state();
            if state.epoch != epoch {
                debug!(
                    epoch = epoch.0,
                    current = state.epoch.0,
                    "project superseded during init; completions dropped"
                );
                return false;
            }
            state.phase = LifecyclePhase::Idle;
            let claimable = state
                .default_completion
                .as_ref()
                .is_some_and(|parked| !matches!(parked.owner, Some(owner) if owner != epoch));
            if claimable {
                state.default_completion.take()
            } else {
                None
            }
        };
        if let Some(on_loaded) = on_loaded {
            on_loaded();
        }
        if let Some(parked) = parked {
            (parked.callback)();
        }
        true
    }
}

#[cfg(test)]
#[path = "tests/lifecycle_tests.rs"]
mod tests;
