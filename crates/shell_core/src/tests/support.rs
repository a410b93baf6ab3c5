//! Test doubles shared by the unit tests of this crate.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{LayerId, PluginId},
    error::UserNotice,
    protocol::{LayerEvent, ViewConfig},
};

use crate::{
    hosts::{
        LayerObserver, Notifier, PanelHost, PluginFetcher, ProjectSummary, ScriptHost, ViewHost,
    },
    plugin_registry::{PluginModule, PluginRegistry},
    project::Project,
};

/// Lets spawned fetch tasks run to completion on the test runtime.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Records fetch requests and never registers anything, so tests decide when
/// (and in which order) plugins register.
#[derive(Default)]
pub struct RecordingFetcher {
    pub requests: Mutex<Vec<(PluginId, String)>>,
}

impl RecordingFetcher {
    pub fn requested(&self) -> Vec<PluginId> {
        self.requests
            .lock()
            .expect("requests")
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[async_trait]
impl PluginFetcher for RecordingFetcher {
    async fn fetch_and_execute(
        &self,
        id: &PluginId,
        url: &str,
        _registry: Arc<PluginRegistry>,
    ) -> Result<()> {
        self.requests
            .lock()
            .expect("requests")
            .push((id.clone(), url.to_string()));
        Ok(())
    }
}

/// Behaves like a well-formed plugin: registers itself once executed.
#[derive(Default)]
pub struct RegisteringFetcher {
    pub fetched: Mutex<Vec<PluginId>>,
}

#[async_trait]
impl PluginFetcher for RegisteringFetcher {
    async fn fetch_and_execute(
        &self,
        id: &PluginId,
        _url: &str,
        registry: Arc<PluginRegistry>,
    ) -> Result<()> {
        self.fetched.lock().expect("fetched").push(id.clone());
        tokio::task::yield_now().await;
        registry.register(id.clone(), PluginModule::new());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<LayerEvent>>,
    pub views: Mutex<Vec<ViewConfig>>,
    pub fitted: Mutex<Vec<LayerId>>,
    pub centers: Mutex<Vec<(f64, f64, f64)>>,
    pub projects: Mutex<Vec<ProjectSummary>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<LayerEvent> {
        self.events.lock().expect("events").clone()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().expect("events").len()
    }
}

impl LayerObserver for RecordingObserver {
    fn on_layer_event(&self, event: &LayerEvent) {
        self.events.lock().expect("events").push(event.clone());
    }
}

impl ViewHost for RecordingObserver {
    fn apply_view(&self, view: &ViewConfig) {
        self.views.lock().expect("views").push(view.clone());
    }

    fn fit_layer(&self, id: LayerId) {
        self.fitted.lock().expect("fitted").push(id);
    }

    fn center_on(&self, lon: f64, lat: f64, resolution: f64) {
        self.centers
            .lock()
            .expect("centers")
            .push((lon, lat, resolution));
    }
}

impl PanelHost for RecordingObserver {
    fn show_project(&self, summary: &ProjectSummary) {
        self.projects
            .lock()
            .expect("projects")
            .push(summary.clone());
    }
}

pub struct RecordingNotifier {
    pub alerts: Mutex<Vec<UserNotice>>,
    pub questions: Mutex<Vec<String>>,
    pub answer: bool,
}

impl RecordingNotifier {
    pub fn answering(answer: bool) -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
            questions: Mutex::new(Vec::new()),
            answer,
        }
    }

    pub fn alerts(&self) -> Vec<UserNotice> {
        self.alerts.lock().expect("alerts").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn alert(&self, notice: &UserNotice) {
        self.alerts.lock().expect("alerts").push(notice.clone());
    }

    fn confirm(&self, question: &str) -> bool {
        self.questions
            .lock()
            .expect("questions")
            .push(question.to_string());
        self.answer
    }
}

type ProjectFactory = Box<dyn Fn() -> Project + Send + Sync>;

/// Serves script text from memory and evaluates it by looking the text up in
/// a table of project factories.
#[derive(Default)]
pub struct MemoryScripts {
    pub scripts: Mutex<HashMap<String, String>>,
    pub factories: Mutex<HashMap<String, ProjectFactory>>,
    pub fetched: Mutex<Vec<String>>,
    pub gate: Mutex<Option<Arc<tokio::sync::Notify>>>,
}

impl MemoryScripts {
    pub fn with_script(
        self,
        url: &str,
        text: &str,
        factory: impl Fn() -> Project + Send + Sync + 'static,
    ) -> Self {
        self.scripts
            .lock()
            .expect("scripts")
            .insert(url.to_string(), text.to_string());
        self.factories
            .lock()
            .expect("factories")
            .insert(text.to_string(), Box::new(factory));
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().expect("fetched").clone()
    }
}

#[async_trait]
impl ScriptHost for MemoryScripts {
    async fn fetch_script(&self, url: &str) -> Result<String> {
        self.fetched.lock().expect("fetched").push(url.to_string());
        let gate = self.gate.lock().expect("gate").clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.scripts
            .lock()
            .expect("scripts")
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("404 for {url}"))
    }

    fn evaluate(&self, origin: &str, text: &str) -> Result<Project> {
        let factories = self.factories.lock().expect("factories");
        let factory = factories
            .get(text.trim())
            .ok_or_else(|| anyhow!("{origin} does not define a project"))?;
        Ok(factory())
    }
}
