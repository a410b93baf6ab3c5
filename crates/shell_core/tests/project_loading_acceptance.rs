use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::{LayerId, PluginId},
    error::UserNotice,
    protocol::{LayerEvent, LayerSpec, ViewConfig},
};
use shell_core::{
    FeatureFormat, FeatureReader, LayerObserver, LayerRegistry, LifecyclePhase, LoadStatus,
    LoaderPaths, MapShell, Notifier, PanelHost, PluginFetcher, PluginLoader, PluginModule,
    PluginRegistry, Project, ProjectLifecycle, ProjectSource, ProjectSummary, ScriptHost,
    ShellHosts, ViewHost,
};
use tokio::sync::oneshot;

/// Plugin "server": every known id registers itself after a short delay.
#[derive(Default)]
struct DelayedCatalog {
    fetches: Mutex<HashMap<PluginId, usize>>,
    init_runs: Arc<AtomicUsize>,
}

impl DelayedCatalog {
    fn fetch_count(&self, id: &str) -> usize {
        self.fetches
            .lock()
            .expect("fetches")
            .get(&PluginId::from(id))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl PluginFetcher for DelayedCatalog {
    async fn fetch_and_execute(
        &self,
        id: &PluginId,
        _url: &str,
        registry: Arc<PluginRegistry>,
    ) -> Result<()> {
        *self
            .fetches
            .lock()
            .expect("fetches")
            .entry(id.clone())
            .or_default() += 1;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let runs = Arc::clone(&self.init_runs);
        registry.register(
            id.clone(),
            PluginModule::with_init(move || {
                runs.fetch_add(1, Ordering::SeqCst);
            }),
        );
        Ok(())
    }
}

#[derive(Default)]
struct Screen {
    events: Mutex<Vec<LayerEvent>>,
    alerts: Mutex<Vec<UserNotice>>,
}

impl LayerObserver for Screen {
    fn on_layer_event(&self, event: &LayerEvent) {
        self.events.lock().expect("events").push(event.clone());
    }
}

impl ViewHost for Screen {
    fn apply_view(&self, _view: &ViewConfig) {}
    fn fit_layer(&self, _id: LayerId) {}
    fn center_on(&self, _lon: f64, _lat: f64, _resolution: f64) {}
}

impl PanelHost for Screen {
    fn show_project(&self, _summary: &ProjectSummary) {}
}

impl Notifier for Screen {
    fn alert(&self, notice: &UserNotice) {
        self.alerts.lock().expect("alerts").push(notice.clone());
    }

    fn confirm(&self, _question: &str) -> bool {
        false
    }
}

struct NoScripts;

#[async_trait]
impl ScriptHost for NoScripts {
    async fn fetch_script(&self, url: &str) -> Result<String> {
        Err(anyhow!("no script at {url}"))
    }

    fn evaluate(&self, origin: &str, _text: &str) -> Result<Project> {
        Err(anyhow!("cannot evaluate {origin}"))
    }
}

struct NoFeatures;

impl FeatureReader for NoFeatures {
    fn read_features(&self, _format: FeatureFormat, _text: &str) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }
}

fn project(title: &str, plugins: &[&str], layers: &[&'static str]) -> Project {
    let layers = layers.to_vec();
    Project::builder(title)
        .plugins(plugins.iter().copied())
        .init(move |handle| {
            handle.add_layers(layers.into_iter().map(LayerSpec::titled));
        })
        .build()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn superseded_project_never_initializes_and_plugins_are_fetched_once() {
    let catalog = Arc::new(DelayedCatalog::default());
    let screen = Arc::new(Screen::default());
    let layers = Arc::new(LayerRegistry::with_observers(vec![
        screen.clone() as Arc<dyn LayerObserver>
    ]));
    let registry = Arc::new(PluginRegistry::new());
    let loader = PluginLoader::new(Arc::clone(&registry), catalog.clone(), "plugins/");
    let lifecycle = ProjectLifecycle::new(
        Arc::clone(&layers),
        loader,
        screen.clone(),
        screen.clone(),
        Arc::new(NoScripts),
    );

    let (old_tx, old_rx) = oneshot::channel::<()>();
    let first = lifecycle.load_project(
        project("old", &["source/gsitiles.js"], &["old std"]),
        Some(Box::new(move || {
            let _ = old_tx.send(());
        })),
    );
    assert!(matches!(first, LoadStatus::AwaitingPlugins(_)));

    let second = tokio::time::timeout(
        Duration::from_secs(5),
        lifecycle.load_and_wait(ProjectSource::Project(project(
            "new",
            &["source/gsitiles.js", "source/naturalearth.js"],
            &["std", "coastline"],
        ))),
    )
    .await
    .expect("second project loads in time")
    .expect("second project loads");

    assert!(second > first.epoch());
    assert!(old_rx.await.is_err(), "stale completion must be dropped");
    let titles: Vec<String> = layers.layers().into_iter().map(|l| l.title).collect();
    assert_eq!(titles, vec!["std", "coastline"]);
    assert_eq!(layers.ids(), vec![LayerId(0), LayerId(1)]);
    assert_eq!(catalog.fetch_count("source/gsitiles.js"), 1);
    assert_eq!(catalog.fetch_count("source/naturalearth.js"), 1);
    assert_eq!(catalog.init_runs.load(Ordering::SeqCst), 2);
    assert_eq!(lifecycle.phase(), LifecyclePhase::Idle);
    assert!(registry.pending_sets().is_empty());
}

#[tokio::test]
async fn booted_shell_reaches_idle_once_plugins_register() {
    let screen = Arc::new(Screen::default());
    let shell = MapShell::new(
        ShellHosts {
            view: screen.clone(),
            panel: screen.clone(),
            notifier: screen.clone(),
            fetcher: Arc::new(DelayedCatalog::default()),
            scripts: Arc::new(NoScripts),
            reader: Arc::new(NoFeatures),
        },
        LoaderPaths::default(),
    );
    let (tx, rx) = oneshot::channel();
    shell.lifecycle().set_default_completion(move || {
        let _ = tx.send(());
    });

    let status = shell
        .boot(
            "http://localhost/index.html",
            project("Default project", &["source/gsitiles.js"], &["std"]),
        )
        .await;
    assert!(matches!(status, Some(LoadStatus::AwaitingPlugins(_))));
    assert!(shell.layers().is_empty());

    tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("default completion in time")
        .expect("default completion fired");

    assert_eq!(shell.layers().len(), 1);
    assert!(shell.plugins().is_loaded(&PluginId::from("source/gsitiles.js")));
    assert!(screen.alerts.lock().expect("alerts").is_empty());
    assert!(screen
        .events
        .lock()
        .expect("events")
        .iter()
        .any(|event| matches!(event, LayerEvent::Added(layer) if layer.title == "std")));
}
