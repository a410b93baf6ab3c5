use super::*;

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    plugin_registry::PluginModule,
    test_support::{settle, RecordingFetcher, RegisteringFetcher},
};

fn ids(raw: &[&str]) -> Vec<PluginId> {
    raw.iter().map(|id| PluginId::from(*id)).collect()
}

fn loader_with(fetcher: Arc<dyn PluginFetcher>) -> PluginLoader {
    PluginLoader::new(Arc::new(PluginRegistry::new()), fetcher, "plugins/")
}

fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = Arc::clone(&count);
    (count, move || {
        inner.fetch_add(1, Ordering::SeqCst);
    })
}

#[tokio::test]
async fn empty_request_completes_without_any_register() {
    let fetcher = Arc::new(RecordingFetcher::default());
    let loader = loader_with(fetcher.clone());
    let (fired, on_complete) = counter();

    loader.load(&[], on_complete);

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    settle().await;
    assert!(fetcher.requested().is_empty());
    assert!(loader.registry().pending_sets().is_empty());
}

#[tokio::test]
async fn already_loaded_plugins_are_not_fetched_again() {
    let fetcher = Arc::new(RecordingFetcher::default());
    let loader = loader_with(fetcher.clone());
    loader.registry().register("a", PluginModule::new());
    let (fired, on_complete) = counter();

    loader.load(&ids(&["a"]), on_complete);
    settle().await;

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(fetcher.requested().is_empty());
}

#[tokio::test]
async fn fetches_use_the_plugin_base_path() {
    let fetcher = Arc::new(RecordingFetcher::default());
    let loader = loader_with(fetcher.clone());

    loader.load(&ids(&["source/gsitiles.js"]), || {});
    settle().await;

    let requests = fetcher.requests.lock().expect("requests").clone();
    assert_eq!(
        requests,
        vec![(
            PluginId::from("source/gsitiles.js"),
            "plugins/source/gsitiles.js".to_string()
        )]
    );
}

#[tokio::test]
async fn overlapping_sets_complete_independently() {
    let fetcher = Arc::new(RecordingFetcher::default());
    let loader = loader_with(fetcher.clone());
    let (first, first_done) = counter();
    let (second, second_done) = counter();

    loader.load(&ids(&["A", "B"]), first_done);
    loader.load(&ids(&["B", "C"]), second_done);
    settle().await;

    let mut requested = fetcher.requested();
    requested.sort();
    assert_eq!(requested, ids(&["A", "B", "C"]), "B must be fetched once");

    let registry = loader.registry();
    registry.register("A", PluginModule::new());
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 0);

    registry.register("C", PluginModule::new());
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 0);

    registry.register("B", PluginModule::new());
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
    assert!(registry.pending_sets().is_empty());
}

#[tokio::test]
async fn unrelated_set_finishing_first_does_not_fire_others() {
    let loader = loader_with(Arc::new(RecordingFetcher::default()));
    let (slow, slow_done) = counter();
    let (fast, fast_done) = counter();

    loader.load(&ids(&["x", "y"]), slow_done);
    loader.load(&ids(&["z"]), fast_done);
    settle().await;

    loader.registry().register("z", PluginModule::new());
    assert_eq!(fast.load(Ordering::SeqCst), 1);
    assert_eq!(slow.load(Ordering::SeqCst), 0);

    loader.registry().register("x", PluginModule::new());
    assert_eq!(slow.load(Ordering::SeqCst), 0);
    loader.registry().register("y", PluginModule::new());
    assert_eq!(slow.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn self_registering_plugins_resolve_load_async() {
    let fetcher = Arc::new(RegisteringFetcher::default());
    let loader = loader_with(fetcher.clone());

    loader
        .load_async(&ids(&["a", "b"]))
        .await
        .expect("load completes");

    assert!(loader.registry().is_loaded(&PluginId::from("a")));
    assert!(loader.registry().is_loaded(&PluginId::from("b")));
    assert_eq!(fetcher.fetched.lock().expect("fetched").len(), 2);
}

#[tokio::test]
async fn plugin_that_never_registers_stalls_only_its_set() {
    let loader = loader_with(Arc::new(RecordingFetcher::default()));
    let (stalled, stalled_done) = counter();

    loader.load(&ids(&["never"]), stalled_done);
    settle().await;

    assert_eq!(stalled.load(Ordering::SeqCst), 0);
    let pending = loader.registry().pending_sets();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].pending, ids(&["never"]));
    assert!(loader.registry().is_in_flight(&PluginId::from("never")));
}

#[tokio::test]
async fn late_registration_is_not_fetched_again() {
    let fetcher = Arc::new(RecordingFetcher::default());
    let loader = loader_with(fetcher.clone());
    let (first, first_done) = counter();
    let (second, second_done) = counter();

    loader.load(&ids(&["deferred"]), first_done);
    settle().await;
    loader.load(&ids(&["deferred"]), second_done);
    settle().await;
    assert_eq!(fetcher.requested(), ids(&["deferred"]));

    loader
        .registry()
        .register("deferred", PluginModule::new());

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
    assert!(!loader.registry().is_in_flight(&PluginId::from("deferred")));
}

struct FailingFetcher {
    attempts: AtomicUsize,
}

#[async_trait::async_trait]
impl PluginFetcher for FailingFetcher {
    async fn fetch_and_execute(
        &self,
        _id: &PluginId,
        url: &str,
        _registry: Arc<PluginRegistry>,
    ) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("404 for {url}")
    }
}

#[tokio::test]
async fn failed_fetch_may_be_retried() {
    let fetcher = Arc::new(FailingFetcher {
        attempts: AtomicUsize::new(0),
    });
    let loader = loader_with(fetcher.clone());

    loader.load(&ids(&["missing"]), || {});
    settle().await;
    assert!(!loader.registry().is_in_flight(&PluginId::from("missing")));

    loader.load(&ids(&["missing"]), || {});
    settle().await;
    assert_eq!(fetcher.attempts.load(Ordering::SeqCst), 2);
}
