use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use geocoding::NominatimGeocoder;
use shell_core::{classify_drop, DropAction, LifecyclePhase, LoadStatus, MapShell, ShellHosts};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod catalog;
mod config;
mod console;
mod geojson;
mod intents;

use catalog::BuiltinCatalog;
use config::load_settings;
use console::{ConsoleNotifier, ConsolePanel, ConsoleView};
use geojson::GeoJsonReader;
use intents::parse_intent;

/// How long the CLI waits for a project's plugins before giving up on it.
const LOAD_WAIT: Duration = Duration::from_secs(10);

/// Headless map shell: loads a project, applies panel commands and prints
/// the layer panel.
#[derive(Parser, Debug)]
struct Args {
    /// Settings file (defaults to ./shell.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Page URL; its `project` parameter selects the project to load.
    #[arg(long, default_value = "index.html")]
    url: String,
    /// Files dropped onto the map after boot.
    #[arg(long = "drop", num_args = 1..)]
    drops: Vec<PathBuf>,
    /// Panel command, e.g. `hide L1`, `opacity L0 0.5`, `order L2,L0,L1`.
    #[arg(long = "intent")]
    intents: Vec<String>,
    /// Place name to search for and jump to.
    #[arg(long)]
    search: Option<String>,
    /// Answer yes to every confirmation.
    #[arg(long, short = 'y')]
    yes: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = load_settings(args.config.as_deref())?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .init();

    let builtins = Arc::new(BuiltinCatalog::new(&settings));
    debug!(projects = ?builtins.project_names().collect::<Vec<_>>(), "built-in projects");
    let panel = Arc::new(ConsolePanel::default());
    let shell = MapShell::new(
        ShellHosts {
            view: Arc::new(ConsoleView),
            panel: Arc::clone(&panel),
            notifier: Arc::new(ConsoleNotifier::new(args.yes)),
            fetcher: builtins.clone(),
            scripts: builtins,
            reader: Arc::new(GeoJsonReader),
        },
        settings.loader_paths(),
    );

    let loaded = expect_load(&shell);
    let booted = shell.boot(&args.url, catalog::default_project()).await;
    if let Some(LoadStatus::AwaitingPlugins(_)) = booted {
        wait_for_load(&shell, loaded).await;
    }

    if !args.drops.is_empty() {
        let loads_project = matches!(
            classify_drop(args.drops.clone()),
            DropAction::LoadProject(_)
        );
        let loaded = expect_load(&shell);
        shell.handle_drop(args.drops).await;
        if loads_project && shell.lifecycle().phase() == LifecyclePhase::AwaitingPlugins {
            wait_for_load(&shell, loaded).await;
        }
    }

    for command in &args.intents {
        match parse_intent(command) {
            Ok(intent) => {
                if shell.apply_intent(intent).is_err() {
                    continue;
                }
                debug!(command = %command, "panel command applied");
            }
            Err(err) => eprintln!("! {err:#}"),
        }
    }

    if let Some(query) = &args.search {
        let geocoder = NominatimGeocoder::new(&settings.nominatim_url)?;
        if let Some(hit) = shell.search(&geocoder, query).await {
            info!(place = %hit.display_name, "jumped to search result");
        }
    }

    print!("{}", panel.render());
    Ok(())
}

fn expect_load(shell: &MapShell) -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();
    shell.lifecycle().set_default_completion(move || {
        let _ = tx.send(());
    });
    rx
}

async fn wait_for_load(shell: &MapShell, loaded: oneshot::Receiver<()>) {
    match tokio::time::timeout(LOAD_WAIT, loaded).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => debug!("load finished without reaching init"),
        Err(_) => {
            for pending in shell.plugins().pending_sets() {
                warn!(
                    load_set = pending.id.0,
                    pending = ?pending.pending,
                    "plugins still not registered"
                );
            }
        }
    }
}
