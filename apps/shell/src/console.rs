//! Terminal stand-ins for the map view, the layer panel and dialogs.

use std::{
    io::{self, BufRead, Write},
    sync::{Mutex, PoisonError},
};

use shared::{
    domain::LayerId,
    error::UserNotice,
    protocol::{Layer, LayerEvent, ViewConfig},
};
use shell_core::{LayerObserver, Notifier, PanelHost, ProjectSummary, ViewHost};
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct ConsoleView;

impl LayerObserver for ConsoleView {
    fn on_layer_event(&self, event: &LayerEvent) {
        match event {
            LayerEvent::Added(layer) => debug!(layer = %layer.id, "map layer inserted"),
            LayerEvent::Updated(layer) => debug!(
                layer = %layer.id,
                visible = layer.visible,
                opacity = layer.opacity,
                blend = layer.blend_mode.composite_operation(),
                "map layer restyled"
            ),
            LayerEvent::Removed(id) => debug!(layer = %id, "map layer removed"),
            LayerEvent::Reordered(order) => debug!(?order, "map layers reordered"),
            LayerEvent::Cleared => debug!("map cleared"),
        }
    }
}

impl ViewHost for ConsoleView {
    fn apply_view(&self, view: &ViewConfig) {
        info!(
            projection = %view.projection,
            center = ?view.center,
            zoom = view.zoom,
            "view configured"
        );
    }

    fn fit_layer(&self, id: LayerId) {
        info!(layer = %id, "view fitted to layer extent");
    }

    fn center_on(&self, lon: f64, lat: f64, resolution: f64) {
        println!("view centred on ({lon}, {lat}) at resolution {resolution:.3} m/px");
    }
}

/// Mirrors the registry in panel order, top-most layer first.
#[derive(Debug, Default)]
pub struct ConsolePanel {
    items: Mutex<Vec<Layer>>,
    project: Mutex<Option<ProjectSummary>>,
}

impl ConsolePanel {
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(project) = self
            .project
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            out.push_str(&format!("# {}\n", project.title));
            if !project.description.is_empty() {
                out.push_str(&format!("  {}\n", project.description));
            }
        }
        for layer in self.items.lock().unwrap_or_else(PoisonError::into_inner).iter() {
            out.push_str(&format!(
                "[{}] {:<4} {} (opacity {:.2}, {})\n",
                if layer.visible { "x" } else { " " },
                layer.id.to_string(),
                layer.title,
                layer.opacity,
                layer.blend_mode.composite_operation(),
            ));
        }
        out
    }
}

impl LayerObserver for ConsolePanel {
    fn on_layer_event(&self, event: &LayerEvent) {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        match event {
            LayerEvent::Added(layer) => items.insert(0, layer.clone()),
            LayerEvent::Updated(layer) => {
                if let Some(item) = items.iter_mut().find(|item| item.id == layer.id) {
                    *item = layer.clone();
                }
            }
            LayerEvent::Removed(id) => items.retain(|item| item.id != *id),
            LayerEvent::Reordered(bottom_first) => {
                let mut previous = std::mem::take(&mut *items);
                for id in bottom_first.iter().rev() {
                    if let Some(index) = previous.iter().position(|item| item.id == *id) {
                        items.push(previous.remove(index));
                    }
                }
            }
            LayerEvent::Cleared => items.clear(),
        }
    }
}

impl PanelHost for ConsolePanel {
    fn show_project(&self, summary: &ProjectSummary) {
        *self.project.lock().unwrap_or_else(PoisonError::into_inner) = Some(summary.clone());
    }
}

/// Alerts go to stderr. Confirmations are answered from stdin unless
/// `assume_yes` is set.
#[derive(Debug)]
pub struct ConsoleNotifier {
    assume_yes: bool,
}

impl ConsoleNotifier {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl Notifier for ConsoleNotifier {
    fn alert(&self, notice: &UserNotice) {
        eprintln!("! {}", notice.message);
    }

    fn confirm(&self, question: &str) -> bool {
        println!("{question}");
        if self.assume_yes {
            println!("> yes");
            return true;
        }
        print!("[y/N] ");
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => matches!(answer.trim(), "y" | "Y" | "yes"),
            Err(_) => false,
        }
    }
}
