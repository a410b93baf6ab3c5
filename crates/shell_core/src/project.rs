use std::fmt;

use shared::{
    domain::{Epoch, LayerId, PluginId},
    protocol::{LayerSpec, ViewConfig},
};

use crate::{hosts::ProjectSummary, layer_registry::LayerRegistry};

/// Project initialization routine. `FnOnce`: a project initializes at most
/// once per load.
pub type ProjectInit = Box<dyn FnOnce(&mut ProjectHandle<'_>) + Send + 'static>;

/// A loadable bundle of view settings, required plugins and the routine that
/// populates the layer stack.
pub struct Project {
    pub title: String,
    pub description: String,
    /// Plugins that must have registered before `init` runs.
    pub plugins: Vec<PluginId>,
    pub view: Option<ViewConfig>,
    pub init: Option<ProjectInit>,
}

impl Project {
    pub fn builder(title: impl Into<String>) -> ProjectBuilder {
        ProjectBuilder {
            project: Project {
                title: title.into(),
                description: String::new(),
                plugins: Vec::new(),
                view: None,
                init: None,
            },
        }
    }

    pub fn summary(&self) -> ProjectSummary {
        ProjectSummary {
            title: self.title.clone(),
            description: self.description.clone(),
            plugins: self.plugins.clone(),
        }
    }
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("title", &self.title)
            .field("description", &self.description)
            .field("plugins", &self.plugins)
            .field("view", &self.view)
            .field("has_init", &self.init.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub struct ProjectBuilder {
    project: Project,
}

impl ProjectBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.project.description = description.into();
        self
    }

    pub fn plugin(mut self, id: impl Into<PluginId>) -> Self {
        self.project.plugins.push(id.into());
        self
    }

    pub fn plugins<I, P>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PluginId>,
    {
        self.project.plugins.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn view(mut self, view: ViewConfig) -> Self {
        self.project.view = Some(view);
        self
    }

    pub fn init(mut self, init: impl FnOnce(&mut ProjectHandle<'_>) + Send + 'static) -> Self {
        self.project.init = Some(Box::new(init));
        self
    }

    pub fn build(self) -> Project {
        self.project
    }
}

/// The only surface a project's init routine gets: adding layers to the
/// freshly cleared registry.
///
/// Bound to one project load. Once a newer load has cleared the registry the
/// handle's adds are dropped and `add_layer` returns `None`.
pub struct ProjectHandle<'a> {
    layers: &'a LayerRegistry,
    epoch: Epoch,
    added: Vec<LayerId>,
}

impl<'a> ProjectHandle<'a> {
    pub(crate) fn new(layers: &'a LayerRegistry, epoch: Epoch) -> Self {
        Self {
            layers,
            epoch,
            added: Vec::new(),
        }
    }

    pub fn add_layer(&mut self, spec: LayerSpec) -> Option<LayerId> {
        let id = self.layers.add_for_load(self.epoch, spec)?;
        self.added.push(id);
        Some(id)
    }

    /// Ids of the layers that were accepted, in order.
    pub fn add_layers(&mut self, specs: impl IntoIterator<Item = LayerSpec>) -> Vec<LayerId> {
        specs
            .into_iter()
            .filter_map(|spec| self.add_layer(spec))
            .collect()
    }

    pub(crate) fn into_added(self) -> Vec<LayerId> {
        self.added
    }
}

impl fmt::Debug for ProjectHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectHandle")
            .field("epoch", &self.epoch)
            .field("added", &self.added)
            .finish()
    }
}
