//! Plugins and project scripts compiled into the binary.
//!
//! There is no script engine here: a project script "evaluates" to the
//! built-in project it names with a `//! project <name>` line, or failing
//! that, the one matching its file stem.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use shared::{
    domain::PluginId,
    projection::lonlat_to_web_mercator,
    protocol::{LayerSpec, ViewConfig},
};
use shell_core::{PluginFetcher, PluginModule, PluginRegistry, Project, ScriptHost};
use tracing::{debug, info};

const PROJECT_DIRECTIVE: &str = "//! project ";

pub const GSI_TILES: &str = "source/gsitiles.js";
pub const NATURAL_EARTH: &str = "source/naturalearth.js";
pub const GSI_ELEVATION_TILES: &str = "source/gsielevtile.js";
pub const GSJ: &str = "source/gsj.js";
pub const MEASURE_VINCENTY: &str = "tool/measure-vincenty.js";

pub const BUILTIN_PLUGINS: [&str; 5] = [
    GSI_TILES,
    NATURAL_EARTH,
    GSI_ELEVATION_TILES,
    GSJ,
    MEASURE_VINCENTY,
];

type ProjectFactory = fn() -> Project;

pub struct BuiltinCatalog {
    plugin_base: String,
    project_base: String,
    project_extension: String,
    script_root: PathBuf,
    projects: BTreeMap<&'static str, ProjectFactory>,
}

impl BuiltinCatalog {
    pub fn new(settings: &crate::config::Settings) -> Self {
        let mut projects: BTreeMap<&'static str, ProjectFactory> = BTreeMap::new();
        projects.insert("experimental_utm53", experimental_utm53);
        Self {
            plugin_base: settings.plugin_base.clone(),
            project_base: settings.project_base.clone(),
            project_extension: settings.project_extension.clone(),
            script_root: PathBuf::from(&settings.script_root),
            projects,
        }
    }

    pub fn project_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.projects.keys().copied()
    }

    /// Name of the built-in project served at `url`, if any.
    fn builtin_at(&self, url: &str) -> Option<&'static str> {
        let name = url
            .strip_prefix(&self.project_base)?
            .strip_suffix(&self.project_extension)?
            .strip_suffix('.')?;
        self.projects.get_key_value(name).map(|(name, _)| *name)
    }

    fn plugin_id_from_url<'a>(&self, url: &'a str) -> &'a str {
        url.strip_prefix(&self.plugin_base).unwrap_or(url)
    }
}

#[async_trait]
impl PluginFetcher for BuiltinCatalog {
    async fn fetch_and_execute(
        &self,
        id: &PluginId,
        url: &str,
        registry: Arc<PluginRegistry>,
    ) -> Result<()> {
        let name = self.plugin_id_from_url(url);
        if !BUILTIN_PLUGINS.contains(&name) {
            bail!("plugin '{id}' not found at {url}");
        }
        debug!(plugin = %id, "executing built-in plugin");
        let plugin = id.clone();
        let module = match name {
            MEASURE_VINCENTY => PluginModule::with_init(move || {
                info!(plugin = %plugin, "measure tool ready");
            }),
            _ => PluginModule::new(),
        };
        registry.register(id.clone(), module);
        Ok(())
    }
}

#[async_trait]
impl ScriptHost for BuiltinCatalog {
    async fn fetch_script(&self, url: &str) -> Result<String> {
        if let Some(name) = self.builtin_at(url) {
            return Ok(format!("{PROJECT_DIRECTIVE}{name}\n"));
        }
        let path = self.script_root.join(url);
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("no project script at '{}'", path.display()))
    }

    fn evaluate(&self, origin: &str, text: &str) -> Result<Project> {
        let declared = text
            .lines()
            .find_map(|line| line.trim().strip_prefix(PROJECT_DIRECTIVE))
            .map(str::trim);
        let stem = Path::new(origin).file_stem().and_then(|stem| stem.to_str());
        let name = declared
            .or(stem)
            .ok_or_else(|| anyhow!("{origin} does not name a project"))?;
        let factory = self
            .projects
            .get(name)
            .ok_or_else(|| anyhow!("{origin}: unknown project '{name}'"))?;
        Ok(factory())
    }
}

fn gsi_tile_layer(id: &str, title: &str) -> LayerSpec {
    LayerSpec::titled(title).with_payload(json!({
        "source": "gsitiles",
        "id": id,
        "url": format!("https://cyberjapandata.gsi.go.jp/xyz/{id}/{{z}}/{{x}}/{{y}}.png"),
        "attribution": "国土地理院",
    }))
}

/// The project shown when the page names none.
pub fn default_project() -> Project {
    Project::builder("Default project")
        .description("This project is default project, which has GSI tile layers.")
        .plugin(GSI_TILES)
        .view(ViewConfig::default())
        .init(|project| {
            project.add_layer(gsi_tile_layer("std", "GSI Standard"));
            project.add_layer(gsi_tile_layer("relief", "GSI Relief").hidden());
            project.add_layer(gsi_tile_layer("ort", "GSI Ortho Photo").hidden());
        })
        .build()
}

fn experimental_utm53() -> Project {
    Project::builder("Experimental UTM53 Project")
        .plugins([
            NATURAL_EARTH,
            GSI_TILES,
            GSI_ELEVATION_TILES,
            GSJ,
            MEASURE_VINCENTY,
        ])
        .view(ViewConfig {
            projection: "EPSG:3099".into(),
            // (135E, 34.5N) on the zone 53 central meridian.
            center: [500000.0, 3817597.25],
            zoom: 8.0,
            max_zoom: Some(20.0),
        })
        .init(|project| {
            project.add_layer(gsi_tile_layer("std", "GSI Standard"));
            project.add_layer(LayerSpec::titled("Coastline").with_payload(json!({
                "source": "naturalearth",
                "id": "cl",
                "center": lonlat_to_web_mercator(135.0, 34.5),
            })));
        })
        .build()
}
