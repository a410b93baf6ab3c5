use std::{collections::HashMap, fs, path::Path};

use anyhow::Context;
use shell_core::LoaderPaths;

pub const DEFAULT_CONFIG_FILE: &str = "shell.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub plugin_base: String,
    pub project_base: String,
    pub project_extension: String,
    /// Directory project and plugin paths are resolved against when a script
    /// is not part of the built-in catalog.
    pub script_root: String,
    pub nominatim_url: String,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        let paths = LoaderPaths::default();
        Self {
            plugin_base: paths.plugin_base,
            project_base: paths.project_base,
            project_extension: paths.project_extension,
            script_root: ".".into(),
            nominatim_url: geocoding::NOMINATIM_URL.into(),
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn loader_paths(&self) -> LoaderPaths {
        LoaderPaths {
            plugin_base: self.plugin_base.clone(),
            project_base: self.project_base.clone(),
            project_extension: self.project_extension.clone(),
        }
    }

    fn set(&mut self, key: &str, value: String) -> bool {
        let slot = match key {
            "plugin_base" => &mut self.plugin_base,
            "project_base" => &mut self.project_base,
            "project_extension" => &mut self.project_extension,
            "script_root" => &mut self.script_root,
            "nominatim_url" => &mut self.nominatim_url,
            "log_filter" => &mut self.log_filter,
            _ => return false,
        };
        *slot = value;
        true
    }
}

const KEYS: [&str; 6] = [
    "plugin_base",
    "project_base",
    "project_extension",
    "script_root",
    "nominatim_url",
    "log_filter",
];

/// Defaults, then the TOML file, then `APP__*` environment variables.
///
/// A missing `shell.toml` is fine; a missing file named with `--config` is
/// an error.
pub fn load_settings(config_file: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match config_file {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file '{}'", path.display()))?;
            apply_file(&mut settings, &raw)
                .with_context(|| format!("invalid config file '{}'", path.display()))?;
        }
        None => {
            if let Ok(raw) = fs::read_to_string(DEFAULT_CONFIG_FILE) {
                apply_file(&mut settings, &raw)
                    .with_context(|| format!("invalid config file '{DEFAULT_CONFIG_FILE}'"))?;
            }
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: HashMap<String, String> = toml::from_str(raw)?;
    for (key, value) in file_cfg {
        if !settings.set(&key, value) {
            tracing::warn!(key = %key, "unknown config key ignored");
        }
    }
    Ok(())
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    for key in KEYS {
        if let Some(value) = lookup(&format!("APP__{}", key.to_ascii_uppercase())) {
            settings.set(key, value);
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
