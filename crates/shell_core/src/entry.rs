//! Boot and drop entry points: the `project` query parameter and files
//! dropped onto the map.

use std::{collections::HashMap, path::PathBuf};

use shared::error::ShellError;
use url::Url;

/// Name of the query parameter selecting a project resource.
pub const PROJECT_PARAM: &str = "project";

/// Where plugin and project scripts are looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderPaths {
    pub plugin_base: String,
    pub project_base: String,
    pub project_extension: String,
}

impl Default for LoaderPaths {
    fn default() -> Self {
        Self {
            plugin_base: "plugins/".to_string(),
            project_base: "projects/".to_string(),
            project_extension: "js".to_string(),
        }
    }
}

/// Collects `key=value` pairs from both the query string and the fragment.
/// Later keys override earlier ones, so the fragment wins over the query.
///
/// Relative inputs such as `?project=x` or `#project=x` are accepted.
pub fn parse_url_params(raw: &str) -> Result<HashMap<String, String>, url::ParseError> {
    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse("http://localhost/")?.join(raw)?
        }
        Err(err) => return Err(err),
    };

    let mut params: HashMap<String, String> = url.query_pairs().into_owned().collect();
    if let Some(fragment) = url.fragment() {
        params.extend(url::form_urlencoded::parse(fragment.as_bytes()).into_owned());
    }
    Ok(params)
}

/// Maps a `project` parameter value to the script URL to load.
pub fn resolve_project_param(name: &str, paths: &LoaderPaths) -> Result<String, ShellError> {
    if name.contains("..") {
        return Err(ShellError::UnsafeProjectName {
            name: name.to_string(),
        });
    }
    Ok(format!(
        "{}{}.{}",
        paths.project_base, name, paths.project_extension
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropAction {
    LoadProject(PathBuf),
    ImportLayers(Vec<PathBuf>),
}

/// A single dropped `.js` file is a project; anything else is imported file
/// by file as layers.
pub fn classify_drop(files: Vec<PathBuf>) -> DropAction {
    if let [only] = files.as_slice() {
        let is_script = only
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("js"));
        if is_script {
            return DropAction::LoadProject(only.clone());
        }
    }
    DropAction::ImportLayers(files)
}

#[cfg(test)]
#[path = "tests/entry_tests.rs"]
mod tests;
