use super::*;

use std::collections::HashMap;

#[test]
fn defaults_match_the_stock_layout() {
    let settings = Settings::default();
    assert_eq!(settings.loader_paths(), LoaderPaths::default());
    assert_eq!(settings.plugin_base, "plugins/");
    assert_eq!(settings.project_base, "projects/");
    assert_eq!(settings.project_extension, "js");
    assert_eq!(settings.nominatim_url, "https://nominatim.openstreetmap.org");
    assert_eq!(settings.log_filter, "info");
}

#[test]
fn file_values_override_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("shell.toml");
    fs::write(
        &path,
        "project_base = \"maps/\"\nlog_filter = \"debug\"\nunknown = \"ignored\"\n",
    )
    .expect("write config");

    let settings = load_settings(Some(&path)).expect("settings");

    assert_eq!(settings.project_base, "maps/");
    assert_eq!(settings.log_filter, "debug");
    assert_eq!(settings.plugin_base, "plugins/");
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = load_settings(Some(&dir.path().join("absent.toml"))).expect_err("missing file");
    assert!(format!("{err:#}").contains("absent.toml"));
}

#[test]
fn malformed_file_is_an_error() {
    let mut settings = Settings::default();
    assert!(apply_file(&mut settings, "plugin_base = [1, 2]").is_err());
}

#[test]
fn env_overrides_win() {
    let env: HashMap<&str, &str> = HashMap::from([
        ("APP__PLUGIN_BASE", "https://example.com/plugins/"),
        ("APP__NOMINATIM_URL", "http://localhost:7070"),
    ]);
    let mut settings = Settings::default();
    apply_file(&mut settings, "plugin_base = \"local/\"").expect("file");

    apply_env(&mut settings, |key| env.get(key).map(|v| v.to_string()));

    assert_eq!(settings.plugin_base, "https://example.com/plugins/");
    assert_eq!(settings.nominatim_url, "http://localhost:7070");
    assert_eq!(settings.project_base, "projects/");
}
