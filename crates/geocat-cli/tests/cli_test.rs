//! Integration tests for the geocat binary
//!
//! These tests run the built binary inside temporary directories and check
//! JSON output, dry-run behavior and the state files an import leaves behind.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn geocat_bin() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // test binary name
    path.pop(); // deps
    path.push("geocat");
    path
}

fn geocat(dir: &Path, args: &[&str]) -> Output {
    Command::new(geocat_bin())
        .current_dir(dir)
        .env_remove("GEOCAT_WORKSPACE")
        .env_remove("GEOCAT_UPDATE_MODE")
        .env_remove("GEOCAT_ARCHIVE")
        .env_remove("GEOCAT_COMPUTE_BOUNDS")
        .args(args)
        .output()
        .expect("Failed to execute command")
}

fn json_data(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("Output should be valid JSON");
    assert_eq!(parsed["status"], "success");
    parsed["data"].clone()
}

fn write_points(path: &Path) {
    let geojson = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"name": "a"}, "geometry": {"type": "Point", "coordinates": [-103.5, 44.4]}},
            {"type": "Feature", "properties": {"name": "b"}, "geometry": {"type": "Point", "coordinates": [-103.7, 44.6]}}
        ]
    }"#;
    std::fs::write(path, geojson).unwrap();
}

#[test]
fn test_init_json_output() {
    let temp_dir = tempfile::tempdir().unwrap();

    let output = geocat(temp_dir.path(), &["init", ".", "--workspace", "topp", "--json"]);
    assert!(output.status.success());

    let data = json_data(&output);
    assert_eq!(data["default_workspace"], "topp");
    assert_eq!(data["config_written"], true);
    assert!(temp_dir.path().join(".geocat/config.toml").exists());
    assert!(temp_dir.path().join(".geocat/catalog.json").exists());
}

#[test]
fn test_init_twice_fails_without_force() {
    let temp_dir = tempfile::tempdir().unwrap();

    assert!(geocat(temp_dir.path(), &["init"]).status.success());
    assert!(!geocat(temp_dir.path(), &["init"]).status.success());
    assert!(geocat(temp_dir.path(), &["init", "--force"]).status.success());
}

#[test]
fn test_dry_run_no_state_modification() {
    let temp_dir = tempfile::tempdir().unwrap();

    let output = geocat(temp_dir.path(), &["init", "--dry-run", "--json"]);
    assert!(output.status.success());

    let data = json_data(&output);
    assert_eq!(data["dry_run"], true);
    assert!(data["planned_actions"].as_array().is_some_and(|a| !a.is_empty()));
    assert!(!temp_dir.path().join(".geocat").exists(), "Dry-run should not create .geocat");
}

#[test]
fn test_import_outside_workspace_fails() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_points(&temp_dir.path().join("sites.geojson"));

    let output = geocat(temp_dir.path(), &["import", "sites.geojson"]);
    assert!(!output.status.success());
}

#[test]
fn test_import_registers_layer() {
    let temp_dir = tempfile::tempdir().unwrap();
    assert!(geocat(temp_dir.path(), &["init"]).status.success());
    write_points(&temp_dir.path().join("sites.geojson"));

    let output = geocat(temp_dir.path(), &["import", "sites.geojson", "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let data = json_data(&output);
    assert_eq!(data["state"], "COMPLETE");
    assert_eq!(data["tasks"][0]["layer"], "sites");
    assert_eq!(data["tasks"][0]["state"], "COMPLETE");

    let layers = json_data(&geocat(temp_dir.path(), &["layers", "--json"]));
    let layers = layers.as_array().unwrap();
    assert_eq!(layers.len(), 1);
    assert_eq!(layers[0]["name"], "sites");

    let history = json_data(&geocat(temp_dir.path(), &["history", "--json"]));
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[test]
fn test_import_dry_run_leaves_catalog_empty() {
    let temp_dir = tempfile::tempdir().unwrap();
    assert!(geocat(temp_dir.path(), &["init"]).status.success());
    write_points(&temp_dir.path().join("sites.geojson"));

    let output = geocat(temp_dir.path(), &["import", "sites.geojson", "--dry-run", "--json"]);
    assert!(output.status.success());
    let data = json_data(&output);
    assert_eq!(data["planned_actions"][0]["action_type"], "register_layer");

    let layers = json_data(&geocat(temp_dir.path(), &["layers", "--json"]));
    assert!(layers.as_array().unwrap().is_empty());
}

#[test]
fn test_import_into_store_writes_database() {
    let temp_dir = tempfile::tempdir().unwrap();
    assert!(geocat(temp_dir.path(), &["init"]).status.success());
    write_points(&temp_dir.path().join("sites.geojson"));

    let output = geocat(temp_dir.path(), &["store", "add", "gis", "--database", "gis", "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(temp_dir.path().join(".geocat/databases/gis.json").exists());

    let output = geocat(temp_dir.path(), &["import", "sites.geojson", "--store", "gis", "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let data = json_data(&output);
    assert_eq!(data["store"], "gis");
    assert_eq!(data["tasks"][0]["written"], 2);

    let stores = json_data(&geocat(temp_dir.path(), &["store", "list", "--json"]));
    assert_eq!(stores[0]["name"], "gis");
}

#[test]
fn test_formats_lists_readers() {
    let temp_dir = tempfile::tempdir().unwrap();

    let output = geocat(temp_dir.path(), &["formats", "--json"]);
    assert!(output.status.success());

    let data = json_data(&output);
    let names: Vec<&str> = data.as_array().unwrap().iter().filter_map(|f| f["name"].as_str()).collect();
    assert!(names.contains(&"GeoJSON"));
    assert!(names.contains(&"Shapefile"));
}
