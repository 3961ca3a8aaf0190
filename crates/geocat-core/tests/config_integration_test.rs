//! Integration tests for layered configuration
//!
//! Precedence: CLI arguments > Environment variables > Config file > Defaults

use geocat_core::config::{CliConfigOverrides, ConfigSource, LayeredConfig};
use geocat_core::models::UpdateMode;
use serial_test::serial;
use std::env;
use std::io::Write;
use tempfile::NamedTempFile;

const VARS: [&str; 5] = [
    "GEOCAT_WORKSPACE",
    "GEOCAT_ARCHIVE",
    "GEOCAT_UPDATE_MODE",
    "GEOCAT_COMPUTE_BOUNDS",
    "GEOCAT_DOWNLOAD_TIMEOUT",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_env_overrides_file() {
    clear_env();
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "workspace = \"from_file\"\ncompute_bounds = false").unwrap();

    env::set_var("GEOCAT_WORKSPACE", "from_env");
    env::set_var("GEOCAT_DOWNLOAD_TIMEOUT", "30");

    let config = LayeredConfig::with_defaults()
        .load_from_file(file.path())
        .unwrap()
        .load_from_env();

    assert_eq!(config.workspace.value, "from_env");
    assert_eq!(config.workspace.source, ConfigSource::Environment);
    assert!(!config.compute_bounds.value);
    assert_eq!(config.compute_bounds.source, ConfigSource::File);
    assert_eq!(config.download_timeout_secs.value, 30);

    clear_env();
}

#[test]
#[serial]
fn test_invalid_env_values_are_ignored() {
    clear_env();
    env::set_var("GEOCAT_ARCHIVE", "maybe");
    env::set_var("GEOCAT_UPDATE_MODE", "merge");
    env::set_var("GEOCAT_DOWNLOAD_TIMEOUT", "0");

    let config = LayeredConfig::with_defaults().load_from_env();

    assert!(!config.archive.value);
    assert_eq!(config.archive.source, ConfigSource::Default);
    assert_eq!(config.update_mode.value, UpdateMode::Create);
    assert_eq!(config.download_timeout_secs.value, 120);

    clear_env();
}

#[test]
#[serial]
fn test_cli_overrides_env() {
    clear_env();
    env::set_var("GEOCAT_UPDATE_MODE", "append");
    env::set_var("GEOCAT_ARCHIVE", "yes");

    let mut config = LayeredConfig::with_defaults().load_from_env();
    assert_eq!(config.update_mode.value, UpdateMode::Append);
    assert!(config.archive.value);

    config.update_from_cli(CliConfigOverrides {
        update_mode: Some(UpdateMode::Replace),
        ..Default::default()
    });

    assert_eq!(config.update_mode.value, UpdateMode::Replace);
    assert_eq!(config.update_mode.source, ConfigSource::Cli);
    assert_eq!(config.archive.source, ConfigSource::Environment);

    clear_env();
}
