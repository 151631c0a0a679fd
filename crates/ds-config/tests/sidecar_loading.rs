//! Sidecar discovery and sanitization through the file system.

use ds_config::rotation::ROTATION_CONFIG_FILES;
use ds_config::{AppConfig, RotationConfig};
use std::fs;
use tempfile::TempDir;

#[test]
fn yaml_sidecar_wins_over_json() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("rotation_config.json"),
        r#"{"max_size_mb": 1.0}"#,
    )
    .unwrap();
    fs::write(tmp.path().join("rotation_config.yaml"), "max_size_mb: 2.5\n").unwrap();

    let located = RotationConfig::locate(tmp.path()).unwrap();
    assert_eq!(located, tmp.path().join(ROTATION_CONFIG_FILES[0]));
    assert_eq!(RotationConfig::load(tmp.path()).unwrap().max_size_mb, 2.5);
}

#[test]
fn json_sidecar_is_found_alone() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("rotation_config.json"),
        r#"{"enabled": false, "backup_count": 2}"#,
    )
    .unwrap();

    let config = RotationConfig::load(tmp.path()).unwrap();
    assert!(!config.enabled);
    assert_eq!(config.backup_count, 2);
    assert_eq!(config.archive_retention_days, 30);
}

#[test]
fn bad_fields_fall_back_individually() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("rotation_config.yml"),
        "max_size_mb: -4\nbackup_count: many\narchive_retention_days: 7\n",
    )
    .unwrap();

    let config = RotationConfig::load(tmp.path()).unwrap();
    assert_eq!(config.max_size_mb, 10.0);
    assert_eq!(config.backup_count, 5);
    assert_eq!(config.archive_retention_days, 7);
}

#[test]
fn unparseable_sidecar_is_ignored() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("rotation_config.yaml"), "max_size_mb: [unclosed\n").unwrap();
    assert!(RotationConfig::load(tmp.path()).is_none());
}

#[test]
fn missing_sidecar_is_none() {
    let tmp = TempDir::new().unwrap();
    assert!(RotationConfig::load(tmp.path()).is_none());
}

#[test]
fn saved_sidecar_loads_back() {
    let tmp = TempDir::new().unwrap();
    let config = RotationConfig::default()
        .with_max_size_mb(0.5)
        .with_backup_count(0);
    let path = config.save(&tmp.path().join("config")).unwrap();
    assert!(path.ends_with("rotation_config.yaml"));
    assert_eq!(RotationConfig::load(&tmp.path().join("config")), Some(config));
}

#[test]
fn app_config_from_json_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("app.json");
    fs::write(
        &path,
        r#"{"app_name": "svc", "log_level": "DEBUG", "console_output": true, "custom_folders": ["a", 5]}"#,
    )
    .unwrap();

    let config = AppConfig::from_file(&path).unwrap();
    assert_eq!(config.app_name, "svc");
    assert_eq!(config.log_level, "DEBUG");
    assert!(config.console_output);
    assert!(config.custom_folders.is_empty());
}
