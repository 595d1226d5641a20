//! Configuration system integration tests for MediAssist.
//!
//! Exercises loading, saving and migrating the configuration file using
//! temporary directories to avoid affecting the real config.

use mediassist_lib::config::{load_from_path, save_to_path, Config};
use mediassist_lib::permissions::Coordinates;
use std::fs;
use tempfile::TempDir;

const CURRENT_VERSION: u32 = 2;

fn temp_config(name: &str) -> (TempDir, std::path::PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join(name);
    (temp_dir, path)
}

// =============================================================================
// Config File Operations Tests
// =============================================================================

#[test]
fn test_save_and_load_config() {
    let (_dir, config_path) = temp_config("config.json");

    let mut config = Config::default();
    config.api.base_url = "https://mediassist.example.org".to_string();
    config.session.default_dispatch_number = "112".to_string();
    config.session.dispatch_delay_ms = 3000;
    config.metronome.play_sounds = false;

    save_to_path(&config_path, &config).expect("Failed to save config");
    let loaded = load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(loaded.version, CURRENT_VERSION);
    assert_eq!(loaded.api.base_url, "https://mediassist.example.org");
    assert_eq!(loaded.session.default_dispatch_number, "112");
    assert_eq!(loaded.session.dispatch_delay_ms, 3000);
    assert!(!loaded.metronome.play_sounds);
}

#[test]
fn test_load_nonexistent_config_returns_defaults() {
    let (_dir, config_path) = temp_config("nonexistent.json");

    let config = load_from_path(&config_path).expect("Should return defaults");

    assert_eq!(config.version, CURRENT_VERSION);
    assert_eq!(config.session.default_dispatch_number, "911");
    assert_eq!(config.session.alert_radius_m, 500);
    assert!(config.geolocation.fixed_location.is_none());
    // Loading alone never creates the file
    assert!(!config_path.exists());
}

#[test]
fn test_save_creates_parent_directories() {
    let (_dir, base) = temp_config("nested");
    let config_path = base.join("deeper").join("config.json");

    save_to_path(&config_path, &Config::default()).expect("Failed to save");

    assert!(config_path.exists());
}

#[test]
fn test_fixed_location_persists() {
    let (_dir, config_path) = temp_config("location.json");

    let mut config = Config::default();
    config.geolocation.fixed_location = Some(Coordinates::new(42.9634, -78.7384));
    save_to_path(&config_path, &config).expect("Failed to save");

    let loaded = load_from_path(&config_path).expect("Failed to load");
    assert_eq!(
        loaded.geolocation.fixed_location,
        Some(Coordinates::new(42.9634, -78.7384))
    );
}

// =============================================================================
// Config Version and Migration Tests
// =============================================================================

#[test]
fn test_old_config_is_migrated_and_written_back() {
    let (_dir, config_path) = temp_config("old.json");
    fs::write(
        &config_path,
        r#"{"version": 1, "metronome": {"beat_flash_ms": 0, "play_sounds": false}}"#,
    )
    .expect("Failed to write old config");

    let loaded = load_from_path(&config_path).expect("Failed to load");
    assert_eq!(loaded.version, CURRENT_VERSION);
    assert_eq!(loaded.metronome.beat_flash_ms, 150);
    assert!(!loaded.metronome.play_sounds);

    let on_disk = fs::read_to_string(&config_path).expect("Failed to read back");
    let value: serde_json::Value = serde_json::from_str(&on_disk).expect("Invalid JSON");
    assert_eq!(value["version"], CURRENT_VERSION);
    assert_eq!(value["metronome"]["beat_flash_ms"], 150);
}

#[test]
fn test_current_config_is_not_rewritten() {
    let (_dir, config_path) = temp_config("current.json");
    let json = r#"{"version": 2, "session": {"locale": "es"}}"#;
    fs::write(&config_path, json).expect("Failed to write config");

    let loaded = load_from_path(&config_path).expect("Failed to load");
    assert_eq!(loaded.session.locale, "es");
    assert_eq!(loaded.session.recognition_language, "en-US");

    let on_disk = fs::read_to_string(&config_path).expect("Failed to read back");
    assert_eq!(on_disk, json);
}

#[test]
fn test_future_version_loads_unchanged() {
    let (_dir, config_path) = temp_config("future.json");
    fs::write(&config_path, r#"{"version": 99}"#).expect("Failed to write config");
    let loaded = load_from_path(&config_path).expect("Future versions load unchanged");
    assert_eq!(loaded.version, 99);
}

// =============================================================================
// Edge Cases
// =============================================================================

#[test]
fn test_config_handles_invalid_json() {
    let (_dir, config_path) = temp_config("invalid.json");
    fs::write(&config_path, "{ not valid json }").expect("Failed to write");

    let result = load_from_path(&config_path);
    assert!(result.is_err());
    assert!(result.unwrap_err().contains("Failed to parse config"));
}

#[test]
fn test_config_with_unknown_fields() {
    let (_dir, config_path) = temp_config("unknown.json");
    fs::write(
        &config_path,
        r#"{"version": 2, "audio": {"sample_rate": 16000}, "session": {"alert_radius_m": 750}}"#,
    )
    .expect("Failed to write");

    let loaded = load_from_path(&config_path).expect("Unknown sections are ignored");
    assert_eq!(loaded.session.alert_radius_m, 750);
}

#[test]
fn test_config_pretty_printed_json() {
    let (_dir, config_path) = temp_config("pretty.json");
    save_to_path(&config_path, &Config::default()).expect("Failed to save");

    let contents = fs::read_to_string(&config_path).expect("Failed to read");
    assert!(contents.contains('\n'));
    assert!(contents.contains("  \"session\""));
}
