//! Configuration management for MediAssist
//!
//! Provides persistent settings storage with schema versioning and migrations.
//! Configuration is stored in `~/.mediassist/config.json` and cached in memory
//! after the first read.

use crate::permissions::{Coordinates, GeolocationOptions};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Current config schema version
const CURRENT_VERSION: u32 = 2;

/// Global config instance for caching
static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema version for migrations
    pub version: u32,
    /// Remote service settings
    pub api: ApiConfig,
    /// Incident session behaviour
    pub session: SessionConfig,
    /// Speech synthesis settings
    pub speech: SpeechConfig,
    /// One-shot positioning settings
    pub geolocation: GeolocationConfig,
    /// CPR metronome settings
    pub metronome: MetronomeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            api: ApiConfig::default(),
            session: SessionConfig::default(),
            speech: SpeechConfig::default(),
            geolocation: GeolocationConfig::default(),
            metronome: MetronomeConfig::default(),
        }
    }
}

/// Remote service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Service base URL
    pub base_url: String,
    /// Client-side request timeout (None waits indefinitely)
    pub timeout_secs: Option<u64>,
    /// Bearer token seeded into the token store at startup
    pub auth_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: None,
            auth_token: None,
        }
    }
}

/// Incident session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Locale sent with triage requests
    pub locale: String,
    /// Language tag used for speech capture
    pub recognition_language: String,
    /// Delay between the critical announcement and the dispatch dial
    pub dispatch_delay_ms: u64,
    /// Radius for contact alerts in metres
    pub alert_radius_m: u32,
    /// Number dialled when triage does not name one
    pub default_dispatch_number: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            locale: "en".to_string(),
            recognition_language: "en-US".to_string(),
            dispatch_delay_ms: 2000,
            alert_radius_m: 500,
            default_dispatch_number: "911".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn dispatch_delay(&self) -> Duration {
        Duration::from_millis(self.dispatch_delay_ms)
    }
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    /// Voice name fragments tried in order when picking a voice
    pub preferred_voices: Vec<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            preferred_voices: vec!["Google".to_string(), "Microsoft".to_string()],
        }
    }
}

/// Positioning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeolocationConfig {
    pub high_accuracy: bool,
    pub timeout_ms: u64,
    /// Maximum age of a cached position (0 forces a fresh fix)
    pub max_age_ms: u64,
    /// Fixed position for front-ends without positioning hardware
    pub fixed_location: Option<Coordinates>,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: 10_000,
            max_age_ms: 0,
            fixed_location: None,
        }
    }
}

impl GeolocationConfig {
    pub fn options(&self) -> GeolocationOptions {
        GeolocationOptions {
            high_accuracy: self.high_accuracy,
            timeout: Duration::from_millis(self.timeout_ms),
            maximum_age: Duration::from_millis(self.max_age_ms),
        }
    }
}

/// CPR metronome configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    /// Whether the metronome plays an audible click
    pub play_sounds: bool,
    pub tone_frequency_hz: f32,
    pub tone_duration_ms: u64,
    /// How long the visual beat stays lit
    pub beat_flash_ms: u64,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            play_sounds: true,
            tone_frequency_hz: 800.0,
            tone_duration_ms: 100,
            beat_flash_ms: 150,
        }
    }
}

/// Get the path to the config file (~/.mediassist/config.json)
pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.json")
}

/// Get the path to the config directory (~/.mediassist)
pub fn get_config_dir() -> PathBuf {
    home_dir_or_fallback().join(".mediassist")
}

/// Get the home directory, falling back to /tmp if unavailable
fn home_dir_or_fallback() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        tracing::error!("Could not determine home directory, using /tmp");
        PathBuf::from("/tmp")
    })
}

/// Load configuration from an explicit path
///
/// A missing file yields the defaults. Older schema versions are migrated and
/// written back.
pub fn load_from_path(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        tracing::info!("Config file not found at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let contents =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config file: {}", e))?;

    let config: Config =
        serde_json::from_str(&contents).map_err(|e| format!("Failed to parse config: {}", e))?;

    let original_version = config.version;
    let migrated = migrate_config(config)?;
    if migrated.version != original_version {
        save_to_path(path, &migrated)?;
    }

    Ok(migrated)
}

/// Save configuration to an explicit path, creating parent directories
pub fn save_to_path(path: &Path, config: &Config) -> Result<(), String> {
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }
    }

    let contents = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialise config: {}", e))?;

    fs::write(path, contents).map_err(|e| format!("Failed to write config file: {}", e))?;

    tracing::info!("Config saved to {}", path.display());
    Ok(())
}

/// Migrate configuration from older schema versions
fn migrate_config(mut config: Config) -> Result<Config, String> {
    let original_version = config.version;

    while config.version < CURRENT_VERSION {
        config = apply_migration(config)?;
    }

    if config.version != original_version {
        tracing::info!(
            "Migrated config from version {} to {}",
            original_version,
            config.version
        );
    }

    Ok(config)
}

/// Apply a single migration step
fn apply_migration(config: Config) -> Result<Config, String> {
    match config.version {
        0 => {
            let mut migrated = config;
            migrated.version = 1;
            Ok(migrated)
        }
        // Version 1 -> 2: the metronome section gained the flash duration; a
        // zero value left over from hand-edited files would hide every beat.
        1 => {
            let mut migrated = config;
            if migrated.metronome.beat_flash_ms == 0 {
                migrated.metronome.beat_flash_ms = MetronomeConfig::default().beat_flash_ms;
            }
            migrated.version = 2;
            Ok(migrated)
        }
        v => Err(format!("Unknown config version: {}", v)),
    }
}

/// Get the global config instance
fn get_config_instance() -> &'static RwLock<Config> {
    CONFIG.get_or_init(|| {
        let config = load_from_path(&get_config_path()).unwrap_or_else(|e| {
            tracing::error!("Failed to load config, using defaults: {}", e);
            Config::default()
        });
        tracing::info!("Config loaded (api base_url={})", config.api.base_url);
        RwLock::new(config)
    })
}

/// Get the current configuration
pub fn get_config() -> Result<Config, String> {
    let config = get_config_instance().read().clone();
    Ok(config)
}

/// Replace the configuration and persist it to disk
pub fn set_config(mut config: Config) -> Result<(), String> {
    config.version = CURRENT_VERSION;

    save_to_path(&get_config_path(), &config)?;

    let mut cached = get_config_instance().write();
    *cached = config;

    tracing::info!("Configuration updated");
    Ok(())
}

/// Reset configuration to defaults and persist it
pub fn reset_config() -> Result<Config, String> {
    let default_config = Config::default();

    save_to_path(&get_config_path(), &default_config)?;

    let mut cached = get_config_instance().write();
    *cached = default_config.clone();

    tracing::info!("Configuration reset to defaults");
    Ok(default_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_current_version() {
        let config = Config::default();
        assert_eq!(config.version, CURRENT_VERSION);
    }

    #[test]
    fn test_session_config_defaults() {
        let session = SessionConfig::default();
        assert_eq!(session.locale, "en");
        assert_eq!(session.recognition_language, "en-US");
        assert_eq!(session.dispatch_delay(), Duration::from_secs(2));
        assert_eq!(session.alert_radius_m, 500);
        assert_eq!(session.default_dispatch_number, "911");
    }

    #[test]
    fn test_api_config_defaults() {
        let api = ApiConfig::default();
        assert_eq!(api.base_url, "http://localhost:8000");
        assert!(api.timeout_secs.is_none());
        assert!(api.auth_token.is_none());
    }

    #[test]
    fn test_geolocation_options() {
        let options = GeolocationConfig::default().options();
        assert!(options.high_accuracy);
        assert_eq!(options.timeout, Duration::from_secs(10));
        assert_eq!(options.maximum_age, Duration::ZERO);
    }

    #[test]
    fn test_metronome_config_defaults() {
        let metronome = MetronomeConfig::default();
        assert!(metronome.play_sounds);
        assert_eq!(metronome.tone_frequency_hz, 800.0);
        assert_eq!(metronome.tone_duration_ms, 100);
        assert_eq!(metronome.beat_flash_ms, 150);
    }

    #[test]
    fn test_partial_config_deserialisation() {
        let json = r#"{"version": 2, "session": {"dispatch_delay_ms": 500}}"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.session.dispatch_delay_ms, 500);
        assert_eq!(config.session.locale, "en");
        assert_eq!(config.api.base_url, "http://localhost:8000");
    }

    #[test]
    fn test_fixed_location_deserialisation() {
        let json = r#"{"geolocation": {"fixed_location": {"latitude": 42.96, "longitude": -78.74}}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let location = config.geolocation.fixed_location.unwrap();
        assert_eq!(location.latitude, 42.96);
        assert_eq!(location.longitude, -78.74);
    }

    #[test]
    fn test_migration_from_version_0() {
        let old_config = Config {
            version: 0,
            ..Default::default()
        };

        let migrated = migrate_config(old_config).unwrap();
        assert_eq!(migrated.version, CURRENT_VERSION);
    }

    #[test]
    fn test_migration_restores_zero_flash() {
        let mut old_config = Config {
            version: 1,
            ..Default::default()
        };
        old_config.metronome.beat_flash_ms = 0;

        let migrated = migrate_config(old_config).unwrap();
        assert_eq!(migrated.metronome.beat_flash_ms, 150);
    }

    #[test]
    fn test_apply_migration_unknown_version() {
        let future_config = Config {
            version: 999,
            ..Default::default()
        };

        let result = apply_migration(future_config);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("Unknown config version"));
    }

    #[test]
    fn test_config_path_format() {
        let path = get_config_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.contains(".mediassist"));
        assert!(path_str.ends_with("config.json"));
    }
}
