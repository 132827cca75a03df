//! Configuration management for clipkeep.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::cache::{DEFAULT_IMAGE_CAPACITY, DEFAULT_METADATA_TTL};
use crate::error::{Error, Result};
use crate::stabilize::{RelatedRule, DEFAULT_BURST_WINDOW, DEFAULT_WINDOW};
use crate::storage::MAX_PINNED;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "clipkeep";

/// Default clipboard history database file name.
const DATABASE_FILE_NAME: &str = "clipboard.db";

/// Default threat memory database file name.
const THREAT_DATABASE_FILE_NAME: &str = "threats.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `CLIPKEEP_`, sections split by `__`)
/// 2. TOML config file at `~/.config/clipkeep/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Capture configuration.
    pub capture: CaptureConfig,
    /// Security classifier configuration.
    pub security: SecurityConfig,
    /// Cache configuration.
    pub cache: CacheConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the clipboard history database.
    /// Defaults to `~/.local/share/clipkeep/clipboard.db`
    pub database_path: Option<PathBuf>,
    /// Path to the threat memory database.
    /// Defaults to `~/.local/share/clipkeep/threats.db`
    pub threat_database_path: Option<PathBuf>,
    /// Maximum number of history items to retain.
    /// Set to 0 for unlimited.
    pub max_items: usize,
}

/// Which clipboard backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Watch-notified on Wayland, immediate-read elsewhere.
    #[default]
    Auto,
    /// Always read the clipboard directly on every tick.
    Immediate,
    /// Always try the watch-notified backend first.
    Watch,
}

/// How raw text changes are grouped into one selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelatedKind {
    /// Only substring extensions and shrinks are grouped.
    #[default]
    Containment,
    /// Substring changes, plus any change within `burst_window_ms` of the
    /// previous one.
    ContainmentOrBurst,
}

/// Capture-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Backend selection.
    pub backend: BackendKind,
    /// Poll interval for the immediate-read backend in milliseconds.
    pub poll_interval_ms: u64,
    /// Poll interval for the watch-notified backend in milliseconds.
    pub watch_poll_interval_ms: u64,
    /// Quiet period after the last related change before a selection is
    /// considered stable, in milliseconds.
    pub stabilize_window_ms: u64,
    /// Rule deciding whether a change continues the current selection.
    pub related: RelatedKind,
    /// Burst window for `containment_or_burst`, in milliseconds.
    pub burst_window_ms: u64,
    /// Give up on a clipboard read after this many milliseconds.
    pub read_timeout_ms: u64,
    /// Image payloads of this many bytes or fewer are ignored.
    pub min_image_bytes: usize,
    /// Maximum text length to capture; longer text is truncated.
    pub max_content_length: usize,
}

/// Security classifier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Classify captured text. When disabled every item is stored as safe.
    pub enabled: bool,
    /// Emit threat notifications for content that has not been dismissed.
    pub notify_threats: bool,
}

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Number of image payloads kept in memory.
    pub image_capacity: usize,
    /// Seconds before cached metadata is considered stale.
    pub metadata_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            threat_database_path: None,
            max_items: 1000,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Auto,
            poll_interval_ms: 500,
            watch_poll_interval_ms: 100,
            stabilize_window_ms: millis(DEFAULT_WINDOW),
            related: RelatedKind::Containment,
            burst_window_ms: millis(DEFAULT_BURST_WINDOW),
            read_timeout_ms: 2000,
            min_image_bytes: 16,
            max_content_length: 1_000_000,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            notify_threats: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            image_capacity: DEFAULT_IMAGE_CAPACITY,
            metadata_ttl_secs: DEFAULT_METADATA_TTL.as_secs(),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

impl CaptureConfig {
    /// Tick interval for the immediate-read backend.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Tick interval for the watch-notified backend.
    #[must_use]
    pub fn watch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.watch_poll_interval_ms)
    }

    /// Upper bound on a single clipboard read.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl CacheConfig {
    /// Get the metadata cache time-to-live.
    #[must_use]
    pub fn metadata_ttl(&self) -> Duration {
        Duration::from_secs(self.metadata_ttl_secs)
    }
}

impl Config {
    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("CLIPKEEP_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let max_pinned = MAX_PINNED as usize;
        if (1..=max_pinned).contains(&self.storage.max_items) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "max_items ({}) must be 0 (unlimited) or greater than {max_pinned}",
                    self.storage.max_items
                ),
            });
        }

        for (name, value) in [
            ("poll_interval_ms", self.capture.poll_interval_ms),
            ("watch_poll_interval_ms", self.capture.watch_poll_interval_ms),
            ("stabilize_window_ms", self.capture.stabilize_window_ms),
            ("burst_window_ms", self.capture.burst_window_ms),
            ("read_timeout_ms", self.capture.read_timeout_ms),
        ] {
            if value == 0 {
                return Err(Error::ConfigValidation {
                    message: format!("{name} must be greater than 0"),
                });
            }
        }

        if self.capture.max_content_length == 0 {
            return Err(Error::ConfigValidation {
                message: "max_content_length must be greater than 0".to_string(),
            });
        }

        if self.cache.image_capacity == 0 {
            return Err(Error::ConfigValidation {
                message: "image_capacity must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Get the history database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the threat memory database path, resolving defaults if not set.
    #[must_use]
    pub fn threat_database_path(&self) -> PathBuf {
        self.storage
            .threat_database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(THREAT_DATABASE_FILE_NAME))
    }

    /// Get the stabilization window.
    #[must_use]
    pub fn stabilize_window(&self) -> Duration {
        Duration::from_millis(self.capture.stabilize_window_ms)
    }

    /// Get the rule used to decide whether two raw changes are related.
    #[must_use]
    pub fn related_rule(&self) -> RelatedRule {
        match self.capture.related {
            RelatedKind::Containment => RelatedRule::Containment,
            RelatedKind::ContainmentOrBurst => RelatedRule::ContainmentOrBurst {
                window: Duration::from_millis(self.capture.burst_window_ms),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.capture.backend, BackendKind::Auto);
        assert!(config.security.enabled);
        assert!(config.security.notify_threats);
        assert_eq!(config.storage.max_items, 1000);
    }

    #[test]
    fn test_default_capture_config() {
        let capture = CaptureConfig::default();

        assert_eq!(capture.poll_interval_ms, 500);
        assert_eq!(capture.watch_poll_interval_ms, 100);
        assert_eq!(capture.stabilize_window_ms, 500);
        assert_eq!(capture.related, RelatedKind::Containment);
        assert_eq!(capture.burst_window_ms, 200);
        assert_eq!(capture.read_timeout_ms, 2000);
        assert_eq!(capture.min_image_bytes, 16);
    }

    #[test]
    fn test_default_cache_config() {
        let cache = CacheConfig::default();
        assert_eq!(cache.image_capacity, 50);
        assert_eq!(cache.metadata_ttl_secs, 5);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_unlimited_items() {
        let mut config = Config::default();
        config.storage.max_items = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_cap_below_pin_limit() {
        let mut config = Config::default();
        config.storage.max_items = 10;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_items"));

        config.storage.max_items = 11;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_intervals() {
        let mut config = Config::default();
        config.capture.poll_interval_ms = 0;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("poll_interval_ms"));

        let mut config = Config::default();
        config.capture.stabilize_window_ms = 0;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("stabilize_window_ms"));
    }

    #[test]
    fn test_validate_zero_burst_window() {
        let mut config = Config::default();
        config.capture.burst_window_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.capture.read_timeout_ms = 0;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("read_timeout_ms"));
    }

    #[test]
    fn test_validate_zero_cache_capacity() {
        let mut config = Config::default();
        config.cache.image_capacity = 0;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("image_capacity"));
    }

    #[test]
    fn test_related_rule_from_config() {
        let mut config = Config::default();
        assert_eq!(config.related_rule(), RelatedRule::Containment);

        config.capture.related = RelatedKind::ContainmentOrBurst;
        assert_eq!(
            config.related_rule(),
            RelatedRule::ContainmentOrBurst {
                window: DEFAULT_BURST_WINDOW
            }
        );

        config.capture.burst_window_ms = 50;
        assert_eq!(
            config.related_rule(),
            RelatedRule::ContainmentOrBurst {
                window: Duration::from_millis(50)
            }
        );
    }

    #[test]
    fn test_database_paths_default() {
        let config = Config::default();
        assert!(config
            .database_path()
            .to_string_lossy()
            .contains("clipboard.db"));
        assert!(config
            .threat_database_path()
            .to_string_lossy()
            .contains("threats.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.capture.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.capture.watch_poll_interval(), Duration::from_millis(100));
        assert_eq!(config.capture.read_timeout(), Duration::from_secs(2));
        assert_eq!(config.stabilize_window(), DEFAULT_WINDOW);
        assert_eq!(config.cache.metadata_ttl(), DEFAULT_METADATA_TTL);
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("clipkeep"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!("clipkeep_config_{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[capture]\nbackend = \"immediate\"\nrelated = \"containment_or_burst\"\nburst_window_ms = 150\n\n[cache]\nimage_capacity = 8\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path.clone())).unwrap();
        assert_eq!(config.capture.backend, BackendKind::Immediate);
        assert_eq!(config.capture.related, RelatedKind::ContainmentOrBurst);
        assert_eq!(config.capture.burst_window_ms, 150);
        assert_eq!(config.cache.image_capacity, 8);
        // Untouched values keep their defaults.
        assert_eq!(config.storage.max_items, 1000);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_backend_kind_serialize() {
        let json = serde_json::to_string(&BackendKind::Watch).unwrap();
        assert_eq!(json, "\"watch\"");
    }

    #[test]
    fn test_storage_config_deserialize() {
        let json = r#"{"max_items": 5000}"#;
        let storage: StorageConfig = serde_json::from_str(json).unwrap();
        assert_eq!(storage.max_items, 5000);
        assert!(storage.database_path.is_none());
    }
}
