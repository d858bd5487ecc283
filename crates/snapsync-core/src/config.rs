//! Configuration module for SnapSync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for SnapSync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub queue: QueueConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

/// Photo backend endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL for REST requests, without trailing slash.
    pub base_url: String,
    /// WebSocket endpoint of the realtime feed.
    pub socket_url: String,
    /// Number of items requested per page.
    pub page_size: usize,
}

/// Upload queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Directory holding the `local`, `staging` and `uploading` trees.
    pub root: PathBuf,
    /// Seconds after which a file left in `uploading` is considered orphaned.
    pub stale_after_secs: u64,
    /// Milliseconds to wait for further triggers before running the queue.
    pub trigger_debounce_ms: u64,
}

/// Local cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// SQLite database for settings and cached pages.
    pub database: PathBuf,
    /// Directory for downloaded image variants.
    pub images: PathBuf,
    /// Downloaded variants older than this many days are deleted.
    pub image_max_age_days: u32,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/snapsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("snapsync")
            .join("config.yaml")
    }
}

impl QueueConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn trigger_debounce(&self) -> Duration {
        Duration::from_millis(self.trigger_debounce_ms)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("snapsync")
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://pics.malliina.com".to_string(),
            socket_url: "wss://pics.malliina.com/sockets".to_string(),
            page_size: 50,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            root: data_dir().join("pictures"),
            stale_after_secs: 6 * 60 * 60,
            trigger_debounce_ms: 500,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("~/.cache"))
            .join("snapsync");
        Self {
            database: data_dir().join("snapsync.db"),
            images: cache_dir.join("images"),
            image_max_age_days: 31,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"backend.page_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- backend ---
        match url::Url::parse(&self.backend.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => errors.push(ValidationError {
                field: "backend.base_url".into(),
                message: format!("not an http(s) URL: {}", self.backend.base_url),
            }),
        }
        if self.backend.base_url.ends_with('/') {
            errors.push(ValidationError {
                field: "backend.base_url".into(),
                message: "must not end with '/'".into(),
            });
        }
        match url::Url::parse(&self.backend.socket_url) {
            Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
            _ => errors.push(ValidationError {
                field: "backend.socket_url".into(),
                message: format!("not a ws(s) URL: {}", self.backend.socket_url),
            }),
        }
        if self.backend.page_size == 0 {
            errors.push(ValidationError {
                field: "backend.page_size".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- queue ---
        if self.queue.stale_after_secs == 0 {
            errors.push(ValidationError {
                field: "queue.stale_after_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- cache ---
        if self.cache.image_max_age_days == 0 {
            errors.push(ValidationError {
                field: "cache.image_max_age_days".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use snapsync_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .backend_base_url("http://localhost:9000")
///     .queue_root(PathBuf::from("/tmp/snapsync"))
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- backend ---

    pub fn backend_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.backend.base_url = url.into();
        self
    }

    pub fn backend_socket_url(mut self, url: impl Into<String>) -> Self {
        self.config.backend.socket_url = url.into();
        self
    }

    pub fn backend_page_size(mut self, n: usize) -> Self {
        self.config.backend.page_size = n;
        self
    }

    // --- queue ---

    pub fn queue_root(mut self, root: PathBuf) -> Self {
        self.config.queue.root = root;
        self
    }

    pub fn queue_stale_after_secs(mut self, seconds: u64) -> Self {
        self.config.queue.stale_after_secs = seconds;
        self
    }

    pub fn queue_trigger_debounce_ms(mut self, millis: u64) -> Self {
        self.config.queue.trigger_debounce_ms = millis;
        self
    }

    // --- cache ---

    pub fn cache_database(mut self, path: PathBuf) -> Self {
        self.config.cache.database = path;
        self
    }

    pub fn cache_images(mut self, path: PathBuf) -> Self {
        self.config.cache.images = path;
        self
    }

    pub fn cache_image_max_age_days(mut self, days: u32) -> Self {
        self.config.cache.image_max_age_days = days;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
