//! Configuration module for StudySync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for StudySync.
///
/// Every section is optional in the YAML file; missing sections and fields
/// take their default values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
    pub connectivity: ConnectivityConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Remote study server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the study server, without a trailing path.
    pub base_url: String,
    /// Bearer token added to every request, if set.
    pub auth_token: Option<String>,
    /// Per-request timeout in seconds. A timeout counts as a transient failure.
    pub request_timeout_secs: u64,
}

/// Sync queue processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Transient failures tolerated before an item is dead-lettered.
    pub max_retries: u32,
    /// Upper bound on the wait between two items of the same pass (ms).
    pub max_inter_item_wait_ms: u64,
    /// Backoff base delay (ms), doubled for every retry.
    pub base_backoff_ms: u64,
    /// Cap applied to the backoff delay before jitter (ms).
    pub max_backoff_ms: u64,
}

/// Question cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Questions fetched per certification when no count is given.
    pub default_question_count: u32,
    /// Days a cached question set stays fresh.
    pub ttl_days: u32,
    /// Hours between periodic cache refreshes.
    pub refresh_interval_hours: u64,
    /// Seconds after startup before the first fallback refresh.
    pub startup_refresh_delay_secs: u64,
    /// Certifications refreshed periodically in addition to cached ones.
    pub certifications: Vec<i64>,
}

/// Connectivity probing settings (daemon only).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Seconds between health probes.
    pub probe_interval_secs: u64,
}

/// Local storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,
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
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/studysync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("studysync")
            .join("config.yaml")
    }

    /// Serialize the configuration back to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            auth_token: None,
            request_timeout_secs: 30,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            max_inter_item_wait_ms: 2000,
            base_backoff_ms: 1000,
            max_backoff_ms: 60_000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_question_count: 200,
            ttl_days: 7,
            refresh_interval_hours: 24,
            startup_refresh_delay_secs: 10,
            certifications: Vec::new(),
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: 15,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("studysync")
                .join("studysync.db"),
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
    /// Dotted path to the offending field, e.g. `"sync.max_retries"`.
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

fn must_be_positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- api ---
        let base_url = self.api.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            errors.push(ValidationError {
                field: "api.base_url".into(),
                message: format!("must be an http(s) URL, got '{}'", self.api.base_url),
            });
        }
        if matches!(&self.api.auth_token, Some(token) if token.trim().is_empty()) {
            errors.push(ValidationError {
                field: "api.auth_token".into(),
                message: "must not be empty when set".into(),
            });
        }
        must_be_positive(
            &mut errors,
            "api.request_timeout_secs",
            self.api.request_timeout_secs,
        );

        // --- sync ---
        must_be_positive(&mut errors, "sync.max_retries", self.sync.max_retries.into());
        must_be_positive(&mut errors, "sync.base_backoff_ms", self.sync.base_backoff_ms);
        if self.sync.max_backoff_ms < self.sync.base_backoff_ms {
            errors.push(ValidationError {
                field: "sync.max_backoff_ms".into(),
                message: format!(
                    "max_backoff_ms ({}) must not be below base_backoff_ms ({})",
                    self.sync.max_backoff_ms, self.sync.base_backoff_ms
                ),
            });
        }

        // --- cache ---
        must_be_positive(
            &mut errors,
            "cache.default_question_count",
            self.cache.default_question_count.into(),
        );
        must_be_positive(&mut errors, "cache.ttl_days", self.cache.ttl_days.into());
        must_be_positive(
            &mut errors,
            "cache.refresh_interval_hours",
            self.cache.refresh_interval_hours,
        );
        if let Some(bad) = self.cache.certifications.iter().find(|id| **id <= 0) {
            errors.push(ValidationError {
                field: "cache.certifications".into(),
                message: format!("certification ids must be positive, got {bad}"),
            });
        }

        // --- connectivity ---
        must_be_positive(
            &mut errors,
            "connectivity.probe_interval_secs",
            self.connectivity.probe_interval_secs,
        );

        // --- storage ---
        if self.storage.database_path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.database_path".into(),
                message: "must not be empty".into(),
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
/// use studysync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .api_base_url("https://study.example.com")
///     .sync_max_retries(3)
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

    // --- api ---

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api.base_url = url.into();
        self
    }

    pub fn api_auth_token(mut self, token: impl Into<String>) -> Self {
        self.config.api.auth_token = Some(token.into());
        self
    }

    pub fn api_request_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.api.request_timeout_secs = seconds;
        self
    }

    // --- sync ---

    pub fn sync_max_retries(mut self, n: u32) -> Self {
        self.config.sync.max_retries = n;
        self
    }

    pub fn sync_max_inter_item_wait_ms(mut self, ms: u64) -> Self {
        self.config.sync.max_inter_item_wait_ms = ms;
        self
    }

    pub fn sync_base_backoff_ms(mut self, ms: u64) -> Self {
        self.config.sync.base_backoff_ms = ms;
        self
    }

    pub fn sync_max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.sync.max_backoff_ms = ms;
        self
    }

    // --- cache ---

    pub fn cache_default_question_count(mut self, n: u32) -> Self {
        self.config.cache.default_question_count = n;
        self
    }

    pub fn cache_ttl_days(mut self, days: u32) -> Self {
        self.config.cache.ttl_days = days;
        self
    }

    pub fn cache_refresh_interval_hours(mut self, hours: u64) -> Self {
        self.config.cache.refresh_interval_hours = hours;
        self
    }

    pub fn cache_startup_refresh_delay_secs(mut self, seconds: u64) -> Self {
        self.config.cache.startup_refresh_delay_secs = seconds;
        self
    }

    pub fn cache_certifications(mut self, ids: Vec<i64>) -> Self {
        self.config.cache.certifications = ids;
        self
    }

    // --- connectivity ---

    pub fn connectivity_probe_interval_secs(mut self, seconds: u64) -> Self {
        self.config.connectivity.probe_interval_secs = seconds;
        self
    }

    // --- storage ---

    pub fn storage_database_path(mut self, path: PathBuf) -> Self {
        self.config.storage.database_path = path;
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
