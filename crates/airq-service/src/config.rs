//! Server configuration.
//!
//! Configuration is read from a TOML file, then environment variables
//! (`OPENWEATHER_API_KEY`, `API_SECRET_KEY`, `AIRQ_BIND`, `AIRQ_DATABASE`),
//! then command-line flags, each layer overriding the previous one.

use std::path::{Path, PathBuf};

use airq_types::Coordinate;
use serde::{Deserialize, Serialize};

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Upstream provider settings.
    pub upstream: UpstreamConfig,
    /// Security settings.
    pub security: SecurityConfig,
    /// Collector settings.
    pub collector: CollectorConfig,
    /// Historical data settings.
    pub history: HistoryConfig,
    /// Cities polled by the collector.
    pub cities: Vec<CityConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            upstream: UpstreamConfig::default(),
            security: SecurityConfig::default(),
            collector: CollectorConfig::default(),
            history: HistoryConfig::default(),
            cities: default_cities(),
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides using `lookup` to resolve variables.
    ///
    /// Empty values are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OPENWEATHER_API_KEY") {
            self.upstream.api_key = Some(key);
        }
        if let Some(key) = get("API_SECRET_KEY") {
            self.security.api_key = Some(key);
        }
        if let Some(bind) = get("AIRQ_BIND") {
            self.server.bind = bind;
        }
        if let Some(path) = get("AIRQ_DATABASE") {
            self.storage.path = PathBuf::from(path);
        }
    }

    /// Validate the configuration and return every problem found.
    ///
    /// ```
    /// use airq_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.upstream.validate());
        errors.extend(self.security.validate());
        errors.extend(self.collector.validate());
        errors.extend(self.history.validate());

        let mut seen_names = std::collections::HashSet::new();
        for (i, city) in self.cities.iter().enumerate() {
            let prefix = format!("cities[{}]", i);
            errors.extend(city.validate(&prefix));

            if !seen_names.insert(city.name.to_lowercase()) {
                errors.push(FieldError {
                    field: format!("{}.name", prefix),
                    message: format!("duplicate city name '{}'", city.name),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// How close (in degrees) a coordinate must be to a city to borrow its name.
pub const LOCATION_NAME_TOLERANCE: f64 = 0.1;

/// The first city within [`LOCATION_NAME_TOLERANCE`] of `coord`.
pub fn city_near<'a>(cities: &'a [CityConfig], coord: &Coordinate) -> Option<&'a CityConfig> {
    cities.iter().find(|city| {
        city.coordinate()
            .is_ok_and(|c| c.is_near(coord, LOCATION_NAME_TOLERANCE))
    })
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:5000").
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(FieldError::new("server.bind", "bind address cannot be empty"));
            return errors;
        }

        let parts: Vec<&str> = self.bind.rsplitn(2, ':').collect();
        if parts.len() != 2 {
            errors.push(FieldError::new(
                "server.bind",
                format!(
                    "invalid bind address '{}': expected format 'host:port'",
                    self.bind
                ),
            ));
            return errors;
        }

        match parts[0].parse::<u16>() {
            Ok(0) => errors.push(FieldError::new("server.bind", "port cannot be 0")),
            Err(_) => errors.push(FieldError::new(
                "server.bind",
                format!("invalid port '{}': must be a number 1-65535", parts[0]),
            )),
            Ok(_) => {}
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: airq_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(FieldError::new("storage.path", "database path cannot be empty"));
        }

        errors
    }
}

/// Default OpenWeatherMap air pollution endpoint.
pub const DEFAULT_UPSTREAM_URL: &str = "http://api.openweathermap.org/data/2.5/air_pollution";

/// Upstream provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the air pollution API.
    pub base_url: String,
    /// Provider API key (`appid`).
    pub api_key: Option<String>,
    /// Request timeout in seconds. Expiry counts as an upstream failure.
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_URL.to_string(),
            api_key: None,
            timeout_secs: 10,
        }
    }
}

/// Maximum upstream timeout in seconds.
pub const MAX_UPSTREAM_TIMEOUT: u64 = 120;

impl UpstreamConfig {
    /// Validate upstream configuration.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            errors.push(FieldError::new(
                "upstream.base_url",
                format!("'{}' must start with http:// or https://", self.base_url),
            ));
        }

        if self.timeout_secs == 0 || self.timeout_secs > MAX_UPSTREAM_TIMEOUT {
            errors.push(FieldError::new(
                "upstream.timeout_secs",
                format!(
                    "timeout {} out of range (1-{} seconds)",
                    self.timeout_secs, MAX_UPSTREAM_TIMEOUT
                ),
            ));
        }

        errors
    }
}

/// Security configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Require the `X-API-Key` header on every route except `/api/health`.
    pub api_key_enabled: bool,
    /// Shared secret expected in `X-API-Key`.
    pub api_key: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_key_enabled: true,
            api_key: None,
        }
    }
}

impl SecurityConfig {
    /// Validate security configuration.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if let Some(key) = &self.api_key
            && key.is_empty()
        {
            errors.push(FieldError::new(
                "security.api_key",
                "api key cannot be empty string (use null/omit instead)",
            ));
        }

        errors
    }
}

/// Minimum collector interval in seconds.
pub const MIN_COLLECT_INTERVAL: u64 = 60;
/// Maximum collector interval in seconds (one day).
pub const MAX_COLLECT_INTERVAL: u64 = 86_400;

/// Collector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Whether the background collector runs.
    pub enabled: bool,
    /// Seconds between collection cycles.
    pub interval_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 900,
        }
    }
}

impl CollectorConfig {
    /// Validate collector configuration.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if self.interval_secs < MIN_COLLECT_INTERVAL {
            errors.push(FieldError::new(
                "collector.interval_secs",
                format!(
                    "interval {} is too short (minimum {} seconds)",
                    self.interval_secs, MIN_COLLECT_INTERVAL
                ),
            ));
        } else if self.interval_secs > MAX_COLLECT_INTERVAL {
            errors.push(FieldError::new(
                "collector.interval_secs",
                format!(
                    "interval {} is too long (maximum {} seconds / 1 day)",
                    self.interval_secs, MAX_COLLECT_INTERVAL
                ),
            ));
        }

        errors
    }
}

/// Maximum number of days seeded at startup.
pub const MAX_HISTORY_DAYS: u32 = 365;

/// Historical data configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Days of hourly history seeded for each city at startup.
    pub days: u32,
    /// Seed missing history for configured cities on startup.
    pub seed_on_startup: bool,
    /// Persist synthetic backfill produced by historical queries.
    pub persist_backfill: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            days: 30,
            seed_on_startup: true,
            persist_backfill: true,
        }
    }
}

impl HistoryConfig {
    /// Validate history configuration.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if self.days == 0 || self.days > MAX_HISTORY_DAYS {
            errors.push(FieldError::new(
                "history.days",
                format!("days {} out of range (1-{})", self.days, MAX_HISTORY_DAYS),
            ));
        }

        errors
    }
}

/// A city polled by the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityConfig {
    /// Display name.
    pub name: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl CityConfig {
    /// Create a city entry.
    pub fn new(name: &str, lat: f64, lon: f64) -> Self {
        Self {
            name: name.to_string(),
            lat,
            lon,
        }
    }

    /// The city's coordinate.
    pub fn coordinate(&self) -> Result<Coordinate, airq_types::ValidationError> {
        Coordinate::new(self.lat, self.lon)
    }

    /// Validate city configuration.
    pub fn validate(&self, prefix: &str) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push(FieldError::new(
                format!("{}.name", prefix),
                "city name cannot be empty",
            ));
        }

        if let Err(e) = self.coordinate() {
            errors.push(FieldError::new(format!("{}.lat/lon", prefix), e.to_string()));
        }

        errors
    }
}

/// Cities collected when the config file does not list any.
pub fn default_cities() -> Vec<CityConfig> {
    vec![
        CityConfig::new("New York", 40.7128, -74.0060),
        CityConfig::new("London", 51.5074, -0.1278),
        CityConfig::new("Tokyo", 35.6762, 139.6503),
        CityConfig::new("Beijing", 39.9042, 116.4074),
        CityConfig::new("Shanghai", 31.2304, 121.4737),
    ]
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_field_errors(.0))]
    Validation(Vec<FieldError>),
}

/// A single validation failure with the offending field.
#[derive(Debug, Clone)]
pub struct FieldError {
    /// The field path (e.g., `server.bind` or `cities[0].name`).
    pub field: String,
    /// Description of the failure.
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("airq")
        .join("server.toml")
}
