//! Configuration loading and typed config structures for the Hotspot viewer.
//!
//! The configuration lives in `hotspot.yaml` (path overridable through
//! `HOTSPOT_CONFIG`). Every section has defaults, so an empty file is a
//! valid configuration apart from having no schemas.

use std::path::Path;

use hotspot_types::{Aabb, SchemaDef, SchemaError, SchemaTable, Vec3};
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level viewer configuration, mirroring `hotspot.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HotspotConfig {
    /// Store connection settings.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Stream discovery settings.
    #[serde(default)]
    pub streams: StreamsConfig,

    /// Main loop timing.
    #[serde(default)]
    pub viewer: LoopConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Registered message schemas.
    #[serde(default)]
    pub schemas: Vec<SchemaDef>,

    /// Surfaces created at startup.
    #[serde(default)]
    pub surfaces: Vec<SurfaceConfig>,
}

impl HotspotConfig {
    /// Load configuration from a YAML file.
    ///
    /// Environment overrides are applied after parsing:
    /// - `REDIS_URL` overrides `redis.url`
    /// - `HOTSPOT_STREAM` overrides `streams.initial`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string. No env overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Override connection settings with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("REDIS_URL") {
            self.redis.url = val;
        }
        if let Ok(val) = std::env::var("HOTSPOT_STREAM") {
            self.streams.initial = Some(val);
        }
    }

    /// Validate the declared schemas into a [`SchemaTable`].
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the declarations are inconsistent.
    pub fn schema_table(&self) -> Result<SchemaTable, SchemaError> {
        SchemaTable::new(self.schemas.clone())
    }
}

/// Store connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RedisConfig {
    /// Redis-protocol connection URL.
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Logical database index. Pub/sub channels are global; only snapshot
    /// reads are affected.
    #[serde(default)]
    pub database: u8,

    /// Capacity of the subscriber's message broadcast buffer.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            database: 0,
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

/// Stream discovery settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamsConfig {
    /// Key of the list holding known stream identifiers.
    #[serde(default = "default_stream_list_key")]
    pub list_key: String,

    /// How often the stream list is re-read, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Activate the newest listed stream while no stream is active.
    #[serde(default = "default_true")]
    pub auto_connect: bool,

    /// Stream to activate at startup, if any.
    #[serde(default)]
    pub initial: Option<String>,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            list_key: default_stream_list_key(),
            poll_interval_ms: default_poll_interval_ms(),
            auto_connect: default_true(),
            initial: None,
        }
    }
}

/// Main loop timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoopConfig {
    /// Interval between ticks, in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Delay before a failed readback is reissued, in milliseconds.
    #[serde(default = "default_readback_retry_ms")]
    pub readback_retry_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            readback_retry_ms: default_readback_retry_ms(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// A surface created at startup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SurfaceConfig {
    /// Display name.
    pub name: String,
    /// One corner of the bounding box.
    pub min: [f32; 3],
    /// The opposite corner.
    pub max: [f32; 3],
}

impl SurfaceConfig {
    /// World-space bounds of the surface.
    pub fn bounds(&self) -> Aabb {
        let [ax, ay, az] = self.min;
        let [bx, by, bz] = self.max;
        Aabb::new(Vec3::new(ax, ay, az), Vec3::new(bx, by, bz))
    }
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_redis_url() -> String {
    "redis://localhost:6379".to_owned()
}

const fn default_broadcast_capacity() -> usize {
    4096
}

fn default_stream_list_key() -> String {
    hotspot_types::keys::STREAM_LIST_KEY.to_owned()
}

const fn default_poll_interval_ms() -> u64 {
    2000
}

const fn default_tick_interval_ms() -> u64 {
    16
}

const fn default_readback_retry_ms() -> u64 {
    200
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use hotspot_types::SchemaRole;

    #[test]
    fn default_config_is_valid() {
        let config = HotspotConfig::default();
        assert_eq!(config.redis.url, "redis://localhost:6379");
        assert_eq!(config.streams.list_key, "event_streams");
        assert_eq!(config.streams.poll_interval_ms, 2000);
        assert!(config.streams.auto_connect);
        assert_eq!(config.viewer.readback_retry_ms, 200);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.schema_table().unwrap().is_empty());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
redis:
  url: "redis://testhost:6380"
  database: 2
  broadcast_capacity: 128

streams:
  poll_interval_ms: 500
  auto_connect: false
  initial: "match-42"

viewer:
  tick_interval_ms: 33
  readback_retry_ms: 100

logging:
  level: "debug"
  format: json

schemas:
  - name: PlayerDamaged
    encoding: text
    storage: list
    fields:
      - { name: position, kind: pos3 }
      - { name: weapon, kind: int, tracked: true }
    point_events:
      - { field: position, radius: "2.0", weight: "1.0" }

surfaces:
  - { name: floor, min: [0.0, 0.0, 0.0], max: [10.0, 1.0, 10.0] }
"#;
        let config = HotspotConfig::parse(yaml).unwrap();
        assert_eq!(config.redis.url, "redis://testhost:6380");
        assert_eq!(config.redis.database, 2);
        assert_eq!(config.redis.broadcast_capacity, 128);
        assert_eq!(config.streams.initial.as_deref(), Some("match-42"));
        assert!(!config.streams.auto_connect);
        assert_eq!(config.viewer.tick_interval_ms, 33);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.schema_table().unwrap().len(), 1);
        let surface = config.surfaces.first().unwrap();
        assert!(surface.bounds().contains(Vec3::new(5.0, 0.5, 5.0)));
    }

    #[test]
    fn empty_yaml_uses_defaults() {
        let config = HotspotConfig::parse("{}").unwrap();
        assert_eq!(config, HotspotConfig::default());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(matches!(
            HotspotConfig::parse("redis: [unterminated"),
            Err(ConfigError::Yaml { .. })
        ));
    }

    #[test]
    fn bundled_config_builds_a_schema_table() {
        let config = HotspotConfig::parse(include_str!("../../../hotspot.yaml")).unwrap();
        let table = config.schema_table().unwrap();
        assert_eq!(table.len(), 8);
        assert_eq!(table.with_role(SchemaRole::Event).count(), 2);
        assert_eq!(config.surfaces.len(), 1);
        assert!(config.streams.initial.is_none());
    }
}
