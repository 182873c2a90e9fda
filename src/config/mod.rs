//! Configuration management for partition-export
//!
//! This module handles loading, parsing, and validating configuration from:
//! - Configuration files (TOML format)
//! - Environment variables
//! - Command-line arguments (applied by the `cli` module)
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::RetryPolicy;
use crate::connection::redact_endpoint;
use crate::domain::FieldKind;
use crate::domain::string::{DEFAULT_STRING_LENGTH, MAX_STRING_LENGTH};
use crate::error::{ConfigError, Result};

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "PARTITION_EXPORT_";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote index location and credentials
    #[serde(default)]
    pub source: SourceConfig,

    /// Ordering field and partition sizing
    #[serde(default)]
    pub partition: PartitionConfig,

    /// Export job settings
    #[serde(default)]
    pub export: ExportConfig,

    /// Transport retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Service endpoint URI
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Database holding the index
    #[serde(default)]
    pub database: String,

    /// Index (collection) name
    #[serde(default)]
    pub index_name: String,

    /// Optional username; the endpoint's own credentials apply otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Optional password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Connection and server selection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Maximum number of results a single query can retrieve
    #[serde(default = "default_max_result_window")]
    pub max_result_window: u64,
}

/// Partitioning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Ordering field used as the partition key
    #[serde(default)]
    pub field_name: String,

    /// Kind of values in the ordering field
    #[serde(default = "default_field_kind")]
    pub field_kind: FieldKind,

    /// Maximum documents per partition
    #[serde(default = "default_max_partition_size")]
    pub max_partition_size: u64,

    /// Longest probe string for string ordering fields
    #[serde(default = "default_string_max_length")]
    pub string_max_length: usize,
}

/// Export job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory for the manifest and exported partition files
    #[serde(default = "default_export_directory")]
    pub directory: PathBuf,

    /// Partitions exported in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Documents per result page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Only export these partition ids
    #[serde(default)]
    pub include_partitions: Vec<usize>,

    /// Skip these partition ids
    #[serde(default)]
    pub exclude_partitions: Vec<usize>,

    /// Only request these fields
    #[serde(default)]
    pub include_fields: Vec<String>,

    /// Do not request these fields
    #[serde(default)]
    pub exclude_fields: Vec<String>,

    /// Fields known to exist in the index
    #[serde(default)]
    pub schema_fields: Vec<String>,

    /// Display a progress bar while exporting
    #[serde(default)]
    pub show_progress: bool,
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff unit in milliseconds; retry n waits base * 2^n
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_endpoint() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_result_window() -> u64 {
    100_000
}

fn default_field_kind() -> FieldKind {
    FieldKind::Timestamp
}

fn default_max_partition_size() -> u64 {
    100_000
}

fn default_string_max_length() -> usize {
    DEFAULT_STRING_LENGTH
}

fn default_export_directory() -> PathBuf {
    PathBuf::from("export")
}

fn default_concurrency() -> usize {
    2
}

fn default_page_size() -> u32 {
    1000
}

fn default_max_retries() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            database: String::new(),
            index_name: String::new(),
            username: None,
            password: None,
            timeout: default_timeout(),
            max_result_window: default_max_result_window(),
        }
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            field_name: String::new(),
            field_kind: default_field_kind(),
            max_partition_size: default_max_partition_size(),
            string_max_length: default_string_max_length(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: default_export_directory(),
            concurrency: default_concurrency(),
            page_size: default_page_size(),
            include_partitions: Vec::new(),
            exclude_partitions: Vec::new(),
            include_fields: Vec::new(),
            exclude_fields: Vec::new(),
            schema_fields: Vec::new(),
            show_progress: false,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// With no explicit path the default location is tried and a missing
    /// file yields the defaults. An explicit path must exist.
    ///
    /// # Arguments
    /// * `path` - Optional path to the configuration file
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigError::FileNotFound(path.display().to_string()).into());
            }
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Serialize configuration to TOML text
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Apply `PARTITION_EXPORT_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.is_empty());

        if let Some(v) = get("ENDPOINT") {
            self.source.endpoint = v;
        }
        if let Some(v) = get("DATABASE") {
            self.source.database = v;
        }
        if let Some(v) = get("INDEX_NAME") {
            self.source.index_name = v;
        }
        if let Some(v) = get("USERNAME") {
            self.source.username = Some(v);
        }
        if let Some(v) = get("PASSWORD") {
            self.source.password = Some(v);
        }
        if let Some(v) = get("EXPORT_DIRECTORY") {
            self.export.directory = PathBuf::from(v);
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".partition-export")
            .join("config.toml")
    }

    /// Validate the configuration
    ///
    /// Runs before any remote call so that configuration mistakes fail fast.
    pub fn validate(&self) -> Result<()> {
        self.source.validate_endpoint()?;

        if self.source.database.trim().is_empty() {
            return Err(ConfigError::MissingField("source.database".to_string()).into());
        }
        if self.source.index_name.trim().is_empty() {
            return Err(ConfigError::MissingField("source.index_name".to_string()).into());
        }
        if self.partition.field_name.trim().is_empty() {
            return Err(ConfigError::MissingField("partition.field_name".to_string()).into());
        }

        let positive: [(&str, u64); 4] = [
            ("source.max_result_window", self.source.max_result_window),
            ("partition.max_partition_size", self.partition.max_partition_size),
            ("export.concurrency", self.export.concurrency as u64),
            ("export.page_size", u64::from(self.export.page_size)),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                }
                .into());
            }
        }

        if self.partition.string_max_length == 0
            || self.partition.string_max_length > MAX_STRING_LENGTH
        {
            return Err(ConfigError::InvalidValue {
                field: "partition.string_max_length".to_string(),
                value: self.partition.string_max_length.to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Whether partitions may be larger than a single query can return
    pub fn partitions_exceed_window(&self) -> bool {
        self.partition.max_partition_size > self.source.max_result_window
    }

    /// Path of the partition manifest for the configured index
    pub fn manifest_path(&self) -> PathBuf {
        self.export
            .directory
            .join(format!("{}-partitions.json", self.source.index_name))
    }

    /// Retry policy for remote calls
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            Duration::from_millis(self.retry.base_delay_ms),
        )
    }
}

impl SourceConfig {
    /// Connect and server selection timeout
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Check that the endpoint is an absolute MongoDB URI
    ///
    /// Errors carry the endpoint with its password masked.
    pub fn validate_endpoint(&self) -> Result<()> {
        let invalid = || ConfigError::InvalidValue {
            field: "source.endpoint".to_string(),
            value: redact_endpoint(&self.endpoint),
        };

        let rest = self
            .endpoint
            .strip_prefix("mongodb://")
            .or_else(|| self.endpoint.strip_prefix("mongodb+srv://"))
            .ok_or_else(invalid)?;

        // host part: after optional credentials, before path or options
        let host = rest.rsplit_once('@').map_or(rest, |(_, h)| h);
        let host = host.split(['/', '?']).next().unwrap_or("");
        if host.is_empty() {
            return Err(invalid().into());
        }
        Ok(())
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid() -> Config {
        let mut config = Config::default();
        config.source.database = "search".into();
        config.source.index_name = "documents".into();
        config.partition.field_name = "timestamp".into();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.source.endpoint, "mongodb://localhost:27017");
        assert_eq!(config.export.concurrency, 2);
        assert_eq!(config.export.page_size, 1000);
        assert_eq!(config.partition.field_kind, FieldKind::Timestamp);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_validate_fails_fast_on_missing_index() {
        assert!(valid().validate().is_ok());

        let mut config = valid();
        config.source.index_name.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("source.index_name"));
    }

    #[test]
    fn test_validate_endpoint() {
        let mut config = valid();
        for bad in ["localhost:27017", "http://host", "mongodb://", "mongodb://user@/db"] {
            config.source.endpoint = bad.into();
            assert!(config.validate().is_err(), "accepted {bad}");
        }
        for good in [
            "mongodb://localhost",
            "mongodb://u:p@db1:27017,db2:27017/search?replicaSet=rs0",
            "mongodb+srv://cluster0.example.net",
        ] {
            config.source.endpoint = good.into();
            assert!(config.validate().is_ok(), "rejected {good}");
        }
    }

    #[test]
    fn test_invalid_endpoint_error_masks_password() {
        let mut config = valid();
        config.source.endpoint = "mongodb://admin:s3cret@/db".into();

        let message = config.source.validate_endpoint().unwrap_err().to_string();
        assert!(!message.contains("s3cret"), "{message}");
        assert!(message.contains("admin:***@"), "{message}");
    }

    #[test]
    fn test_connection_timeout() {
        let mut config = valid();
        config.source.timeout = 7;
        assert_eq!(config.source.connection_timeout(), Duration::from_secs(7));
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let mut config = valid();
        config.export.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.partition.string_max_length = MAX_STRING_LENGTH + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_partial_file_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [source]
            database = "search"
            index_name = "docs"

            [partition]
            field_name = "id"
            field_kind = "integer"
            max_partition_size = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.source.index_name, "docs");
        assert_eq!(config.partition.field_kind, FieldKind::Integer);
        assert_eq!(config.partition.max_partition_size, 50);
        assert_eq!(config.export.concurrency, 2);
        assert!(config.validate().is_ok());

        let text = config.to_toml().unwrap();
        let back = Config::from_toml(&text).unwrap();
        assert_eq!(back.partition.max_partition_size, 50);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<String, String> = [
            ("PARTITION_EXPORT_INDEX_NAME", "from-env"),
            ("PARTITION_EXPORT_EXPORT_DIRECTORY", "/tmp/out"),
            ("PARTITION_EXPORT_DATABASE", ""),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let mut config = valid();
        config.apply_env_with(|k| vars.get(k).cloned());
        assert_eq!(config.source.index_name, "from-env");
        assert_eq!(config.export.directory, PathBuf::from("/tmp/out"));
        // empty values do not override
        assert_eq!(config.source.database, "search");
    }

    #[test]
    fn test_manifest_path() {
        let config = valid();
        assert_eq!(
            config.manifest_path(),
            PathBuf::from("export").join("documents-partitions.json")
        );
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let path = std::env::temp_dir().join("partition-export-no-such-config.toml");
        assert!(Config::load_from_file(Some(&path)).is_err());
    }
}
