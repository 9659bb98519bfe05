//! Daemon-wide configuration. Deserializes from an optional TOML file;
//! `carbon-daemon`'s CLI layer overlays flags and `CARBON_*` environment
//! variables on top of whatever this produces.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Everything needed to wire up the ingestion pipeline, independent of how
/// the value was assembled (file, env, CLI, or built-in default).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Address and port the line ingestor listens on.
    pub bind: String,
    /// Base directory under which per-key archive files are created.
    pub data_dir: PathBuf,
    /// Path to the retention-schema resolver rule file.
    pub schemas_config: PathBuf,
    /// Path to the aggregation-method resolver rule file.
    pub aggregation_config: PathBuf,
    /// Maximum number of simultaneously open archive file handles.
    pub handle_pool_capacity: usize,
    /// Whether `StorageWriter::send` waits for the write to complete.
    pub write_mode: WriteModeConfig,
    /// `tracing` filter directive, e.g. `"info"` or `"carbon_storage=debug"`.
    pub log_level: String,
    /// How often `DaemonMetrics::report` is called, in seconds.
    pub metrics_report_interval_secs: u64,
}

/// Serializable mirror of `carbon_storage::WriteMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteModeConfig {
    /// `StorageWriter::send` returns once the batch reaches disk.
    Sync,
    /// `StorageWriter::send` returns once the batch is handed off.
    Async,
}

impl From<WriteModeConfig> for carbon_storage::WriteMode {
    fn from(value: WriteModeConfig) -> Self {
        match value {
            WriteModeConfig::Sync => carbon_storage::WriteMode::Sync,
            WriteModeConfig::Async => carbon_storage::WriteMode::Async,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: format!("0.0.0.0:{}", carbon_core::DEFAULT_PORT),
            data_dir: PathBuf::from("./db"),
            schemas_config: PathBuf::from("storage-schemas.conf"),
            aggregation_config: PathBuf::from("storage-aggregation.conf"),
            handle_pool_capacity: carbon_core::DEFAULT_HANDLE_POOL_CAPACITY,
            write_mode: WriteModeConfig::Async,
            log_level: "info".to_string(),
            metrics_report_interval_secs: 60,
        }
    }
}

impl DaemonConfig {
    /// Parse a config from TOML text. Missing fields fall back to
    /// [`DaemonConfig::default`] via `#[serde(default)]`.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = DaemonConfig::from_toml_str("bind = \"127.0.0.1:2004\"\n").unwrap();
        assert_eq!(config.bind, "127.0.0.1:2004");
        assert_eq!(config.handle_pool_capacity, carbon_core::DEFAULT_HANDLE_POOL_CAPACITY);
        assert_eq!(config.write_mode, WriteModeConfig::Async);
    }

    #[test]
    fn empty_document_is_all_defaults() {
        let config = DaemonConfig::from_toml_str("").unwrap();
        let default = DaemonConfig::default();
        assert_eq!(config.bind, default.bind);
        assert_eq!(config.data_dir, default.data_dir);
    }
}
