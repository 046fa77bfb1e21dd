//! Adapter configuration.
//!
//! Loaded once at startup from a YAML file and passed by reference to every
//! component that needs it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{AdapterError, Result};

/// Well-known location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/prometheus-adapter/prometheus_adapter.yaml";

/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_PATH_ENV: &str = "PROMETHEUS_ADAPTER_CONFIG";

/// Top-level adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Base address of the Prometheus server hosting the query API.
    #[serde(default = "default_prometheus_address")]
    pub prometheus_address: String,

    /// Length of the lookback window appended to every query, in minutes.
    /// Should match the period of the external scheduler.
    #[serde(default = "default_upload_interval_minutes")]
    pub upload_interval_minutes: u32,

    /// Timeout applied to every HTTP request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Monitored nodes, in file order.
    pub nodes: IndexMap<String, NodeConfig>,

    #[serde(default)]
    pub sink: SinkConfig,

    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// Optional path for a Prometheus textfile with the adapter's own counters.
    #[serde(default)]
    pub metrics_textfile: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub metrics: Vec<String>,
}

/// Downstream store selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkConfig {
    Table(TableSinkConfig),
    SearchIndex(SearchIndexSinkConfig),
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Table(TableSinkConfig::default())
    }
}

/// DynamoDB table sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSinkConfig {
    #[serde(default = "default_table_name")]
    pub table_name: String,

    #[serde(default = "default_region")]
    pub region: String,

    /// Overrides `https://dynamodb.{region}.amazonaws.com`, e.g. for DynamoDB Local.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Static credentials. When absent the standard `AWS_*` environment
    /// variables are used.
    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,

    #[serde(default)]
    pub session_token: Option<String>,

    #[serde(default)]
    pub attributes: TableAttributes,
}

impl Default for TableSinkConfig {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
            region: default_region(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            attributes: TableAttributes::default(),
        }
    }
}

/// Item attribute names for the enrichment fields and the label map.
/// The defaults match the items already stored in `robot_metrics`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableAttributes {
    #[serde(default = "default_device_attribute")]
    pub device: String,

    #[serde(default = "default_software_version_attribute")]
    pub software_version: String,

    /// Map of every series label, `__name__` included.
    #[serde(default = "default_labels_attribute")]
    pub labels: String,
}

impl Default for TableAttributes {
    fn default() -> Self {
        Self {
            device: default_device_attribute(),
            software_version: default_software_version_attribute(),
            labels: default_labels_attribute(),
        }
    }
}

/// Elasticsearch index sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchIndexSinkConfig {
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl Default for SearchIndexSinkConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            username: None,
            password: None,
        }
    }
}

/// Fields attached to every uploaded record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Fixed device identifier. Defaults to the local hostname.
    #[serde(default)]
    pub device_id: Option<String>,

    /// Fixed software version. Takes precedence over `software_package`.
    #[serde(default)]
    pub software_version: Option<String>,

    /// Debian package whose installed version is reported.
    #[serde(default)]
    pub software_package: Option<String>,

    #[serde(default = "default_dpkg_status_path")]
    pub dpkg_status_path: PathBuf,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            software_version: None,
            software_package: None,
            dpkg_status_path: default_dpkg_status_path(),
        }
    }
}

fn default_prometheus_address() -> String {
    "http://localhost:9091".to_string()
}

fn default_upload_interval_minutes() -> u32 {
    10
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_table_name() -> String {
    "robot_metrics".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_device_attribute() -> String {
    "robot".to_string()
}

fn default_software_version_attribute() -> String {
    "sw_version".to_string()
}

fn default_labels_attribute() -> String {
    "metric".to_string()
}

fn default_search_endpoint() -> String {
    "http://localhost:9200".to_string()
}

fn default_dpkg_status_path() -> PathBuf {
    PathBuf::from("/var/lib/dpkg/status")
}

impl RelayConfig {
    /// Resolves the configuration path from the environment, falling back
    /// to the well-known location.
    pub fn path_from_env() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            AdapterError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: RelayConfig = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    /// Flattens the per-node metric lists, node order first, then list order.
    pub fn metric_names(&self) -> Result<Vec<String>> {
        let metrics: Vec<String> = self
            .nodes
            .values()
            .flat_map(|node| node.metrics.iter().cloned())
            .collect();

        if metrics.is_empty() {
            return Err(AdapterError::Config(
                "no metrics configured under any node".to_string(),
            ));
        }
        Ok(metrics)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
