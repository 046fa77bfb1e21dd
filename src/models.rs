use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Label holding the metric name in every Prometheus series.
pub const NAME_LABEL: &str = "__name__";

/// Response body of `/api/v1/query`.
#[derive(Debug, Deserialize)]
pub struct QueryEnvelope {
    /// Empty when the server omitted it, which never counts as success.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: Option<QueryData>,
    #[serde(default, rename = "errorType")]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Successful query payload. Series are kept as raw JSON so one malformed
/// series does not fail the whole envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryData {
    #[serde(default, rename = "resultType")]
    pub result_type: Option<String>,
    #[serde(default)]
    pub result: Vec<Value>,
}

/// One series from a vector or matrix result.
#[derive(Debug, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    /// Vector shape: a single `[timestamp, "value"]` pair.
    #[serde(default)]
    pub value: Option<Value>,
    /// Matrix shape: a list of `[timestamp, "value"]` pairs.
    #[serde(default)]
    pub values: Option<Vec<Value>>,
}

/// A single observation ready for upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlattenedRecord {
    pub metric_name: String,
    pub labels: BTreeMap<String, String>,
    /// Unix seconds, with the fractional part Prometheus reports.
    pub timestamp: f64,
    pub value: f64,
    /// Sample value as Prometheus reported it, e.g. `"97.5"` or `"+Inf"`.
    pub raw_value: String,
    pub device_id: String,
    pub software_version: String,
}

impl FlattenedRecord {
    /// `None` for `NaN` and infinities, which neither store can hold as a number.
    pub fn finite_value(&self) -> Option<f64> {
        self.value.is_finite().then_some(self.value)
    }
}
