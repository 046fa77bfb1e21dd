use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Url};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use super::Sink;
use crate::config::SearchIndexSinkConfig;
use crate::models::FlattenedRecord;
use crate::{AdapterError, Result};

/// Marker Elasticsearch puts in the body of a successful index request.
const CREATED_MARKER: &str = r#""result":"created""#;

/// Writes each record as a document into an index named after its metric.
pub struct SearchIndexSink {
    http: Client,
    endpoint: Url,
    credentials: Option<(String, Option<String>)>,
}

#[derive(Debug, Serialize)]
struct IndexDocument<'a> {
    metric_name: &'a str,
    #[serde(rename = "@timestamp", skip_serializing_if = "Option::is_none")]
    time: Option<String>,
    timestamp: f64,
    value: Option<f64>,
    raw_value: &'a str,
    device_id: &'a str,
    software_version: &'a str,
    labels: &'a BTreeMap<String, String>,
}

impl<'a> From<&'a FlattenedRecord> for IndexDocument<'a> {
    fn from(record: &'a FlattenedRecord) -> Self {
        let millis = (record.timestamp * 1000.0).round() as i64;
        Self {
            metric_name: &record.metric_name,
            time: DateTime::<Utc>::from_timestamp_millis(millis)
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            timestamp: record.timestamp,
            value: record.finite_value(),
            raw_value: &record.raw_value,
            device_id: &record.device_id,
            software_version: &record.software_version,
            labels: &record.labels,
        }
    }
}

impl SearchIndexSink {
    pub fn new(config: &SearchIndexSinkConfig, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            AdapterError::SinkInit(format!("invalid endpoint {}: {}", config.endpoint, e))
        })?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::SinkInit(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
        })
    }

    fn document_url(&self, metric_name: &str) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| AdapterError::SinkInit(format!("endpoint {} cannot be a base", self.endpoint)))?
            .pop_if_empty()
            .extend([metric_name, "_doc"]);
        Ok(url)
    }
}

#[async_trait]
impl Sink for SearchIndexSink {
    fn kind(&self) -> &'static str {
        "search_index"
    }

    async fn upload(&self, record: &FlattenedRecord) -> Result<()> {
        let url = self.document_url(&record.metric_name)?;
        let mut request = self.http.post(url).json(&IndexDocument::from(record));
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response.text().await?;

        if body.contains(CREATED_MARKER) {
            Ok(())
        } else {
            Err(AdapterError::Rejected(format!(
                "index responded {}: {}",
                status.as_u16(),
                body
            )))
        }
    }
}
