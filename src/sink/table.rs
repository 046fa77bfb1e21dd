use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Map, Value};
use std::env;
use std::time::Duration;
use tracing::debug;

use super::sigv4::{self, Credentials, SignableRequest};
use super::Sink;
use crate::config::{TableAttributes, TableSinkConfig};
use crate::models::{FlattenedRecord, NAME_LABEL};
use crate::{AdapterError, Result};

const SERVICE: &str = "dynamodb";
const PUT_ITEM_TARGET: &str = "DynamoDB_20120810.PutItem";
const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

/// Writes each record as one DynamoDB item through `PutItem`.
pub struct TableSink {
    http: Client,
    endpoint: Url,
    host: String,
    table_name: String,
    region: String,
    attributes: TableAttributes,
    credentials: Credentials,
}

impl TableSink {
    pub fn new(config: &TableSinkConfig, timeout: Duration) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://dynamodb.{}.amazonaws.com/", config.region));
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| AdapterError::SinkInit(format!("invalid endpoint {}: {}", endpoint, e)))?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(AdapterError::SinkInit(format!(
                    "endpoint {} has no host",
                    endpoint
                )))
            }
        };

        let credentials = resolve_credentials(config)?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::SinkInit(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            host,
            table_name: config.table_name.clone(),
            region: config.region.clone(),
            attributes: config.attributes.clone(),
            credentials,
        })
    }
}

fn resolve_credentials(config: &TableSinkConfig) -> Result<Credentials> {
    let access_key_id = config
        .access_key_id
        .clone()
        .or_else(|| env::var("AWS_ACCESS_KEY_ID").ok());
    let secret_access_key = config
        .secret_access_key
        .clone()
        .or_else(|| env::var("AWS_SECRET_ACCESS_KEY").ok());
    let session_token = config
        .session_token
        .clone()
        .or_else(|| env::var("AWS_SESSION_TOKEN").ok());

    match (access_key_id, secret_access_key) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(Credentials {
            access_key_id,
            secret_access_key,
            session_token,
        }),
        _ => Err(AdapterError::SinkInit(
            "no AWS credentials in configuration or environment".to_string(),
        )),
    }
}

/// DynamoDB numbers carry at most 38 significant digits, with magnitudes
/// between 1e-130 and 1e126. `None` when `value` cannot be stored as one.
fn table_number(value: f64) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    let magnitude = value.abs();
    if magnitude == 0.0 {
        return Some("0".to_string());
    }
    if !(1e-130..1e126).contains(&magnitude) {
        return None;
    }
    if (1e-6..1e15).contains(&magnitude) {
        Some(value.to_string())
    } else {
        Some(format!("{:e}", value))
    }
}

/// `N` when the value fits a DynamoDB number, otherwise `S` with the text
/// Prometheus reported.
fn number_attribute(value: f64, raw: &str) -> Value {
    match table_number(value) {
        Some(number) => json!({ "N": number }),
        None => json!({ "S": raw }),
    }
}

/// Numeric device ids such as `219` are stored as numbers.
fn device_attribute(device_id: &str) -> Value {
    if !device_id.is_empty() && device_id.bytes().all(|b| b.is_ascii_digit()) {
        json!({ "N": device_id })
    } else {
        json!({ "S": device_id })
    }
}

/// Body of a `PutItem` request in DynamoDB's attribute-value JSON.
pub fn put_item_request(
    table_name: &str,
    attributes: &TableAttributes,
    record: &FlattenedRecord,
) -> Value {
    let mut labels: Map<String, Value> = record
        .labels
        .iter()
        .map(|(name, value)| (name.clone(), json!({ "S": value })))
        .collect();
    labels.insert(NAME_LABEL.to_string(), json!({ "S": record.metric_name }));

    let mut item = Map::new();
    item.insert("metric_name".to_string(), json!({ "S": record.metric_name }));
    item.insert(
        "timestamp".to_string(),
        number_attribute(record.timestamp, &record.timestamp.to_string()),
    );
    item.insert(
        "value".to_string(),
        number_attribute(record.value, &record.raw_value),
    );
    item.insert(attributes.device.clone(), device_attribute(&record.device_id));
    item.insert(
        attributes.software_version.clone(),
        json!({ "S": record.software_version }),
    );
    item.insert(attributes.labels.clone(), json!({ "M": labels }));

    json!({ "TableName": table_name, "Item": item })
}

#[async_trait]
impl Sink for TableSink {
    fn kind(&self) -> &'static str {
        "table"
    }

    async fn upload(&self, record: &FlattenedRecord) -> Result<()> {
        let payload = serde_json::to_vec(&put_item_request(
            &self.table_name,
            &self.attributes,
            record,
        ))?;

        let mut headers = vec![
            ("content-type", CONTENT_TYPE),
            ("host", self.host.as_str()),
            ("x-amz-target", PUT_ITEM_TARGET),
        ];
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token", token.as_str()));
        }

        let signature = sigv4::sign(
            &SignableRequest {
                method: "POST",
                path: self.endpoint.path(),
                query: self.endpoint.query().unwrap_or(""),
                headers: &headers,
                payload: &payload,
            },
            &self.credentials,
            &self.region,
            SERVICE,
            Utc::now(),
        )?;

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header("x-amz-date", &signature.amz_date)
            .header("authorization", &signature.authorization);
        for (name, value) in &headers {
            // reqwest derives Host from the URL.
            if *name != "host" {
                request = request.header(*name, *value);
            }
        }

        let response = request
            .body(payload)
            .send()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        let status = response.status();

        if status == StatusCode::OK {
            debug!(table = %self.table_name, metric = %record.metric_name, "item stored");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AdapterError::Rejected(format!(
                "table responded {}: {}",
                status.as_u16(),
                body
            )))
        }
    }
}
