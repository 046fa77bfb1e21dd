use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::{QueryData, QueryEnvelope};
use crate::{AdapterError, Result};

/// Thin client for the Prometheus instant query endpoint.
#[derive(Debug, Clone)]
pub struct MetricsClient {
    http: Client,
    interval_minutes: u32,
}

impl MetricsClient {
    pub fn new(interval_minutes: u32, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            interval_minutes,
        })
    }

    /// Range selector sent for `metric_name`, covering one upload interval.
    pub fn query_string(&self, metric_name: &str) -> String {
        format!("{}[{}m]", metric_name, self.interval_minutes)
    }

    /// Queries the last upload interval of `metric_name`.
    pub async fn query(&self, node_address: &str, metric_name: &str) -> Result<QueryData> {
        let url = format!("{}/api/v1/query", node_address.trim_end_matches('/'));
        let query = self.query_string(metric_name);
        debug!(%url, %query, "querying prometheus");

        let response = self
            .http
            .get(&url)
            .query(&[("query", query.as_str())])
            .send()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(AdapterError::Status {
                status: status.as_u16(),
                message: status_message(&body),
            });
        }

        parse_envelope(&body)
    }
}

/// Message for a non-200 answer: the envelope's error type and text when the
/// body is an error envelope.
fn status_message(body: &str) -> String {
    let envelope = match serde_json::from_str::<QueryEnvelope>(body) {
        Ok(envelope) => envelope,
        Err(_) => return "Server returned an error".to_string(),
    };
    match (envelope.error_type, envelope.error) {
        (Some(error_type), Some(error)) => format!("Error type: {}, Error: {}", error_type, error),
        (None, Some(error)) => error,
        (Some(error_type), None) => format!("Error type: {}", error_type),
        (None, None) => "Server returned an error".to_string(),
    }
}

fn parse_envelope(body: &str) -> Result<QueryData> {
    let envelope: QueryEnvelope = serde_json::from_str(body)?;

    for warning in &envelope.warnings {
        warn!(%warning, "prometheus returned a warning");
    }

    if envelope.status != "success" {
        return Err(AdapterError::Query {
            error_type: envelope.error_type.unwrap_or_else(|| "unknown".to_string()),
            error: envelope.error.unwrap_or_default(),
        });
    }

    envelope
        .data
        .ok_or_else(|| AdapterError::Schema("success envelope without data".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Query,
        http::StatusCode as AxumStatus,
        routing::get,
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client() -> MetricsClient {
        MetricsClient::new(10, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_query_string_appends_interval() {
        let client = MetricsClient::new(15, Duration::from_secs(5)).unwrap();
        assert_eq!(client.query_string("up"), "up[15m]");
    }

    #[tokio::test]
    async fn test_success_returns_data() {
        let app = Router::new().route(
            "/api/v1/query",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("query").map(String::as_str), Some("up[10m]"));
                Json(json!({
                    "status": "success",
                    "data": {
                        "resultType": "matrix",
                        "result": [{"metric": {"__name__": "up"}, "values": [[1, "1"]]}]
                    }
                }))
            }),
        );
        let address = serve(app).await;

        let data = client().query(&address, "up").await.unwrap();
        assert_eq!(data.result_type.as_deref(), Some("matrix"));
        assert_eq!(data.result.len(), 1);
    }

    #[tokio::test]
    async fn test_error_envelope_carries_type_and_message() {
        let app = Router::new().route(
            "/api/v1/query",
            get(|| async {
                Json(json!({
                    "status": "error",
                    "errorType": "bad_data",
                    "error": "invalid parameter \"query\""
                }))
            }),
        );
        let address = serve(app).await;

        let err = client().query(&address, "up").await.unwrap_err();
        assert_eq!(err.kind(), "query");
        let message = err.to_string();
        assert!(message.contains("bad_data"));
        assert!(message.contains("invalid parameter"));
    }

    #[tokio::test]
    async fn test_non_200_is_a_status_error() {
        let app = Router::new().route(
            "/api/v1/query",
            get(|| async {
                (
                    AxumStatus::UNPROCESSABLE_ENTITY,
                    Json(json!({
                        "status": "error",
                        "errorType": "execution",
                        "error": "query timed out"
                    })),
                )
            }),
        );
        let address = serve(app).await;

        match client().query(&address, "up").await.unwrap_err() {
            AdapterError::Status { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "Error type: execution, Error: query timed out");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bad_request_reports_error_type() {
        let app = Router::new().route(
            "/api/v1/query",
            get(|| async {
                (
                    AxumStatus::BAD_REQUEST,
                    Json(json!({"errorType": "bad_data", "error": "parse error"})),
                )
            }),
        );
        let address = serve(app).await;

        let err = client().query(&address, "up").await.unwrap_err();
        assert_eq!(err.kind(), "status");
        assert_eq!(
            err.to_string(),
            "Error code: 400, Error type: bad_data, Error: parse error"
        );
    }

    #[test]
    fn test_status_message_without_envelope() {
        assert_eq!(status_message("Bad Gateway"), "Server returned an error");
        assert_eq!(
            status_message(r#"{"status": "error", "error": "overloaded"}"#),
            "overloaded"
        );
    }

    #[tokio::test]
    async fn test_invalid_body_is_a_decode_error() {
        let app = Router::new().route("/api/v1/query", get(|| async { "<html>proxy</html>" }));
        let address = serve(app).await;

        let err = client().query(&address, "up").await.unwrap_err();
        assert_eq!(err.kind(), "decode");
    }

    #[tokio::test]
    async fn test_success_without_data_is_a_schema_error() {
        let app = Router::new().route(
            "/api/v1/query",
            get(|| async { Json(json!({"status": "success"})) }),
        );
        let address = serve(app).await;

        let err = client().query(&address, "up").await.unwrap_err();
        assert_eq!(err.kind(), "schema");
    }

    #[tokio::test]
    async fn test_connection_refused_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = client().query(&address, "up").await.unwrap_err();
        assert_eq!(err.kind(), "transport");
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let app = Router::new().route(
            "/api/v1/query",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(Value::Null)
            }),
        );
        let address = serve(app).await;

        let client = MetricsClient::new(10, Duration::from_millis(200)).unwrap();
        let err = client.query(&address, "up").await.unwrap_err();
        assert_eq!(err.kind(), "transport");
    }
}
