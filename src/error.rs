use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Error code: {status}, {message}")]
    Status { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Error type: {error_type}, Error: {error}")]
    Query { error_type: String, error: String },

    #[error("Schema mismatch: {0}")]
    Schema(String),

    #[error("Upload rejected: {0}")]
    Rejected(String),

    #[error("Sink initialization error: {0}")]
    SinkInit(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdapterError {
    /// Short, stable name of the failure class. Used as a log field and as
    /// the `outcome` label on the adapter's own counters.
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::Config(_) => "config",
            AdapterError::Transport(_) => "transport",
            AdapterError::Status { .. } => "status",
            AdapterError::Decode(_) => "decode",
            AdapterError::Query { .. } => "query",
            AdapterError::Schema(_) => "schema",
            AdapterError::Rejected(_) => "rejected",
            AdapterError::SinkInit(_) => "sink_init",
            AdapterError::Metrics(_) => "metrics",
            AdapterError::Io(_) => "io",
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AdapterError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            AdapterError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            AdapterError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        AdapterError::Decode(err.to_string())
    }
}

impl From<serde_yaml::Error> for AdapterError {
    fn from(err: serde_yaml::Error) -> Self {
        AdapterError::Config(err.to_string())
    }
}

impl From<prometheus::Error> for AdapterError {
    fn from(err: prometheus::Error) -> Self {
        AdapterError::Metrics(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_message_carries_envelope_fields() {
        let err = AdapterError::Query {
            error_type: "bad_data".to_string(),
            error: "parse error at char 4".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("bad_data"));
        assert!(message.contains("parse error at char 4"));
        assert_eq!(err.kind(), "query");
    }

    #[test]
    fn test_yaml_error_is_config() {
        let err: AdapterError = serde_yaml::from_str::<Vec<String>>("{ not: [a list")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), "config");
    }
}
