use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{AdapterError, Result};

/// Set to `json` for one JSON object per log line.
pub const LOG_FORMAT_ENV: &str = "PROMETHEUS_ADAPTER_LOG_FORMAT";

/// Sets up the logging subscriber for the adapter.
///
/// Filtering follows `RUST_LOG`, defaulting to `info` for this crate.
pub fn init_logger() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), Level::INFO)));

    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_ansi(false)
                    .compact(),
            )
            .try_init()
    };

    result.map_err(|e| AdapterError::Config(format!("Failed to initialize logger: {}", e)))
}
