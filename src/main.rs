use chrono::Utc;
use tracing::{error, info, warn};

use prometheus_adapter::{
    client::MetricsClient,
    config::RelayConfig,
    enrichment::Enrichment,
    logging,
    metrics::RelayMetrics,
    relay::Relay,
    sink,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = logging::init_logger() {
        eprintln!("[Prometheus Adapter]: {}", e);
    }

    let path = RelayConfig::path_from_env();
    let config = RelayConfig::load(&path)
        .unwrap_or_else(|e| exit_with_error(&format!("Error reading configuration file: {}", e)));
    let metric_names = config
        .metric_names()
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to obtain metrics list: {}", e)));
    let sink = sink::build_sink(&config.sink, config.request_timeout())
        .unwrap_or_else(|e| exit_with_error(&format!("Error initializing database: {}", e)));
    let client = MetricsClient::new(config.upload_interval_minutes, config.request_timeout())
        .unwrap_or_else(|e| exit_with_error(&e.to_string()));
    let metrics = RelayMetrics::new().unwrap_or_else(|e| exit_with_error(&e.to_string()));
    let enrichment = Enrichment::resolve(&config.enrichment);

    info!(
        config = %path.display(),
        sink = sink.kind(),
        metrics = ?metric_names,
        device_id = %enrichment.device_id,
        software_version = %enrichment.software_version,
        "starting pass"
    );

    let relay = Relay::new(
        &config.prometheus_address,
        &client,
        sink.as_ref(),
        &enrichment,
        &metrics,
    );
    let report = relay.run_pass(&metric_names).await;
    metrics.finish_pass(Utc::now().timestamp() as f64);

    info!(
        queries_ok = report.queries_ok,
        query_failures = report.query_failures.len(),
        uploaded = report.uploaded,
        upload_failures = report.upload_failures.len(),
        "pass complete"
    );

    if let Some(textfile) = &config.metrics_textfile {
        if let Err(e) = metrics.write_textfile(textfile) {
            warn!(path = %textfile.display(), error = %e, "failed to write metrics textfile");
        }
    }
}

fn exit_with_error(message: &str) -> ! {
    error!("[Prometheus Adapter]: {}", message);
    std::process::exit(1);
}
