//! One polling pass: query every configured metric and upload what comes back.

use tracing::{error, info, warn};

use crate::client::MetricsClient;
use crate::enrichment::Enrichment;
use crate::flatten::flatten;
use crate::metrics::RelayMetrics;
use crate::sink::Sink;
use crate::AdapterError;

#[derive(Debug)]
pub struct QueryFailure {
    pub metric: String,
    pub error: AdapterError,
}

#[derive(Debug)]
pub struct UploadFailure {
    pub metric_name: String,
    pub timestamp: f64,
    pub error: AdapterError,
}

/// Outcome of a pass. Failures never abort the pass; they are collected here.
#[derive(Debug, Default)]
pub struct PassReport {
    pub queries_ok: usize,
    pub query_failures: Vec<QueryFailure>,
    pub uploaded: usize,
    pub upload_failures: Vec<UploadFailure>,
}

impl PassReport {
    pub fn is_clean(&self) -> bool {
        self.query_failures.is_empty() && self.upload_failures.is_empty()
    }
}

pub struct Relay<'a> {
    node_address: &'a str,
    client: &'a MetricsClient,
    sink: &'a dyn Sink,
    enrichment: &'a Enrichment,
    metrics: &'a RelayMetrics,
}

impl<'a> Relay<'a> {
    pub fn new(
        node_address: &'a str,
        client: &'a MetricsClient,
        sink: &'a dyn Sink,
        enrichment: &'a Enrichment,
        metrics: &'a RelayMetrics,
    ) -> Self {
        Self {
            node_address,
            client,
            sink,
            enrichment,
            metrics,
        }
    }

    /// Queries each metric in turn and uploads every resulting record in turn.
    pub async fn run_pass(&self, metric_names: &[String]) -> PassReport {
        let mut report = PassReport::default();

        for metric in metric_names {
            info!(%metric, "querying metric");

            let timer = self.metrics.start_query_timer();
            let result = self.client.query(self.node_address, metric).await;
            timer.observe_duration();

            let data = match result {
                Ok(data) => {
                    self.metrics.record_query("ok");
                    report.queries_ok += 1;
                    data
                }
                Err(e) => {
                    error!(%metric, kind = e.kind(), error = %e, "Error querying prometheus");
                    self.metrics.record_query(e.kind());
                    report.query_failures.push(QueryFailure {
                        metric: metric.clone(),
                        error: e,
                    });
                    continue;
                }
            };

            let records = flatten(&data, self.enrichment);
            if records.is_empty() {
                warn!(%metric, "query returned no samples");
            }

            for record in &records {
                match self.sink.upload(record).await {
                    Ok(()) => {
                        self.metrics.record_upload("ok");
                        report.uploaded += 1;
                    }
                    Err(e) => {
                        error!(
                            sink = self.sink.kind(),
                            metric_name = %record.metric_name,
                            timestamp = record.timestamp,
                            kind = e.kind(),
                            error = %e,
                            "Error uploading record"
                        );
                        self.metrics.record_upload(e.kind());
                        report.upload_failures.push(UploadFailure {
                            metric_name: record.metric_name.clone(),
                            timestamp: record.timestamp,
                            error: e,
                        });
                    }
                }
            }
        }

        report
    }
}
