use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, HistogramTimer, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::fs;
use std::path::Path;

use crate::Result;

/// The adapter's own counters for one pass.
#[derive(Clone)]
pub struct RelayMetrics {
    registry: Registry,
    queries: IntCounterVec,
    records: IntCounterVec,
    query_duration: Histogram,
    last_pass: Gauge,
}

impl RelayMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let queries = IntCounterVec::new(
            Opts::new(
                "prometheus_adapter_queries_total",
                "Prometheus queries issued, by outcome",
            ),
            &["outcome"],
        )?;
        let records = IntCounterVec::new(
            Opts::new(
                "prometheus_adapter_records_total",
                "Flattened records handed to the sink, by outcome",
            ),
            &["outcome"],
        )?;
        let query_duration = Histogram::with_opts(
            HistogramOpts::new(
                "prometheus_adapter_query_duration_seconds",
                "Prometheus query duration in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        )?;
        let last_pass = Gauge::new(
            "prometheus_adapter_last_pass_timestamp_seconds",
            "Unix time at which the last pass finished",
        )?;

        registry.register(Box::new(queries.clone()))?;
        registry.register(Box::new(records.clone()))?;
        registry.register(Box::new(query_duration.clone()))?;
        registry.register(Box::new(last_pass.clone()))?;

        Ok(Self {
            registry,
            queries,
            records,
            query_duration,
            last_pass,
        })
    }

    pub fn start_query_timer(&self) -> HistogramTimer {
        self.query_duration.start_timer()
    }

    /// `outcome` is `"ok"` or an error kind.
    pub fn record_query(&self, outcome: &str) {
        self.queries.with_label_values(&[outcome]).inc();
    }

    pub fn record_upload(&self, outcome: &str) {
        self.records.with_label_values(&[outcome]).inc();
    }

    pub fn finish_pass(&self, unix_seconds: f64) {
        self.last_pass.set(unix_seconds);
    }

    pub fn queries(&self, outcome: &str) -> u64 {
        self.queries.with_label_values(&[outcome]).get()
    }

    pub fn records(&self, outcome: &str) -> u64 {
        self.records.with_label_values(&[outcome]).get()
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Writes the exposition for a node_exporter textfile collector. The
    /// target is replaced by rename, never written in place.
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        let rendered = self.render()?;
        let tmp = path.with_extension("prom.tmp");
        fs::write(&tmp, rendered)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
