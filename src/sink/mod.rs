//! Downstream stores for flattened records.
//!
//! Two interchangeable strategies sit behind [`Sink`]: a DynamoDB table
//! ([`TableSink`]) and an Elasticsearch index ([`SearchIndexSink`]). Which
//! one runs is decided by the `sink.type` configuration key.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::SinkConfig;
use crate::models::FlattenedRecord;
use crate::Result;

pub mod search_index;
pub mod sigv4;
pub mod table;

pub use search_index::SearchIndexSink;
pub use table::TableSink;

/// Accepts one record at a time. No batching, no retry.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short name used in log lines.
    fn kind(&self) -> &'static str;

    async fn upload(&self, record: &FlattenedRecord) -> Result<()>;
}

/// Builds the configured sink. Failures here are fatal for the pass.
pub fn build_sink(config: &SinkConfig, timeout: Duration) -> Result<Box<dyn Sink>> {
    let sink: Box<dyn Sink> = match config {
        SinkConfig::Table(table) => Box::new(TableSink::new(table, timeout)?),
        SinkConfig::SearchIndex(index) => Box::new(SearchIndexSink::new(index, timeout)?),
    };
    Ok(sink)
}
