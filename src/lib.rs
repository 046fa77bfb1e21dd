pub mod client;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod flatten;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod relay;
pub mod sink;

pub use error::{AdapterError, Result};
