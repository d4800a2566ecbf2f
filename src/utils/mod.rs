//! # Utility Modules
//!
//! Supporting utilities shared by the services and the node actor.
//!
//! ## Components
//! - **Dedup Cache**: TTL-bounded recent message ids for duplicate suppression
//! - **Metrics**: Thread-safe per-node observability counters
//! - **Logging**: Structured logging configuration

pub mod dedup_cache;
pub mod logging;
pub mod metrics;

pub use dedup_cache::DedupCache;
pub use metrics::{Metrics, MetricsSnapshot};
