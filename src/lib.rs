//! Per-service latency aggregation for browser sessions.
//!
//! Navigation, request and tab lifecycle events are correlated per tab,
//! attributed to a service name derived from the URL, accumulated into
//! mergeable latency stats, and reported one entry at a time to a
//! collector.

pub mod config;
pub mod engine;
pub mod error;
pub mod net;
pub mod stats;

pub use config::Config;
pub use engine::{AggregationEngine, Event};
pub use error::{ConfigError, DeliveryError, EventError};
pub use net::report::{HttpSink, Report, ReportSink};
pub use net::resolver::{NameResolver, ServiceGroup, UNCLASSIFIED};
