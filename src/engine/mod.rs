//! Event routing and reporting.
//!
//! ```text
//! Event ─▶ AggregationEngine ─▶ SessionUnit (per tab, buffers stats)
//!                 │                   │ final service name known
//!                 │                   ▼
//!                 └──────────▶ ServiceRegistry ─▶ best() ─▶ ReportSink
//! ```

pub mod event;
pub mod flush;
pub mod latency;
pub mod tab;

pub use event::{Event, NavigationDetails, RequestDetails, TabDetails, TabStatus};
pub use latency::AggregationEngine;
pub use tab::SessionUnit;
