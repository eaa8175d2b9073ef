//! Hierarchical latency statistics.
//!
//! ```text
//! ServiceRegistry      final name
//!   OriginStats        original name
//!     NamedStatSet     measurement kind
//!       Stat           count, total, high, low, countables
//! ```
//!
//! Every level merges with `transfer()`, which consumes the source.

pub mod latency;
pub mod names;
pub mod service;
pub mod stat;

pub use latency::NamedStatSet;
pub use names::OriginStats;
pub use service::ServiceRegistry;
pub use stat::Stat;

/// Top-level navigation, start to completion.
pub const NAVIGATION: &str = "navigation";
/// Sub-request finished before the tab's navigation resolved.
pub const REQUEST: &str = "request";
/// Sub-request finished after the tab settled on a service.
pub const TAB_REQUEST: &str = "tabrequest";
/// Tab status `loading` to `complete`.
pub const TAB_UPDATE: &str = "tabupdate";

/// Countable: the tab closed while this was still outstanding.
pub const TAB_CLOSED: &str = "tabclosed";
