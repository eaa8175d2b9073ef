//! Error types. None of them are fatal: the worst outcome is one dropped
//! sample or one report left for a later retry.

use thiserror::Error;

/// Why a lifecycle event was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("missing {0}")]
    MissingField(&'static str),
    #[error("not a web url: {0}")]
    NotWebUrl(String),
    #[error("request {0} was never started")]
    UnknownRequest(String),
    #[error("frame {0} has no navigation in flight")]
    UnknownFrame(i64),
    #[error("session {0} is not tracked")]
    UnknownSession(i64),
    #[error("request {id} ended at {end} but started at {start}")]
    UrlMismatch { id: String, start: String, end: String },
    #[error("no service name for {0}")]
    Unresolvable(String),
}

/// Why a report was not acknowledged by the collector.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("client error: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("collector answered {0}")]
    Status(u16),
    #[error("cannot serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{0}")]
    Rejected(String),
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid report_to endpoint {0:?}: {1}")]
    InvalidEndpoint(String, url::ParseError),
}
