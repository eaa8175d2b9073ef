//! Collector settings and classification options.
//!
//! Passed explicitly to [`NameResolver`](crate::net::resolver::NameResolver)
//! and [`AggregationEngine`](crate::engine::latency::AggregationEngine).
//!
//! ```toml
//! report_to = "https://collector.example.com/reportlatency/post"
//! default_as_org = true
//! enabled_services = ["googleServices"]
//!
//! [flush]
//! max_checks = 10
//! max_interval_ms = 10000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;
use crate::net::rules::GOOGLE_SERVICES;

pub const DEFAULT_REPORT_TO: &str = "http://localhost/reportlatency/post";

/// Wire option reported when unclaimed traffic is classified by domain.
pub const DEFAULT_AS_ORG: &str = "default_as_org";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Collector endpoint.
    pub report_to: String,
    /// Classify traffic no rule claims by its registrable domain instead of
    /// lumping it into `"."`.
    pub default_as_org: bool,
    /// Rule groups to consult, in order.
    pub enabled_services: Vec<String>,
    /// Client version sent with each report.
    pub version: Option<String>,
    pub flush: FlushConfig,
    pub delivery_timeout_ms: u64,
}

/// Leaky-bucket thresholds for the periodic flush check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
    /// Report after this many checks without one.
    pub max_checks: u32,
    /// Report once this much event time has passed since the last report.
    pub max_interval_ms: u64,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            max_checks: 10,
            max_interval_ms: 10_000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            report_to: DEFAULT_REPORT_TO.to_string(),
            default_as_org: false,
            enabled_services: vec![GOOGLE_SERVICES.to_string()],
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            flush: FlushConfig::default(),
            delivery_timeout_ms: 15_000,
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// An empty endpoint falls back to the default; anything else must parse.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(self.report_to())
            .map(|_| ())
            .map_err(|e| ConfigError::InvalidEndpoint(self.report_to.clone(), e))
    }

    pub fn report_to(&self) -> &str {
        if self.report_to.trim().is_empty() {
            DEFAULT_REPORT_TO
        } else {
            &self.report_to
        }
    }

    /// Options the collector is told about with every report.
    pub fn enabled_options(&self) -> Vec<String> {
        let mut options = self.enabled_services.clone();
        if self.default_as_org {
            options.push(DEFAULT_AS_ORG.to_string());
        }
        options
    }
}
