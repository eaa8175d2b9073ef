//! Report wire form and delivery to the collector.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use time::macros::format_description;
use time::UtcOffset;

use crate::config::Config;
use crate::error::DeliveryError;
use crate::stats::{NamedStatSet, OriginStats};

/// One summary posted to the collector.
///
/// `services` is `final name -> original name -> kind -> stat`; the engine
/// sends one `(final, original)` entry per report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub enabled_options: Vec<String>,
    pub timezone: String,
    pub services: BTreeMap<String, OriginStats>,
}

impl Report {
    /// Report carrying a single `(service, name)` entry.
    pub fn single(config: &Config, service: &str, name: &str, stats: NamedStatSet) -> Self {
        let mut origins = OriginStats::new();
        origins.transfer_name(name, stats);
        let mut services = BTreeMap::new();
        services.insert(service.to_string(), origins);
        Self {
            version: config.version.clone(),
            enabled_options: config.enabled_options(),
            timezone: local_timezone(),
            services,
        }
    }

    /// JSON body as posted to the collector.
    pub fn to_json(&self) -> Result<Vec<u8>, DeliveryError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// `(final, original)` pairs carried by this report.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.services
            .iter()
            .flat_map(|(service, origins)| {
                origins.names().map(move |name| (service.clone(), name.to_string()))
            })
            .collect()
    }
}

/// Where reports go. `Ok` means the collector acknowledged the report.
///
/// Called from a delivery thread, never from the event loop.
pub trait ReportSink: Send + Sync {
    fn send(&self, report: &Report) -> Result<(), DeliveryError>;
}

/// Posts reports as JSON to the configured collector endpoint.
pub struct HttpSink {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpSink {
    /// Client for `config.report_to()`, bounded by `delivery_timeout_ms`.
    pub fn new(config: &Config) -> Result<Self, DeliveryError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("report-latency/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_millis(config.delivery_timeout_ms))
            .build()
            .map_err(DeliveryError::Client)?;
        Ok(Self {
            client,
            endpoint: config.report_to().to_string(),
        })
    }

    /// Collector URL reports are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ReportSink for HttpSink {
    fn send(&self, report: &Report) -> Result<(), DeliveryError> {
        let body = report.to_json()?;
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(DeliveryError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }
        log::debug!("collector {} accepted report ({})", self.endpoint, status);
        Ok(())
    }
}

/// Local UTC offset as `GMT+hhmm`, a coarse proxy for office location.
pub fn local_timezone() -> String {
    timezone_label(UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
}

/// `offset` as `GMT+hhmm`.
pub fn timezone_label(offset: UtcOffset) -> String {
    let format = format_description!("GMT[offset_hour sign:mandatory][offset_minute]");
    offset
        .format(format)
        .unwrap_or_else(|_| "GMT+0000".to_string())
}
