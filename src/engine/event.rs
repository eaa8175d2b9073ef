//! Lifecycle events as delivered by the browser integration.
//!
//! Payloads arrive loosely typed (every field optional, camelCase JSON) and
//! are checked once, here, before anything touches tab state.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::EventError;
use crate::net::resolver::is_web_url;

/// Chrome's error string for a navigation the user or page cancelled.
pub const ABORTED: &str = "net::ERR_ABORTED";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    StartRequest(RequestDetails),
    /// Completion or redirect of a request.
    EndRequest(RequestDetails),
    /// The request failed.
    DeleteRequest(RequestDetails),
    StartNavigation(NavigationDetails),
    EndNavigation(NavigationDetails),
    /// The navigation failed or was aborted.
    DeleteNavigation(NavigationDetails),
    TabUpdated(TabDetails),
    TabRemoved(TabDetails),
}

impl Event {
    pub fn session_id(&self) -> Option<i64> {
        match self {
            Event::StartRequest(d) | Event::EndRequest(d) | Event::DeleteRequest(d) => d.session_id,
            Event::StartNavigation(d) | Event::EndNavigation(d) | Event::DeleteNavigation(d) => {
                d.session_id
            }
            Event::TabUpdated(d) | Event::TabRemoved(d) => d.session_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestDetails {
    pub session_id: Option<i64>,
    pub request_id: Option<String>,
    pub url: Option<String>,
    pub timestamp: Option<f64>,
    pub from_cache: bool,
    pub status_code: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NavigationDetails {
    pub session_id: Option<i64>,
    pub frame_id: Option<i64>,
    pub parent_frame_id: Option<i64>,
    pub url: Option<String>,
    pub timestamp: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TabDetails {
    pub session_id: Option<i64>,
    pub status: Option<TabStatus>,
    pub url: Option<String>,
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabStatus {
    Loading,
    Complete,
    #[serde(other)]
    Other,
}

/// A request event that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub session_id: i64,
    pub request_id: String,
    pub url: String,
    pub timestamp: f64,
    pub from_cache: bool,
    pub status_code: Option<u16>,
}

/// A navigation event that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Navigation {
    pub session_id: i64,
    pub frame_id: i64,
    pub parent_frame_id: i64,
    pub url: Option<String>,
    pub timestamp: f64,
    pub error: Option<String>,
}

impl Navigation {
    /// Top-level frames have no parent.
    pub fn is_top_level(&self) -> bool {
        self.parent_frame_id < 0
    }

    pub fn is_aborted(&self) -> bool {
        self.error.as_deref() == Some(ABORTED)
    }
}

/// A tab status change that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct TabUpdate {
    pub session_id: i64,
    pub status: TabStatus,
    pub url: String,
    pub timestamp: f64,
}

/// An http(s) URL with a host, so it always resolves to a service name.
fn web_url(url: Option<&String>) -> Result<String, EventError> {
    let url = url.ok_or(EventError::MissingField("url"))?;
    let has_host = Url::parse(url).map_or(false, |parsed| parsed.host_str().is_some());
    if !is_web_url(url) || !has_host {
        return Err(EventError::NotWebUrl(url.clone()));
    }
    Ok(url.clone())
}

impl RequestDetails {
    /// Start and end events need a web URL; failures only need the ids.
    pub fn validate(&self, needs_url: bool) -> Result<Request, EventError> {
        let session_id = self.session_id.ok_or(EventError::MissingField("sessionId"))?;
        let request_id = self
            .request_id
            .clone()
            .ok_or(EventError::MissingField("requestId"))?;
        let timestamp = self.timestamp.ok_or(EventError::MissingField("timestamp"))?;
        let url = if needs_url {
            web_url(self.url.as_ref())?
        } else {
            self.url.clone().unwrap_or_default()
        };
        Ok(Request {
            session_id,
            request_id,
            url,
            timestamp,
            from_cache: self.from_cache,
            status_code: self.status_code,
        })
    }
}

impl NavigationDetails {
    pub fn validate(&self, needs_url: bool) -> Result<Navigation, EventError> {
        let session_id = self.session_id.ok_or(EventError::MissingField("sessionId"))?;
        let frame_id = self.frame_id.ok_or(EventError::MissingField("frameId"))?;
        let timestamp = self.timestamp.ok_or(EventError::MissingField("timestamp"))?;
        let url = if needs_url {
            Some(web_url(self.url.as_ref())?)
        } else {
            self.url.clone()
        };
        Ok(Navigation {
            session_id,
            frame_id,
            parent_frame_id: self.parent_frame_id.unwrap_or(-1),
            url,
            timestamp,
            error: self.error.clone(),
        })
    }
}

impl TabDetails {
    pub fn validate(&self) -> Result<TabUpdate, EventError> {
        let session_id = self.session_id.ok_or(EventError::MissingField("sessionId"))?;
        let status = self.status.ok_or(EventError::MissingField("status"))?;
        let url = web_url(self.url.as_ref())?;
        let timestamp = self.timestamp.ok_or(EventError::MissingField("timestamp"))?;
        Ok(TabUpdate {
            session_id,
            status,
            url,
            timestamp,
        })
    }

    pub fn validate_removed(&self) -> Result<i64, EventError> {
        self.session_id.ok_or(EventError::MissingField("sessionId"))
    }
}
