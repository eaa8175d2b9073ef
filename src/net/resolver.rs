//! URL → service name.
//!
//! Registered rule groups get the first chance to claim a URL. Anything
//! left over is either collapsed to its organisation's domain
//! (`default_as_org`) or lumped into [`UNCLASSIFIED`].

use std::collections::BTreeMap;

use percent_encoding::percent_decode_str;
use url::{Position, Url};

use crate::config::Config;
use crate::net::rules;

/// Service name for traffic nothing claimed: "the rest of the internet".
pub const UNCLASSIFIED: &str = ".";

/// A URL-claiming callback: `(host, path) -> Some(service)` to claim.
pub type ClaimFn = dyn Fn(&str, &str) -> Option<String> + Send + Sync;

/// Collapses a hostname under one top-level domain.
pub type TldHandler = fn(&str) -> String;

/// A named set of URL-claiming rules, e.g. one company's services.
pub struct ServiceGroup {
    pub id: String,
    pub description: String,
    claim: Box<ClaimFn>,
}

impl ServiceGroup {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        claim: impl Fn(&str, &str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            claim: Box::new(claim),
        }
    }

    pub fn claim(&self, host: &str, path: &str) -> Option<String> {
        (self.claim)(host, path)
    }
}

impl std::fmt::Debug for ServiceGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceGroup").field("id", &self.id).finish()
    }
}

/// Maps URLs to the service name their latency is accounted to.
///
/// Pure: the same URL always resolves to the same name for a given
/// resolver.
#[derive(Debug)]
pub struct NameResolver {
    groups: Vec<ServiceGroup>,
    tld_handlers: BTreeMap<String, TldHandler>,
    default_as_org: bool,
}

impl Default for NameResolver {
    fn default() -> Self {
        Self::new(false)
    }
}

impl NameResolver {
    /// A resolver with no rule groups and the stock TLD handlers.
    pub fn new(default_as_org: bool) -> Self {
        let mut tld_handlers: BTreeMap<String, TldHandler> = BTreeMap::new();
        tld_handlers.insert("us".to_string(), us_domain);
        Self {
            groups: Vec::new(),
            tld_handlers,
            default_as_org,
        }
    }

    /// Built-in rule groups named in `enabled_services`, in that order.
    /// Unknown ids are logged and skipped.
    pub fn from_config(config: &Config) -> Self {
        let mut resolver = Self::new(config.default_as_org);
        for id in &config.enabled_services {
            match rules::builtin(id) {
                Some(group) => resolver.register(group),
                None => log::warn!("unknown service group {:?} in config", id),
            }
        }
        resolver
    }

    /// Append a rule group; earlier groups win.
    pub fn register(&mut self, group: ServiceGroup) {
        log::debug!("register service group {}", group.id);
        self.groups.push(group);
    }

    pub fn with_group(mut self, group: ServiceGroup) -> Self {
        self.register(group);
        self
    }

    /// Install or replace the domain collapser for one TLD.
    pub fn with_tld_handler(mut self, tld: &str, handler: TldHandler) -> Self {
        self.tld_handlers.insert(tld.to_ascii_lowercase(), handler);
        self
    }

    pub fn groups(&self) -> impl Iterator<Item = &ServiceGroup> {
        self.groups.iter()
    }

    /// Service name for `url`, or `None` for anything that isn't http(s).
    pub fn resolve(&self, url: &str) -> Option<String> {
        if !is_web_url(url) {
            return None;
        }
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        let rest = &parsed[Position::BeforePath..];
        let rest = rest.strip_prefix('/').unwrap_or(rest);
        let path = percent_decode_str(rest).decode_utf8_lossy();

        for group in &self.groups {
            if let Some(name) = group.claim(host, &path) {
                return Some(name);
            }
        }

        if self.default_as_org {
            return Some(self.default_domain(host));
        }

        Some(UNCLASSIFIED.to_string())
    }

    /// Registrable-domain guess for an unclaimed host.
    pub fn default_domain(&self, hostname: &str) -> String {
        let Some(tld) = top_level_domain(hostname) else {
            // unqualified hostname
            return hostname.to_string();
        };

        if let Some(handler) = self.tld_handlers.get(tld) {
            return handler(hostname);
        }

        // Most ccTLDs carry a category label (co.uk, com.au) above the org.
        if tld.chars().count() == 2 {
            return three_level_domain(hostname).to_string();
        }

        two_level_domain(hostname).to_string()
    }
}

/// `http:` and `https:` only.
pub fn is_web_url(url: &str) -> bool {
    url.starts_with("http:") || url.starts_with("https:")
}

/// Hundreds bucket of an HTTP status: 200, 300, 400, 500.
pub fn status_code_family(code: u16) -> Option<u16> {
    match code {
        200..=599 => Some(code / 100 * 100),
        _ => None,
    }
}

/// The last `n` labels of `hostname`, or all of it when it is shorter.
fn level_domain(hostname: &str, n: usize) -> &str {
    let mut start = hostname.len();
    for level in 0..n {
        let head = &hostname[..start];
        let label_start = head.rfind('.').map_or(0, |dot| dot + 1);
        if label_start == start {
            return hostname;
        }
        if level + 1 < n {
            if label_start == 0 {
                return hostname;
            }
            start = label_start - 1;
        } else {
            start = label_start;
        }
    }
    &hostname[start..]
}

pub fn two_level_domain(hostname: &str) -> &str {
    level_domain(hostname, 2)
}

pub fn three_level_domain(hostname: &str) -> &str {
    level_domain(hostname, 3)
}

pub fn four_level_domain(hostname: &str) -> &str {
    level_domain(hostname, 4)
}

/// Last label of a dotted hostname; `None` for unqualified names.
pub fn top_level_domain(hostname: &str) -> Option<&str> {
    let dot = hostname.rfind('.')?;
    let tld = &hostname[dot + 1..];
    if tld.is_empty() {
        None
    } else {
        Some(tld)
    }
}

/// Host plus the first path segment, e.g. `www.google.com/calendar`.
pub fn host_first_path(host: &str, path: &str) -> String {
    let end = path.find(['/', '?', '#']).unwrap_or(path.len());
    if end == 0 {
        host.to_string()
    } else {
        format!("{}/{}", host, &path[..end])
    }
}

/// `.us` names: localities (`ci.boston.ma.us`) keep four labels, states
/// (`state.ca.us`) three, everything else two.
pub fn us_domain(hostname: &str) -> String {
    let labels: Vec<&str> = hostname.split('.').collect();
    let n = labels.len();
    let is_state_code = |label: &str| label.chars().count() == 2;

    if n >= 4
        && labels[n - 1] == "us"
        && is_state_code(labels[n - 2])
        && !labels[n - 3].is_empty()
        && ["co", "ci", "town", "vil"]
            .iter()
            .any(|p| labels[n - 4].ends_with(p))
    {
        return four_level_domain(hostname).to_string();
    }

    if n >= 3
        && labels[n - 1] == "us"
        && is_state_code(labels[n - 2])
        && labels[n - 3].ends_with("state")
    {
        return three_level_domain(hostname).to_string();
    }

    two_level_domain(hostname).to_string()
}
