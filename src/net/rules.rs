//! Built-in service groups.
//!
//! Deployments can register their own [`ServiceGroup`]s on the
//! [`NameResolver`](super::resolver::NameResolver); these are the ones that
//! ship with the crate and can be enabled by id from the config.

use super::resolver::{host_first_path, three_level_domain, two_level_domain, ServiceGroup};

pub const GOOGLE_SERVICES: &str = "googleServices";

/// Hosts whose service name includes the first path segment.
const GOOGLE_PATH_HOSTS: &[&str] = &["www.google.com"];

/// Domains split one level further, by subdomain (`mail.google.com`).
const GOOGLE_SUBDOMAIN_SERVICES: &[&str] = &["google.com"];

/// Domains counted as a single service each.
const GOOGLE_DOMAIN_SERVICES: &[&str] = &[
    "youtube.com",
    "youtube-nocookie.com",
    "youtu.be",
    "ytimg.com",
    "doubleclick.net",
    "googlesyndication.com",
    "admob.com",
    "googletagservices.com",
    "googleadservices.com",
    "google-analytics.com",
    "urchin.com",
    "googletagmanager.com",
    "gstatic.com",
    "goo.gl",
    "g.co",
    "googlecommerce.com",
    "android.com",
    "googleapis.com",
    "appspot.com",
    "withgoogle.com",
    "blogger.com",
    "blogblog.com",
    "blogspot.com",
    "googlecode.com",
    "googlesource.com",
    "googlegroups.com",
    "googleusercontent.com",
    "ggpht.com",
    "googledrive.com",
    "gmail.com",
    "googleitahosted.com",
    "itasoftware.com",
    "widevine.tv",
    "widevine.com",
    "keyhole.com",
    "googlemail.com",
    "google.net",
    "google.org",
    "googleratings.com",
];

/// Look up a built-in group by id.
pub fn builtin(id: &str) -> Option<ServiceGroup> {
    match id {
        GOOGLE_SERVICES => Some(google_services()),
        _ => None,
    }
}

/// Public Google services, broken down per product: `www.google.com/calendar`,
/// `mail.google.com`, `youtube.com`.
pub fn google_services() -> ServiceGroup {
    ServiceGroup::new(
        GOOGLE_SERVICES,
        "Breaks down URLs to public Google Services by the specific Google \
         service, for instance www.google.com/calendar or mail.google.com",
        google_name,
    )
}

fn google_name(host: &str, path: &str) -> Option<String> {
    if GOOGLE_PATH_HOSTS.contains(&host) {
        return Some(host_first_path(host, path));
    }

    let domain = two_level_domain(host);
    if GOOGLE_SUBDOMAIN_SERVICES.contains(&domain) {
        return Some(three_level_domain(host).to_string());
    }
    if GOOGLE_DOMAIN_SERVICES.contains(&domain) {
        return Some(domain.to_string());
    }

    None
}
