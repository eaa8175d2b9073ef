//! Per-tab state: in-flight requests, the top-level navigation, and stats
//! buffered until the tab's final service name is known.

use std::collections::HashMap;

use crate::error::EventError;
use crate::net::resolver::{status_code_family, NameResolver};
use crate::stats::OriginStats;
use crate::stats::{NAVIGATION, REQUEST, TAB_CLOSED, TAB_REQUEST, TAB_UPDATE};

use super::event::{Navigation, Request, TabStatus, TabUpdate};

#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub url: String,
    pub start: f64,
    pub status_code: Option<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavigationRecord {
    pub url: String,
    pub start: f64,
    pub frame_id: i64,
}

/// One tab, from its first event until it is removed.
#[derive(Debug, Default)]
pub struct SessionUnit {
    requests: HashMap<String, RequestRecord>,
    navigation: Option<NavigationRecord>,
    service: Option<String>,
    aborted: Option<String>,
    loading_since: Option<f64>,
    stat: OriginStats,
}

impl SessionUnit {
    /// Fresh tab with nothing tracked.
    pub fn new() -> Self {
        Self::default()
    }

    /// Final service name of the page the tab settled on, if any.
    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    /// Top-level navigation still in flight.
    pub fn navigation(&self) -> Option<&NavigationRecord> {
        self.navigation.as_ref()
    }

    /// Name of the last aborted top-level navigation, kept for close-time
    /// accounting.
    pub fn aborted_name(&self) -> Option<&str> {
        self.aborted.as_deref()
    }

    pub fn open_requests(&self) -> usize {
        self.requests.len()
    }

    /// Buffered, not yet promoted stats.
    pub fn stats(&self) -> &OriginStats {
        &self.stat
    }

    /// Hand the buffered stats over, leaving the buffer empty.
    pub fn take_stats(&mut self) -> OriginStats {
        std::mem::take(&mut self.stat)
    }

    /// Open a request record. A record already open under the same id is
    /// closed first, ending at this event's timestamp.
    pub fn start_request(&mut self, resolver: &NameResolver, req: &Request) {
        let record = RequestRecord {
            url: req.url.clone(),
            start: req.timestamp,
            status_code: req.status_code,
        };
        if let Some(stale) = self.requests.insert(req.request_id.clone(), record) {
            // Redirect chains reuse the id; the new start ends the old leg.
            log::debug!("request {} restarted, closing {}", req.request_id, stale.url);
            let status = req.status_code.or(stale.status_code);
            if let Err(e) = self.record_request(resolver, &stale, req.timestamp, status) {
                log::debug!("dropped restarted request {}: {}", req.request_id, e);
            }
        }
    }

    /// Close a request and record its latency. Cache hits record nothing;
    /// an end URL that differs from the start URL drops the record.
    pub fn end_request(&mut self, resolver: &NameResolver, req: &Request) -> Result<(), EventError> {
        let record = self
            .requests
            .remove(&req.request_id)
            .ok_or_else(|| EventError::UnknownRequest(req.request_id.clone()))?;

        if req.from_cache {
            log::debug!("request {} ({}) served from cache", req.request_id, req.url);
            return Ok(());
        }

        if record.url != req.url {
            return Err(EventError::UrlMismatch {
                id: req.request_id.clone(),
                start: record.url,
                end: req.url.clone(),
            });
        }

        let status = req.status_code.or(record.status_code);
        self.record_request(resolver, &record, req.timestamp, status)
    }

    /// The request failed: forget it without a sample.
    pub fn delete_request(&mut self, req: &Request) -> Result<(), EventError> {
        self.requests
            .remove(&req.request_id)
            .map(|_| ())
            .ok_or_else(|| EventError::UnknownRequest(req.request_id.clone()))
    }

    /// Error statuses are counted as outcomes, everything else as latency.
    fn record_request(
        &mut self,
        resolver: &NameResolver,
        record: &RequestRecord,
        end: f64,
        status: Option<u16>,
    ) -> Result<(), EventError> {
        let name = resolver
            .resolve(&record.url)
            .ok_or_else(|| EventError::Unresolvable(record.url.clone()))?;
        let kind = if self.service.is_some() { TAB_REQUEST } else { REQUEST };

        match status.and_then(status_code_family) {
            Some(family @ (400 | 500)) => self.stat.increment(&name, kind, &family.to_string()),
            _ => self.stat.add(&name, kind, end - record.start),
        }
        Ok(())
    }

    /// Track a new top-level navigation. Whatever the tab resolved or
    /// aborted before no longer applies.
    pub fn start_navigation(&mut self, nav: &Navigation) {
        if !nav.is_top_level() {
            return;
        }
        let Some(url) = nav.url.clone() else {
            return;
        };
        if let Some(previous) = &self.navigation {
            log::debug!("navigation to {} replaced before completing", previous.url);
        }
        self.service = None;
        self.aborted = None;
        self.navigation = Some(NavigationRecord {
            url,
            start: nav.timestamp,
            frame_id: nav.frame_id,
        });
    }

    /// Records the navigation sample and returns the tab's new final service
    /// name. Sub-frame completions are ignored.
    pub fn end_navigation(
        &mut self,
        resolver: &NameResolver,
        nav: &Navigation,
    ) -> Result<Option<String>, EventError> {
        if !nav.is_top_level() {
            return Ok(None);
        }
        let current = self
            .navigation
            .as_ref()
            .filter(|current| current.frame_id == nav.frame_id)
            .ok_or(EventError::UnknownFrame(nav.frame_id))?;

        // Resolve both names before touching state, so a dropped event
        // leaves the navigation tracked.
        let final_url = nav.url.as_deref().unwrap_or(&current.url);
        let original = resolver
            .resolve(&current.url)
            .ok_or_else(|| EventError::Unresolvable(current.url.clone()))?;
        let service = resolver
            .resolve(final_url)
            .ok_or_else(|| EventError::Unresolvable(final_url.to_string()))?;
        let start = current.start;

        self.navigation = None;
        self.stat.add(&original, NAVIGATION, nav.timestamp - start);
        self.service = Some(service.clone());
        self.aborted = None;
        Ok(Some(service))
    }

    /// Take the tracked navigation if it belongs to `frame_id`.
    fn take_navigation(&mut self, frame_id: i64) -> Result<NavigationRecord, EventError> {
        match self.navigation.take() {
            Some(current) if current.frame_id == frame_id => Ok(current),
            other => {
                self.navigation = other;
                Err(EventError::UnknownFrame(frame_id))
            }
        }
    }

    /// The navigation failed. Aborts remember the attempted name.
    pub fn delete_navigation(
        &mut self,
        resolver: &NameResolver,
        nav: &Navigation,
    ) -> Result<(), EventError> {
        if !nav.is_top_level() {
            return Ok(());
        }
        let current = self.take_navigation(nav.frame_id)?;
        if nav.is_aborted() {
            self.aborted = resolver.resolve(&current.url);
        }
        Ok(())
    }

    /// Time `loading` to `complete` as a `tabupdate` sample.
    pub fn tab_updated(&mut self, resolver: &NameResolver, update: &TabUpdate) -> Result<(), EventError> {
        match update.status {
            TabStatus::Loading => self.loading_since = Some(update.timestamp),
            TabStatus::Complete => {
                let Some(start) = self.loading_since else {
                    log::debug!("tab completed {} without loading", update.url);
                    return Ok(());
                };
                let name = resolver
                    .resolve(&update.url)
                    .ok_or_else(|| EventError::Unresolvable(update.url.clone()))?;
                self.loading_since = None;
                self.stat.add(&name, TAB_UPDATE, update.timestamp - start);
            }
            TabStatus::Other => {}
        }
        Ok(())
    }

    /// Tear the tab down. Anything still outstanding on a tab that never
    /// resolved is counted as `tabclosed`. Returns the name the leftover
    /// stats belong under, with the stats themselves.
    pub fn close(mut self, resolver: &NameResolver) -> (Option<String>, OriginStats) {
        if let Some(service) = self.service.take() {
            return (Some(service), self.stat);
        }

        let navigation = self
            .navigation
            .take()
            .and_then(|nav| resolver.resolve(&nav.url));
        let owner = match navigation {
            Some(name) => {
                self.stat.increment(&name, NAVIGATION, TAB_CLOSED);
                Some(name)
            }
            None => {
                if let Some(name) = &self.aborted {
                    self.stat.increment(name, NAVIGATION, TAB_CLOSED);
                }
                self.aborted.take()
            }
        };

        for (id, record) in self.requests.drain() {
            match resolver.resolve(&record.url) {
                Some(name) => self.stat.increment(&name, REQUEST, TAB_CLOSED),
                None => log::debug!("request {} ({}) closed unresolvable", id, record.url),
            }
        }

        (owner, self.stat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::event::ABORTED;
    use crate::net::rules;

    fn resolver() -> NameResolver {
        NameResolver::new(true).with_group(rules::google_services())
    }

    fn request(id: &str, url: &str, ts: f64) -> Request {
        Request {
            session_id: 1,
            request_id: id.to_string(),
            url: url.to_string(),
            timestamp: ts,
            from_cache: false,
            status_code: None,
        }
    }

    fn navigation(frame: i64, parent: i64, url: &str, ts: f64) -> Navigation {
        Navigation {
            session_id: 1,
            frame_id: frame,
            parent_frame_id: parent,
            url: Some(url.to_string()),
            timestamp: ts,
            error: None,
        }
    }

    fn tab(status: TabStatus, url: &str, ts: f64) -> TabUpdate {
        TabUpdate {
            session_id: 1,
            status,
            url: url.to_string(),
            timestamp: ts,
        }
    }

    #[test]
    fn delete_request_records_nothing() {
        let r = resolver();
        let mut t = SessionUnit::new();
        t.start_request(&r, &request("1", "http://host.example.com/", 1000.0));
        t.delete_request(&request("1", "http://host.example.com/", 1001.0)).unwrap();
        assert_eq!(t.stats().count(REQUEST), 0);
        assert_eq!(t.open_requests(), 0);
    }

    #[test]
    fn end_request_records_latency() {
        let r = resolver();
        let mut t = SessionUnit::new();
        t.start_request(&r, &request("1", "http://host.example.com/", 1000.0));
        t.end_request(&r, &request("1", "http://host.example.com/", 1010.0)).unwrap();
        assert_eq!(t.stats().count(REQUEST), 1);
        assert_eq!(t.stats().total(REQUEST), 10.0);
        assert!(t.stats().get("example.com").is_some());
    }

    #[test]
    fn cached_request_records_nothing() {
        let r = resolver();
        let mut t = SessionUnit::new();
        t.start_request(&r, &request("2", "http://host.example.com/image.png", 1020.0));
        let mut end = request("2", "http://host.example.com/image.png", 1021.0);
        end.from_cache = true;
        t.end_request(&r, &end).unwrap();
        assert_eq!(t.stats().count(REQUEST), 0);
        assert_eq!(t.stats().total(REQUEST), 0.0);
        assert!(t.stats().is_empty());
    }

    #[test]
    fn unknown_and_mismatched_requests_are_dropped() {
        let r = resolver();
        let mut t = SessionUnit::new();
        assert_eq!(
            t.end_request(&r, &request("9", "http://a.com/", 5.0)),
            Err(EventError::UnknownRequest("9".into()))
        );

        t.start_request(&r, &request("3", "http://a.com/x", 1.0));
        let err = t.end_request(&r, &request("3", "http://a.com/y", 2.0)).unwrap_err();
        assert!(matches!(err, EventError::UrlMismatch { .. }));
        assert_eq!(t.open_requests(), 0);
        assert!(t.stats().is_empty());
    }

    #[test]
    fn restarted_request_closes_stale_record() {
        let r = resolver();
        let mut t = SessionUnit::new();
        t.start_request(&r, &request("4", "http://a.com/old", 100.0));
        t.start_request(&r, &request("4", "http://b.com/new", 130.0));
        assert_eq!(t.open_requests(), 1);
        assert_eq!(t.stats().get("a.com").unwrap().total(REQUEST), 30.0);

        t.end_request(&r, &request("4", "http://b.com/new", 140.0)).unwrap();
        assert_eq!(t.stats().get("b.com").unwrap().total(REQUEST), 10.0);
        assert_eq!(t.stats().count(REQUEST), 2);
    }

    #[test]
    fn error_status_is_an_outcome() {
        let r = resolver();
        let mut t = SessionUnit::new();
        t.start_request(&r, &request("5", "http://a.com/missing", 1.0));
        let mut end = request("5", "http://a.com/missing", 4.0);
        end.status_code = Some(404);
        t.end_request(&r, &end).unwrap();

        let stat = t.stats().get("a.com").unwrap().get(REQUEST).unwrap();
        assert_eq!(stat.count(), 0);
        assert_eq!(stat.countable("400"), 1);
        assert_eq!(t.stats().count(REQUEST), 1);
    }

    #[test]
    fn navigation_lifecycle() {
        let r = resolver();
        let mut t = SessionUnit::new();
        t.start_navigation(&navigation(0, -1, "http://host/", 1000.0));
        let service = t.end_navigation(&r, &navigation(0, -1, "http://host/", 1020.0)).unwrap();

        let host = r.resolve("http://host/").unwrap();
        assert_eq!(service.as_deref(), Some(host.as_str()));
        assert_eq!(t.service(), Some(host.as_str()));
        let nav = t.stats().get(&host).unwrap().get(NAVIGATION).unwrap();
        assert_eq!(nav.count(), 1);
        assert_eq!(nav.total(), 20.0);
    }

    #[test]
    fn redirected_navigation_splits_names() {
        let r = resolver();
        let mut t = SessionUnit::new();
        t.start_navigation(&navigation(0, -1, "http://goo.gl/abc", 0.0));
        let service = t
            .end_navigation(&r, &navigation(0, -1, "https://www.youtube.com/watch?v=x", 300.0))
            .unwrap();
        assert_eq!(service.as_deref(), Some("youtube.com"));
        assert_eq!(t.stats().get("goo.gl").unwrap().total(NAVIGATION), 300.0);
    }

    #[test]
    fn requests_after_resolution_are_tab_requests() {
        let r = resolver();
        let mut t = SessionUnit::new();
        t.start_request(&r, &request("1", "http://a.com/", 0.0));
        t.end_request(&r, &request("1", "http://a.com/", 5.0)).unwrap();
        t.start_navigation(&navigation(0, -1, "http://a.com/", 0.0));
        t.end_navigation(&r, &navigation(0, -1, "http://a.com/", 10.0)).unwrap();
        t.start_request(&r, &request("2", "http://a.com/poll", 20.0));
        t.end_request(&r, &request("2", "http://a.com/poll", 27.0)).unwrap();

        assert_eq!(t.stats().count(REQUEST), 1);
        assert_eq!(t.stats().count(TAB_REQUEST), 1);
        assert_eq!(t.stats().total(TAB_REQUEST), 7.0);
    }

    #[test]
    fn subframes_and_strangers_are_ignored() {
        let r = resolver();
        let mut t = SessionUnit::new();
        t.start_navigation(&navigation(5, 0, "http://ads.example.net/", 0.0));
        assert!(t.navigation().is_none());
        assert_eq!(t.end_navigation(&r, &navigation(5, 0, "http://ads.example.net/", 3.0)), Ok(None));

        assert_eq!(
            t.end_navigation(&r, &navigation(0, -1, "http://a.com/", 3.0)),
            Err(EventError::UnknownFrame(0))
        );

        t.start_navigation(&navigation(0, -1, "http://a.com/", 0.0));
        assert_eq!(
            t.end_navigation(&r, &navigation(7, -1, "http://a.com/", 3.0)),
            Err(EventError::UnknownFrame(7))
        );
        assert!(t.navigation().is_some());
    }

    #[test]
    fn new_navigation_clears_service() {
        let r = resolver();
        let mut t = SessionUnit::new();
        t.start_navigation(&navigation(0, -1, "http://a.com/", 0.0));
        t.end_navigation(&r, &navigation(0, -1, "http://a.com/", 1.0)).unwrap();
        assert_eq!(t.service(), Some("a.com"));
        t.start_navigation(&navigation(0, -1, "http://b.com/", 2.0));
        assert_eq!(t.service(), None);
    }

    #[test]
    fn aborted_navigation_is_remembered() {
        let r = resolver();
        let mut t = SessionUnit::new();
        t.start_navigation(&navigation(0, -1, "http://slow.example.org/", 0.0));
        let mut failed = navigation(0, -1, "http://slow.example.org/", 50.0);
        failed.error = Some(ABORTED.to_string());
        t.delete_navigation(&r, &failed).unwrap();
        assert!(t.navigation().is_none());
        assert_eq!(t.aborted_name(), Some("example.org"));
        assert!(t.stats().is_empty());

        t.start_navigation(&navigation(0, -1, "http://other.com/", 60.0));
        let mut failed = navigation(0, -1, "http://other.com/", 70.0);
        failed.error = Some("net::ERR_NAME_NOT_RESOLVED".to_string());
        t.delete_navigation(&r, &failed).unwrap();
        assert_eq!(t.aborted_name(), None);
    }

    #[test]
    fn superseded_abort_is_not_charged_at_close() {
        let r = resolver();
        let mut t = SessionUnit::new();
        t.start_navigation(&navigation(0, -1, "http://www.first.com/", 0.0));
        let mut aborted = navigation(0, -1, "http://www.first.com/", 5.0);
        aborted.error = Some(ABORTED.to_string());
        t.delete_navigation(&r, &aborted).unwrap();

        t.start_navigation(&navigation(0, -1, "http://www.second.com/", 10.0));
        let mut failed = navigation(0, -1, "http://www.second.com/", 15.0);
        failed.error = Some("net::ERR_CONNECTION_RESET".to_string());
        t.delete_navigation(&r, &failed).unwrap();

        let (owner, stats) = t.close(&r);
        assert_eq!(owner, None);
        assert!(stats.is_empty());
    }

    #[test]
    fn unresolvable_end_keeps_navigation() {
        let r = resolver();
        let mut t = SessionUnit::new();
        t.start_navigation(&navigation(0, -1, "http://www.slow.com/", 0.0));
        assert_eq!(
            t.end_navigation(&r, &navigation(0, -1, "http://", 10.0)),
            Err(EventError::Unresolvable("http://".to_string()))
        );
        assert_eq!(t.navigation().map(|n| n.url.as_str()), Some("http://www.slow.com/"));
        assert!(t.stats().is_empty());
        assert_eq!(t.service(), None);

        let (owner, stats) = t.close(&r);
        assert_eq!(owner.as_deref(), Some("slow.com"));
        let nav = stats.get("slow.com").unwrap().get(NAVIGATION).unwrap();
        assert_eq!(nav.countable(TAB_CLOSED), 1);
    }

    #[test]
    fn unresolvable_completion_keeps_loading_timer() {
        let r = resolver();
        let mut t = SessionUnit::new();
        t.tab_updated(&r, &tab(TabStatus::Loading, "http://server/", 100.0)).unwrap();
        assert_eq!(
            t.tab_updated(&r, &tab(TabStatus::Complete, "http://", 150.0)),
            Err(EventError::Unresolvable("http://".to_string()))
        );
        t.tab_updated(&r, &tab(TabStatus::Complete, "http://server/", 180.0)).unwrap();
        assert_eq!(t.stats().total(TAB_UPDATE), 80.0);
    }

    #[test]
    fn tab_update_timing() {
        let r = resolver();
        let mut t = SessionUnit::new();
        t.tab_updated(&r, &tab(TabStatus::Loading, "http://server/path", 100.0)).unwrap();
        t.tab_updated(&r, &tab(TabStatus::Complete, "http://server/path", 180.0)).unwrap();
        assert_eq!(t.stats().count(TAB_UPDATE), 1);
        assert_eq!(t.stats().total(TAB_UPDATE), 80.0);

        t.tab_updated(&r, &tab(TabStatus::Complete, "http://server/path", 200.0)).unwrap();
        assert_eq!(t.stats().count(TAB_UPDATE), 1);
    }

    #[test]
    fn closing_unresolved_tab_counts_abandoned_work() {
        let r = resolver();
        let mut t = SessionUnit::new();
        t.start_navigation(&navigation(0, -1, "http://www.example.com/", 0.0));
        t.start_request(&r, &request("1", "http://cdn.example.net/a.js", 1.0));

        let (owner, stats) = t.close(&r);
        assert_eq!(owner.as_deref(), Some("example.com"));
        let nav = stats.get("example.com").unwrap().get(NAVIGATION).unwrap();
        assert_eq!(nav.countable(TAB_CLOSED), 1);
        let req = stats.get("example.net").unwrap().get(REQUEST).unwrap();
        assert_eq!(req.countable(TAB_CLOSED), 1);
    }

    #[test]
    fn closing_after_abort_uses_aborted_name() {
        let r = resolver();
        let mut t = SessionUnit::new();
        t.start_navigation(&navigation(0, -1, "http://www.example.com/", 0.0));
        let mut failed = navigation(0, -1, "http://www.example.com/", 9.0);
        failed.error = Some(ABORTED.to_string());
        t.delete_navigation(&r, &failed).unwrap();

        let (owner, stats) = t.close(&r);
        assert_eq!(owner.as_deref(), Some("example.com"));
        assert_eq!(stats.count(NAVIGATION), 1);
    }

    #[test]
    fn closing_resolved_tab_counts_nothing() {
        let r = resolver();
        let mut t = SessionUnit::new();
        t.start_navigation(&navigation(0, -1, "http://a.com/", 0.0));
        t.end_navigation(&r, &navigation(0, -1, "http://a.com/", 1.0)).unwrap();
        t.take_stats();

        let (owner, stats) = t.close(&r);
        assert_eq!(owner.as_deref(), Some("a.com"));
        assert!(stats.is_empty());
    }
}
