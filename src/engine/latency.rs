//! The aggregation engine: routes lifecycle events to tabs, promotes their
//! stats once a final service name is known, and reports one entry at a
//! time to the collector.
//!
//! Everything runs on the caller's thread except delivery, which happens on
//! a short-lived worker whose outcome comes back over a channel and is
//! applied by [`AggregationEngine::poll_deliveries`].

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::{DeliveryError, EventError};
use crate::net::report::{HttpSink, Report, ReportSink};
use crate::net::resolver::{NameResolver, UNCLASSIFIED};
use crate::stats::ServiceRegistry;

use super::event::Event;
use super::flush::FlushPolicy;
use super::tab::SessionUnit;

/// Outcome of one report handed back by its delivery worker.
struct Delivery {
    id: u64,
    report: Report,
    outcome: Result<(), DeliveryError>,
}

pub struct AggregationEngine {
    config: Config,
    resolver: NameResolver,
    tabs: HashMap<i64, SessionUnit>,
    services: ServiceRegistry,
    flush: FlushPolicy,
    sink: Arc<dyn ReportSink>,
    /// Delivery id -> services whose entry is out with the collector.
    in_flight: HashMap<u64, Vec<String>>,
    next_delivery: u64,
    delivery_tx: mpsc::Sender<Delivery>,
    delivery_rx: mpsc::Receiver<Delivery>,
}

impl AggregationEngine {
    /// Engine using the rule groups and options named in `config`.
    pub fn new(config: Config, sink: Arc<dyn ReportSink>) -> Self {
        let resolver = NameResolver::from_config(&config);
        Self::with_resolver(config, resolver, sink)
    }

    pub fn with_resolver(config: Config, resolver: NameResolver, sink: Arc<dyn ReportSink>) -> Self {
        let (delivery_tx, delivery_rx) = mpsc::channel();
        Self {
            flush: FlushPolicy::new(config.flush),
            config,
            resolver,
            tabs: HashMap::new(),
            services: ServiceRegistry::new(),
            sink,
            in_flight: HashMap::new(),
            next_delivery: 0,
            delivery_tx,
            delivery_rx,
        }
    }

    /// Engine posting to `config.report_to` over HTTP.
    pub fn from_config(config: Config) -> Result<Self, DeliveryError> {
        let sink = HttpSink::new(&config)?;
        Ok(Self::new(config, Arc::new(sink)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> &NameResolver {
        &self.resolver
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn tab(&self, session_id: i64) -> Option<&SessionUnit> {
        self.tabs.get(&session_id)
    }

    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    /// Reports sent but not yet acknowledged or failed.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Apply one lifecycle event. Errors mean the event was dropped and
    /// nothing changed; they are safe to ignore.
    pub fn handle(&mut self, event: Event) -> Result<(), EventError> {
        self.poll_deliveries();
        self.dispatch(event).map_err(|e| {
            log::debug!("dropped event: {}", e);
            e
        })
    }

    fn dispatch(&mut self, event: Event) -> Result<(), EventError> {
        match event {
            Event::StartRequest(details) => {
                let req = details.validate(true)?;
                self.tabs
                    .entry(req.session_id)
                    .or_default()
                    .start_request(&self.resolver, &req);
                self.promote(req.session_id);
            }
            Event::EndRequest(details) => {
                let req = details.validate(true)?;
                tab_mut(&mut self.tabs, req.session_id)?.end_request(&self.resolver, &req)?;
                self.promote(req.session_id);
            }
            Event::DeleteRequest(details) => {
                let req = details.validate(false)?;
                tab_mut(&mut self.tabs, req.session_id)?.delete_request(&req)?;
            }
            Event::StartNavigation(details) => {
                let nav = details.validate(true)?;
                if self.flush.check(nav.timestamp) {
                    self.report(None, nav.timestamp);
                }
                // whatever the old page still buffered belongs to it
                self.promote(nav.session_id);
                self.tabs.entry(nav.session_id).or_default().start_navigation(&nav);
            }
            Event::EndNavigation(details) => {
                let nav = details.validate(true)?;
                let resolved =
                    tab_mut(&mut self.tabs, nav.session_id)?.end_navigation(&self.resolver, &nav)?;
                if let Some(service) = resolved {
                    self.promote(nav.session_id);
                    self.report(Some(&service), nav.timestamp);
                }
            }
            Event::DeleteNavigation(details) => {
                let nav = details.validate(false)?;
                tab_mut(&mut self.tabs, nav.session_id)?.delete_navigation(&self.resolver, &nav)?;
            }
            Event::TabUpdated(details) => {
                let update = details.validate()?;
                self.tabs
                    .entry(update.session_id)
                    .or_default()
                    .tab_updated(&self.resolver, &update)?;
                self.promote(update.session_id);
            }
            Event::TabRemoved(details) => {
                let session_id = details.validate_removed()?;
                self.remove_tab(session_id);
            }
        }
        Ok(())
    }

    /// Move a resolved tab's buffered stats into the registry.
    fn promote(&mut self, session_id: i64) {
        let Some(tab) = self.tabs.get_mut(&session_id) else {
            return;
        };
        let Some(service) = tab.service().map(str::to_string) else {
            return;
        };
        if !tab.stats().is_empty() {
            self.services.transfer(&service, tab.take_stats());
        }
    }

    fn remove_tab(&mut self, session_id: i64) {
        let Some(tab) = self.tabs.remove(&session_id) else {
            log::debug!("tab {} removed before any event", session_id);
            return;
        };
        let (owner, stats) = tab.close(&self.resolver);
        let service = owner.unwrap_or_else(|| {
            if !stats.is_empty() {
                log::debug!("tab {} closed without a page, keeping its stats as unclassified", session_id);
            }
            UNCLASSIFIED.to_string()
        });
        self.services.transfer(&service, stats);
    }

    /// Send the best pending entry, skipping service `skip`. Returns the
    /// delivery id, or `None` when there was nothing to send.
    pub fn report(&mut self, skip: Option<&str>, now: f64) -> Option<u64> {
        let in_flight = &self.in_flight;
        let service = self
            .services
            .best_where(|s| Some(s) != skip && !in_flight.values().flatten().any(|f| f == s))?
            .to_string();
        let name = self.services.service(&service)?.best(skip)?.to_string();
        let stats = self.services.take(&service, &name)?;
        let report = Report::single(&self.config, &service, &name, stats);

        let id = self.next_delivery;
        self.next_delivery += 1;
        self.in_flight.insert(id, vec![service.clone()]);
        self.flush.reported(now);
        log::info!("reporting {} via {} (delivery {})", service, name, id);

        let sink = Arc::clone(&self.sink);
        let tx = self.delivery_tx.clone();
        std::thread::spawn(move || {
            let outcome = sink.send(&report);
            let _ = tx.send(Delivery { id, report, outcome });
        });
        Some(id)
    }

    /// Apply every delivery outcome that has arrived. Returns how many.
    pub fn poll_deliveries(&mut self) -> usize {
        let mut done = 0;
        while let Ok(delivery) = self.delivery_rx.try_recv() {
            self.complete(delivery);
            done += 1;
        }
        done
    }

    /// Block until nothing is in flight or `timeout` passes.
    pub fn wait_for_deliveries(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut done = 0;
        while !self.in_flight.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.delivery_rx.recv_timeout(remaining) {
                Ok(delivery) => {
                    self.complete(delivery);
                    done += 1;
                }
                Err(_) => break,
            }
        }
        done
    }

    fn complete(&mut self, delivery: Delivery) {
        self.in_flight.remove(&delivery.id);
        match delivery.outcome {
            Ok(()) => log::info!("delivery {} acknowledged", delivery.id),
            Err(e) => {
                log::warn!("delivery {} failed, keeping it for retry: {}", delivery.id, e);
                for (service, origins) in delivery.report.services {
                    self.services.transfer(&service, origins);
                }
            }
        }
    }
}

fn tab_mut(tabs: &mut HashMap<i64, SessionUnit>, session_id: i64) -> Result<&mut SessionUnit, EventError> {
    tabs.get_mut(&session_id)
        .ok_or(EventError::UnknownSession(session_id))
}
