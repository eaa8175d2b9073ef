//! Stats for every final (attributed) service name: the unit of reporting.

use std::collections::BTreeMap;

use serde::Serialize;

use super::names::select_best;
use super::{NamedStatSet, OriginStats};
use super::{NAVIGATION, REQUEST};

/// `final name -> original name -> kind -> Stat`.
///
/// A final name is present only while its [`OriginStats`] holds something.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ServiceRegistry {
    stat: BTreeMap<String, OriginStats>,
}

impl ServiceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample for `name` under final name `service`.
    pub fn add(&mut self, service: &str, name: &str, kind: &str, delta: f64) {
        self.stat
            .entry(service.to_string())
            .or_default()
            .add(name, kind, delta);
    }

    pub fn increment(&mut self, service: &str, name: &str, kind: &str, countable: &str) {
        self.stat
            .entry(service.to_string())
            .or_default()
            .increment(name, kind, countable);
    }

    /// Merge a whole [`OriginStats`] (usually a tab's buffer) under `service`.
    pub fn transfer(&mut self, service: &str, stats: OriginStats) {
        if stats.is_empty() {
            return;
        }
        match self.stat.get_mut(service) {
            Some(existing) => existing.transfer(stats),
            None => {
                self.stat.insert(service.to_string(), stats);
            }
        }
    }

    /// Merge one `(service, name)` entry back in, e.g. after a failed
    /// delivery.
    pub fn transfer_entry(&mut self, service: &str, name: &str, stats: NamedStatSet) {
        if stats.is_empty() {
            return;
        }
        self.stat
            .entry(service.to_string())
            .or_default()
            .transfer_name(name, stats);
    }

    /// Read-only view of one service's entries.
    pub fn service(&self, service: &str) -> Option<&OriginStats> {
        self.stat.get(service)
    }

    /// Remove one original name from `service`, dropping the service when
    /// nothing is left under it.
    pub fn delete(&mut self, service: &str, name: &str) {
        self.take(service, name);
    }

    /// Remove a whole service.
    pub fn delete_service(&mut self, service: &str) {
        self.stat.remove(service);
    }

    /// Like [`delete`](Self::delete), but hands the removed entry back.
    pub fn take(&mut self, service: &str, name: &str) -> Option<NamedStatSet> {
        let origins = self.stat.get_mut(service)?;
        let taken = origins.take(name);
        if origins.is_empty() {
            self.stat.remove(service);
        }
        taken
    }

    /// Service with the most navigations, then the most requests, other than
    /// `exclude`.
    pub fn best(&self, exclude: Option<&str>) -> Option<&str> {
        self.best_where(|service| Some(service) != exclude)
    }

    /// [`best`](Self::best) over the services `keep` accepts.
    pub fn best_where(&self, keep: impl Fn(&str) -> bool) -> Option<&str> {
        select_best(
            self.stat
                .iter()
                .filter(|(service, _)| keep(service.as_str()))
                .map(|(service, s)| (service.as_str(), s.count(NAVIGATION), s.count(REQUEST))),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.stat.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stat.len()
    }

    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.stat.keys().map(String::as_str)
    }
}
