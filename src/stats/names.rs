//! Latency stats grouped by the service name originally requested.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::Serialize;

use super::NamedStatSet;
use super::{NAVIGATION, REQUEST};

/// `original name -> kind -> Stat`.
///
/// Used both as a tab's provisional buffer and as one service's entry in
/// the [`ServiceRegistry`](super::ServiceRegistry).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct OriginStats {
    stat: BTreeMap<String, NamedStatSet>,
}

impl OriginStats {
    /// Empty, as a fresh tab's buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample under original name `name`.
    pub fn add(&mut self, name: &str, kind: &str, delta: f64) {
        self.stat.entry(name.to_string()).or_default().add(kind, delta);
    }

    /// Count an outcome under original name `name`.
    pub fn increment(&mut self, name: &str, kind: &str, countable: &str) {
        self.stat
            .entry(name.to_string())
            .or_default()
            .increment(kind, countable);
    }

    /// Merge all of `other` into `self`, consuming it.
    pub fn transfer(&mut self, other: OriginStats) {
        for (name, stats) in other.stat {
            match self.stat.entry(name) {
                Entry::Occupied(mut e) => e.get_mut().transfer(stats),
                Entry::Vacant(e) => {
                    e.insert(stats);
                }
            }
        }
    }

    /// Merge one original name's stats into `self`.
    pub fn transfer_name(&mut self, name: &str, stats: NamedStatSet) {
        match self.stat.get_mut(name) {
            Some(existing) => existing.transfer(stats),
            None => {
                self.stat.insert(name.to_string(), stats);
            }
        }
    }

    /// Stats recorded under original name `name`.
    pub fn get(&self, name: &str) -> Option<&NamedStatSet> {
        self.stat.get(name)
    }

    /// Remove and return one original name's stats.
    pub fn take(&mut self, name: &str) -> Option<NamedStatSet> {
        self.stat.remove(name)
    }

    /// Total observations of `kind` across every original name.
    pub fn count(&self, kind: &str) -> u64 {
        self.stat.values().map(|s| s.count(kind)).sum()
    }

    /// Latency total of `kind` across every original name.
    pub fn total(&self, kind: &str) -> f64 {
        self.stat.values().map(|s| s.total(kind)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.stat.is_empty()
    }

    /// Drop original name `name` and everything under it.
    pub fn delete(&mut self, name: &str) {
        self.stat.remove(name);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stat.keys().map(String::as_str)
    }

    /// Original name with the most navigations, then the most requests,
    /// skipping `exclude`. Earlier names win exact ties.
    pub fn best(&self, exclude: Option<&str>) -> Option<&str> {
        select_best(
            self.stat
                .iter()
                .filter(|(name, _)| Some(name.as_str()) != exclude)
                .map(|(name, s)| (name.as_str(), s.count(NAVIGATION), s.count(REQUEST))),
        )
    }
}

/// Pick the first candidate with the greatest `(navigations, requests)`.
pub(crate) fn select_best<'a>(
    candidates: impl Iterator<Item = (&'a str, u64, u64)>,
) -> Option<&'a str> {
    let mut best: Option<(&str, u64, u64)> = None;
    for (name, navigations, requests) in candidates {
        let better = match best {
            None => true,
            Some((_, bn, br)) => navigations > bn || (navigations == bn && requests > br),
        };
        if better {
            best = Some((name, navigations, requests));
        }
    }
    best.map(|(name, _, _)| name)
}
