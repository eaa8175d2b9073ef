//! Stats for several kinds of latency, keyed by measurement kind.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::Serialize;

use super::Stat;

/// `navigation`, `request`, `tabrequest`, `tabupdate`, ... each with its own
/// [`Stat`], created on first use.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NamedStatSet {
    stat: BTreeMap<String, Stat>,
}

impl NamedStatSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a `kind` latency sample.
    pub fn add(&mut self, kind: &str, delta: f64) {
        self.stat.entry(kind.to_string()).or_default().add(delta);
    }

    /// Count a `kind` outcome that is not a latency sample.
    pub fn increment(&mut self, kind: &str, countable: &str) {
        self.stat.entry(kind.to_string()).or_default().increment(countable);
    }

    /// Merge every kind of `other` into `self`. Kinds missing here are
    /// moved over whole.
    pub fn transfer(&mut self, other: NamedStatSet) {
        for (kind, stat) in other.stat {
            match self.stat.entry(kind) {
                Entry::Occupied(mut e) => e.get_mut().transfer(stat),
                Entry::Vacant(e) => {
                    e.insert(stat);
                }
            }
        }
    }

    /// Stat for `kind`, if anything was recorded.
    pub fn get(&self, kind: &str) -> Option<&Stat> {
        self.stat.get(kind)
    }

    /// Samples plus countable outcomes recorded for `kind`.
    pub fn count(&self, kind: &str) -> u64 {
        self.stat.get(kind).map_or(0, Stat::observations)
    }

    /// Latency total for `kind`; countables do not contribute.
    pub fn total(&self, kind: &str) -> f64 {
        self.stat.get(kind).map_or(0.0, Stat::total)
    }

    pub fn is_empty(&self) -> bool {
        self.stat.is_empty()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.stat.keys().map(String::as_str)
    }
}
