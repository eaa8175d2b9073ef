//! A single latency distribution.
//!
//! Holds enough composite data on a series of measurements to partially
//! reconstruct the distribution: count, total, high, low, plus named
//! outcome counters ("countables") that are not latency samples.

use std::collections::BTreeMap;

use serde::Serialize;

/// Composite measurement of one latency kind.
///
/// Samples go through [`Stat::add`], outcomes through [`Stat::increment`],
/// and two stats combine with [`Stat::transfer`], which consumes its source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stat {
    #[serde(skip_serializing_if = "is_zero_count")]
    count: u64,
    #[serde(skip_serializing_if = "is_zero_total")]
    total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    high: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    low: Option<f64>,
    #[serde(flatten)]
    countables: BTreeMap<String, u64>,
}

fn is_zero_count(v: &u64) -> bool {
    *v == 0
}

fn is_zero_total(v: &f64) -> bool {
    *v == 0.0
}

impl Stat {
    /// Empty stat: no samples, no countables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Incorporate one latency sample (milliseconds).
    pub fn add(&mut self, delta: f64) {
        self.count += 1;
        self.total += delta;
        self.high = Some(self.high.map_or(delta, |h| h.max(delta)));
        self.low = Some(self.low.map_or(delta, |l| l.min(delta)));
    }

    /// Bump the named outcome counter by one.
    pub fn increment(&mut self, countable: &str) {
        *self.countables.entry(countable.to_string()).or_insert(0) += 1;
    }

    /// Merge `other` into `self`. The source is moved in and cannot be read
    /// again.
    pub fn transfer(&mut self, other: Stat) {
        self.count += other.count;
        self.total += other.total;
        self.high = match (self.high, other.high) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.low = match (self.low, other.low) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        for (name, n) in other.countables {
            *self.countables.entry(name).or_insert(0) += n;
        }
    }

    /// Number of latency samples.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Samples plus every countable outcome.
    pub fn observations(&self) -> u64 {
        self.count + self.countables.values().sum::<u64>()
    }

    /// Sum of all samples.
    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn high(&self) -> Option<f64> {
        self.high
    }

    pub fn low(&self) -> Option<f64> {
        self.low
    }

    /// Occurrences of outcome `name`, zero if never seen.
    pub fn countable(&self, name: &str) -> u64 {
        self.countables.get(name).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stat() {
        let s = Stat::new();
        assert_eq!(s.count(), 0);
        assert_eq!(s.total(), 0.0);
        assert_eq!(s.high(), None);
        assert_eq!(s.low(), None);
    }

    #[test]
    fn add_tracks_range() {
        let mut s = Stat::new();
        s.add(5.0);
        assert_eq!((s.count(), s.total(), s.high()), (1, 5.0, Some(5.0)));

        s.add(3.0);
        assert_eq!((s.count(), s.total(), s.high()), (2, 8.0, Some(5.0)));
        assert_eq!(s.low(), Some(3.0));

        s.add(10.0);
        assert_eq!((s.count(), s.total(), s.high()), (3, 18.0, Some(10.0)));
    }

    #[test]
    fn three_sample_range() {
        let mut s = Stat::new();
        for v in [550.0, 30.0, 1500.0] {
            s.add(v);
        }
        assert_eq!(s.count(), 3);
        assert_eq!(s.total(), 2080.0);
        assert_eq!(s.high(), Some(1500.0));
        assert_eq!(s.low(), Some(30.0));
    }

    #[test]
    fn transfer_merges() {
        let mut s = Stat::new();
        let mut t = Stat::new();
        t.add(10.0);
        s.transfer(t);
        assert_eq!((s.count(), s.total(), s.high()), (1, 10.0, Some(10.0)));

        let mut t = Stat::new();
        for v in [12.0, 8.0, 4.0] {
            t.add(v);
        }
        t.increment("tabclosed");
        s.transfer(t);
        assert_eq!(s.count(), 4);
        assert_eq!(s.total(), 34.0);
        assert_eq!(s.high(), Some(12.0));
        assert_eq!(s.low(), Some(4.0));
        assert_eq!(s.countable("tabclosed"), 1);
        assert_eq!(s.observations(), 5);
    }

    #[test]
    fn increment_is_not_a_sample() {
        let mut s = Stat::new();
        s.increment("tabclosed");
        s.increment("tabclosed");
        assert_eq!(s.count(), 0);
        assert_eq!(s.countable("tabclosed"), 2);
        assert_eq!(s.observations(), 2);
    }

    #[test]
    fn wire_form_omits_absent_fields() {
        let s = Stat::new();
        assert_eq!(serde_json::to_string(&s).unwrap(), "{}");

        let mut s = Stat::new();
        s.add(1.0);
        s.increment("tabclosed");
        assert_eq!(
            serde_json::to_value(&s).unwrap(),
            serde_json::json!({"count": 1, "total": 1.0, "high": 1.0, "low": 1.0, "tabclosed": 1})
        );
    }
}
