use std::collections::HashMap;

use ahash::RandomState;

/// Running summary for one key. All values are in tenths.
///
/// A `Stats` only exists once a value has been seen, so `min` and `max` are
/// always real observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub min: i64,
    pub max: i64,
    pub sum: i128,
    pub count: u64,
}

impl Stats {
    pub fn new(value: i64) -> Self {
        Self {
            min: value,
            max: value,
            sum: value as i128,
            count: 1,
        }
    }

    #[inline]
    pub fn record(&mut self, value: i64) {
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
        self.sum += value as i128;
        self.count += 1;
    }

    /// Monoid combine: associative and commutative.
    pub fn merge(&mut self, other: &Stats) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.count += other.count;
    }

    /// Mean in tenths, rounded half away from zero.
    pub fn mean_tenths(&self) -> i64 {
        let count = self.count as i128;
        let rounded = if self.sum >= 0 {
            (2 * self.sum + count) / (2 * count)
        } else {
            -((-2 * self.sum + count) / (2 * count))
        };
        // mean lies within [min, max], both of which are i64
        rounded as i64
    }
}

/// Key → [`Stats`] map shared by workers (local) and the merger (global).
#[derive(Debug, Clone, Default)]
pub struct AggregateMap {
    entries: HashMap<Box<[u8]>, Stats, RandomState>,
}

impl AggregateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observation in, creating the entry on first sight of `key`.
    #[inline]
    pub fn record(&mut self, key: &[u8], value: i64) {
        match self.entries.get_mut(key) {
            Some(stats) => stats.record(value),
            None => {
                self.entries.insert(key.into(), Stats::new(value));
            }
        }
    }

    /// Fold a whole partial map in, consuming it.
    pub fn merge(&mut self, other: AggregateMap) {
        if self.entries.is_empty() {
            self.entries = other.entries;
            return;
        }
        for (key, stats) in other.entries {
            self.entries
                .entry(key)
                .and_modify(|global| global.merge(&stats))
                .or_insert(stats);
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&Stats> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by key bytes.
    pub fn sorted(&self) -> Vec<(&[u8], &Stats)> {
        let mut sorted: Vec<_> = self.entries.iter().map(|(k, v)| (&**k, v)).collect();
        sorted.sort_unstable_by(|a, b| a.0.cmp(b.0));
        sorted
    }
}

impl PartialEq for AggregateMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for AggregateMap {}
