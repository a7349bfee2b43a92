//! Bounded per-shard reading history.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{LocationKey, Parameter, Reading};

// ---

/// Identity of an independent history: one location, one pollutant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ShardKey {
    pub location: LocationKey,
    pub parameter: Parameter,
}

impl ShardKey {
    pub fn of(reading: &Reading) -> Self {
        ShardKey {
            location: reading.location_key(),
            parameter: reading.parameter,
        }
    }
}

/// The last `capacity` readings of a shard, ascending by `observed_at`.
#[derive(Debug, Clone)]
pub struct ShardHistory {
    capacity: usize,
    entries: VecDeque<Reading>,
}

impl ShardHistory {
    pub fn new(capacity: usize) -> Self {
        ShardHistory {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Insert in timestamp order and evict the oldest entry past capacity.
    ///
    /// Late arrivals land at their ordered position; one older than a full
    /// window is dropped immediately.
    pub fn push(&mut self, reading: Reading) {
        let at = self
            .entries
            .partition_point(|r| r.observed_at <= reading.observed_at);
        self.entries.insert(at, reading);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Newest entry observed at or before `at`.
    pub fn previous_to(&self, at: DateTime<Utc>) -> Option<&Reading> {
        self.entries.iter().rev().find(|r| r.observed_at <= at)
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<Reading> {
        self.entries.iter().cloned().collect()
    }
}
