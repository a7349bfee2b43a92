//! Bounded log of recent anomaly events.

use std::collections::VecDeque;

use uuid::Uuid;

use crate::AnomalyEvent;

// ---

/// Most recent anomaly events, oldest evicted first.
///
/// Sequence ids start at 1 and increase by one per appended event, across
/// evictions. The log never hands out references; readers get copies.
#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    next_seq: u64,
    entries: VecDeque<AnomalyEvent>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        EventLog {
            capacity: capacity.max(1),
            next_seq: 1,
            entries: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Stamp `events` with sequence ids and fresh UUIDs, record them, and
    /// return the stamped copies in the same order.
    pub fn append(&mut self, events: Vec<AnomalyEvent>) -> Vec<AnomalyEvent> {
        let mut stamped = Vec::with_capacity(events.len());
        for mut event in events {
            event.seq = self.next_seq;
            event.id = Uuid::new_v4();
            self.next_seq += 1;

            self.entries.push_back(event.clone());
            stamped.push(event);
        }
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        stamped
    }

    /// Up to `limit` events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AnomalyEvent> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    /// Copy of the whole log, oldest first.
    pub fn snapshot(&self) -> Vec<AnomalyEvent> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sequence id the next appended event will receive.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }
}
