//! Holding area for reliable payloads that arrive ahead of sequence.
//!
//! Releases items strictly in sequence order. The buffer is bounded two
//! ways so a gap that never fills cannot stall delivery or grow memory:
//!
//! - more than `capacity` held items forces a resync;
//! - any held item older than the timeout forces a resync on [`expire`].
//!
//! A resync gives up on the missing sequences, jumps `next_expected` to the
//! lowest held sequence and drains from there.
//!
//! [`expire`]: ReorderBuffer::expire

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::sequence::{distance, is_ahead};

#[derive(Debug)]
struct Held<T> {
    item: T,
    held_since: Instant,
}

#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next_expected: u16,
    held: HashMap<u16, Held<T>>,
    capacity: usize,
    timeout: Duration,
}

impl<T> ReorderBuffer<T> {
    pub fn new(next_expected: u16, capacity: usize, timeout: Duration) -> Self {
        Self {
            next_expected,
            held: HashMap::new(),
            capacity,
            timeout,
        }
    }

    pub fn next_expected(&self) -> u16 {
        self.next_expected
    }

    /// Restarts the expected sequence. Anything held is discarded.
    pub fn set_next_expected(&mut self, sequence: u16) {
        self.next_expected = sequence;
        self.held.clear();
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Offers `item` with `sequence`. Returns everything now deliverable,
    /// in order.
    ///
    /// Items behind `next_expected` are stale and dropped. A second copy of
    /// an already-held sequence is ignored.
    pub fn push(&mut self, sequence: u16, item: T, now: Instant) -> Vec<T> {
        if sequence == self.next_expected {
            let mut ready = vec![item];
            self.next_expected = self.next_expected.wrapping_add(1);
            self.drain_into(&mut ready);
            return ready;
        }

        if !is_ahead(sequence, self.next_expected) {
            tracing::trace!(sequence, expected = self.next_expected, "stale sequence dropped");
            return Vec::new();
        }

        self.held.entry(sequence).or_insert(Held {
            item,
            held_since: now,
        });

        if self.held.len() > self.capacity {
            tracing::debug!(
                held = self.held.len(),
                expected = self.next_expected,
                "reorder buffer full, skipping gap"
            );
            return self.resync();
        }
        Vec::new()
    }

    /// Resyncs if any held item has waited longer than the timeout.
    pub fn expire(&mut self, now: Instant) -> Vec<T> {
        let stale = self
            .held
            .values()
            .any(|h| now.saturating_duration_since(h.held_since) >= self.timeout);
        if !stale {
            return Vec::new();
        }
        tracing::debug!(
            held = self.held.len(),
            expected = self.next_expected,
            "reorder gap timed out, skipping"
        );
        self.resync()
    }

    /// Jumps to the lowest held sequence and drains contiguously from it.
    pub fn resync(&mut self) -> Vec<T> {
        let expected = self.next_expected;
        let Some(lowest) = self.held.keys().copied().min_by_key(|&s| distance(expected, s)) else {
            return Vec::new();
        };
        self.next_expected = lowest;
        let mut ready = Vec::new();
        self.drain_into(&mut ready);
        ready
    }

    fn drain_into(&mut self, ready: &mut Vec<T>) {
        while let Some(held) = self.held.remove(&self.next_expected) {
            ready.push(held.item);
            self.next_expected = self.next_expected.wrapping_add(1);
        }
    }
}
