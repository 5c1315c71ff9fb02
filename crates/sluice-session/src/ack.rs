//! Acknowledgement bookkeeping for one session.
//!
//! Two bounded FIFOs:
//!
//! - **pending**: reliable packets we sent, kept with their encoded bytes so
//!   they can be resent verbatim. Acknowledged entries stay (flagged) until
//!   they age out, so the FIFO length and the unacked count differ.
//! - **received**: sequence numbers we recently accepted from the peer, used
//!   to spot duplicates that must be re-acked but not re-delivered.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One reliable packet awaiting acknowledgement.
#[derive(Debug, Clone)]
pub struct PendingPacket {
    pub sequence: u16,
    /// Encoded datagram, resent unchanged.
    pub bytes: Vec<u8>,
    pub first_sent_at: Instant,
    pub last_sent_at: Instant,
    pub acked: bool,
    pub resends: u32,
}

/// Result of matching an inbound acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The entry was outstanding and is now acknowledged.
    ///
    /// `rtt_sample` is `None` when the packet had been resent, since the
    /// ack could belong to either copy.
    Acked { rtt_sample: Option<Duration> },
    /// The entry was already acknowledged.
    Duplicate,
    /// No entry with this sequence (never sent, or already evicted).
    Unknown,
}

#[derive(Debug)]
pub struct AckTracker {
    pending: VecDeque<PendingPacket>,
    pending_capacity: usize,
    received: VecDeque<u16>,
    received_capacity: usize,
}

impl AckTracker {
    pub fn new(pending_capacity: usize, received_capacity: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(pending_capacity + 1),
            pending_capacity,
            received: VecDeque::with_capacity(received_capacity + 1),
            received_capacity,
        }
    }

    /// Remembers a sent reliable packet.
    ///
    /// Returns the oldest entry if the FIFO overflowed. It is dropped
    /// without a resend whether or not it was acknowledged.
    pub fn record_sent(&mut self, sequence: u16, bytes: Vec<u8>, now: Instant) -> Option<PendingPacket> {
        self.pending.push_back(PendingPacket {
            sequence,
            bytes,
            first_sent_at: now,
            last_sent_at: now,
            acked: false,
            resends: 0,
        });
        if self.pending.len() > self.pending_capacity {
            self.pending.pop_front()
        } else {
            None
        }
    }

    pub fn acknowledge(&mut self, sequence: u16, now: Instant) -> AckOutcome {
        let Some(entry) = self.pending.iter_mut().find(|p| p.sequence == sequence) else {
            return AckOutcome::Unknown;
        };
        if entry.acked {
            return AckOutcome::Duplicate;
        }
        entry.acked = true;
        let rtt_sample = (entry.resends == 0).then(|| now.saturating_duration_since(entry.last_sent_at));
        AckOutcome::Acked { rtt_sample }
    }

    /// Records an inbound sequence. Returns `false` if it was already seen.
    pub fn mark_received(&mut self, sequence: u16) -> bool {
        if self.received.contains(&sequence) {
            return false;
        }
        self.received.push_back(sequence);
        while self.received.len() > self.received_capacity {
            self.received.pop_front();
        }
        true
    }

    pub fn has_received(&self, sequence: u16) -> bool {
        self.received.contains(&sequence)
    }

    /// Collects every unacked packet last sent at least `after` ago and
    /// stamps it as resent at `now`.
    pub fn take_overdue(&mut self, now: Instant, after: Duration) -> Vec<(u16, Vec<u8>)> {
        self.pending
            .iter_mut()
            .filter(|p| !p.acked && now.saturating_duration_since(p.last_sent_at) >= after)
            .map(|p| {
                p.last_sent_at = now;
                p.resends += 1;
                (p.sequence, p.bytes.clone())
            })
            .collect()
    }

    /// Whether `sequence` is in the pending FIFO and not yet acknowledged.
    pub fn is_outstanding(&self, sequence: u16) -> bool {
        self.pending.iter().any(|p| p.sequence == sequence && !p.acked)
    }

    pub fn unacked_count(&self) -> usize {
        self.pending.iter().filter(|p| !p.acked).count()
    }

    /// When the oldest still-unacked packet was first sent.
    pub fn oldest_unacked_sent_at(&self) -> Option<Instant> {
        self.pending
            .iter()
            .filter(|p| !p.acked)
            .map(|p| p.first_sent_at)
            .min()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_capacity(&self) -> usize {
        self.pending_capacity
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingPacket> {
        self.pending.iter()
    }
}
