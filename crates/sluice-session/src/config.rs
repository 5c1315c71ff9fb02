//! Configuration for sessions, flood control and penalties.
//!
//! Every struct derives `Deserialize` with `#[serde(default)]`, so a config
//! file only has to name the values it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::LocalizedText;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Reliability and ordering settings applied to every session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sent reliable packets remembered for acknowledgement and resend.
    pub pending_capacity: usize,

    /// Recently received sequence numbers remembered for duplicate
    /// suppression.
    pub received_history: usize,

    /// An unacknowledged packet is resent once this long has passed since
    /// it was last sent.
    pub retransmit_after_ms: u64,

    /// A peer whose pending list is full of unacknowledged packets, the
    /// oldest sent longer ago than this, is disconnected. Also the idle
    /// limit for sessions that never send a Hello.
    pub unresponsive_after_ms: u64,

    /// Deliver reliable payloads in sequence order instead of arrival order.
    pub message_ordering: bool,

    /// Most out-of-order payloads held while waiting for a gap to fill.
    pub reorder_capacity: usize,

    /// A held payload older than this gives up on the gap in front of it.
    pub reorder_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pending_capacity: 8,
            received_history: 8,
            retransmit_after_ms: 1500,
            unresponsive_after_ms: 8000,
            message_ordering: false,
            reorder_capacity: 32,
            reorder_timeout_ms: 5000,
        }
    }
}

impl SessionConfig {
    pub fn retransmit_after(&self) -> Duration {
        Duration::from_millis(self.retransmit_after_ms)
    }

    pub fn unresponsive_after(&self) -> Duration {
        Duration::from_millis(self.unresponsive_after_ms)
    }

    pub fn reorder_timeout(&self) -> Duration {
        Duration::from_millis(self.reorder_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// RateLimitConfig
// ---------------------------------------------------------------------------

/// One sliding window: at most `max_count` datagrams per `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimit {
    pub window_ms: u64,
    pub max_count: u32,
}

impl WindowLimit {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Per-session flood control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Datagrams larger than this are dropped before anything else runs.
    pub max_packet_size_bytes: usize,

    /// Limit for Reliable, Hello and Ping datagrams.
    pub reliable: WindowLimit,

    /// Limit for Unreliable, Acknowledge and Disconnect datagrams.
    pub unreliable: WindowLimit,

    /// Warnings older than this are forgotten.
    pub warnings_window_ms: u64,

    /// Warnings within the window that trigger the penalty.
    pub max_warnings: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_packet_size_bytes: 4096,
            reliable: WindowLimit {
                window_ms: 4000,
                max_count: 20,
            },
            unreliable: WindowLimit {
                window_ms: 1000,
                max_count: 10,
            },
            warnings_window_ms: 120_000,
            max_warnings: 3,
        }
    }
}

impl RateLimitConfig {
    pub fn warnings_window(&self) -> Duration {
        Duration::from_millis(self.warnings_window_ms)
    }
}

// ---------------------------------------------------------------------------
// PenaltyPolicy
// ---------------------------------------------------------------------------

/// What happens to a peer that keeps flooding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PenaltyAction {
    /// Disconnect, escalating to a ban after repeated offenses.
    #[default]
    Disconnect,
    /// Ban on the first offense.
    Ban,
}

/// Escalation applied when the rate limiter gives up on a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyPolicy {
    pub action: PenaltyAction,

    /// Disconnects from one address within `disconnect_tracking_ms` that
    /// turn into a ban. 0 never escalates.
    pub ban_after_disconnects: u32,

    /// How long a penalty disconnect counts toward escalation.
    pub disconnect_tracking_ms: u64,

    pub ban_duration_secs: u64,

    /// Shown to a peer disconnected for flooding.
    pub disconnect_message: LocalizedText,

    /// Shown to a banned peer. `%1` is the ban duration.
    pub ban_message: LocalizedText,

    /// Minimum gap between two ban notices sent to the same address.
    pub ban_notice_interval_ms: u64,
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        Self {
            action: PenaltyAction::Disconnect,
            ban_after_disconnects: 3,
            disconnect_tracking_ms: 600_000,
            ban_duration_secs: 3600,
            disconnect_message: LocalizedText::single(
                "en",
                "You have been disconnected for sending too many packets.",
            ),
            ban_message: LocalizedText::single("en", "You have been banned for %1."),
            ban_notice_interval_ms: 10_000,
        }
    }
}

impl PenaltyPolicy {
    pub fn disconnect_tracking(&self) -> Duration {
        Duration::from_millis(self.disconnect_tracking_ms)
    }

    pub fn ban_duration(&self) -> Duration {
        Duration::from_secs(self.ban_duration_secs)
    }

    pub fn ban_notice_interval(&self) -> Duration {
        Duration::from_millis(self.ban_notice_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// EndpointConfig
// ---------------------------------------------------------------------------

/// Everything the [`Endpoint`](crate::Endpoint) needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub session: SessionConfig,
    pub rate_limit: RateLimitConfig,
    pub penalty: PenaltyPolicy,
    /// Locale used when a client's own language has no translation.
    pub default_locale: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            rate_limit: RateLimitConfig::default(),
            penalty: PenaltyPolicy::default(),
            default_locale: "en".to_string(),
        }
    }
}

impl EndpointConfig {
    /// Fix values that would make the endpoint misbehave.
    ///
    /// Called automatically by [`Endpoint::new`](crate::Endpoint::new).
    /// Capacities are raised to at least 1 and the datagram limit to at
    /// least the 3-byte packet header.
    pub fn validated(mut self) -> Self {
        let session = &mut self.session;
        for (name, value) in [
            ("pending_capacity", &mut session.pending_capacity),
            ("received_history", &mut session.received_history),
            ("reorder_capacity", &mut session.reorder_capacity),
        ] {
            if *value == 0 {
                tracing::warn!(field = name, "capacity of 0 is not usable, raising to 1");
                *value = 1;
            }
        }
        if self.rate_limit.max_packet_size_bytes < 3 {
            tracing::warn!(
                max = self.rate_limit.max_packet_size_bytes,
                "max_packet_size_bytes below header size, raising to 3"
            );
            self.rate_limit.max_packet_size_bytes = 3;
        }
        if self.default_locale.is_empty() {
            self.default_locale = "en".to_string();
        }
        self
    }
}
