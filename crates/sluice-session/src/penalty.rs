//! Per-address penalty escalation and timed bans.
//!
//! Sessions come and go, but a flooding host keeps its IP. Strikes and bans
//! are therefore tracked by address, outside any session, and survive the
//! session being torn down.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::time::{Duration, Instant};

use crate::config::{PenaltyAction, PenaltyPolicy};

/// What the tracker decided for one offense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenaltyVerdict {
    Disconnect,
    Ban { duration: Duration },
}

#[derive(Debug)]
pub struct PenaltyTracker {
    policy: PenaltyPolicy,
    strikes: HashMap<IpAddr, VecDeque<Instant>>,
    bans: HashMap<IpAddr, Instant>,
    /// When each banned address was last sent a ban notice.
    notices: HashMap<IpAddr, Instant>,
}

impl PenaltyTracker {
    pub fn new(policy: PenaltyPolicy) -> Self {
        Self {
            policy,
            strikes: HashMap::new(),
            bans: HashMap::new(),
            notices: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &PenaltyPolicy {
        &self.policy
    }

    /// Records one flood offense from `ip` and decides the penalty.
    pub fn record_offense(&mut self, ip: IpAddr, now: Instant) -> PenaltyVerdict {
        let duration = self.policy.ban_duration();
        if self.policy.action == PenaltyAction::Ban {
            self.ban(ip, duration, now);
            return PenaltyVerdict::Ban { duration };
        }

        let threshold = self.policy.ban_after_disconnects as usize;
        let tracking = self.policy.disconnect_tracking();
        let strikes = self.strikes.entry(ip).or_default();
        strikes.retain(|at| now.saturating_duration_since(*at) <= tracking);
        strikes.push_back(now);

        if threshold > 0 && strikes.len() >= threshold {
            self.strikes.remove(&ip);
            self.ban(ip, duration, now);
            PenaltyVerdict::Ban { duration }
        } else {
            PenaltyVerdict::Disconnect
        }
    }

    pub fn ban(&mut self, ip: IpAddr, duration: Duration, now: Instant) {
        self.bans.insert(ip, now + duration);
        self.notices.remove(&ip);
        tracing::warn!(%ip, duration_secs = duration.as_secs(), "address banned");
    }

    /// Lifts a ban. Returns `true` if one was in place.
    pub fn unban(&mut self, ip: IpAddr) -> bool {
        self.notices.remove(&ip);
        self.bans.remove(&ip).is_some()
    }

    /// Whether a ban notice may go to `ip` now. Records the notice if so.
    ///
    /// At most one notice per address per `ban_notice_interval_ms`.
    pub fn claim_ban_notice(&mut self, ip: IpAddr, now: Instant) -> bool {
        let interval = self.policy.ban_notice_interval();
        match self.notices.get(&ip) {
            Some(last) if now.saturating_duration_since(*last) < interval => false,
            _ => {
                self.notices.insert(ip, now);
                true
            }
        }
    }

    /// Time left on `ip`'s ban, if it is banned.
    pub fn ban_remaining(&self, ip: IpAddr, now: Instant) -> Option<Duration> {
        self.bans
            .get(&ip)
            .filter(|until| **until > now)
            .map(|until| until.saturating_duration_since(now))
    }

    pub fn is_banned(&self, ip: IpAddr, now: Instant) -> bool {
        self.ban_remaining(ip, now).is_some()
    }

    /// Drops lapsed bans and strikes. Returns how many bans expired.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.bans.len();
        self.bans.retain(|_, until| *until > now);
        let expired = before - self.bans.len();
        let bans = &self.bans;
        self.notices.retain(|ip, _| bans.contains_key(ip));

        let tracking = self.policy.disconnect_tracking();
        self.strikes.retain(|_, strikes| {
            strikes.retain(|at| now.saturating_duration_since(*at) <= tracking);
            !strikes.is_empty()
        });

        if expired > 0 {
            tracing::debug!(expired, "expired bans purged");
        }
        expired
    }
}

/// Renders a duration for a ban message: `1 hour 30 minutes`, `45 seconds`.
pub fn describe_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let parts = [
        (total / 86_400, "day"),
        (total % 86_400 / 3600, "hour"),
        (total % 3600 / 60, "minute"),
        (total % 60, "second"),
    ];
    let words: Vec<String> = parts
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| {
            if *n == 1 {
                format!("1 {unit}")
            } else {
                format!("{n} {unit}s")
            }
        })
        .collect();
    if words.is_empty() {
        "0 seconds".to_string()
    } else {
        words.join(" ")
    }
}
