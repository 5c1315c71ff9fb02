//! The session registry: every live session, by address and by client id.
//!
//! # Concurrency note
//!
//! Not thread-safe by itself. The endpoint owns it and the server loop owns
//! the endpoint, so every mutation happens on one task.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::SocketAddr;
use std::time::Instant;

use sluice_protocol::ClientId;

use crate::config::{RateLimitConfig, SessionConfig};
use crate::Session;

pub struct SessionRegistry {
    sessions: HashMap<SocketAddr, Session>,
    /// Index from client id to address, kept in sync with `sessions`.
    clients: HashMap<ClientId, SocketAddr>,
    next_client_id: u32,
    session_config: SessionConfig,
    rate_limit: RateLimitConfig,
}

impl SessionRegistry {
    pub fn new(session_config: SessionConfig, rate_limit: RateLimitConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            clients: HashMap::new(),
            next_client_id: 1,
            session_config,
            rate_limit,
        }
    }

    /// Returns the session for `addr`, creating it with a fresh client id if
    /// there is none. The flag is `true` when the session was just created.
    pub fn lookup_or_create(&mut self, addr: SocketAddr, now: Instant) -> (&mut Session, bool) {
        match self.sessions.entry(addr) {
            Entry::Occupied(entry) => (entry.into_mut(), false),
            Entry::Vacant(entry) => {
                let client_id = ClientId(self.next_client_id);
                self.next_client_id = self.next_client_id.wrapping_add(1).max(1);
                self.clients.insert(client_id, addr);
                tracing::debug!(%client_id, %addr, "session created");
                let session = Session::new(client_id, addr, &self.session_config, &self.rate_limit, now);
                (entry.insert(session), true)
            }
        }
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&Session> {
        self.sessions.get(addr)
    }

    pub fn get_mut(&mut self, addr: &SocketAddr) -> Option<&mut Session> {
        self.sessions.get_mut(addr)
    }

    pub fn address_of(&self, client_id: ClientId) -> Option<SocketAddr> {
        self.clients.get(&client_id).copied()
    }

    pub fn get_by_client(&self, client_id: ClientId) -> Option<&Session> {
        self.address_of(client_id).and_then(|addr| self.sessions.get(&addr))
    }

    pub fn get_by_client_mut(&mut self, client_id: ClientId) -> Option<&mut Session> {
        let addr = self.address_of(client_id)?;
        self.sessions.get_mut(&addr)
    }

    /// Removes the session at `addr`. Safe to call twice.
    pub fn remove(&mut self, addr: &SocketAddr) -> Option<Session> {
        let session = self.sessions.remove(addr)?;
        self.clients.remove(&session.client_id());
        Some(session)
    }

    /// Snapshot of every address, for iteration that may remove sessions.
    pub fn addresses(&self) -> Vec<SocketAddr> {
        self.sessions.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
