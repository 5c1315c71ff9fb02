//! Echo server: every message a client sends comes straight back to it.
//!
//! Clients are seated in a single lobby room so disconnects show up as
//! room detachments in the log.
//!
//! ```text
//! RUST_LOG=debug cargo run -p echo-server -- [config.json]
//! ```

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, Weak};

use sluice::prelude::*;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Lobby
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Lobby {
    members: Mutex<BTreeSet<ClientId>>,
}

impl Lobby {
    fn join(&self, client_id: ClientId) -> usize {
        let mut members = self.members.lock().unwrap_or_else(|e| e.into_inner());
        members.insert(client_id);
        members.len()
    }
}

impl Room for Lobby {
    fn name(&self) -> String {
        "LOBBY".to_string()
    }

    fn detach(&self, client_id: ClientId, cause: &DisconnectCause) {
        let mut members = self.members.lock().unwrap_or_else(|e| e.into_inner());
        members.remove(&client_id);
        tracing::info!(%client_id, %cause, remaining = members.len(), "left lobby");
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

struct Echo {
    lobby: Arc<Lobby>,
}

impl SessionHandler for Echo {
    async fn handle(&mut self, event: TransportEvent, server: &ServerHandle) {
        match event {
            TransportEvent::Identified {
                client_id,
                remote,
                identity,
            } => {
                let seated = self.lobby.join(client_id);
                tracing::info!(
                    %client_id,
                    %remote,
                    name = %identity.display_name,
                    seated,
                    "joined lobby"
                );
                let room: Weak<dyn Room> = Arc::downgrade(&self.lobby) as Weak<dyn Room>;
                if let Err(e) = server.attach_room(client_id, room) {
                    tracing::warn!(error = %e, "could not seat client");
                }
            }
            TransportEvent::Message {
                client_id,
                payload,
                reliable,
            } => {
                tracing::debug!(%client_id, messages = payload.len(), reliable, "echo");
                if let Err(e) = server.send(client_id, payload, reliable) {
                    tracing::warn!(error = %e, "echo failed");
                }
            }
            TransportEvent::Disconnected { client_id, cause, .. } => {
                tracing::info!(%client_id, %cause, "client gone");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

fn load_config() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)?;
            tracing::info!(%path, "loaded config");
            Ok(ServerConfig::from_json(&json)?)
        }
        None => Ok(ServerConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config()?;
    let server = SluiceServerBuilder::new()
        .config(config)
        .build(Echo {
            lobby: Arc::new(Lobby::default()),
        })
        .await?;

    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, shutting down");
            let _ = handle.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}
