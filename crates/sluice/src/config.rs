//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sluice_session::EndpointConfig;
use sluice_tick::SweepConfig;
use sluice_transport::MAX_DATAGRAM_SIZE;

use crate::SluiceError;

/// Everything needed to start a [`SluiceServer`](crate::SluiceServer).
///
/// Loads from JSON with every field optional:
///
/// ```json
/// {
///     "bind": "0.0.0.0:22023",
///     "endpoint": {
///         "session": { "message_ordering": true },
///         "rate_limit": { "max_warnings": 5 }
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the UDP socket binds to.
    pub bind: String,

    /// Time between retransmission sweeps. 0 disables the sweep.
    pub sweep_interval_ms: u64,

    /// Size of the receive buffer. Always kept larger than the datagram
    /// size limit so oversized datagrams are recognised as such.
    pub recv_buffer_bytes: usize,

    pub endpoint: EndpointConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:22023".to_string(),
            sweep_interval_ms: 2000,
            recv_buffer_bytes: MAX_DATAGRAM_SIZE,
            endpoint: EndpointConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, SluiceError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub(crate) fn sweep_config(&self) -> SweepConfig {
        if self.sweep_interval_ms == 0 {
            SweepConfig::disabled()
        } else {
            SweepConfig::every(self.sweep_interval())
        }
    }

    /// Buffer size actually used: at least one byte past the datagram
    /// limit, at most the largest UDP payload.
    pub(crate) fn effective_recv_buffer(&self) -> usize {
        let floor = self.endpoint.rate_limit.max_packet_size_bytes.saturating_add(1);
        self.recv_buffer_bytes.max(floor).min(MAX_DATAGRAM_SIZE.max(floor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.sweep_interval(), Duration::from_millis(2000));
        assert_eq!(config.endpoint.rate_limit.max_packet_size_bytes, 4096);
        assert_eq!(config.endpoint.default_locale, "en");
        assert!(!config.endpoint.session.message_ordering);
    }

    #[test]
    fn test_from_json_partial_document() {
        let config = ServerConfig::from_json(
            r#"{
                "bind": "127.0.0.1:0",
                "endpoint": {
                    "session": { "message_ordering": true },
                    "rate_limit": { "reliable": { "window_ms": 1000, "max_count": 5 } },
                    "penalty": { "action": "ban", "ban_message": { "en": "Go away for %1." } }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.bind, "127.0.0.1:0");
        assert_eq!(config.sweep_interval_ms, 2000);
        assert!(config.endpoint.session.message_ordering);
        assert_eq!(config.endpoint.session.pending_capacity, 8);
        assert_eq!(config.endpoint.rate_limit.reliable.max_count, 5);
        assert_eq!(config.endpoint.rate_limit.unreliable.max_count, 10);
        assert_eq!(
            config.endpoint.penalty.action,
            sluice_session::PenaltyAction::Ban
        );
        assert_eq!(
            config
                .endpoint
                .penalty
                .ban_message
                .format(None, "en", &["1 hour"])
                .as_deref(),
            Some("Go away for 1 hour.")
        );
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            ServerConfig::from_json("not json"),
            Err(SluiceError::Config(_))
        ));
    }

    #[test]
    fn test_zero_interval_disables_sweep() {
        let config = ServerConfig {
            sweep_interval_ms: 0,
            ..ServerConfig::default()
        };
        assert!(config.sweep_config().is_disabled());
        assert!(!ServerConfig::default().sweep_config().is_disabled());
    }

    #[test]
    fn test_recv_buffer_exceeds_packet_limit() {
        let config = ServerConfig {
            recv_buffer_bytes: 16,
            ..ServerConfig::default()
        };
        assert_eq!(config.effective_recv_buffer(), 4097);
        assert_eq!(ServerConfig::default().effective_recv_buffer(), MAX_DATAGRAM_SIZE);
    }
}
