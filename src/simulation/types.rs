use crate::node::DelayConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest payload a single relayed packet carries.
pub const MAX_PACKET_PAYLOAD: usize = 462;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Debited from a channel for every packet it carries
    pub ticket_price: u128,
    /// Packet payload size used when splitting session data
    pub max_payload: usize,
    /// A mixer delay above this breaks any session it hits
    pub session_break_delay: Duration,
    /// Host session listeners bind on when a request names none
    pub listen_host: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            ticket_price: 100,
            max_payload: MAX_PACKET_PAYLOAD,
            session_break_delay: Duration::from_millis(5000),
            listen_host: "127.0.0.1".to_string(),
        }
    }
}

impl SimulationConfig {
    pub fn with_ticket_price(mut self, price: u128) -> Self {
        self.ticket_price = price;
        self
    }

    pub fn with_session_break_delay(mut self, delay: Duration) -> Self {
        self.session_break_delay = delay;
        self
    }
}

/// Settings of one simulated node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimNodeConfig {
    pub alias: String,
    pub delay: DelayConfig,
}

impl SimNodeConfig {
    pub fn new(alias: impl Into<String>, delay: DelayConfig) -> Self {
        Self {
            alias: alias.into(),
            delay,
        }
    }
}

/// `count` nodes named `local1`, `local2`, ... with the given delays; nodes
/// past the end of `delays` have no delay configured.
pub fn local_nodes(count: usize, delays: &[DelayConfig]) -> Vec<SimNodeConfig> {
    (0..count)
        .map(|i| {
            SimNodeConfig::new(
                format!("local{}", i + 1),
                delays.get(i).copied().unwrap_or_default(),
            )
        })
        .collect()
}
