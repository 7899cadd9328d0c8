use crate::echo::STANDARD_MTU_SIZE;
use crate::node::{Capabilities, Protocol};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SessionState {
    Closed,
    Opening,
    Open { port: u16 },
    Closing,
    Failed { error: String },
}

impl SessionState {
    pub fn is_open(&self) -> bool {
        matches!(self, SessionState::Open { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SessionState::Failed { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Open,
    Opened { port: u16 },
    OpenFailed { error: String },
    Close,
    Closed,
    TransportError { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionVerifierConfig {
    pub protocol: Protocol,
    pub capabilities: Capabilities,
    /// Number of messages written into the session
    pub message_count: usize,
    /// Size every message is padded to
    pub message_size: usize,
    /// Bound on a single socket read or write
    pub io_timeout: Duration,
    /// Host the node should bind the session's local end on
    pub listen_host: Option<String>,
}

impl Default for SessionVerifierConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Tcp,
            capabilities: Capabilities::reliable(),
            message_count: 100,
            message_size: STANDARD_MTU_SIZE,
            io_timeout: Duration::from_secs(3600),
            listen_host: None,
        }
    }
}

impl SessionVerifierConfig {
    /// Defaults, with a smaller batch when running under CI.
    pub fn for_environment() -> Self {
        let ci = std::env::var("CI").map(|v| v != "false").unwrap_or(false);
        Self {
            message_count: if ci { 50 } else { 100 },
            ..Default::default()
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_message_count(mut self, count: usize) -> Self {
        self.message_count = count;
        self
    }

    pub fn with_message_size(mut self, size: usize) -> Self {
        self.message_size = size.max(1);
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }
}

/// Outcome of one session round trip.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub port: u16,
    pub bytes_sent: usize,
    pub bytes_received: usize,
    pub matched: bool,
    pub first_difference: Option<usize>,
    /// Set when the transport failed before all bytes came back
    pub transport_error: Option<String>,
    pub elapsed: Duration,
    /// Machine state just before the session was closed
    pub state_at_close: SessionState,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.matched && self.transport_error.is_none()
    }
}

/// Message `index` as written into the session: the decimal index padded
/// with spaces to `size` bytes.
pub fn padded_message(index: usize, size: usize) -> String {
    format!("{index:<size$}")
}

/// Position of the first differing byte, `None` when equal.
pub fn first_difference(expected: &[u8], actual: &[u8]) -> Option<usize> {
    let shared = expected.len().min(actual.len());
    (0..shared)
        .find(|&i| expected[i] != actual[i])
        .or_else(|| (expected.len() != actual.len()).then_some(shared))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_message() {
        let msg = padded_message(42, 8);
        assert_eq!(msg, "42      ");
        assert_eq!(padded_message(7, STANDARD_MTU_SIZE).len(), STANDARD_MTU_SIZE);
    }

    #[test]
    fn test_padding_never_truncates() {
        assert_eq!(padded_message(12345, 3), "12345");
    }

    #[test]
    fn test_first_difference() {
        assert_eq!(first_difference(b"abc", b"abc"), None);
        assert_eq!(first_difference(b"abc", b"abd"), Some(2));
        assert_eq!(first_difference(b"abc", b"ab"), Some(2));
        assert_eq!(first_difference(b"", b"x"), Some(0));
    }

    #[test]
    fn test_state_predicates() {
        assert!(SessionState::Open { port: 1 }.is_open());
        assert!(SessionState::Closed.is_terminal());
        assert!(SessionState::Failed { error: "x".into() }.is_terminal());
        assert!(!SessionState::Closing.is_terminal());
    }
}
