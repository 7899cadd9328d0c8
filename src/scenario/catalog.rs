//! The scenario table.

use crate::node::{DelayConfig, Protocol};
use crate::scenario::types::{ScenarioDescriptor, ScenarioKind};
use std::time::Duration;

pub const MESSAGE_DELAY_MS: u64 = 5000;
pub const DISTRIBUTION_MESSAGES: usize = 1000;
pub const DISTRIBUTION_RANGE_MS: u64 = 1000;

/// Relay delays swept by the session scenarios. The last one is far above
/// the default breaking threshold.
pub const RELAY_SWEEP: [DelayConfig; 3] = [
    DelayConfig {
        min_delay_ms: None,
        delay_range_ms: None,
    },
    DelayConfig {
        min_delay_ms: Some(1000),
        delay_range_ms: Some(500),
    },
    DelayConfig {
        min_delay_ms: Some(10000),
        delay_range_ms: Some(1),
    },
];

/// A single zero-hop message from a source delaying it by at least 5 s.
pub fn message_delay() -> ScenarioDescriptor {
    ScenarioDescriptor::new(
        format!("message-delay-{MESSAGE_DELAY_MS}ms"),
        ScenarioKind::MessageDelay {
            source: DelayConfig::new(MESSAGE_DELAY_MS, 1),
            min_duration: Duration::from_millis(MESSAGE_DELAY_MS),
        },
    )
}

/// Zero-hop batches with a 1 s range over minimum delays of 1, 2 and 3 s.
pub fn delay_distribution(messages: usize) -> Vec<ScenarioDescriptor> {
    (1..=3)
        .map(|j| {
            let min = j * 1000;
            ScenarioDescriptor::new(
                format!("delay-distribution-{min}ms"),
                ScenarioKind::DelayDistribution {
                    source: DelayConfig::new(min, DISTRIBUTION_RANGE_MS),
                    messages,
                },
            )
        })
        .collect()
}

/// Session round trips through a relay for each of `relays`. A relay whose
/// minimum delay exceeds `breaking_threshold_ms` is expected to fail.
pub fn relay_sweep(
    relays: &[DelayConfig],
    protocol: Protocol,
    breaking_threshold_ms: u64,
) -> Vec<ScenarioDescriptor> {
    relays
        .iter()
        .map(|relay| {
            let descriptor = ScenarioDescriptor::new(
                format!("session-{protocol}-relay-{}ms", relay.min_ms()),
                ScenarioKind::SessionRoundTrip {
                    relay: *relay,
                    protocol,
                },
            );
            if relay.min_ms() > breaking_threshold_ms {
                descriptor.expect_failure()
            } else {
                descriptor
            }
        })
        .collect()
}

/// The full table with default sizes.
pub fn all(breaking_threshold_ms: u64) -> Vec<ScenarioDescriptor> {
    let mut table = vec![message_delay()];
    table.extend(delay_distribution(DISTRIBUTION_MESSAGES));
    table.extend(relay_sweep(&RELAY_SWEEP, Protocol::Tcp, breaking_threshold_ms));
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::types::ExpectedOutcome;

    #[test]
    fn test_distribution_minimums() {
        let table = delay_distribution(DISTRIBUTION_MESSAGES);
        let minimums: Vec<u64> = table
            .iter()
            .map(|d| match &d.kind {
                ScenarioKind::DelayDistribution { source, messages } => {
                    assert_eq!(*messages, 1000);
                    assert_eq!(source.range_ms(), 1000);
                    source.min_ms()
                }
                other => panic!("unexpected kind {other:?}"),
            })
            .collect();
        assert_eq!(minimums, vec![1000, 2000, 3000]);
    }

    #[test]
    fn test_relay_above_threshold_is_expected_failure() {
        let table = relay_sweep(&RELAY_SWEEP, Protocol::Tcp, 5000);
        let expected: Vec<_> = table.iter().map(|d| d.expected).collect();
        assert_eq!(
            expected,
            vec![
                ExpectedOutcome::Pass,
                ExpectedOutcome::Pass,
                ExpectedOutcome::Fail
            ]
        );
        assert_eq!(table[2].name, "session-tcp-relay-10000ms");
        assert_eq!(table[0].name, "session-tcp-relay-0ms");
    }

    #[test]
    fn test_threshold_moves_expectation() {
        let table = relay_sweep(&RELAY_SWEEP, Protocol::Udp, 500);
        assert_eq!(table[1].expected, ExpectedOutcome::Fail);
    }

    #[test]
    fn test_full_table() {
        let table = all(5000);
        assert_eq!(table.len(), 7);
        assert_eq!(table[0].name, "message-delay-5000ms");
    }
}
