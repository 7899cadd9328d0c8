//! Parser for the node's line-oriented metrics exposition.

use std::collections::HashMap;

pub const MIXER_AVERAGE_DELAY: &str = "hopr_mixer_average_packet_delay";
pub const PACKETS_FORWARDED: &str = "hopr_packets_count{type=\"forwarded\"}";

/// Key/value view over one metrics scrape.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    values: HashMap<String, String>,
}

impl MetricsSnapshot {
    /// Parse exposition text. Comment lines (`#`) and blank lines are dropped;
    /// every other line splits at its first whitespace run into key and value.
    pub fn parse(text: &str) -> Self {
        let values = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (key, rest) = line.split_once(char::is_whitespace)?;
                Some((key.to_string(), rest.trim().to_string()))
            })
            .collect();

        Self { values }
    }

    pub fn raw(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Numeric value of `key`; a trailing sample timestamp is ignored.
    pub fn value(&self, key: &str) -> Option<f64> {
        self.raw(key)?.split_whitespace().next()?.parse().ok()
    }

    pub fn value_or_zero(&self, key: &str) -> f64 {
        self.value(key).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
