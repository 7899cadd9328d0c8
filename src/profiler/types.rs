use crate::artifacts::ProfileArtifacts;
use crate::node::DelayConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of histogram bins used for every delay profile.
pub const HISTOGRAM_BINS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilerConfig {
    /// Messages sent per run
    pub message_count: usize,
    /// Wait after channel setup before the first send
    pub settle_delay: Duration,
    /// Added to the source's maximum mixer delay to bound each receipt
    pub receipt_grace: Duration,
    /// First inbox poll interval
    pub poll_initial_interval: Duration,
    /// Upper bound on the inbox poll interval
    pub poll_max_interval: Duration,
    /// Send pacing in messages per second (0 = unlimited)
    pub send_rate: u32,
    /// Channel funding multiplier for profiling routes
    pub funding_multiplier: u32,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            message_count: 1000,
            settle_delay: Duration::from_secs(2),
            receipt_grace: Duration::from_secs(15),
            poll_initial_interval: Duration::from_millis(10),
            poll_max_interval: Duration::from_millis(250),
            send_rate: 0,
            funding_multiplier: 2,
        }
    }
}

impl ProfilerConfig {
    pub fn with_message_count(mut self, count: usize) -> Self {
        self.message_count = count;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_receipt_grace(mut self, grace: Duration) -> Self {
        self.receipt_grace = grace;
        self
    }

    pub fn with_send_rate(mut self, per_second: u32) -> Self {
        self.send_rate = per_second;
        self
    }

    /// Per-message receipt bound: the source's maximum delay plus the grace.
    pub fn receipt_timeout(&self, source_delay: &DelayConfig) -> Duration {
        Duration::from_millis(source_delay.max_ms()) + self.receipt_grace
    }
}

/// One profiling message. Offsets are measured from the start of the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketRecord {
    pub index: usize,
    pub tag: u16,
    pub sent_at: Duration,
    pub received_at: Option<Duration>,
}

impl PacketRecord {
    pub fn transfer_time(&self) -> Option<Duration> {
        self.received_at.map(|r| r.saturating_sub(self.sent_at))
    }
}

/// Aggregate over the received samples, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayStats {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// `counts.len() + 1` ascending bin edges
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    pub fn bin_count(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// `(left edge, right edge, count)` per bin.
    pub fn bins(&self) -> impl Iterator<Item = (f64, f64, usize)> + '_ {
        self.edges
            .windows(2)
            .zip(&self.counts)
            .map(|(w, &count)| (w[0], w[1], count))
    }
}

/// Delay configuration of the first two nodes of a profiled route, used to
/// label artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileLabels {
    pub source: DelayConfig,
    pub next_hop: DelayConfig,
}

impl ProfileLabels {
    pub fn new(source: DelayConfig, next_hop: DelayConfig) -> Self {
        Self { source, next_hop }
    }

    /// File name component shared by all artifacts of a run. Absent values
    /// appear as `NA` since a path cannot carry the slash of `N/A`.
    pub fn file_suffix(&self, timestamp: &str) -> String {
        let part = |label: String| label.replace('/', "");
        format!(
            "{}_l1_{}r{}_l2_{}r{}",
            timestamp,
            part(self.source.min_label()),
            part(self.source.range_label()),
            part(self.next_hop.min_label()),
            part(self.next_hop.range_label())
        )
    }

    pub fn describe(&self) -> String {
        format!(
            "Local1 Delay: {} (Range: {}), Local2 Delay: {} (Range: {})",
            self.source.min_ms_label(),
            self.source.range_ms_label(),
            self.next_hop.min_ms_label(),
            self.next_hop.range_ms_label()
        )
    }
}

#[derive(Debug, Clone)]
pub struct DelayProfile {
    pub records: Vec<PacketRecord>,
    pub stats: DelayStats,
    pub histogram: Histogram,
    pub artifacts: ProfileArtifacts,
}

impl DelayProfile {
    /// `(index, transfer time in seconds)` for every received message.
    pub fn samples(&self) -> Vec<(usize, f64)> {
        samples(&self.records)
    }

    pub fn dropped(&self) -> usize {
        self.records.len() - self.stats.count
    }
}

pub(crate) fn samples(records: &[PacketRecord]) -> Vec<(usize, f64)> {
    records
        .iter()
        .filter_map(|r| r.transfer_time().map(|t| (r.index, t.as_secs_f64())))
        .collect()
}
