use crate::node::DelayConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Header of the append-only session summary.
pub const SESSION_SUMMARY_HEADER: &str =
    "timestamp,relay_min_delay_ms,relay_delay_range_ms,avg_packet_delay_ms,packets_relayed";

/// Header of the raw transfer-time series.
pub const SERIES_HEADER: &str = "packet_index,transfer_time";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Histogram images
    pub plots_dir: PathBuf,
    /// Raw transfer-time series
    pub series_dir: PathBuf,
    /// Session summary file, appended to across runs
    pub session_summary: PathBuf,
    /// Histogram image size in pixels
    pub image_size: (u32, u32),
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self::under("logs")
    }
}

impl ArtifactConfig {
    /// Default layout below `root`.
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            plots_dir: root.join("plots"),
            series_dir: root.clone(),
            session_summary: root.join("session_attack").join("session_attack.csv"),
            image_size: (1000, 600),
        }
    }
}

/// Paths written for one profiling run. `None` where persisting failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileArtifacts {
    pub histogram: Option<PathBuf>,
    pub series: Option<PathBuf>,
}

/// One row of the session summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummaryRow {
    pub timestamp: String,
    pub relay_delay: DelayConfig,
    pub avg_packet_delay_ms: f64,
    pub packets_relayed: f64,
}

impl SessionSummaryRow {
    pub fn now(relay_delay: DelayConfig, avg_packet_delay_ms: f64, packets_relayed: f64) -> Self {
        Self {
            timestamp: chrono::Local::now()
                .format("%Y-%m-%dT%H:%M:%S%.6f")
                .to_string(),
            relay_delay,
            avg_packet_delay_ms,
            packets_relayed,
        }
    }

    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.timestamp,
            self.relay_delay.min_label(),
            self.relay_delay.range_label(),
            self.avg_packet_delay_ms,
            self.packets_relayed
        )
    }
}
