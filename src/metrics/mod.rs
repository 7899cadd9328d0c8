//! Metrics and observability module
//!
//! Harness-side metrics through the `metrics` facade. Key metrics:
//! - Profiling samples sent and dropped
//! - Per-sample transfer time
//! - Channels opened and closed
//! - Session verification and scenario outcomes

pub mod recorder;

pub use recorder::{
    init_metrics, record_channel_closed, record_channel_opened, record_sample_dropped,
    record_sample_sent, record_session_verified, record_transfer_time, ScenarioMetrics,
};
