//! Metrics recorder for harness operations
//!
//! Records what the harness itself observes: samples, channels, sessions and
//! scenario outcomes. Nothing is exported unless a recorder is installed.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return; // Already initialized
    }

    // Sample counters
    describe_counter!(
        "harness_samples_sent_total",
        "Total number of profiling messages sent"
    );
    describe_counter!(
        "harness_samples_dropped_total",
        "Profiling samples dropped, labelled by reason"
    );

    // Lifecycle counters
    describe_counter!("harness_channels_opened_total", "Channels opened by the harness");
    describe_counter!("harness_channels_closed_total", "Channels closed by the harness");
    describe_counter!(
        "harness_sessions_verified_total",
        "Session round-trip verifications, labelled by outcome"
    );
    describe_counter!(
        "harness_scenarios_total",
        "Scenario runs, labelled by outcome"
    );

    // Histograms
    describe_histogram!(
        "harness_transfer_time_seconds",
        "Send-to-receipt time of a single profiling message"
    );
    describe_histogram!(
        "harness_scenario_duration_seconds",
        "Wall time of a scenario run"
    );
}

// ============== Samples ==============

/// Record a profiling message being sent
pub fn record_sample_sent(source: &str) {
    counter!("harness_samples_sent_total", "source" => source.to_string()).increment(1);
}

/// Record a profiling sample being dropped
pub fn record_sample_dropped(reason: &'static str) {
    counter!("harness_samples_dropped_total", "reason" => reason).increment(1);
}

/// Record the transfer time of a received sample
pub fn record_transfer_time(duration: Duration) {
    histogram!("harness_transfer_time_seconds").record(duration.as_secs_f64());
}

// ============== Lifecycle ==============

pub fn record_channel_opened(owner: &str) {
    counter!("harness_channels_opened_total", "owner" => owner.to_string()).increment(1);
}

pub fn record_channel_closed(owner: &str) {
    counter!("harness_channels_closed_total", "owner" => owner.to_string()).increment(1);
}

pub fn record_session_verified(outcome: &'static str) {
    counter!("harness_sessions_verified_total", "outcome" => outcome).increment(1);
}

/// Times a scenario run and records its outcome
pub struct ScenarioMetrics {
    scenario: String,
    start_time: Instant,
}

impl ScenarioMetrics {
    pub fn start(scenario: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            start_time: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Record the outcome label and the elapsed time
    pub fn finish(self, outcome: &'static str) {
        counter!("harness_scenarios_total", "scenario" => self.scenario.clone(), "outcome" => outcome)
            .increment(1);
        histogram!("harness_scenario_duration_seconds", "scenario" => self.scenario)
            .record(self.start_time.elapsed().as_secs_f64());
    }
}
