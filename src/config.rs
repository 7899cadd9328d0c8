//! Run-wide configuration.
//!
//! Everything a run needs is injected through [`HarnessConfig`]; nothing is
//! read from process-wide state apart from the `CI` switch in
//! [`SessionVerifierConfig::for_environment`].

use crate::artifacts::ArtifactConfig;
use crate::channels::FundingPolicy;
use crate::profiler::ProfilerConfig;
use crate::session::SessionVerifierConfig;
use crate::simulation::SimulationConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Mixer delay at which relayed sessions stop being reliable.
pub const DEFAULT_BREAKING_THRESHOLD_MS: u64 = 5000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// First port handed to served nodes (0 = ephemeral)
    pub port_base: u16,
    pub funding: FundingPolicy,
    pub session: SessionVerifierConfig,
    pub profiler: ProfilerConfig,
    pub artifacts: ArtifactConfig,
    /// Relay minimum delays above this make session scenarios expected failures
    pub breaking_threshold_ms: u64,
    /// Capture echo traffic into this directory when set
    pub echo_capture_dir: Option<PathBuf>,
    pub simulation: SimulationConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            port_base: 0,
            funding: FundingPolicy::default(),
            session: SessionVerifierConfig::for_environment(),
            profiler: ProfilerConfig::default(),
            artifacts: ArtifactConfig::default(),
            breaking_threshold_ms: DEFAULT_BREAKING_THRESHOLD_MS,
            echo_capture_dir: None,
            simulation: SimulationConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn with_port_base(mut self, port_base: u16) -> Self {
        self.port_base = port_base;
        self
    }

    pub fn with_funding(mut self, funding: FundingPolicy) -> Self {
        self.funding = funding;
        self
    }

    pub fn with_session(mut self, session: SessionVerifierConfig) -> Self {
        self.session = session;
        self
    }

    pub fn with_profiler(mut self, profiler: ProfilerConfig) -> Self {
        self.profiler = profiler;
        self
    }

    pub fn with_artifacts(mut self, artifacts: ArtifactConfig) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_breaking_threshold_ms(mut self, threshold: u64) -> Self {
        self.breaking_threshold_ms = threshold;
        self
    }

    pub fn with_echo_capture(mut self, dir: impl Into<PathBuf>) -> Self {
        self.echo_capture_dir = Some(dir.into());
        self
    }

    pub fn with_simulation(mut self, simulation: SimulationConfig) -> Self {
        self.simulation = simulation;
        self
    }

    /// Port for the `index`-th served node, `0` when ports are ephemeral.
    pub fn port_for(&self, index: usize) -> u16 {
        if self.port_base == 0 {
            return 0;
        }
        self.port_base.saturating_add(index as u16)
    }

    /// Simulation settings with the breaking threshold applied, so a
    /// simulated relay breaks sessions exactly where scenarios expect it.
    pub fn simulation_config(&self) -> SimulationConfig {
        self.simulation
            .clone()
            .with_ticket_price(self.funding.ticket_price)
            .with_session_break_delay(Duration::from_millis(self.breaking_threshold_ms))
    }
}
