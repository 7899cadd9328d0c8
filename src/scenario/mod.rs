//! Declarative scenarios and the runner that executes them.
//!
//! A scenario names the mixer delays its route needs and what it checks.
//! The runner provisions a fresh route from a [`Swarm`], funds it, drives
//! traffic and tears everything down through a resource scope before the
//! outcome is judged against the scenario's expectation.

pub mod catalog;
pub mod checks;
pub mod error;
pub mod runner;
pub mod swarm;
pub mod types;

pub use checks::check_residuals;
pub use error::{HarnessError, HarnessResult};
pub use runner::ScenarioRunner;
pub use swarm::{Deployment, SimulatedSwarm, StaticSwarm, Swarm};
pub use types::{
    ExpectedOutcome, ScenarioDescriptor, ScenarioKind, ScenarioOutcome, ScenarioReport,
};
