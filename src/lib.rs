//! Verification harness for multi-hop mixnet relays.
//!
//! The harness funds channels along a route, pushes byte-exact traffic
//! through sessions, profiles per-hop mixer delay and persists what it
//! measured. An in-process simulated network stands in for real nodes.

pub mod api;
pub mod artifacts;
pub mod channels;
pub mod config;
pub mod echo;
pub mod metrics;
pub mod node;
pub mod profiler;
pub mod scenario;
pub mod scope;
pub mod session;
pub mod simulation;

pub use config::HarnessConfig;
