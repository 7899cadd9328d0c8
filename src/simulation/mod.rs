//! In-process mixnet used to exercise the harness without real nodes.
//!
//! Each simulated node delays what it sends by its mixer delay, keeps a
//! tagged inbox, pays tickets out of its channels for relayed packets and
//! bridges sessions to local sockets. Node metrics are rendered in the
//! Prometheus text format a real node exposes.

mod bridge;
pub mod cluster;
pub mod network;
pub mod node;
pub mod types;

pub use cluster::SimulatedCluster;
pub use network::{Leg, LegFailure, SimNetwork};
pub use node::{NodeState, SimNode};
pub use types::{local_nodes, SimNodeConfig, SimulationConfig, MAX_PACKET_PAYLOAD};
