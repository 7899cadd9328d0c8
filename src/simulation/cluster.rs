use crate::node::{Node, NodeApi, NodeError, NodeResult, Route};
use crate::simulation::network::SimNetwork;
use crate::simulation::node::SimNode;
use crate::simulation::types::{SimNodeConfig, SimulationConfig};
use std::sync::Arc;
use tracing::debug;

/// A fresh simulated network with its nodes wrapped as harness [`Node`]s.
pub struct SimulatedCluster {
    network: Arc<SimNetwork>,
    sim_nodes: Vec<SimNode>,
    nodes: Vec<Node>,
}

impl SimulatedCluster {
    pub fn new(config: SimulationConfig, node_configs: &[SimNodeConfig]) -> Self {
        let network = SimNetwork::new(config);
        let mut sim_nodes = Vec::with_capacity(node_configs.len());
        let mut nodes = Vec::with_capacity(node_configs.len());

        for node_config in node_configs {
            let state = network.add_node(node_config);
            let sim_node = SimNode::new(state.clone(), network.clone());
            let api: Arc<dyn NodeApi> = Arc::new(sim_node.clone());
            nodes.push(Node::new(
                state.alias.clone(),
                state.peer_id.clone(),
                state.address.clone(),
                api,
            ));
            sim_nodes.push(sim_node);
        }

        Self {
            network,
            sim_nodes,
            nodes,
        }
    }

    pub fn network(&self) -> &Arc<SimNetwork> {
        &self.network
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn sim_nodes(&self) -> &[SimNode] {
        &self.sim_nodes
    }

    pub fn node(&self, alias: &str) -> NodeResult<&Node> {
        self.nodes
            .iter()
            .find(|n| n.alias == alias)
            .ok_or_else(|| NodeError::UnknownPeer(alias.to_string()))
    }

    /// Route through the named nodes, in order.
    pub fn route(&self, aliases: &[&str]) -> NodeResult<Route> {
        let nodes = aliases
            .iter()
            .map(|alias| self.node(alias).cloned())
            .collect::<NodeResult<Vec<_>>>()?;
        Route::new(nodes)
    }

    /// Abort every session still open on any node.
    pub fn shutdown(&self) -> usize {
        self.sim_nodes
            .iter()
            .map(|n| n.state().abort_sessions())
            .sum()
    }
}

impl Drop for SimulatedCluster {
    fn drop(&mut self) {
        let aborted = self.shutdown();
        if aborted > 0 {
            debug!(aborted, "cluster dropped with open sessions");
        }
    }
}
