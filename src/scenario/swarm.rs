use crate::node::{DelayConfig, Node, Route};
use crate::scenario::error::{HarnessError, HarnessResult};
use crate::simulation::{local_nodes, SimNetwork, SimulatedCluster, SimulationConfig};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

/// A route ready for one scenario plus whatever keeps its nodes alive.
pub struct Deployment {
    pub route: Route,
    backing: Option<Box<dyn Any + Send + Sync>>,
}

impl Deployment {
    pub fn new(route: Route) -> Self {
        Self {
            route,
            backing: None,
        }
    }

    pub fn with_backing<T: Any + Send + Sync>(mut self, backing: T) -> Self {
        self.backing = Some(Box::new(backing));
        self
    }

    pub fn backing<T: Any>(&self) -> Option<&T> {
        self.backing.as_ref()?.downcast_ref()
    }
}

/// Source of routes whose nodes carry the requested mixer delays.
#[async_trait]
pub trait Swarm: Send + Sync {
    /// Provide a route of `delays.len()` nodes, source first.
    async fn provision(&self, delays: &[DelayConfig]) -> HarnessResult<Deployment>;
}

/// Starts a fresh simulated cluster for every route.
pub struct SimulatedSwarm {
    config: SimulationConfig,
    provisioned: Mutex<Vec<Arc<SimNetwork>>>,
}

impl SimulatedSwarm {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            provisioned: Mutex::new(Vec::new()),
        }
    }

    /// Every network handed out so far, oldest first.
    pub fn provisioned(&self) -> Vec<Arc<SimNetwork>> {
        self.provisioned.lock().clone()
    }
}

#[async_trait]
impl Swarm for SimulatedSwarm {
    async fn provision(&self, delays: &[DelayConfig]) -> HarnessResult<Deployment> {
        let cluster = SimulatedCluster::new(self.config.clone(), &local_nodes(delays.len(), delays));
        let route = Route::new(cluster.nodes().to_vec())?;
        self.provisioned.lock().push(cluster.network().clone());
        debug!(route = %route.describe(), "simulated cluster started");
        Ok(Deployment::new(route).with_backing(cluster))
    }
}

/// A fixed set of running nodes, each with the delay it was started with.
///
/// Routes are assembled from nodes whose delay matches the request exactly;
/// a node appears at most once per route.
pub struct StaticSwarm {
    nodes: Vec<(Node, DelayConfig)>,
}

impl StaticSwarm {
    pub fn new(nodes: Vec<(Node, DelayConfig)>) -> Self {
        Self { nodes }
    }
}

#[async_trait]
impl Swarm for StaticSwarm {
    async fn provision(&self, delays: &[DelayConfig]) -> HarnessResult<Deployment> {
        let mut taken = vec![false; self.nodes.len()];
        let mut route = Vec::with_capacity(delays.len());

        for delay in delays {
            let index = self
                .nodes
                .iter()
                .enumerate()
                .position(|(i, (_, configured))| !taken[i] && configured == delay)
                .ok_or_else(|| HarnessError::NoMatchingNode(delay.describe()))?;
            taken[index] = true;
            route.push(self.nodes[index].0.clone());
        }

        Ok(Deployment::new(Route::new(route)?))
    }
}
