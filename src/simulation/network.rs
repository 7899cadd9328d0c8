use crate::node::{NodeError, NodeResult, PeerId};
use crate::simulation::node::NodeState;
use crate::simulation::types::{SimNodeConfig, SimulationConfig};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Why a packet could not cross a leg.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LegFailure {
    #[error("no open channel from {from} to {to}")]
    NoChannel { from: String, to: String },

    #[error("channel from {from} to {to} cannot pay {required}, balance {balance}")]
    Unfunded {
        from: String,
        to: String,
        required: u128,
        balance: u128,
    },

    #[error("mixer delay of {delay:?} at {alias} exceeds the session limit")]
    DelayExceeded { alias: String, delay: Duration },
}

struct ChannelEntry {
    owner: PeerId,
    counterparty: PeerId,
    balance: u128,
}

/// Registry of simulated nodes and the channels between them.
pub struct SimNetwork {
    config: SimulationConfig,
    nodes: DashMap<PeerId, Arc<NodeState>>,
    addresses: DashMap<String, PeerId>,
    channels: DashMap<String, ChannelEntry>,
    next_channel: AtomicU64,
}

impl SimNetwork {
    pub fn new(config: SimulationConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            nodes: DashMap::new(),
            addresses: DashMap::new(),
            channels: DashMap::new(),
            next_channel: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn add_node(&self, config: &SimNodeConfig) -> Arc<NodeState> {
        let index = self.nodes.len() + 1;
        let peer_id = PeerId::new(format!("12D3KooWSim{index:04}"));
        let address = format!("0x{index:040x}");
        let state = Arc::new(NodeState::new(config, peer_id.clone(), address.clone()));

        self.addresses.insert(address, peer_id.clone());
        self.nodes.insert(peer_id, state.clone());
        state
    }

    pub fn node(&self, peer_id: &PeerId) -> NodeResult<Arc<NodeState>> {
        self.nodes
            .get(peer_id)
            .map(|n| n.value().clone())
            .ok_or_else(|| NodeError::UnknownPeer(peer_id.to_string()))
    }

    pub fn open_channel(&self, owner: &PeerId, address: &str, amount: u128) -> NodeResult<String> {
        let counterparty = self
            .addresses
            .get(address)
            .map(|p| p.value().clone())
            .ok_or_else(|| NodeError::UnknownPeer(address.to_string()))?;

        if self.find_channel(owner, &counterparty).is_some() {
            return Err(NodeError::Status {
                status: 409,
                body: format!("channel from {owner} to {counterparty} already open"),
            });
        }

        let id = format!("0x{:064x}", self.next_channel.fetch_add(1, Ordering::SeqCst));
        self.channels.insert(
            id.clone(),
            ChannelEntry {
                owner: owner.clone(),
                counterparty,
                balance: amount,
            },
        );
        Ok(id)
    }

    /// Close a channel owned by `owner`.
    pub fn close_channel(&self, owner: &PeerId, channel_id: &str) -> NodeResult<bool> {
        match self.channels.remove_if(channel_id, |_, entry| &entry.owner == owner) {
            Some(_) => Ok(true),
            None => Err(NodeError::UnknownChannel(channel_id.to_string())),
        }
    }

    pub fn channel_balance(&self, owner: &PeerId, counterparty: &PeerId) -> Option<u128> {
        self.find_channel(owner, counterparty)
            .and_then(|id| self.channels.get(&id).map(|c| c.balance))
    }

    pub fn open_channel_count(&self) -> usize {
        self.channels.len()
    }

    fn find_channel(&self, owner: &PeerId, counterparty: &PeerId) -> Option<String> {
        self.channels
            .iter()
            .find(|c| &c.owner == owner && &c.counterparty == counterparty)
            .map(|c| c.key().clone())
    }

    fn debit(&self, from: &NodeState, to: &NodeState, packets: u64) -> Result<(), LegFailure> {
        let required = self.config.ticket_price * packets as u128;
        let mut channel = self
            .channels
            .iter_mut()
            .find(|c| c.owner == from.peer_id && c.counterparty == to.peer_id)
            .ok_or_else(|| LegFailure::NoChannel {
                from: from.alias.clone(),
                to: to.alias.clone(),
            })?;

        if channel.balance < required {
            return Err(LegFailure::Unfunded {
                from: from.alias.clone(),
                to: to.alias.clone(),
                required,
                balance: channel.balance,
            });
        }
        channel.balance -= required;
        Ok(())
    }

    /// Resolve `hops` (sender first, receiver last) into a leg.
    pub fn leg(self: &Arc<Self>, hops: &[PeerId]) -> NodeResult<Leg> {
        if hops.len() < 2 {
            return Err(NodeError::InvalidRoute("a leg needs a sender and a receiver".into()));
        }
        let nodes = hops
            .iter()
            .map(|peer| self.node(peer))
            .collect::<NodeResult<Vec<_>>>()?;
        Ok(Leg {
            network: self.clone(),
            nodes,
        })
    }
}

/// One direction of travel through the network.
pub struct Leg {
    network: Arc<SimNetwork>,
    nodes: Vec<Arc<NodeState>>,
}

impl Leg {
    pub fn receiver(&self) -> Arc<NodeState> {
        self.nodes[self.nodes.len() - 1].clone()
    }

    /// Carry `packets` packets from sender to receiver and return the total
    /// mixer delay they pick up.
    ///
    /// Every node but the receiver mixes; relays count the packets as
    /// forwarded. Every hop but the last pays one ticket per packet. With
    /// `breakable` set, a single mixer delay above the configured session
    /// limit fails the leg.
    pub fn traverse(&self, packets: u64, breakable: bool) -> Result<Duration, LegFailure> {
        let last = self.nodes.len() - 1;
        let limit = self.network.config.session_break_delay;
        let mut total = Duration::ZERO;

        for (i, node) in self.nodes[..last].iter().enumerate() {
            if i + 1 < last {
                self.network.debit(node, &self.nodes[i + 1], packets)?;
            }
            let delay = node.sample_delay();
            node.record_mixed(delay);
            if i > 0 {
                node.record_forwarded(packets);
            }
            if breakable && delay > limit {
                return Err(LegFailure::DelayExceeded {
                    alias: node.alias.clone(),
                    delay,
                });
            }
            total += delay;
        }

        self.nodes[last].record_received(packets);
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::DelayConfig;
    use crate::simulation::types::local_nodes;

    fn network(delays: &[DelayConfig]) -> (Arc<SimNetwork>, Vec<Arc<NodeState>>) {
        let network = SimNetwork::new(SimulationConfig::default());
        let nodes = local_nodes(3, delays)
            .iter()
            .map(|c| network.add_node(c))
            .collect();
        (network, nodes)
    }

    fn ids(nodes: &[Arc<NodeState>]) -> Vec<PeerId> {
        nodes.iter().map(|n| n.peer_id.clone()).collect()
    }

    #[test]
    fn test_zero_hop_needs_no_channel() {
        let (network, nodes) = network(&[DelayConfig::new(10, 0)]);
        let leg = network.leg(&ids(&nodes[..2])).unwrap();
        assert_eq!(leg.traverse(1, false).unwrap(), Duration::from_millis(10));
    }

    #[test]
    fn test_relay_hop_pays_tickets() {
        let (network, nodes) = network(&[]);
        let leg = network.leg(&ids(&nodes)).unwrap();

        assert!(matches!(
            leg.traverse(1, false),
            Err(LegFailure::NoChannel { .. })
        ));

        network
            .open_channel(&nodes[0].peer_id, &nodes[1].address, 250)
            .unwrap();
        leg.traverse(2, false).unwrap();
        assert_eq!(
            network.channel_balance(&nodes[0].peer_id, &nodes[1].peer_id),
            Some(50)
        );
        assert!(matches!(
            leg.traverse(1, false),
            Err(LegFailure::Unfunded { balance: 50, .. })
        ));
    }

    #[test]
    fn test_break_delay_only_applies_when_breakable() {
        let (network, nodes) = network(&[DelayConfig::new(10_000, 0)]);
        let leg = network.leg(&ids(&nodes[..2])).unwrap();

        assert!(leg.traverse(1, false).is_ok());
        assert!(matches!(
            leg.traverse(1, true),
            Err(LegFailure::DelayExceeded { .. })
        ));
    }

    #[test]
    fn test_channel_lifecycle() {
        let (network, nodes) = network(&[]);
        let id = network
            .open_channel(&nodes[0].peer_id, &nodes[1].address, 100)
            .unwrap();

        // Duplicate and unknown counterparty
        assert!(network
            .open_channel(&nodes[0].peer_id, &nodes[1].address, 100)
            .is_err());
        assert!(network
            .open_channel(&nodes[0].peer_id, "0xdead", 100)
            .is_err());

        // Only the owner may close
        assert!(network.close_channel(&nodes[1].peer_id, &id).is_err());
        assert!(network.close_channel(&nodes[0].peer_id, &id).unwrap());
        assert_eq!(network.open_channel_count(), 0);
    }
}
