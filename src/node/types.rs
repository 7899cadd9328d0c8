use crate::node::api::NodeApi;
use crate::node::error::{NodeError, NodeResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Application tags up to this value are reserved by the node.
pub const RESERVED_TAG_UPPER_BOUND: u16 = 1023;

/// Peer identifier as reported by the node API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Protocol {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(NodeError::InvalidResponse(format!("unknown protocol {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    Segmentation,
    Retransmission,
}

/// Reliability features requested for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub segmentation: bool,
    pub retransmission: bool,
}

impl Capabilities {
    pub fn reliable() -> Self {
        Self {
            segmentation: true,
            retransmission: true,
        }
    }

    pub fn none() -> Self {
        Self {
            segmentation: false,
            retransmission: false,
        }
    }

    pub fn to_list(self) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.segmentation {
            caps.push(Capability::Segmentation);
        }
        if self.retransmission {
            caps.push(Capability::Retransmission);
        }
        caps
    }

    pub fn from_list(caps: &[Capability]) -> Self {
        Self {
            segmentation: caps.contains(&Capability::Segmentation),
            retransmission: caps.contains(&Capability::Retransmission),
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::reliable()
    }
}

/// Per-node mixer delay. Absent values count as zero and render as `N/A`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayConfig {
    pub min_delay_ms: Option<u64>,
    pub delay_range_ms: Option<u64>,
}

impl DelayConfig {
    pub fn new(min_delay_ms: u64, delay_range_ms: u64) -> Self {
        Self {
            min_delay_ms: Some(min_delay_ms),
            delay_range_ms: Some(delay_range_ms),
        }
    }

    pub fn unset() -> Self {
        Self::default()
    }

    pub fn min_ms(&self) -> u64 {
        self.min_delay_ms.unwrap_or(0)
    }

    pub fn range_ms(&self) -> u64 {
        self.delay_range_ms.unwrap_or(0)
    }

    pub fn max_ms(&self) -> u64 {
        self.min_ms().saturating_add(self.range_ms())
    }

    pub fn min_label(&self) -> String {
        label(self.min_delay_ms)
    }

    pub fn range_label(&self) -> String {
        label(self.delay_range_ms)
    }

    /// Minimum delay with its unit, or `N/A`.
    pub fn min_ms_label(&self) -> String {
        ms_label(self.min_delay_ms)
    }

    pub fn range_ms_label(&self) -> String {
        ms_label(self.delay_range_ms)
    }

    /// Human-readable form, e.g. `min 1000ms, range 500ms` or
    /// `min N/A, range N/A`.
    pub fn describe(&self) -> String {
        format!("min {}, range {}", self.min_ms_label(), self.range_ms_label())
    }
}

fn label(value: Option<u64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

fn ms_label(value: Option<u64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v}ms"))
}

/// Intermediate path of a session, in the node's wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPath {
    Hops(u8),
    IntermediatePath(Vec<PeerId>),
}

impl SessionPath {
    pub fn relays(&self) -> NodeResult<&[PeerId]> {
        match self {
            SessionPath::IntermediatePath(path) => Ok(path),
            SessionPath::Hops(0) => Ok(&[]),
            SessionPath::Hops(n) => Err(NodeError::InvalidRoute(format!(
                "automatic selection of {n} hops is not supported"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionTarget {
    Plain(String),
}

impl SessionTarget {
    pub fn address(&self) -> &str {
        match self {
            SessionTarget::Plain(addr) => addr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOpenRequest {
    pub destination: PeerId,
    pub path: SessionPath,
    pub target: SessionTarget,
    pub capabilities: Vec<Capability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_host: Option<String>,
}

/// Client-side session handle as listed by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub ip: String,
    pub port: u16,
    pub protocol: Protocol,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub tag: u16,
    pub body: String,
    pub peer_id: PeerId,
    pub path: Vec<PeerId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopMessageRequest {
    pub tag: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxMessage {
    pub tag: u16,
    pub body: String,
    pub received_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChannelRequest {
    pub peer_address: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChannelResponse {
    pub channel_id: String,
}

/// A relay or endpoint node together with the handle to its API.
#[derive(Clone)]
pub struct Node {
    pub alias: String,
    pub peer_id: PeerId,
    /// On-chain address used when opening channels towards this node.
    pub address: String,
    pub api: Arc<dyn NodeApi>,
}

impl Node {
    pub fn new(
        alias: impl Into<String>,
        peer_id: PeerId,
        address: impl Into<String>,
        api: Arc<dyn NodeApi>,
    ) -> Self {
        Self {
            alias: alias.into(),
            peer_id,
            address: address.into(),
            api,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("alias", &self.alias)
            .field("peer_id", &self.peer_id)
            .field("address", &self.address)
            .finish()
    }
}

/// Ordered sequence of at least two nodes: source, relays, destination.
#[derive(Debug, Clone)]
pub struct Route {
    nodes: Vec<Node>,
}

impl Route {
    pub fn new(nodes: Vec<Node>) -> NodeResult<Self> {
        if nodes.len() < 2 {
            return Err(NodeError::InvalidRoute(format!(
                "a route needs at least 2 nodes, got {}",
                nodes.len()
            )));
        }
        Ok(Self { nodes })
    }

    pub fn source(&self) -> &Node {
        &self.nodes[0]
    }

    pub fn destination(&self) -> &Node {
        &self.nodes[self.nodes.len() - 1]
    }

    pub fn relays(&self) -> &[Node] {
        &self.nodes[1..self.nodes.len() - 1]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Peer ids of the relays, in forwarding order.
    pub fn intermediate_path(&self) -> Vec<PeerId> {
        self.relays().iter().map(|n| n.peer_id.clone()).collect()
    }

    /// Adjacent `(from, to)` pairs in forward direction.
    pub fn hops(&self) -> impl Iterator<Item = (&Node, &Node)> {
        self.nodes.windows(2).map(|w| (&w[0], &w[1]))
    }

    pub fn describe(&self) -> String {
        self.nodes
            .iter()
            .map(|n| n.alias.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
