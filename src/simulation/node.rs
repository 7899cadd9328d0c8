use crate::node::metrics::MIXER_AVERAGE_DELAY;
use crate::node::{
    Capabilities, DelayConfig, InboxMessage, NodeApi, NodeError, NodeResult, PeerId, Protocol,
    Session, SessionOpenRequest, RESERVED_TAG_UPPER_BOUND,
};
use crate::simulation::bridge::{self, BridgeSpec};
use crate::simulation::network::SimNetwork;
use crate::simulation::types::SimNodeConfig;
use async_trait::async_trait;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const PACKETS_COUNT_METRIC: &str = "hopr_packets_count";

struct ActiveSession {
    session: Session,
    worker: JoinHandle<()>,
}

/// Per-node state shared between the node's API handle and the network.
pub struct NodeState {
    pub alias: String,
    pub peer_id: PeerId,
    pub address: String,
    pub delay: DelayConfig,
    inbox: Mutex<HashMap<u16, VecDeque<InboxMessage>>>,
    sessions: Mutex<Vec<ActiveSession>>,
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    mixed_packets: AtomicU64,
    mixed_delay_ms: AtomicU64,
}

impl NodeState {
    pub fn new(config: &SimNodeConfig, peer_id: PeerId, address: String) -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        Self {
            alias: config.alias.clone(),
            peer_id,
            address,
            delay: config.delay,
            inbox: Mutex::new(HashMap::new()),
            sessions: Mutex::new(Vec::new()),
            recorder,
            handle,
            mixed_packets: AtomicU64::new(0),
            mixed_delay_ms: AtomicU64::new(0),
        }
    }

    /// Minimum delay plus a uniform draw from the delay range.
    pub fn sample_delay(&self) -> Duration {
        let jitter = match self.delay.range_ms() {
            0 => 0,
            range => rand::thread_rng().gen_range(0..=range),
        };
        Duration::from_millis(self.delay.min_ms() + jitter)
    }

    pub(crate) fn record_mixed(&self, delay: Duration) {
        let packets = self.mixed_packets.fetch_add(1, Ordering::Relaxed) + 1;
        let total = self
            .mixed_delay_ms
            .fetch_add(delay.as_millis() as u64, Ordering::Relaxed)
            + delay.as_millis() as u64;

        metrics::with_local_recorder(&self.recorder, || {
            gauge!(MIXER_AVERAGE_DELAY).set(total as f64 / packets as f64);
        });
    }

    pub(crate) fn record_forwarded(&self, packets: u64) {
        metrics::with_local_recorder(&self.recorder, || {
            counter!(PACKETS_COUNT_METRIC, "type" => "forwarded").increment(packets);
        });
    }

    pub(crate) fn record_received(&self, packets: u64) {
        metrics::with_local_recorder(&self.recorder, || {
            counter!(PACKETS_COUNT_METRIC, "type" => "received").increment(packets);
        });
    }

    pub(crate) fn deliver(&self, mut message: InboxMessage) {
        message.received_at = chrono::Utc::now().timestamp_millis();
        debug!(node = %self.alias, tag = message.tag, "message delivered");
        self.inbox
            .lock()
            .entry(message.tag)
            .or_default()
            .push_back(message);
    }

    fn pop(&self, tag: u16) -> Option<InboxMessage> {
        self.inbox.lock().get_mut(&tag).and_then(|q| q.pop_front())
    }

    pub fn render_metrics(&self) -> String {
        self.handle.render()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Drop every session without being asked. Returns how many were open.
    pub(crate) fn abort_sessions(&self) -> usize {
        let mut sessions = self.sessions.lock();
        for active in sessions.iter() {
            active.worker.abort();
        }
        let count = sessions.len();
        sessions.clear();
        count
    }
}

impl Drop for NodeState {
    fn drop(&mut self) {
        self.abort_sessions();
    }
}

/// A simulated node answering the node API in-process.
#[derive(Clone)]
pub struct SimNode {
    state: Arc<NodeState>,
    network: Arc<SimNetwork>,
}

impl SimNode {
    pub fn new(state: Arc<NodeState>, network: Arc<SimNetwork>) -> Self {
        Self { state, network }
    }

    pub fn state(&self) -> &Arc<NodeState> {
        &self.state
    }

    pub fn network(&self) -> &Arc<SimNetwork> {
        &self.network
    }

    fn hops(&self, relays: &[PeerId], destination: &PeerId) -> Vec<PeerId> {
        let mut hops = Vec::with_capacity(relays.len() + 2);
        hops.push(self.state.peer_id.clone());
        hops.extend(relays.iter().cloned());
        hops.push(destination.clone());
        hops
    }
}

#[async_trait]
impl NodeApi for SimNode {
    async fn send_message(
        &self,
        destination: &PeerId,
        body: &str,
        path: &[PeerId],
        tag: u16,
    ) -> NodeResult<bool> {
        if tag <= RESERVED_TAG_UPPER_BOUND {
            warn!(node = %self.state.alias, tag, "refusing message with reserved tag");
            return Ok(false);
        }

        let leg = self.network.leg(&self.hops(path, destination))?;
        let delay = leg
            .traverse(1, false)
            .map_err(|e| NodeError::InvalidRoute(e.to_string()))?;

        let receiver = leg.receiver();
        let message = InboxMessage {
            tag,
            body: body.to_string(),
            received_at: 0,
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            receiver.deliver(message);
        });
        Ok(true)
    }

    async fn pop_message(&self, tag: u16) -> NodeResult<Option<InboxMessage>> {
        Ok(self.state.pop(tag))
    }

    async fn open_channel(&self, destination_address: &str, amount: u128) -> NodeResult<String> {
        let id = self
            .network
            .open_channel(&self.state.peer_id, destination_address, amount)?;
        debug!(node = %self.state.alias, channel = %id, amount, "channel opened");
        Ok(id)
    }

    async fn close_channel(&self, channel_id: &str) -> NodeResult<bool> {
        self.network.close_channel(&self.state.peer_id, channel_id)
    }

    async fn session_open(
        &self,
        protocol: Protocol,
        request: &SessionOpenRequest,
    ) -> NodeResult<Session> {
        let relays = request.path.relays()?;
        let mut hops = self.hops(relays, &request.destination);
        let forward = self.network.leg(&hops)?;
        hops.reverse();
        let backward = self.network.leg(&hops)?;

        let target: SocketAddr = request.target.address().parse().map_err(|_| {
            NodeError::InvalidRoute(format!("unresolvable target {}", request.target.address()))
        })?;
        let host = request
            .listen_host
            .clone()
            .unwrap_or_else(|| self.network.config().listen_host.clone());

        let spec = BridgeSpec {
            forward,
            backward,
            capabilities: Capabilities::from_list(&request.capabilities),
            max_payload: self.network.config().max_payload,
        };
        let (port, worker) = bridge::spawn(protocol, &host, target, spec).await?;

        let session = Session {
            ip: host,
            port,
            protocol,
            target: target.to_string(),
        };
        info!(
            node = %self.state.alias,
            %protocol,
            port,
            target = %session.target,
            "session opened"
        );
        self.state.sessions.lock().push(ActiveSession {
            session: session.clone(),
            worker,
        });
        Ok(session)
    }

    async fn session_list(&self, protocol: Protocol) -> NodeResult<Vec<Session>> {
        Ok(self
            .state
            .sessions
            .lock()
            .iter()
            .filter(|s| s.session.protocol == protocol)
            .map(|s| s.session.clone())
            .collect())
    }

    async fn session_close(&self, session: &Session) -> NodeResult<bool> {
        let mut sessions = self.state.sessions.lock();
        let Some(position) = sessions.iter().position(|s| {
            s.session.protocol == session.protocol
                && s.session.port == session.port
                && s.session.ip == session.ip
        }) else {
            return Ok(false);
        };

        let active = sessions.remove(position);
        active.worker.abort();
        info!(node = %self.state.alias, port = session.port, "session closed");
        Ok(true)
    }

    async fn metrics(&self) -> NodeResult<String> {
        Ok(self.state.render_metrics())
    }
}
