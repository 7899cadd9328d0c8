//! Opens the payment channels a route needs and guarantees their closure.

use crate::channels::error::{ChannelError, ChannelResult};
use crate::channels::types::{ChannelRecord, ChannelStatus, Direction, FundingPolicy};
use crate::metrics;
use crate::node::{Node, Route};
use crate::scope::Release;
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct ChannelOrchestrator {
    policy: FundingPolicy,
}

impl ChannelOrchestrator {
    pub fn new(policy: FundingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &FundingPolicy {
        &self.policy
    }

    /// Open one forward and one backward channel per adjacent pair of the
    /// route, all concurrently, each funded for `expected_messages`.
    ///
    /// If any open fails, the channels that did open are closed before the
    /// error is returned.
    pub async fn open_route(&self, route: &Route, expected_messages: u64) -> ChannelResult<ChannelSet> {
        self.open_funded(route, self.policy.funding_for(expected_messages))
            .await
    }

    /// Like [`open_route`](Self::open_route) with a caller-chosen amount per
    /// channel. Amounts below what the policy requires for
    /// `expected_messages` are refused before any node is contacted.
    pub async fn open_route_with_funding(
        &self,
        route: &Route,
        expected_messages: u64,
        funding: u128,
    ) -> ChannelResult<ChannelSet> {
        self.policy.ensure_covers(funding, expected_messages)?;
        self.open_funded(route, funding).await
    }

    async fn open_funded(&self, route: &Route, funding: u128) -> ChannelResult<ChannelSet> {
        let nodes = route.nodes();
        let mut plan: Vec<(&Node, &Node, Direction)> = route
            .hops()
            .map(|(from, to)| (from, to, Direction::Forward))
            .collect();
        plan.extend(
            (1..nodes.len())
                .rev()
                .map(|i| (&nodes[i], &nodes[i - 1], Direction::Backward)),
        );

        tracing::info!(
            route = %route.describe(),
            channels = plan.len(),
            funding,
            "opening route channels"
        );

        let opens = plan.iter().map(|(from, to, direction)| async move {
            let opened = from.api.open_channel(&to.address, funding).await;
            (*from, *to, *direction, opened)
        });
        let results = join_all(opens).await;

        let total = results.len();
        let mut channels = Vec::with_capacity(total);
        let mut failures = Vec::new();

        for (from, to, direction, opened) in results {
            match opened {
                Ok(id) => {
                    metrics::record_channel_opened(&from.alias);
                    tracing::debug!(channel = %id, from = %from.alias, to = %to.alias, "channel open");
                    channels.push(OpenedChannel {
                        owner: from.clone(),
                        record: Mutex::new(ChannelRecord {
                            id,
                            source: from.alias.clone(),
                            destination: to.alias.clone(),
                            funding,
                            direction,
                            status: ChannelStatus::Open,
                        }),
                    });
                }
                Err(e) => {
                    tracing::error!(from = %from.alias, to = %to.alias, "channel open failed: {e}");
                    failures.push(ChannelError::OpenFailed {
                        source_alias: from.alias.clone(),
                        destination_alias: to.alias.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let set = ChannelSet {
            channels,
            closed: AtomicBool::new(false),
        };

        if failures.is_empty() {
            return Ok(set);
        }

        tracing::warn!(opened = set.len(), "rolling back partially opened route");
        if let Err(e) = set.close().await {
            tracing::warn!("rollback incomplete: {e}");
        }

        let failed = failures.len();
        let first = failures.swap_remove(0);
        Err(ChannelError::RouteOpenFailed {
            failed,
            total,
            first: Box::new(first),
        })
    }
}

struct OpenedChannel {
    owner: Node,
    record: Mutex<ChannelRecord>,
}

impl OpenedChannel {
    async fn close(&self) -> ChannelResult<()> {
        let id = {
            let mut record = self.record.lock();
            if record.status == ChannelStatus::Closed {
                return Ok(());
            }
            record.status = ChannelStatus::Closing;
            record.id.clone()
        };

        let closed = self.owner.api.close_channel(&id).await;
        if !matches!(closed, Ok(true)) {
            // Still open as far as the harness knows; a later close retries
            self.record.lock().status = ChannelStatus::Open;
        }
        match closed {
            Ok(true) => {
                self.record.lock().status = ChannelStatus::Closed;
                metrics::record_channel_closed(&self.owner.alias);
                Ok(())
            }
            Ok(false) => Err(ChannelError::CloseFailed(id)),
            Err(e) => Err(e.into()),
        }
    }
}

/// The channels opened for one route, closed in reverse opening order.
/// Each channel is closed at most once; channels whose close failed are
/// retried by the next [`close`](ChannelSet::close) or on drop.
pub struct ChannelSet {
    channels: Vec<OpenedChannel>,
    closed: AtomicBool,
}

impl ChannelSet {
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn records(&self) -> Vec<ChannelRecord> {
        self.channels.iter().map(|c| c.record.lock().clone()).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close every channel still open. All closes are attempted even when
    /// some fail; the first failure is returned and the set stays open.
    pub async fn close(&self) -> ChannelResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        close_all(&self.channels).await?;
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

async fn close_all(channels: &[OpenedChannel]) -> ChannelResult<()> {
    let mut first_error = None;
    for channel in channels.iter().rev() {
        if let Err(e) = channel.close().await {
            tracing::warn!(owner = %channel.owner.alias, "channel close failed: {e}");
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

impl Drop for ChannelSet {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) || self.channels.is_empty() {
            return;
        }

        let channels = std::mem::take(&mut self.channels);
        tracing::warn!(count = channels.len(), "channel set dropped while open, closing in background");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = close_all(&channels).await {
                        tracing::error!("background channel close failed: {e}");
                    }
                });
            }
            Err(_) => tracing::error!("no runtime available, channels left open"),
        }
    }
}

#[async_trait]
impl Release for ChannelSet {
    fn label(&self) -> String {
        format!("channels({})", self.channels.len())
    }

    async fn release(&self) -> anyhow::Result<()> {
        self.close().await?;
        Ok(())
    }
}
