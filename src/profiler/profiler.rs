use crate::artifacts::{ArtifactWriter, ProfileArtifacts};
use crate::metrics::{record_sample_dropped, record_sample_sent, record_transfer_time};
use crate::node::{NodeApi, NodeResult, Route, RESERVED_TAG_UPPER_BOUND};
use crate::profiler::error::{ProfilerError, ProfilerResult};
use crate::profiler::pacer::SendPacer;
use crate::profiler::stats;
use crate::profiler::types::{
    samples, DelayProfile, PacketRecord, ProfileLabels, ProfilerConfig, HISTOGRAM_BINS,
};
use backoff::{backoff::Backoff, ExponentialBackoff};
use tokio::time::{sleep, timeout, Instant};
use tracing::{error, info, warn};

/// Measures per-message delay between a route's source and destination.
///
/// Messages are sent one at a time; each waits for its own receipt before
/// the next one leaves. Lost or unsendable messages are dropped from the
/// sample set and the run continues.
pub struct DelayProfiler {
    config: ProfilerConfig,
    pacer: SendPacer,
    writer: Option<ArtifactWriter>,
}

impl DelayProfiler {
    pub fn new(config: ProfilerConfig) -> Self {
        let pacer = SendPacer::new(config.send_rate);
        Self {
            config,
            pacer,
            writer: None,
        }
    }

    /// Persist histogram and raw series after every run.
    pub fn with_artifacts(mut self, writer: ArtifactWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    pub async fn profile(&self, route: &Route, labels: &ProfileLabels) -> ProfilerResult<DelayProfile> {
        let source = route.source();
        let destination = route.destination();
        let path = route.intermediate_path();
        let count = self.config.message_count;
        let tags = draw_tags(count)?;
        let receipt_timeout = self.config.receipt_timeout(&labels.source);

        info!(
            route = %route.describe(),
            count,
            timeout_secs = receipt_timeout.as_secs_f64(),
            "profiling delay"
        );
        sleep(self.config.settle_delay).await;

        let batch_start = Instant::now();
        let mut records = Vec::with_capacity(count);

        for (index, tag) in tags.into_iter().enumerate() {
            self.pacer.wait().await;
            let body = format!("Message #{index:08}");
            let sent_at = batch_start.elapsed();
            let mut record = PacketRecord {
                index,
                tag,
                sent_at,
                received_at: None,
            };

            record_sample_sent(&source.alias);
            match source
                .api
                .send_message(&destination.peer_id, &body, &path, tag)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    error!("Failed to send packet {}", index);
                    record_sample_dropped("send_failed");
                    records.push(record);
                    continue;
                }
                Err(e) => {
                    error!("Failed to send packet {}: {}", index, e);
                    record_sample_dropped("send_failed");
                    records.push(record);
                    continue;
                }
            }

            match timeout(
                receipt_timeout,
                self.await_receipt(destination.api.as_ref(), tag, &body),
            )
            .await
            {
                Ok(Ok(())) => {
                    let received_at = batch_start.elapsed();
                    record_transfer_time(received_at.saturating_sub(sent_at));
                    record.received_at = Some(received_at);
                }
                Ok(Err(e)) => {
                    error!("Error waiting for packet {}: {}", index, e);
                    record_sample_dropped("receipt_error");
                }
                Err(_) => {
                    error!("Timeout waiting for packet {} (tag: {})", index, tag);
                    record_sample_dropped("timeout");
                }
            }
            records.push(record);
        }

        let series = samples(&records);
        let times: Vec<f64> = series.iter().map(|(_, t)| *t).collect();
        let (Some(stats), Some(histogram)) = (
            stats::summarize(&times),
            stats::histogram(&times, HISTOGRAM_BINS),
        ) else {
            return Err(ProfilerError::NoSamples { sent: count });
        };

        info!("Statistics for configuration - {}", labels.describe());
        info!(
            received = stats.count,
            dropped = count - stats.count,
            "Average transfer time: {:.4} seconds, standard deviation: {:.4} seconds",
            stats.mean,
            stats.std_dev
        );

        let artifacts = match &self.writer {
            Some(writer) => writer.persist_profile(&series, &stats, &histogram, labels),
            None => ProfileArtifacts::default(),
        };

        Ok(DelayProfile {
            records,
            stats,
            histogram,
            artifacts,
        })
    }

    /// Poll the destination inbox for `body` under `tag`. Unbounded; the
    /// caller applies the timeout.
    async fn await_receipt(&self, api: &dyn NodeApi, tag: u16, body: &str) -> NodeResult<()> {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.config.poll_initial_interval,
            max_interval: self.config.poll_max_interval,
            max_elapsed_time: None,
            ..Default::default()
        };

        loop {
            match api.pop_message(tag).await? {
                Some(message) if message.body == body => return Ok(()),
                Some(message) => {
                    warn!(tag, body = %message.body, "skipping unexpected message under tag");
                    continue;
                }
                None => {}
            }
            let wait = backoff
                .next_backoff()
                .unwrap_or(self.config.poll_max_interval);
            sleep(wait).await;
        }
    }
}

/// `count` distinct tags above the reserved range.
pub fn draw_tags(count: usize) -> ProfilerResult<Vec<u16>> {
    let first = RESERVED_TAG_UPPER_BOUND as usize + 1;
    let available = u16::MAX as usize + 1 - first;
    if count > available {
        return Err(ProfilerError::TagSpaceExhausted {
            requested: count,
            available,
        });
    }

    let mut rng = rand::thread_rng();
    Ok(rand::seq::index::sample(&mut rng, available, count)
        .into_iter()
        .map(|offset| (first + offset) as u16)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{
        InboxMessage, Node, NodeError, PeerId, Protocol, Session, SessionOpenRequest,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use std::time::Duration;

    /// Delivers every message into its own inbox after a fixed delay, except
    /// the bodies listed in `lose` and `refuse`.
    struct LoopbackApi {
        delay: Duration,
        lose: HashSet<String>,
        refuse: HashSet<String>,
        inbox: Arc<Mutex<HashMap<u16, Vec<InboxMessage>>>>,
    }

    impl LoopbackApi {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                lose: HashSet::new(),
                refuse: HashSet::new(),
                inbox: Arc::new(Mutex::new(HashMap::new())),
            }
        }
    }

    #[async_trait]
    impl NodeApi for LoopbackApi {
        async fn send_message(
            &self,
            _: &PeerId,
            body: &str,
            _: &[PeerId],
            tag: u16,
        ) -> NodeResult<bool> {
            if self.refuse.contains(body) {
                return Ok(false);
            }
            if self.lose.contains(body) {
                return Ok(true);
            }
            let inbox = self.inbox.clone();
            let delay = self.delay;
            let message = InboxMessage {
                tag,
                body: body.to_string(),
                received_at: 0,
            };
            tokio::spawn(async move {
                sleep(delay).await;
                inbox.lock().entry(tag).or_default().push(message);
            });
            Ok(true)
        }

        async fn pop_message(&self, tag: u16) -> NodeResult<Option<InboxMessage>> {
            let mut inbox = self.inbox.lock();
            Ok(inbox
                .get_mut(&tag)
                .filter(|queue| !queue.is_empty())
                .map(|queue| queue.remove(0)))
        }

        async fn open_channel(&self, _: &str, _: u128) -> NodeResult<String> {
            Err(NodeError::InvalidResponse("unsupported".into()))
        }

        async fn close_channel(&self, _: &str) -> NodeResult<bool> {
            Ok(false)
        }

        async fn session_open(&self, _: Protocol, _: &SessionOpenRequest) -> NodeResult<Session> {
            Err(NodeError::InvalidResponse("unsupported".into()))
        }

        async fn session_list(&self, _: Protocol) -> NodeResult<Vec<Session>> {
            Ok(Vec::new())
        }

        async fn session_close(&self, _: &Session) -> NodeResult<bool> {
            Ok(false)
        }

        async fn metrics(&self) -> NodeResult<String> {
            Ok(String::new())
        }
    }

    fn route(api: LoopbackApi) -> Route {
        let api: Arc<dyn NodeApi> = Arc::new(api);
        Route::new(vec![
            Node::new("local1", PeerId::new("a"), "0xa", api.clone()),
            Node::new("local2", PeerId::new("b"), "0xb", api),
        ])
        .unwrap()
    }

    fn config(count: usize) -> ProfilerConfig {
        ProfilerConfig::default()
            .with_message_count(count)
            .with_settle_delay(Duration::ZERO)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_is_measured() {
        let profiler = DelayProfiler::new(config(20));
        let profile = profiler
            .profile(&route(LoopbackApi::new(Duration::from_secs(2))), &ProfileLabels::default())
            .await
            .unwrap();

        assert_eq!(profile.stats.count, 20);
        assert_eq!(profile.dropped(), 0);
        // Polling adds at most one jittered poll interval to the true delay
        assert!(profile.stats.mean >= 2.0);
        assert!(profile.stats.mean <= 2.4);
        assert_eq!(profile.histogram.bin_count(), HISTOGRAM_BINS);
        assert_eq!(profile.histogram.total(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_and_refused_messages_are_dropped() {
        let mut api = LoopbackApi::new(Duration::from_millis(100));
        api.lose.insert("Message #00000001".into());
        api.refuse.insert("Message #00000003".into());

        let profiler = DelayProfiler::new(config(5));
        let profile = profiler
            .profile(&route(api), &ProfileLabels::default())
            .await
            .unwrap();

        assert_eq!(profile.records.len(), 5);
        assert_eq!(profile.stats.count, 3);
        let indices: Vec<usize> = profile.samples().iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 2, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_message_waits_out_the_timeout() {
        let mut api = LoopbackApi::new(Duration::from_millis(10));
        api.lose.insert("Message #00000000".into());

        let start = Instant::now();
        let profile = DelayProfiler::new(config(2))
            .profile(&route(api), &ProfileLabels::default())
            .await
            .unwrap();

        // Source delay unset: the bound is the 15 s grace alone
        assert!(start.elapsed() >= Duration::from_secs(15));
        assert_eq!(profile.stats.count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_samples_fails() {
        let mut api = LoopbackApi::new(Duration::ZERO);
        api.refuse.insert("Message #00000000".into());
        api.refuse.insert("Message #00000001".into());

        let result = DelayProfiler::new(config(2))
            .profile(&route(api), &ProfileLabels::default())
            .await;
        assert!(matches!(result, Err(ProfilerError::NoSamples { sent: 2 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_body_under_tag_is_skipped() {
        let tag = 4242;
        let api = LoopbackApi::new(Duration::from_millis(50));
        let inbox = api.inbox.clone();
        inbox.lock().entry(tag).or_default().push(InboxMessage {
            tag,
            body: "stale".into(),
            received_at: 0,
        });
        let route = route(api);
        let destination = route.destination().api.clone();
        destination
            .send_message(&PeerId::new("b"), "fresh", &[], tag)
            .await
            .unwrap();

        let profiler = DelayProfiler::new(config(1));
        let found = timeout(
            Duration::from_secs(1),
            profiler.await_receipt(destination.as_ref(), tag, "fresh"),
        )
        .await;

        assert!(matches!(found, Ok(Ok(()))));
        assert!(inbox.lock().get(&tag).map_or(true, |q| q.is_empty()));
    }

    #[test]
    fn test_draw_tags_are_unique_and_above_reserved() {
        let tags = draw_tags(5000).unwrap();
        assert_eq!(tags.len(), 5000);
        assert!(tags.iter().all(|&t| t > RESERVED_TAG_UPPER_BOUND));
        let unique: HashSet<u16> = tags.iter().copied().collect();
        assert_eq!(unique.len(), tags.len());
    }

    #[test]
    fn test_draw_tags_exhausted() {
        assert!(matches!(
            draw_tags(70_000),
            Err(ProfilerError::TagSpaceExhausted { .. })
        ));
    }
}
