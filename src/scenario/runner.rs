use crate::artifacts::{ArtifactWriter, SessionSummaryRow};
use crate::channels::{ChannelOrchestrator, FundingPolicy};
use crate::config::HarnessConfig;
use crate::echo::{EchoConfig, EchoServer};
use crate::metrics::ScenarioMetrics;
use crate::node::metrics::{MIXER_AVERAGE_DELAY, PACKETS_FORWARDED};
use crate::node::{DelayConfig, MetricsSnapshot, Protocol, Route};
use crate::profiler::{DelayProfile, DelayProfiler, ProfileLabels};
use crate::scenario::checks::check_residuals;
use crate::scenario::error::{HarnessError, HarnessResult};
use crate::scenario::swarm::Swarm;
use crate::scenario::types::{ScenarioDescriptor, ScenarioKind, ScenarioOutcome, ScenarioReport};
use crate::scope::ResourceScope;
use crate::session::{SessionError, SessionVerifier, VerificationReport};
use crate::simulation::MAX_PACKET_PAYLOAD;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// What a run measured, kept for the report whether or not it passed.
#[derive(Default)]
struct Evidence {
    profile: Option<DelayProfile>,
    verification: Option<VerificationReport>,
}

/// Runs scenario descriptors one by one, each on a freshly provisioned route
/// inside its own resource scope.
pub struct ScenarioRunner<S> {
    swarm: S,
    config: HarnessConfig,
    writer: ArtifactWriter,
}

impl<S: Swarm> ScenarioRunner<S> {
    pub fn new(swarm: S, config: HarnessConfig) -> Self {
        let writer = ArtifactWriter::new(config.artifacts.clone());
        Self {
            swarm,
            config,
            writer,
        }
    }

    pub fn swarm(&self) -> &S {
        &self.swarm
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub async fn run_all(&self, descriptors: &[ScenarioDescriptor]) -> Vec<ScenarioReport> {
        let mut reports = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            reports.push(self.run(descriptor).await);
        }
        reports
    }

    /// Run one scenario. Never fails: errors become a failed outcome.
    pub async fn run(&self, descriptor: &ScenarioDescriptor) -> ScenarioReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("scenario", name = %descriptor.name, %run_id);

        async move {
            let metrics = ScenarioMetrics::start(descriptor.name.clone());
            info!(expected = ?descriptor.expected, "scenario started");

            let mut evidence = Evidence::default();
            let result = self.execute(descriptor, &mut evidence).await;
            let outcome = ScenarioOutcome::judge(descriptor.expected, &result);
            let elapsed = metrics.elapsed();
            metrics.finish(outcome.label());

            match &outcome {
                ScenarioOutcome::Failed { reason } => error!(%reason, "scenario failed"),
                _ => info!(outcome = %outcome, elapsed_ms = elapsed.as_millis() as u64, "scenario finished"),
            }

            ScenarioReport {
                run_id,
                name: descriptor.name.clone(),
                outcome,
                elapsed,
                profile: evidence.profile,
                verification: evidence.verification,
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        descriptor: &ScenarioDescriptor,
        evidence: &mut Evidence,
    ) -> HarnessResult<()> {
        let delays = descriptor.kind.node_delays();
        let deployment = self.swarm.provision(&delays).await?;
        let route = deployment.route.clone();
        info!(route = %route.describe(), "route provisioned");

        let mut scope = ResourceScope::new(descriptor.name.clone());
        let result = self
            .drive(&mut scope, &route, &descriptor.kind, &delays, evidence)
            .await;

        let failures = scope.close().await;
        drop(deployment);

        // A teardown failure outranks a permitted echo failure
        match result {
            Err(e) if !e.is_permitted_failure() => Err(e),
            _ if failures > 0 => Err(HarnessError::ReleaseFailed(failures)),
            other => other,
        }
    }

    async fn drive(
        &self,
        scope: &mut ResourceScope,
        route: &Route,
        kind: &ScenarioKind,
        delays: &[DelayConfig],
        evidence: &mut Evidence,
    ) -> HarnessResult<()> {
        let labels = ProfileLabels::new(delays[0], delays[1]);

        match kind {
            ScenarioKind::MessageDelay { min_duration, .. } => {
                self.open_channels(scope, route, self.profiling_funding(), 1)
                    .await?;
                let profiler =
                    DelayProfiler::new(self.config.profiler.clone().with_message_count(1));
                let profile = profiler.profile(route, &labels).await?;
                let took = profile.records.iter().find_map(|r| r.transfer_time());
                evidence.profile = Some(profile);

                match took {
                    Some(took) if took >= *min_duration => Ok(()),
                    Some(took) => Err(HarnessError::CheckFailed(format!(
                        "message took {took:?}, expected at least {min_duration:?}"
                    ))),
                    None => Err(HarnessError::CheckFailed("message never arrived".to_string())),
                }
            }

            ScenarioKind::DelayDistribution { source, messages } => {
                self.open_channels(scope, route, self.profiling_funding(), *messages as u64)
                    .await?;
                let profiler =
                    DelayProfiler::new(self.config.profiler.clone().with_message_count(*messages))
                        .with_artifacts(self.writer.clone());
                let profile = profiler.profile(route, &labels).await?;
                let samples: Vec<f64> = profile.samples().into_iter().map(|(_, t)| t).collect();
                evidence.profile = Some(profile);

                check_residuals(&samples, source, self.poll_slack()).map_err(HarnessError::CheckFailed)
            }

            ScenarioKind::SessionRoundTrip { relay, protocol } => {
                let session_config = self.config.session.clone().with_protocol(*protocol);
                let packets = session_config.message_count
                    * session_config.message_size.div_ceil(MAX_PACKET_PAYLOAD);
                self.open_channels(scope, route, self.config.funding, packets as u64)
                    .await?;

                let mut echo_config = match protocol {
                    Protocol::Tcp => EchoConfig::tcp(),
                    Protocol::Udp => EchoConfig::udp(),
                }
                .with_recv_buf_len(session_config.message_size);
                if let Some(dir) = &self.config.echo_capture_dir {
                    echo_config = echo_config.with_capture(dir.clone());
                }
                let echo = scope.adopt(EchoServer::start(echo_config).await?);

                let verifier = SessionVerifier::new(session_config);
                let report = verifier.verify(scope, route, echo.addr()).await?;
                self.record_relay_summary(route, relay).await;

                let failure = session_failure(&report);
                evidence.verification = Some(report);
                match failure {
                    None => Ok(()),
                    Some(e) => Err(e.into()),
                }
            }
        }
    }

    async fn open_channels(
        &self,
        scope: &mut ResourceScope,
        route: &Route,
        policy: FundingPolicy,
        messages: u64,
    ) -> HarnessResult<()> {
        let channels = ChannelOrchestrator::new(policy)
            .open_route(route, messages)
            .await?;
        info!(channels = channels.len(), messages, "route funded");
        scope.adopt(channels);
        Ok(())
    }

    fn profiling_funding(&self) -> FundingPolicy {
        FundingPolicy::new(
            self.config.funding.ticket_price,
            self.config.profiler.funding_multiplier,
        )
    }

    /// Worst-case overshoot of a receipt measurement: one randomized poll
    /// interval above the cap, plus scheduling noise.
    fn poll_slack(&self) -> Duration {
        self.config.profiler.poll_max_interval.mul_f64(1.5) + Duration::from_millis(50)
    }

    /// Append the first relay's mixer figures to the session summary.
    async fn record_relay_summary(&self, route: &Route, relay_delay: &DelayConfig) {
        let Some(relay) = route.relays().first() else {
            return;
        };

        let text = match relay.api.metrics().await {
            Ok(text) => text,
            Err(e) => {
                warn!(relay = %relay.alias, "failed to fetch relay metrics: {e}");
                return;
            }
        };

        let snapshot = MetricsSnapshot::parse(&text);
        let row = SessionSummaryRow::now(
            *relay_delay,
            snapshot.value_or_zero(MIXER_AVERAGE_DELAY),
            snapshot.value_or_zero(PACKETS_FORWARDED),
        );
        match self.writer.append_session_summary(&row) {
            Ok(path) => info!(
                relay = %relay.alias,
                avg_delay_ms = row.avg_packet_delay_ms,
                relayed = row.packets_relayed,
                path = %path.display(),
                "session summary recorded"
            ),
            Err(e) => error!(relay = %relay.alias, "failed to record session summary: {e}"),
        }
    }
}

fn session_failure(report: &VerificationReport) -> Option<SessionError> {
    if let Some(error) = &report.transport_error {
        return Some(SessionError::EchoIncomplete {
            expected_len: report.bytes_sent,
            actual_len: report.bytes_received,
            error: error.clone(),
        });
    }
    report.first_difference.map(|at| SessionError::ByteMismatch {
        expected_len: report.bytes_sent,
        actual_len: report.bytes_received,
        first_difference: Some(at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactConfig;
    use crate::node::{InboxMessage, Node, NodeApi, NodeResult, PeerId, Session, SessionOpenRequest};
    use crate::profiler::ProfilerConfig;
    use crate::scenario::catalog::{self, RELAY_SWEEP};
    use crate::scenario::swarm::{SimulatedSwarm, StaticSwarm};
    use crate::session::SessionVerifierConfig;
    use crate::simulation::{local_nodes, SimulatedCluster};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// A node that never agrees to close a session.
    struct StickySessions(Arc<dyn NodeApi>);

    #[async_trait]
    impl NodeApi for StickySessions {
        async fn send_message(
            &self,
            destination: &PeerId,
            body: &str,
            path: &[PeerId],
            tag: u16,
        ) -> NodeResult<bool> {
            self.0.send_message(destination, body, path, tag).await
        }

        async fn pop_message(&self, tag: u16) -> NodeResult<Option<InboxMessage>> {
            self.0.pop_message(tag).await
        }

        async fn open_channel(&self, destination_address: &str, amount: u128) -> NodeResult<String> {
            self.0.open_channel(destination_address, amount).await
        }

        async fn close_channel(&self, channel_id: &str) -> NodeResult<bool> {
            self.0.close_channel(channel_id).await
        }

        async fn session_open(
            &self,
            protocol: Protocol,
            request: &SessionOpenRequest,
        ) -> NodeResult<Session> {
            self.0.session_open(protocol, request).await
        }

        async fn session_list(&self, protocol: Protocol) -> NodeResult<Vec<Session>> {
            self.0.session_list(protocol).await
        }

        async fn session_close(&self, _session: &Session) -> NodeResult<bool> {
            Ok(false)
        }

        async fn metrics(&self) -> NodeResult<String> {
            self.0.metrics().await
        }
    }

    fn config(dir: &TempDir) -> HarnessConfig {
        HarnessConfig::default()
            .with_artifacts(ArtifactConfig::under(dir.path()))
            .with_session(SessionVerifierConfig::default().with_message_count(10))
            .with_profiler(ProfilerConfig::default().with_settle_delay(Duration::ZERO))
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_delay_lower_bound() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let runner = ScenarioRunner::new(SimulatedSwarm::new(config.simulation_config()), config);

        let descriptor = ScenarioDescriptor::new(
            "short-delay",
            ScenarioKind::MessageDelay {
                source: DelayConfig::new(300, 1),
                min_duration: Duration::from_millis(300),
            },
        );
        let report = runner.run(&descriptor).await;
        assert_eq!(report.outcome, ScenarioOutcome::Passed, "{}", report.outcome);
        assert_eq!(report.profile.unwrap().stats.count, 1);

        let network = &runner.swarm().provisioned()[0];
        assert_eq!(network.open_channel_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmet_lower_bound_fails() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let runner = ScenarioRunner::new(SimulatedSwarm::new(config.simulation_config()), config);

        let descriptor = ScenarioDescriptor::new(
            "too-fast",
            ScenarioKind::MessageDelay {
                source: DelayConfig::new(10, 1),
                min_duration: Duration::from_secs(60),
            },
        );
        let report = runner.run(&descriptor).await;
        assert!(matches!(report.outcome, ScenarioOutcome::Failed { .. }));
        assert_eq!(runner.swarm().provisioned()[0].open_channel_count(), 0);
    }

    #[tokio::test]
    async fn test_session_scenario_writes_summary() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let summary = config.artifacts.session_summary.clone();
        let runner = ScenarioRunner::new(SimulatedSwarm::new(config.simulation_config()), config);

        let descriptor = ScenarioDescriptor::new(
            "session",
            ScenarioKind::SessionRoundTrip {
                relay: DelayConfig::new(5, 5),
                protocol: Protocol::Tcp,
            },
        );
        let report = runner.run(&descriptor).await;
        assert_eq!(report.outcome, ScenarioOutcome::Passed, "{}", report.outcome);
        assert!(report.verification.unwrap().matched);

        let written = std::fs::read_to_string(summary).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains(",5,5,"));
        assert_eq!(runner.swarm().provisioned()[0].open_channel_count(), 0);
    }

    #[tokio::test]
    async fn test_broken_session_is_expected_failure() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir).with_breaking_threshold_ms(50);
        let runner = ScenarioRunner::new(SimulatedSwarm::new(config.simulation_config()), config);

        let descriptor = ScenarioDescriptor::new(
            "broken",
            ScenarioKind::SessionRoundTrip {
                relay: DelayConfig::new(100, 1),
                protocol: Protocol::Tcp,
            },
        )
        .expect_failure();
        let report = runner.run(&descriptor).await;
        assert!(
            matches!(report.outcome, ScenarioOutcome::ExpectedFailure { .. }),
            "{}",
            report.outcome
        );
        let network = &runner.swarm().provisioned()[0];
        assert_eq!(network.open_channel_count(), 0);
    }

    #[test]
    fn test_session_failure_reason() {
        let report = VerificationReport {
            port: 1,
            bytes_sent: 10,
            bytes_received: 10,
            matched: false,
            first_difference: Some(3),
            transport_error: None,
            elapsed: Duration::ZERO,
            state_at_close: crate::session::SessionState::Open { port: 1 },
        };
        let failure = session_failure(&report).unwrap();
        assert!(failure.is_echo_failure());
        assert!(matches!(
            failure,
            SessionError::ByteMismatch {
                first_difference: Some(3),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_provisioning_failure_is_not_expected() {
        let dir = TempDir::new().unwrap();
        let runner = ScenarioRunner::new(StaticSwarm::new(vec![]), config(&dir));

        let table = catalog::relay_sweep(&RELAY_SWEEP, Protocol::Tcp, 5000);
        let reports = runner.run_all(&table).await;
        assert_eq!(table[2].expected, crate::scenario::ExpectedOutcome::Fail);
        for report in &reports {
            assert!(
                matches!(report.outcome, ScenarioOutcome::Failed { .. }),
                "{}: {}",
                report.name,
                report.outcome
            );
        }
        assert!(!reports[2].outcome.to_string().contains("N/Ams"));
    }

    #[tokio::test]
    async fn test_unclosable_session_is_not_expected() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let relay = DelayConfig::new(5, 5);
        let cluster = SimulatedCluster::new(
            config.simulation_config(),
            &local_nodes(3, &[DelayConfig::unset(), relay]),
        );
        let nodes = cluster.nodes();
        let source = Node::new(
            nodes[0].alias.clone(),
            nodes[0].peer_id.clone(),
            nodes[0].address.clone(),
            Arc::new(StickySessions(nodes[0].api.clone())),
        );
        let swarm = StaticSwarm::new(vec![
            (source, DelayConfig::unset()),
            (nodes[1].clone(), relay),
            (nodes[2].clone(), DelayConfig::unset()),
        ]);
        let runner = ScenarioRunner::new(swarm, config);

        let descriptor = ScenarioDescriptor::new(
            "sticky-session",
            ScenarioKind::SessionRoundTrip {
                relay,
                protocol: Protocol::Tcp,
            },
        )
        .expect_failure();
        let report = runner.run(&descriptor).await;

        match &report.outcome {
            ScenarioOutcome::Failed { reason } => assert!(reason.contains("close"), "{reason}"),
            other => panic!("expected a failure, got {other}"),
        }
        assert_eq!(cluster.network().open_channel_count(), 0);
    }

    #[tokio::test]
    async fn test_intact_session_under_expected_failure_passes() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let runner = ScenarioRunner::new(SimulatedSwarm::new(config.simulation_config()), config);

        let descriptor = ScenarioDescriptor::new(
            "intact",
            ScenarioKind::SessionRoundTrip {
                relay: DelayConfig::new(5, 5),
                protocol: Protocol::Tcp,
            },
        )
        .expect_failure();
        let report = runner.run(&descriptor).await;

        assert_eq!(report.outcome, ScenarioOutcome::Passed, "{}", report.outcome);
        assert!(report.verification.unwrap().passed());
    }
}
