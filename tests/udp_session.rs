use mixnet_harness::artifacts::ArtifactConfig;
use mixnet_harness::channels::{ChannelOrchestrator, FundingPolicy};
use mixnet_harness::echo::{EchoConfig, EchoServer};
use mixnet_harness::node::{Capabilities, DelayConfig, Protocol};
use mixnet_harness::scenario::catalog;
use mixnet_harness::scenario::{ScenarioOutcome, ScenarioRunner, SimulatedSwarm};
use mixnet_harness::scope::ResourceScope;
use mixnet_harness::session::{SessionState, SessionVerifier, SessionVerifierConfig};
use mixnet_harness::simulation::{local_nodes, SimulatedCluster, SimulationConfig};
use mixnet_harness::HarnessConfig;
use std::time::Duration;
use tempfile::TempDir;

/// UDP datagrams cross a relay and come back unchanged
#[tokio::test]
async fn test_udp_relay_scenario() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = TempDir::new().unwrap();
    let config = HarnessConfig::default()
        .with_artifacts(ArtifactConfig::under(dir.path()))
        .with_session(
            SessionVerifierConfig::default()
                .with_message_count(20)
                .with_io_timeout(Duration::from_secs(10)),
        );
    let runner = ScenarioRunner::new(SimulatedSwarm::new(config.simulation_config()), config);

    let table = catalog::relay_sweep(&[DelayConfig::new(10, 10)], Protocol::Udp, 5000);
    let report = runner.run(&table[0]).await;
    println!("✓ {}: {}", report.name, report.outcome);

    assert_eq!(report.outcome, ScenarioOutcome::Passed, "{}", report.outcome);
    let verification = report.verification.unwrap();
    assert_eq!(verification.bytes_received, 20 * 1500);
    assert_eq!(runner.swarm().provisioned()[0].open_channel_count(), 0);
}

/// Without segmentation a TCP write larger than one packet breaks the session
#[tokio::test]
async fn test_tcp_without_segmentation_breaks() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let cluster = SimulatedCluster::new(
        SimulationConfig::default(),
        &local_nodes(3, &[DelayConfig::unset(), DelayConfig::new(1, 1)]),
    );
    let route = cluster.route(&["local1", "local2", "local3"]).unwrap();
    let mut scope = ResourceScope::new("no-segmentation");
    let channels = ChannelOrchestrator::new(FundingPolicy::default())
        .open_route(&route, 100)
        .await
        .unwrap();
    scope.adopt(channels);
    let echo = scope.adopt(EchoServer::start(EchoConfig::tcp()).await.unwrap());

    let mut session_config = SessionVerifierConfig::default()
        .with_message_count(5)
        .with_io_timeout(Duration::from_secs(10));
    session_config.capabilities = Capabilities::none();
    let verifier = SessionVerifier::new(session_config);

    let report = verifier.verify(&mut scope, &route, echo.addr()).await.unwrap();
    assert!(!report.passed());
    assert!(matches!(report.state_at_close, SessionState::Failed { .. }));

    assert_eq!(scope.close().await, 0);
    assert_eq!(cluster.network().open_channel_count(), 0);
}
