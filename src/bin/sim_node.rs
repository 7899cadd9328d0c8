use anyhow::Context;
use mixnet_harness::api::create_api_server;
use mixnet_harness::metrics::init_metrics;
use mixnet_harness::node::DelayConfig;
use mixnet_harness::simulation::{local_nodes, SimulatedCluster};
use mixnet_harness::HarnessConfig;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Reads an optional numeric environment variable.
fn env_u64(name: &str) -> anyhow::Result<Option<u64>> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .with_context(|| format!("{name} must be a number, got {value:?}")),
        Err(_) => Ok(None),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    init_metrics();

    let port_base = env_u64("MIXNET_PORT_BASE")?.unwrap_or(19091);
    let config = HarnessConfig::default().with_port_base(
        u16::try_from(port_base).context("MIXNET_PORT_BASE out of range")?,
    );
    let token = std::env::var("MIXNET_API_TOKEN").ok();
    let relay_delay = DelayConfig {
        min_delay_ms: env_u64("MIXNET_RELAY_MIN_DELAY_MS")?,
        delay_range_ms: env_u64("MIXNET_RELAY_DELAY_RANGE_MS")?,
    };

    let cluster = SimulatedCluster::new(
        config.simulation_config(),
        &local_nodes(3, &[DelayConfig::unset(), relay_delay]),
    );

    let mut servers = JoinSet::new();
    for (index, node) in cluster.sim_nodes().iter().enumerate() {
        let port = config.port_for(index);
        let listener = TcpListener::bind((config.simulation.listen_host.as_str(), port))
            .await
            .with_context(|| format!("failed to bind node {} on port {port}", index + 1))?;
        let addr = listener.local_addr()?;
        let state = node.state();
        info!(
            alias = %state.alias,
            peer_id = %state.peer_id,
            address = %state.address,
            %addr,
            min_delay = %state.delay.min_label(),
            delay_range = %state.delay.range_label(),
            "node listening"
        );

        let app = create_api_server(node.clone(), token.clone());
        servers.spawn(async move { axum::serve(listener, app).await });
    }

    tokio::select! {
        result = servers.join_next() => {
            if let Some(result) = result {
                result.context("node server panicked")?.context("node server failed")?;
            }
        }
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }

    cluster.shutdown();
    Ok(())
}
