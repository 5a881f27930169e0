use anyhow::Context as _;
use skycast_server::observability::init_observability;
use skycast_server::{AppState, ServerConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load();
    init_observability();

    let orchestrator = match config.build_orchestrator() {
        Ok(orchestrator) => orchestrator,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            return Err(err).context("invalid configuration");
        }
    };
    info!(model = orchestrator.model(), max_tool_rounds = config.max_tool_rounds, "orchestrator ready");

    let state = AppState::new(orchestrator);
    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shutdown.cancel();
        }
    });

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    skycast_server::serve(listener, state).await
}
