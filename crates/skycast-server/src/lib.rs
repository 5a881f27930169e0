//! HTTP surface for skycast.
//!
//! `GET /stream?query=...` answers with an unbuffered `text/plain` body that
//! carries the orchestrator's characters as they are produced.

pub mod config;
pub mod encoder;
pub mod handlers;
pub mod observability;
pub mod problem;
pub mod routes;
pub mod state;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use config::ServerConfig;
pub use problem::Problem;
pub use state::AppState;

pub fn create_app(state: AppState) -> Router {
    routes::create_routes(state).layer(TraceLayer::new_for_http())
}

/// Serves until `state.shutdown` is cancelled.
///
/// Cancelling the shutdown token also cancels every in-flight session.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = create_app(state);
    info!(addr = %listener.local_addr()?, "skycast listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
