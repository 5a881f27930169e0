use axum::Router;
use axum::routing::get;

use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/stream", get(super::handlers::stream_answer))
        .route("/health", get(super::handlers::health))
        .route("/info", get(super::handlers::info))
        .with_state(state)
}
