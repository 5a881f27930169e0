use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query as QueryParams, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use skycast_core::Query;
use tracing::info;

use crate::encoder;
use crate::problem::Problem;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    #[serde(default)]
    pub query: Option<String>,
}

/// `GET /stream?query=...`: streams the answer one character at a time.
pub async fn stream_answer(
    State(state): State<AppState>,
    params: Result<QueryParams<StreamParams>, QueryRejection>,
) -> Response {
    let raw = match params {
        Ok(QueryParams(params)) => params.query.unwrap_or_default(),
        Err(rejection) => return Problem::bad_request(rejection.body_text()).into_response(),
    };
    let query = match Query::parse(raw) {
        Ok(query) => query,
        Err(err) => return Problem::from(err).into_response(),
    };

    let cancel = state.shutdown.child_token();
    let units = state.orchestrator.stream(query, cancel.clone());
    info!(session_id = %units.session_id(), "streaming answer");
    encoder::encode(units, cancel).await
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.orchestrator.model(),
    }))
}
