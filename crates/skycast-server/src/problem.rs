use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

/// Structured error body for failures detected before streaming starts.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Problem {
    pub title: String,
    pub detail: String,
    pub status: u16,
}

impl Problem {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            title: status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            detail: detail.into(),
            status: status.as_u16(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }
}

impl From<skycast_core::QueryError> for Problem {
    fn from(err: skycast_core::QueryError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            [(header::CONTENT_TYPE, "application/problem+json")],
            axum::Json(self),
        )
            .into_response()
    }
}
