//! Character stream to streamed HTTP body.
//!
//! Every unit is written as its own body frame, so the client sees it as soon
//! as it is generated. After the head is committed there is no way to report
//! an error in-band; a failing stream just ends.

use std::convert::Infallible;

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{Stream, StreamExt as _, stream};
use skycast_core::CharacterUnit;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::problem::Problem;

pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Encodes `units` as an unbuffered `text/plain` response.
///
/// Waits for the first unit before committing the head: a sequence that ends
/// with nothing and was not cancelled becomes a 500 problem. Dropping the body
/// (client disconnect) fires `cancel`.
pub async fn encode<S>(mut units: S, cancel: CancellationToken) -> Response
where
    S: Stream<Item = CharacterUnit> + Send + Unpin + 'static,
{
    let first = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        unit = units.next() => unit,
    };
    let Some(first) = first else {
        if cancel.is_cancelled() {
            debug!("cancelled before the first unit");
            return streaming_response(Body::empty());
        }
        return Problem::internal("the answer stream ended before producing any output")
            .into_response();
    };

    let guard = cancel.clone().drop_guard();
    let frames = stream::once(async move { first })
        .chain(units)
        .take_until(cancel.cancelled_owned())
        .map(move |unit| {
            let _connection = &guard;
            Ok::<_, Infallible>(unit_frame(unit))
        });
    streaming_response(Body::from_stream(frames))
}

fn unit_frame(unit: CharacterUnit) -> Bytes {
    let mut buf = [0u8; 4];
    Bytes::copy_from_slice(unit.encode_utf8(&mut buf).as_bytes())
}

fn streaming_response(body: Body) -> Response {
    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(TEXT_CONTENT_TYPE),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn unit_frame_is_the_utf8_encoding() {
        assert_eq!(unit_frame('a').as_ref(), b"a");
        assert_eq!(unit_frame('東').as_ref(), "東".as_bytes());
        assert_eq!(unit_frame('🌧').len(), 4);
    }

    #[tokio::test]
    async fn streams_every_unit_with_text_headers() {
        let units = stream::iter("Hé 🌧".chars().collect::<Vec<_>>());
        let response = encode(units, CancellationToken::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], TEXT_CONTENT_TYPE);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert_eq!(std::str::from_utf8(&body).expect("utf8"), "Hé 🌧");
    }

    #[tokio::test]
    async fn empty_sequence_is_an_internal_problem() {
        let response = encode(stream::iter(Vec::<char>::new()), CancellationToken::new()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let problem: Problem = serde_json::from_slice(&body).expect("problem json");
        assert_eq!(problem.status, 500);
    }

    #[tokio::test]
    async fn cancelled_before_first_unit_closes_cleanly() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let response = encode(stream::pending::<char>(), cancel).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn dropping_the_body_fires_cancellation() {
        let cancel = CancellationToken::new();
        let units = stream::iter(vec!['a']).chain(stream::pending());
        let response = encode(units, cancel.clone()).await;
        assert!(!cancel.is_cancelled());
        drop(response);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn cancellation_mid_stream_ends_body_without_error() {
        let cancel = CancellationToken::new();
        let units = stream::iter(vec!['a', 'b']).chain(stream::pending());
        let response = encode(units, cancel.clone()).await;
        let mut body = response.into_body().into_data_stream();
        assert_eq!(body.next().await.expect("frame").expect("ok").as_ref(), b"a");
        assert_eq!(body.next().await.expect("frame").expect("ok").as_ref(), b"b");
        cancel.cancel();
        assert!(body.next().await.is_none());
    }
}
