//! Decoder against a real listener: rejected requests and chunked bodies.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use bytes::Bytes;
use futures::{StreamExt as _, stream};
use skycast_client::{DecodeError, DecoderState, ProblemBody, TransportDecoder};
use tokio::net::TcpListener;

async fn spawn(app: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move { axum::serve(listener, app).await });
    format!("http://{addr}")
}

async fn rejecting() -> impl IntoResponse {
    (
        StatusCode::BAD_REQUEST,
        [(header::CONTENT_TYPE, "application/problem+json")],
        r#"{"title":"Bad Request","detail":"query must not be blank","status":400}"#,
    )
}

/// Writes `Rain 🌧 ends.` with the 4-byte scalar cut across three writes.
async fn split_rain() -> impl IntoResponse {
    let bytes = "Rain 🌧 ends.".as_bytes();
    let parts: Vec<Bytes> = [&bytes[..6], &bytes[6..8], &bytes[8..9], &bytes[9..]]
        .into_iter()
        .map(Bytes::copy_from_slice)
        .collect();
    let body = stream::iter(parts).then(|part| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok::<_, Infallible>(part)
    });
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
}

#[tokio::test]
async fn rejected_request_leaves_the_decoder_failed_with_the_problem() {
    let base = spawn(axum::Router::new().route("/stream", get(rejecting))).await;
    let mut decoder =
        TransportDecoder::connect(&reqwest::Client::new(), &base, "  ").await;

    assert_eq!(decoder.state(), DecoderState::Failed);
    assert_eq!(
        decoder.failure(),
        Some(&DecodeError::Status {
            status: 400,
            problem: Some(ProblemBody {
                title: "Bad Request".into(),
                detail: "query must not be blank".into(),
                status: 400,
            }),
        })
    );
    assert_eq!(decoder.next_fragment().await, None);

    let err = skycast_client::open_stream(&reqwest::Client::new(), &base, "  ")
        .await
        .err()
        .expect("rejected");
    assert!(matches!(err, DecodeError::Status { status: 400, .. }));
}

#[tokio::test]
async fn split_scalar_in_a_chunked_body_is_decoded_whole() {
    let base = spawn(axum::Router::new().route("/stream", get(split_rain))).await;
    let mut decoder = skycast_client::open_stream(&reqwest::Client::new(), &base, "rain?")
        .await
        .expect("stream opens");
    assert_eq!(decoder.state(), DecoderState::Idle);

    let mut text = String::new();
    while let Some(fragment) = decoder.next_fragment().await {
        text.push_str(&fragment.expect("fragment"));
    }
    assert_eq!(text, "Rain 🌧 ends.");
    assert_eq!(decoder.state(), DecoderState::Completed);
    assert!(decoder.failure().is_none());
}

#[tokio::test]
async fn unreachable_server_fails_without_a_status() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let decoder =
        TransportDecoder::connect(&reqwest::Client::new(), &format!("http://{addr}"), "hi").await;
    assert_eq!(decoder.state(), DecoderState::Failed);
    assert!(matches!(decoder.failure(), Some(DecodeError::Transport(_))));
}
