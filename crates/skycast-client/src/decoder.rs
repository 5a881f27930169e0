//! Streamed response bytes back to text fragments.
//!
//! The server writes whole scalars, but a read can end in the middle of a
//! multi-byte encoding. Incomplete tails are held until the rest arrives.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt as _, ready, stream};
use tracing::debug;

/// Problem body returned by the server for pre-stream failures.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct ProblemBody {
    pub title: String,
    pub detail: String,
    pub status: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("{}", status_message(.status, .problem))]
    Status {
        status: u16,
        problem: Option<ProblemBody>,
    },
    #[error("connection failed: {0}")]
    Transport(String),
}

fn status_message(status: &u16, problem: &Option<ProblemBody>) -> String {
    match problem {
        Some(problem) => format!("{} ({status}): {}", problem.title, problem.detail),
        None => format!("server responded with status {status}"),
    }
}

/// Lifecycle of one decoded response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecoderState {
    Idle,
    Receiving,
    Completed,
    Failed,
}

/// Incremental UTF-8 decoder.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decodes as much of `bytes` (plus any held tail) as forms complete scalars.
    ///
    /// Invalid sequences become U+FFFD; an incomplete trailing sequence is kept.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    if let Ok(prefix) = std::str::from_utf8(&self.pending[..valid]) {
                        out.push_str(prefix);
                    }
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    /// Bytes held back waiting for the rest of a scalar.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Flushes at end of input; a dangling partial scalar becomes U+FFFD.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        self.pending.clear();
        Some(char::REPLACEMENT_CHARACTER.to_string())
    }
}

/// Response body as delivered by reqwest.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, DecodeError>> + Send>>;

/// Turns a body byte stream into text fragments, tracking [`DecoderState`].
///
/// Yields non-empty fragments until the body closes (`Completed`) or the
/// transport breaks (`Failed`), then `None` forever.
pub struct TransportDecoder<B> {
    bytes: B,
    utf8: Utf8Decoder,
    state: DecoderState,
    failure: Option<DecodeError>,
}

impl<B> TransportDecoder<B> {
    pub fn new(bytes: B) -> Self {
        Self {
            bytes,
            utf8: Utf8Decoder::default(),
            state: DecoderState::Idle,
            failure: None,
        }
    }

    fn failed(bytes: B, err: DecodeError) -> Self {
        Self {
            bytes,
            utf8: Utf8Decoder::default(),
            state: DecoderState::Failed,
            failure: Some(err),
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Why the decoder ended in `Failed`, if it did.
    pub fn failure(&self) -> Option<&DecodeError> {
        self.failure.as_ref()
    }
}

impl<B, E> TransportDecoder<B>
where
    B: Stream<Item = Result<Bytes, E>> + Unpin,
    E: fmt::Display,
{
    /// Next non-empty fragment; `None` once the body is closed or has failed.
    pub async fn next_fragment(&mut self) -> Option<Result<String, DecodeError>> {
        self.next().await
    }
}

impl<B, E> Stream for TransportDecoder<B>
where
    B: Stream<Item = Result<Bytes, E>> + Unpin,
    E: fmt::Display,
{
    type Item = Result<String, DecodeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if matches!(this.state, DecoderState::Completed | DecoderState::Failed) {
                return Poll::Ready(None);
            }
            match ready!(this.bytes.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    this.state = DecoderState::Receiving;
                    let text = this.utf8.push(&chunk);
                    if !text.is_empty() {
                        return Poll::Ready(Some(Ok(text)));
                    }
                }
                Some(Err(e)) => {
                    let err = DecodeError::Transport(e.to_string());
                    this.state = DecoderState::Failed;
                    this.failure = Some(err.clone());
                    return Poll::Ready(Some(Err(err)));
                }
                None => {
                    this.state = DecoderState::Completed;
                    return Poll::Ready(this.utf8.finish().map(Ok));
                }
            }
        }
    }
}

impl TransportDecoder<BodyStream> {
    /// Sends `GET {base_url}/stream?query=...` and wraps the response.
    ///
    /// A failed request or a status of 400 or above gives a decoder that is
    /// already `Failed`, with the parsed problem body in [`Self::failure`].
    pub async fn connect(client: &reqwest::Client, base_url: &str, query: &str) -> Self {
        let url = format!("{}/stream", base_url.trim_end_matches('/'));
        let response = match client.get(url).query(&[("query", query)]).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "stream request failed");
                return Self::failed(
                    Box::pin(stream::empty()),
                    DecodeError::Transport(e.to_string()),
                );
            }
        };
        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            debug!(status, "stream request rejected");
            return Self::failed(
                Box::pin(stream::empty()),
                DecodeError::Status {
                    status,
                    problem: serde_json::from_str(&body).ok(),
                },
            );
        }
        Self::new(Box::pin(response.bytes_stream()))
    }
}

/// Opens a stream for `query`, failing before any fragment when the
/// request is rejected.
pub async fn open_stream(
    client: &reqwest::Client,
    base_url: &str,
    query: &str,
) -> Result<TransportDecoder<BodyStream>, DecodeError> {
    let decoder = TransportDecoder::connect(client, base_url, query).await;
    match decoder.failure() {
        Some(err) => Err(err.clone()),
        None => Ok(decoder),
    }
}
