//! Client side of skycast: decodes a streamed answer and folds it into a
//! document that a front end can render as it grows.
//!
//! ```no_run
//! use std::sync::Arc;
//! use skycast_client::{DocumentAggregator, HttpFragmentSource};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let source = HttpFragmentSource::new("http://127.0.0.1:8080")?;
//! let mut aggregator = DocumentAggregator::new(Arc::new(source));
//! aggregator.submit("What's the weather in Lisbon?").await;
//! aggregator.run_to_idle().await;
//! println!("{}", aggregator.document());
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod decoder;
pub mod source;

pub use aggregator::{DocumentAggregator, DocumentState};
pub use decoder::{
    BodyStream, DecodeError, DecoderState, FragmentStream, ProblemBody, TransportDecoder,
    Utf8Decoder, open_stream,
};
pub use source::{FragmentSource, HttpFragmentSource};
