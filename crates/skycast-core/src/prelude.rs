//! Common imports for typical usage.
//!
//! Re-exports the types needed to build an orchestrator and consume a stream,
//! plus the cancellation token type sessions are driven by.
pub use crate::{
    APOLOGY, CharacterStream, CharacterUnit, ConfigError, ModelBackend, Orchestrator, Query,
    QueryError, SamplingParams, TerminalState, ToolBox,
};
pub use tokio_util::sync::CancellationToken;
