//! Tool-augmented answer generation, streamed one character at a time.
//!
//! Backend-specific APIs are namespaced under `vendors::*`.
//!
//! # Streaming an answer (OpenAI + weather tool)
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use futures::StreamExt as _;
//! use skycast_core::prelude::*;
//! use skycast_core::tools::{WeatherConfig, WeatherTool};
//! use skycast_core::vendors::openai::OpenAiBackend;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::builder(Arc::new(OpenAiBackend::from_env()?))
//!     .tools(ToolBox::new().with_tool(Arc::new(WeatherTool::new(WeatherConfig::from_env()?)?)))
//!     .build();
//!
//! let mut units = orchestrator.stream(
//!     Query::parse("Weather in Paris on 2025-01-01?")?,
//!     CancellationToken::new(),
//! );
//! while let Some(unit) = units.next().await {
//!     print!("{unit}");
//! }
//! # Ok(())
//! # }
//! ```

/// Queries, deltas, and conversation items.
pub mod content;
/// Public error types.
pub mod errors;
/// Backend identifiers, sampling parameters, and tool declarations.
pub mod model;
/// Prompt/tool control loop and the lazy character stream.
pub mod orchestrator;
/// Common imports for typical usage.
pub mod prelude;
/// Model backend contract.
pub mod provider;
/// Per-query session bookkeeping.
pub mod session;
/// Tools callable by the model.
pub mod tools;
/// Vendor-specific backends.
pub mod vendors;

pub use content::{CharacterUnit, ContentDelta, ConversationItem, MAX_QUERY_CHARS, Query, ToolCall};
pub use errors::{ConfigError, ProviderError, QueryError};
pub use model::{ProviderId, SamplingParams, ToolDeclaration};
pub use orchestrator::{APOLOGY, CharacterStream, Orchestrator, OrchestratorBuilder};
pub use provider::{DeltaStream, ModelBackend, PromptRequest};
pub use session::{StreamSession, TerminalState};
pub use tools::{Tool, ToolBox};
