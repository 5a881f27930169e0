use std::pin::Pin;

use crate::content::{ContentDelta, ConversationItem};
use crate::errors::ProviderError;
use crate::model::{ProviderId, SamplingParams, ToolDeclaration};

/// Incremental backend output for one generation round.
///
/// The stream ends after the backend reports completion; a stream that stops
/// without completion yields a terminal `Err` instead.
pub type DeltaStream =
    Pin<Box<dyn futures::Stream<Item = Result<ContentDelta, ProviderError>> + Send + 'static>>;

/// Everything submitted to the backend for one generation round.
#[derive(Clone, Debug)]
pub struct PromptRequest {
    pub session_id: uuid::Uuid,
    /// Zero for the initial submission, incremented after each batch of tool results.
    pub round: u32,
    pub instructions: String,
    pub input: Vec<ConversationItem>,
    pub tools: Vec<ToolDeclaration>,
    pub sampling: SamplingParams,
}

/// Contract implemented by model backends.
#[async_trait::async_trait]
pub trait ModelBackend: Send + Sync {
    /// Stable backend id.
    fn id(&self) -> ProviderId;

    /// Model name used for logging and the info endpoint.
    fn model(&self) -> &str;

    /// Submits a prompt and returns its delta stream.
    ///
    /// Errors returned here happen before any delta was produced.
    async fn start_stream(&self, req: PromptRequest) -> Result<DeltaStream, ProviderError>;
}
