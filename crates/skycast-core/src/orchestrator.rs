use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::StreamExt as _;
use futures::stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::content::{CharacterUnit, ContentDelta, ConversationItem, Query};
use crate::errors::ProviderError;
use crate::model::SamplingParams;
use crate::provider::{DeltaStream, ModelBackend, PromptRequest};
use crate::session::{StreamSession, TerminalState};
use crate::tools::ToolBox;

/// Emitted in place of an answer when generation fails before the first unit.
pub const APOLOGY: &str =
    "Sorry, I couldn't come up with an answer right now. Please try again in a moment.";

const DEFAULT_MAX_TOOL_ROUNDS: u32 = 8;

/// Drives the prompt/tool loop against a model backend.
///
/// Cheap to share: each call to [`Orchestrator::stream`] gets its own session
/// and nothing mutable crosses sessions.
#[derive(Clone)]
pub struct Orchestrator {
    backend: Arc<dyn ModelBackend>,
    tools: ToolBox,
    sampling: SamplingParams,
    max_tool_rounds: u32,
    instructions: Option<String>,
}

impl Orchestrator {
    pub fn builder(backend: Arc<dyn ModelBackend>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            backend,
            tools: ToolBox::new(),
            sampling: SamplingParams::default(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            instructions: None,
        }
    }

    /// Model name reported by the backend.
    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// Starts a session for `query`.
    ///
    /// Nothing is submitted until the returned stream is first polled. The
    /// stream ends on completion, on cancellation, or early when the backend
    /// fails after output has started.
    pub fn stream(&self, query: Query, cancel: CancellationToken) -> CharacterStream {
        let session = StreamSession::new(query, cancel);
        let session_id = session.id();
        let today = chrono::Local::now().date_naive();
        let instructions = self
            .instructions
            .clone()
            .unwrap_or_else(|| default_instructions(today));
        let conversation = vec![ConversationItem::UserText(
            session.query().as_str().to_string(),
        )];
        let state = SessionState {
            backend: self.backend.clone(),
            tools: self.tools.clone(),
            sampling: self.sampling.clone(),
            max_tool_rounds: self.max_tool_rounds,
            instructions,
            session,
            conversation,
            round: 0,
            calls_this_round: 0,
            round_text: String::new(),
            deferred: None,
            phase: Phase::Submit,
            pending: VecDeque::new(),
            reported: false,
        };
        let inner = stream::unfold(state, |mut state| async move {
            let unit = state.next_unit().await?;
            Some((unit, state))
        });
        CharacterStream {
            session_id,
            inner: Box::pin(inner),
        }
    }
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    backend: Arc<dyn ModelBackend>,
    tools: ToolBox,
    sampling: SamplingParams,
    max_tool_rounds: u32,
    instructions: Option<String>,
}

impl OrchestratorBuilder {
    pub fn tools(mut self, tools: ToolBox) -> Self {
        self.tools = tools;
        self
    }

    pub fn sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    /// Follow-up submissions allowed after tool results.
    pub fn max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// Replaces the default system instructions.
    pub fn instructions(mut self, text: impl Into<String>) -> Self {
        self.instructions = Some(text.into()).filter(|s| !s.trim().is_empty());
        self
    }

    pub fn build(self) -> Orchestrator {
        Orchestrator {
            backend: self.backend,
            tools: self.tools,
            sampling: self.sampling,
            max_tool_rounds: self.max_tool_rounds,
            instructions: self.instructions,
        }
    }
}

fn default_instructions(today: chrono::NaiveDate) -> String {
    format!(
        "You are Skycast, a concise and friendly assistant. Today is {}. \
         When the user asks about the weather, call get_weather with the city and the date \
         as YYYY-MM-DD, resolving relative dates against today, and base your answer on the \
         tool result. Answer in the language of the question.",
        today.format("%Y-%m-%d")
    )
}

/// Lazily produced sequence of character units for one session.
///
/// One consumer, strictly sequential pulls; not restartable.
pub struct CharacterStream {
    session_id: uuid::Uuid,
    inner: Pin<Box<dyn futures::Stream<Item = CharacterUnit> + Send>>,
}

impl CharacterStream {
    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }
}

impl futures::Stream for CharacterStream {
    type Item = CharacterUnit;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}

enum Phase {
    Submit,
    Receiving(DeltaStream),
    Finished,
}

struct SessionState {
    backend: Arc<dyn ModelBackend>,
    tools: ToolBox,
    sampling: SamplingParams,
    max_tool_rounds: u32,
    instructions: String,
    session: StreamSession,
    conversation: Vec<ConversationItem>,
    round: u32,
    calls_this_round: u32,
    /// Visible text of the current round not yet recorded in `conversation`.
    round_text: String,
    /// A tool result waiting to be folded in before the next backend delta.
    deferred: Option<ContentDelta>,
    phase: Phase,
    pending: VecDeque<CharacterUnit>,
    reported: bool,
}

impl SessionState {
    async fn next_unit(&mut self) -> Option<CharacterUnit> {
        let cancel = self.session.cancel_token().clone();
        loop {
            if self.session.is_cancelled() {
                self.finish(TerminalState::Cancelled);
                self.report();
                return None;
            }
            if let Some(unit) = self.pending.pop_front() {
                self.session.record_emitted();
                return Some(unit);
            }

            match std::mem::replace(&mut self.phase, Phase::Finished) {
                Phase::Submit => {
                    let request = self.request();
                    debug!(session_id = %self.session.id(), round = self.round, "submitting prompt");
                    let started = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        started = self.backend.start_stream(request) => Some(started),
                    };
                    match started {
                        None => continue,
                        Some(Ok(deltas)) => self.phase = Phase::Receiving(deltas),
                        Some(Err(err)) => self.fail(err),
                    }
                }
                Phase::Receiving(mut deltas) => {
                    let next = match self.deferred.take() {
                        Some(delta) => Some(Ok(delta)),
                        None => tokio::select! {
                            biased;
                            _ = cancel.cancelled() => continue,
                            next = deltas.next() => next,
                        },
                    };
                    match next {
                        Some(Ok(ContentDelta::TextChunk(text))) => {
                            self.round_text.push_str(&text);
                            self.pending.extend(text.chars());
                            self.phase = Phase::Receiving(deltas);
                        }
                        Some(Ok(ContentDelta::ToolCallRequest(call))) => {
                            info!(session_id = %self.session.id(), tool = %call.name, round = self.round, "tool call requested");
                            let result = tokio::select! {
                                biased;
                                _ = cancel.cancelled() => continue,
                                result = self.tools.dispatch(&call) => result,
                            };
                            self.record_round_text();
                            self.conversation.push(ConversationItem::ToolCall(call));
                            self.deferred = Some(result);
                            self.calls_this_round += 1;
                            self.phase = Phase::Receiving(deltas);
                        }
                        Some(Ok(ContentDelta::ToolCallResult { call_id, name, text })) => {
                            debug!(session_id = %self.session.id(), tool = %name, chars = text.chars().count(), "tool result folded into context");
                            self.conversation.push(ConversationItem::ToolOutput {
                                call_id,
                                output: text,
                            });
                            self.phase = Phase::Receiving(deltas);
                        }
                        Some(Err(err)) => self.fail(err),
                        None => self.round_finished(),
                    }
                }
                Phase::Finished => {
                    self.report();
                    return None;
                }
            }
        }
    }

    fn request(&self) -> PromptRequest {
        PromptRequest {
            session_id: self.session.id(),
            round: self.round,
            instructions: self.instructions.clone(),
            input: self.conversation.clone(),
            tools: self.tools.declarations(),
            sampling: self.sampling.clone(),
        }
    }

    fn round_finished(&mut self) {
        if self.calls_this_round == 0 {
            self.complete();
            return;
        }
        if self.round >= self.max_tool_rounds {
            warn!(session_id = %self.session.id(), rounds = self.round, "tool round budget exhausted");
            self.complete();
            return;
        }
        self.record_round_text();
        self.round += 1;
        self.calls_this_round = 0;
        self.phase = Phase::Submit;
    }

    /// Moves text already shown to the user into the context, so the next
    /// round continues from it instead of starting over.
    fn record_round_text(&mut self) {
        if !self.round_text.is_empty() {
            let text = std::mem::take(&mut self.round_text);
            self.conversation.push(ConversationItem::AssistantText(text));
        }
    }

    fn complete(&mut self) {
        if self.nothing_emitted() {
            self.apologize();
        } else {
            self.finish(TerminalState::Completed);
        }
    }

    fn fail(&mut self, err: ProviderError) {
        if self.nothing_emitted() {
            warn!(session_id = %self.session.id(), error = %err, "generation failed before output; sending apology");
            self.apologize();
        } else {
            warn!(session_id = %self.session.id(), error = %err, emitted = self.session.emitted(), "generation failed mid-stream; truncating");
            self.finish(TerminalState::Truncated);
        }
    }

    fn apologize(&mut self) {
        self.pending.extend(APOLOGY.chars());
        self.finish(TerminalState::Apologized);
    }

    fn nothing_emitted(&self) -> bool {
        self.session.emitted() == 0 && self.pending.is_empty()
    }

    fn finish(&mut self, state: TerminalState) {
        self.phase = Phase::Finished;
        if state == TerminalState::Cancelled {
            self.pending.clear();
        }
        self.session.finish(state);
    }

    /// Logs the outcome once the last unit has been handed out.
    fn report(&mut self) {
        if std::mem::replace(&mut self.reported, true) {
            return;
        }
        info!(
            session_id = %self.session.id(),
            query_chars = self.session.query().char_len(),
            emitted = self.session.emitted(),
            terminal = ?self.session.terminal(),
            "session finished"
        );
    }
}
