use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;
use tracing::debug;

use crate::ProviderId;
use crate::content::{ContentDelta, ConversationItem};
use crate::errors::{ConfigError, ProviderError};
use crate::provider::{DeltaStream, ModelBackend, PromptRequest};

use super::config::OpenAiClientConfig;
use super::transport::{FrameSplitter, OpenAiEvent, events_from_frame};

const OPENAI_PROVIDER: &str = "openai";

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// Model backend for OpenAI's Responses API (streaming, function calling).
pub struct OpenAiBackend {
    client: reqwest::Client,
    config: OpenAiClientConfig,
}

impl OpenAiBackend {
    /// Creates a backend from explicit client configuration.
    ///
    /// A blank key is rejected here so a misconfigured service never starts.
    pub fn new(config: OpenAiClientConfig) -> Result<Self, ConfigError> {
        if config.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("OPENAI_API_KEY"));
        }
        if config.model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "model",
                message: "must not be empty".into(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "OpenAI client",
                message: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    /// Creates a backend using `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(OpenAiClientConfig::from_env()?)
    }
}

#[async_trait::async_trait]
impl ModelBackend for OpenAiBackend {
    fn id(&self) -> ProviderId {
        ProviderId::new(OPENAI_PROVIDER)
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn start_stream(&self, req: PromptRequest) -> Result<DeltaStream, ProviderError> {
        let provider_id = ProviderId::new(OPENAI_PROVIDER);
        let body = build_request_body(&self.config.model, &req);
        debug!(session_id = %req.session_id, round = req.round, model = %self.config.model, "starting OpenAI responses stream");

        let response = self
            .client
            .post(self.config.responses_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                ProviderError::transport(provider_id.clone(), format!("OpenAI request failed: {e}"))
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::provider(
                provider_id,
                format!("OpenAI responses request failed with status {status}: {body}"),
                Some(status.as_u16()),
            ));
        }

        let bytes_stream: ByteStream = Box::pin(response.bytes_stream());
        Ok(Box::pin(openai_delta_stream(provider_id, bytes_stream)))
    }
}

pub(crate) fn build_request_body(model: &str, req: &PromptRequest) -> serde_json::Value {
    let input: Vec<serde_json::Value> = req.input.iter().map(render_input_item).collect();
    let tools: Vec<serde_json::Value> = req
        .tools
        .iter()
        .map(|tool| {
            serde_json::json!({
                "type": "function",
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
                "strict": true,
            })
        })
        .collect();

    let mut body = serde_json::json!({
        "model": model,
        "instructions": req.instructions,
        "input": input,
        "stream": true,
        "store": false,
        "max_output_tokens": req.sampling.max_output_tokens,
        "temperature": req.sampling.temperature,
        "top_p": req.sampling.top_p,
    });
    if !tools.is_empty() {
        body["tools"] = serde_json::Value::Array(tools);
        body["tool_choice"] = serde_json::json!("auto");
        body["parallel_tool_calls"] = serde_json::json!(false);
    }
    body
}

fn render_input_item(item: &ConversationItem) -> serde_json::Value {
    match item {
        ConversationItem::UserText(text) => serde_json::json!({
            "role": "user",
            "content": text,
        }),
        ConversationItem::AssistantText(text) => serde_json::json!({
            "role": "assistant",
            "content": text,
        }),
        ConversationItem::ToolCall(call) => serde_json::json!({
            "type": "function_call",
            "call_id": call.call_id,
            "name": call.name,
            "arguments": call.arguments,
        }),
        ConversationItem::ToolOutput { call_id, output } => serde_json::json!({
            "type": "function_call_output",
            "call_id": call_id,
            "output": output,
        }),
    }
}

fn openai_delta_stream(
    provider_id: ProviderId,
    bytes_stream: ByteStream,
) -> impl futures::Stream<Item = Result<ContentDelta, ProviderError>> + Send {
    struct State {
        provider_id: ProviderId,
        bytes_stream: ByteStream,
        splitter: FrameSplitter,
        pending: VecDeque<ContentDelta>,
        completed: bool,
    }

    stream::try_unfold(
        State {
            provider_id,
            bytes_stream,
            splitter: FrameSplitter::default(),
            pending: VecDeque::new(),
            completed: false,
        },
        |mut state| async move {
            loop {
                if let Some(delta) = state.pending.pop_front() {
                    return Ok(Some((delta, state)));
                }
                if state.completed {
                    return Ok(None);
                }

                match state.bytes_stream.next().await {
                    Some(Ok(chunk)) => {
                        for frame in state.splitter.feed(&chunk) {
                            for event in events_from_frame(&state.provider_id, &frame)? {
                                match event {
                                    OpenAiEvent::Delta(delta) => state.pending.push_back(delta),
                                    OpenAiEvent::Completed => state.completed = true,
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        return Err(ProviderError::transport(
                            state.provider_id,
                            format!("OpenAI streaming read failed: {e}"),
                        ));
                    }
                    None => {
                        return Err(ProviderError::protocol(
                            state.provider_id,
                            "stream ended before response.completed",
                        ));
                    }
                }
            }
        },
    )
}
