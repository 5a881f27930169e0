//! Server-sent event framing and Responses API event mapping.

use serde_json::Value;

use crate::content::{ContentDelta, ToolCall};
use crate::errors::ProviderError;
use crate::model::ProviderId;

/// One `event:`/`data:` block terminated by a blank line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EventFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Buffers body chunks and cuts them into [`EventFrame`]s at blank lines.
#[derive(Default)]
pub(crate) struct FrameSplitter {
    buf: Vec<u8>,
}

impl FrameSplitter {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<EventFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some((end, sep)) = blank_line(&self.buf) {
            let block: Vec<u8> = self.buf.drain(..end + sep).take(end).collect();
            frames.extend(parse_block(&block));
        }
        frames
    }
}

/// Position and length of the first `\n\n` or `\r\n\r\n`.
fn blank_line(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_block(block: &[u8]) -> Option<EventFrame> {
    // Blocks end at blank lines, never inside a multi-byte scalar.
    let text = String::from_utf8_lossy(block);
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();
    for line in text.lines() {
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }
    if event.is_none() && data.is_empty() {
        return None;
    }
    Some(EventFrame {
        event,
        data: data.join("\n"),
    })
}

/// One decoded Responses API event.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum OpenAiEvent {
    Delta(ContentDelta),
    /// `response.completed` or `response.incomplete`: the round is over.
    Completed,
}

pub(crate) fn events_from_frame(
    provider: &ProviderId,
    frame: &EventFrame,
) -> Result<Vec<OpenAiEvent>, ProviderError> {
    let data = frame.data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(data).map_err(|e| {
        ProviderError::protocol(provider.clone(), format!("unparseable event payload: {e}"))
    })?;
    events_from_json(provider, &value)
}

pub(crate) fn events_from_json(
    provider: &ProviderId,
    value: &Value,
) -> Result<Vec<OpenAiEvent>, ProviderError> {
    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
    let event = match kind {
        "response.output_text.delta" => value
            .get("delta")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(|text| OpenAiEvent::Delta(ContentDelta::TextChunk(text.to_string()))),
        "response.output_item.done" => {
            let item = value.get("item").unwrap_or(&Value::Null);
            if item.get("type").and_then(Value::as_str) != Some("function_call") {
                None
            } else {
                let call = function_call(item).ok_or_else(|| {
                    ProviderError::protocol(provider.clone(), "function_call item missing fields")
                })?;
                Some(OpenAiEvent::Delta(ContentDelta::ToolCallRequest(call)))
            }
        }
        "response.completed" | "response.incomplete" => Some(OpenAiEvent::Completed),
        "error" | "response.error" | "response.failed" => {
            return Err(ProviderError::provider(
                provider.clone(),
                failure_message(value),
                None,
            ));
        }
        _ => None,
    };
    Ok(event.into_iter().collect())
}

fn failure_message(value: &Value) -> String {
    ["/error/message", "/response/error/message", "/message"]
        .iter()
        .find_map(|pointer| value.pointer(pointer).and_then(Value::as_str))
        .unwrap_or("the model stream reported an error")
        .to_string()
}

fn function_call(item: &Value) -> Option<ToolCall> {
    let field = |key: &str| item.get(key).and_then(Value::as_str).map(ToOwned::to_owned);
    Some(ToolCall {
        call_id: field("call_id")?,
        name: field("name")?,
        arguments: field("arguments").unwrap_or_else(|| "{}".to_string()),
    })
}
