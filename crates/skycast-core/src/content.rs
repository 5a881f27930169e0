use crate::errors::QueryError;

/// Atomic unit of the outward stream: one Unicode scalar value.
pub type CharacterUnit = char;

/// Maximum query length, counted in Unicode scalars.
pub const MAX_QUERY_CHARS: usize = 2000;

/// A validated user query.
///
/// Immutable once constructed; the text is kept exactly as submitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    /// Validates raw query text.
    pub fn parse(text: impl Into<String>) -> Result<Self, QueryError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QueryError::Blank);
        }
        let chars = text.chars().count();
        if chars > MAX_QUERY_CHARS {
            return Err(QueryError::TooLong {
                chars,
                max: MAX_QUERY_CHARS,
            });
        }
        Ok(Self(text))
    }

    /// Returns the query text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the query length in Unicode scalars.
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }
}

/// A function call requested by the model backend.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolCall {
    /// Backend-assigned id used to correlate the result.
    pub call_id: String,
    /// Declared function name (for example `get_weather`).
    pub name: String,
    /// Raw JSON argument text exactly as the backend produced it.
    pub arguments: String,
}

/// One incremental unit of model output, or a tool result folded back in.
#[derive(Clone, Debug, PartialEq)]
pub enum ContentDelta {
    /// Visible answer text.
    TextChunk(String),
    /// The backend wants a tool invoked before it continues.
    ToolCallRequest(ToolCall),
    /// Textual result of a tool call.
    ToolCallResult {
        call_id: String,
        name: String,
        text: String,
    },
}

/// Context submitted to the backend on each generation round.
#[derive(Clone, Debug, PartialEq)]
pub enum ConversationItem {
    /// The user's query.
    UserText(String),
    /// Answer text already shown to the user in an earlier round.
    AssistantText(String),
    /// A call previously requested by the backend, echoed back verbatim.
    ToolCall(ToolCall),
    /// The textual output for a previously requested call.
    ToolOutput { call_id: String, output: String },
}
