//! Tools the model may call mid-generation.
//!
//! Every tool resolves to text. Failures are rendered as sentences so the
//! orchestrator can fold any result back into context the same way.

mod weather;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::content::{ContentDelta, ToolCall};
use crate::model::ToolDeclaration;

pub use weather::{WeatherArgs, WeatherConfig, WeatherTool};

/// A callable function advertised to the model backend.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Declaration sent to the backend with every prompt.
    fn declaration(&self) -> ToolDeclaration;

    /// Runs the tool with raw JSON arguments. Never fails; errors become text.
    async fn invoke(&self, arguments: &str) -> String;
}

/// Registered tools keyed by function name.
#[derive(Clone, Default)]
pub struct ToolBox {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolBox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool under its declared name, replacing any previous one.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        let name = tool.declaration().name;
        self.tools.insert(name, tool);
        self
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.values().map(|tool| tool.declaration()).collect()
    }

    /// Resolves a call to a [`ContentDelta::ToolCallResult`] carrying its text.
    pub async fn dispatch(&self, call: &ToolCall) -> ContentDelta {
        let text = match self.tools.get(&call.name) {
            Some(tool) => {
                debug!(tool = %call.name, call_id = %call.call_id, "invoking tool");
                tool.invoke(&call.arguments).await
            }
            None => {
                warn!(tool = %call.name, call_id = %call.call_id, "model requested an unknown tool");
                format!(
                    "The tool \"{}\" is not available, so that information could not be looked up.",
                    call.name
                )
            }
        };
        ContentDelta::ToolCallResult {
            call_id: call.call_id.clone(),
            name: call.name.clone(),
            text,
        }
    }
}
