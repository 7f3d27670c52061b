//! Content block types carried by assistant and user messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A content block within a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text content.
    Text(TextBlock),
    /// A client-side tool use request from the assistant.
    ToolUse(ToolUseBlock),
    /// A tool executed on the API side (e.g. web search).
    ServerToolUse(ToolUseBlock),
    /// A tool result returned to the assistant.
    ToolResult(ToolResultBlock),
    /// Extended thinking.
    Thinking(ThinkingBlock),
    /// Thinking the API chose not to reveal.
    RedactedThinking(RedactedThinkingBlock),
    /// Results of a server-side web search.
    WebSearchToolResult(WebSearchToolResultBlock),
    /// Any block type this crate does not model.
    #[serde(other)]
    Unknown,
}

/// Plain text content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
}

/// A tool use request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    /// Unique identifier for this tool use.
    pub id: String,
    /// Name of the tool being invoked.
    pub name: String,
    /// Input parameters as JSON object.
    pub input: Value,
}

/// A tool result returned to the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    /// ID of the tool_use this result corresponds to.
    pub tool_use_id: String,
    #[serde(default)]
    pub content: ToolResultContent,
    #[serde(default)]
    pub is_error: bool,
}

/// Content of a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    /// Simple string result.
    Text(String),
    /// Structured result with multiple content blocks.
    Blocks(Vec<Value>),
}

impl Default for ToolResultContent {
    fn default() -> Self {
        ToolResultContent::Text(String::new())
    }
}

impl ToolResultContent {
    /// Get the content as a string (concatenates text blocks if structured).
    pub fn as_text(&self) -> String {
        match self {
            ToolResultContent::Text(s) => s.clone(),
            ToolResultContent::Blocks(blocks) => blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Thinking block for extended thinking feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingBlock {
    pub thinking: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Redacted thinking; only the opaque payload is available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactedThinkingBlock {
    pub data: String,
}

/// Web search results produced by a `server_tool_use`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchToolResultBlock {
    pub tool_use_id: String,
    #[serde(default)]
    pub content: Value,
}

impl ContentBlock {
    /// Check if this is a text block.
    pub fn is_text(&self) -> bool {
        matches!(self, ContentBlock::Text(_))
    }

    /// Get as tool use block, client or server side.
    pub fn as_tool_use(&self) -> Option<&ToolUseBlock> {
        match self {
            ContentBlock::ToolUse(t) | ContentBlock::ServerToolUse(t) => Some(t),
            _ => None,
        }
    }

    /// Get as tool result block if applicable.
    pub fn as_tool_result(&self) -> Option<&ToolResultBlock> {
        match self {
            ContentBlock::ToolResult(t) => Some(t),
            _ => None,
        }
    }

    /// Extract the text content if this is a text block.
    pub fn text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text(t) => Some(t.text.as_str()),
            _ => None,
        }
    }
}
