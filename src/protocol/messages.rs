//! CLI message types for the stream-json protocol.

use serde::{Deserialize, Serialize};

use super::content::{ContentBlock, ToolResultBlock, ToolUseBlock};
use super::control::{ControlCancelRequest, ControlRequestMessage, ControlResponseMessage};
use super::usage::Usage;

/// A message read from the Claude CLI's stdout.
///
/// The CLI outputs newline-delimited JSON messages of different types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CliMessage {
    /// System message; the `init` subtype opens every request.
    System(SystemMessage),
    /// Assistant response message.
    Assistant(AssistantMessage),
    /// User message (typically tool results).
    User(UserMessage),
    /// Final result message.
    Result(ResultMessage),
    /// The CLI asks the host for something (tool permission).
    ControlRequest(ControlRequestMessage),
    /// The CLI acknowledges a host control request.
    ControlResponse(ControlResponseMessage),
    /// The CLI withdraws an earlier control request.
    ControlCancelRequest(ControlCancelRequest),
    /// Message types this crate does not model.
    #[serde(other)]
    Unknown,
}

/// System message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub subtype: String,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    /// Resolved model name.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, rename = "permissionMode")]
    pub permission_mode: Option<String>,
    #[serde(default)]
    pub claude_code_version: Option<String>,
}

impl SystemMessage {
    /// Check if this is an init message.
    pub fn is_init(&self) -> bool {
        self.subtype == "init"
    }
}

/// Assistant response message containing model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub message: AssistantMessageContent,
    #[serde(default)]
    pub parent_tool_use_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Content of an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessageContent {
    #[serde(default)]
    pub id: String,
    /// Model that produced the message; `<synthetic>` for locally generated ones.
    #[serde(default)]
    pub model: String,
    #[serde(default = "assistant_role")]
    pub role: String,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

fn assistant_role() -> String {
    "assistant".to_string()
}

impl AssistantMessageContent {
    /// Get all text content concatenated.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| block.text())
            .collect::<Vec<_>>()
            .join("")
    }

    /// Get all tool use blocks.
    pub fn tool_uses(&self) -> Vec<&ToolUseBlock> {
        self.content
            .iter()
            .filter_map(|block| block.as_tool_use())
            .collect()
    }
}

/// User message (typically containing tool results).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub message: UserMessageContent,
    #[serde(default)]
    pub parent_tool_use_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Content of a user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessageContent {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

impl UserMessageContent {
    /// Get all tool result blocks.
    pub fn tool_results(&self) -> Vec<&ToolResultBlock> {
        self.content
            .iter()
            .filter_map(|block| block.as_tool_result())
            .collect()
    }
}

/// Final result message with summary statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    /// `success`, `error_max_turns`, `error_during_execution`, ...
    pub subtype: String,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub duration_api_ms: Option<u64>,
    #[serde(default)]
    pub num_turns: Option<u32>,
    #[serde(default)]
    pub result: Option<String>,
    /// Cumulative cost of the request.
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
    /// Cumulative usage of the request.
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ResultMessage {
    /// Check if this is a success result.
    pub fn is_success(&self) -> bool {
        self.subtype == "success" && !self.is_error
    }

    /// Check if this is an error result.
    pub fn is_error(&self) -> bool {
        self.is_error || self.subtype.starts_with("error")
    }

    /// Get the duration as a std::time::Duration.
    pub fn duration(&self) -> Option<std::time::Duration> {
        self.duration_ms.map(std::time::Duration::from_millis)
    }
}

impl CliMessage {
    /// Get the session ID if present.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            CliMessage::System(m) => m.session_id.as_deref(),
            CliMessage::Assistant(m) => m.session_id.as_deref(),
            CliMessage::User(m) => m.session_id.as_deref(),
            CliMessage::Result(m) => m.session_id.as_deref(),
            _ => None,
        }
    }

    /// Check if this is a result message.
    pub fn is_result(&self) -> bool {
        matches!(self, CliMessage::Result(_))
    }

    /// Check if this message belongs to the control protocol.
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            CliMessage::ControlRequest(_)
                | CliMessage::ControlResponse(_)
                | CliMessage::ControlCancelRequest(_)
        )
    }
}
