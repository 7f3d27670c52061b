//! Control protocol carried alongside regular messages in stream-json mode.
//!
//! When the CLI runs with `--permission-prompt-tool stdio` it asks the host for
//! a decision before every tool use by writing a `control_request` with
//! subtype `can_use_tool` to stdout. The host answers with a
//! `control_response` on stdin. The host can also send its own control
//! requests, e.g. `interrupt`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A control request, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlRequestMessage {
    /// Correlation id echoed by the matching response.
    pub request_id: String,
    pub request: ControlRequest,
}

/// The body of a control request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ControlRequest {
    /// CLI asks whether a tool may run.
    CanUseTool(CanUseToolRequest),
    /// Host asks the CLI to stop the current turn.
    Interrupt,
    /// Subtypes this crate does not handle (hook callbacks, MCP routing, ...).
    #[serde(other)]
    Unsupported,
}

/// Permission check for a single tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanUseToolRequest {
    pub tool_name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_suggestions: Option<Value>,
}

/// Wrapper for a control response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponseMessage {
    pub response: ControlResponse,
}

/// The body of a control response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ControlResponse {
    Success {
        request_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response: Option<Value>,
    },
    Error {
        request_id: String,
        error: String,
    },
}

impl ControlResponse {
    /// The id of the request being answered.
    pub fn request_id(&self) -> &str {
        match self {
            ControlResponse::Success { request_id, .. } | ControlResponse::Error { request_id, .. } => {
                request_id
            }
        }
    }
}

/// The CLI withdrew a control request it sent earlier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlCancelRequest {
    pub request_id: String,
}

/// Allow or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    Allow,
    Deny,
}

/// Answer to a `can_use_tool` request, in the shape the CLI expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionDecision {
    pub behavior: Behavior,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Required by the CLI on `allow`; it rejects a missing input object.
    #[serde(
        default,
        rename = "updatedInput",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_input: Option<Value>,
}

impl PermissionDecision {
    /// Allow the tool to run with the given input.
    pub fn allow(input: Value) -> Self {
        Self {
            behavior: Behavior::Allow,
            message: None,
            updated_input: Some(input),
        }
    }

    /// Deny the tool use, telling the model why.
    pub fn deny(message: impl Into<String>) -> Self {
        Self {
            behavior: Behavior::Deny,
            message: Some(message.into()),
            updated_input: None,
        }
    }

    /// Check whether this decision lets the tool run.
    pub fn is_allow(&self) -> bool {
        self.behavior == Behavior::Allow
    }
}

/// A prompt written to the CLI's stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPrompt {
    pub message: UserPromptContent,
    pub parent_tool_use_id: Option<String>,
    #[serde(default)]
    pub session_id: String,
}

/// Message body of a [`UserPrompt`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPromptContent {
    pub role: String,
    pub content: String,
}

impl UserPrompt {
    /// Create a top-level user prompt.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            message: UserPromptContent {
                role: "user".to_string(),
                content: text.into(),
            },
            parent_tool_use_id: None,
            session_id: String::new(),
        }
    }
}

/// A line the host writes to the CLI's stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    User(UserPrompt),
    ControlRequest(ControlRequestMessage),
    ControlResponse(ControlResponseMessage),
}

impl OutboundMessage {
    /// Answer a `can_use_tool` request.
    pub fn permission(request_id: impl Into<String>, decision: &PermissionDecision) -> Self {
        OutboundMessage::ControlResponse(ControlResponseMessage {
            response: ControlResponse::Success {
                request_id: request_id.into(),
                response: serde_json::to_value(decision).ok(),
            },
        })
    }

    /// Reject a control request the host cannot serve.
    pub fn control_error(request_id: impl Into<String>, error: impl Into<String>) -> Self {
        OutboundMessage::ControlResponse(ControlResponseMessage {
            response: ControlResponse::Error {
                request_id: request_id.into(),
                error: error.into(),
            },
        })
    }

    /// Ask the CLI to stop the current turn.
    pub fn interrupt(request_id: impl Into<String>) -> Self {
        OutboundMessage::ControlRequest(ControlRequestMessage {
            request_id: request_id.into(),
            request: ControlRequest::Interrupt,
        })
    }
}
