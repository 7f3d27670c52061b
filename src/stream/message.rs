//! Messages delivered on a stream.
//!
//! [`BridgeMessage`] carries the agent's own messages unchanged plus the two
//! approval handshake messages, which use hyphenated tags so consumers can
//! tell them apart from agent output before generic dispatch.

use serde::{Deserialize, Serialize};

use crate::approval::{ApprovalRequest, ApprovalResponse};
use crate::config::SessionId;
use crate::protocol::{AssistantMessage, CliMessage, ResultMessage, SystemMessage, UserMessage};

/// Session metadata from the `system`/`init` message.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    /// Session identifier, if the CLI reported one.
    pub session_id: Option<SessionId>,
    /// Working directory of the agent.
    pub cwd: Option<String>,
    /// Available tools.
    pub tools: Vec<String>,
    /// Resolved model name.
    pub model: Option<String>,
    /// Permission mode.
    pub permission_mode: Option<String>,
    /// Claude Code version.
    pub claude_code_version: Option<String>,
}

impl From<&SystemMessage> for SessionInfo {
    fn from(system: &SystemMessage) -> Self {
        SessionInfo {
            session_id: system.session_id.clone().map(SessionId::from),
            cwd: system.cwd.clone(),
            tools: system.tools.clone(),
            model: system.model.clone(),
            permission_mode: system.permission_mode.clone(),
            claude_code_version: system.claude_code_version.clone(),
        }
    }
}

/// A message on a stream.
///
/// # Message Order
///
/// 1. `system` (`init`) - first message of a request
/// 2. `assistant` / `user` - model output and tool results, interleaved
/// 3. `tool-approval-request` / `tool-approval-response` - whenever a tool
///    needs approval; the request always precedes the tool's result
/// 4. `result` - last substantive message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    System(SystemMessage),
    Assistant(AssistantMessage),
    User(UserMessage),
    Result(ResultMessage),
    #[serde(rename = "tool-approval-request")]
    ToolApprovalRequest(ApprovalRequest),
    #[serde(rename = "tool-approval-response")]
    ToolApprovalResponse(ApprovalResponse),
}

impl BridgeMessage {
    /// Convert an agent message. Control traffic and unknown types yield `None`.
    pub fn from_cli(message: CliMessage) -> Option<Self> {
        match message {
            CliMessage::System(m) => Some(BridgeMessage::System(m)),
            CliMessage::Assistant(m) => Some(BridgeMessage::Assistant(m)),
            CliMessage::User(m) => Some(BridgeMessage::User(m)),
            CliMessage::Result(m) => Some(BridgeMessage::Result(m)),
            CliMessage::ControlRequest(_)
            | CliMessage::ControlResponse(_)
            | CliMessage::ControlCancelRequest(_)
            | CliMessage::Unknown => None,
        }
    }

    /// Check if this is one of the approval handshake messages.
    pub fn is_approval(&self) -> bool {
        matches!(
            self,
            BridgeMessage::ToolApprovalRequest(_) | BridgeMessage::ToolApprovalResponse(_)
        )
    }

    /// Get the approval request if this is one.
    pub fn as_approval_request(&self) -> Option<&ApprovalRequest> {
        match self {
            BridgeMessage::ToolApprovalRequest(r) => Some(r),
            _ => None,
        }
    }

    /// Session metadata if this is the `init` message.
    pub fn session_info(&self) -> Option<SessionInfo> {
        match self {
            BridgeMessage::System(s) if s.is_init() => Some(SessionInfo::from(s)),
            _ => None,
        }
    }

    /// Session id carried by an agent message.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            BridgeMessage::System(m) => m.session_id.as_deref(),
            BridgeMessage::Assistant(m) => m.session_id.as_deref(),
            BridgeMessage::User(m) => m.session_id.as_deref(),
            BridgeMessage::Result(m) => m.session_id.as_deref(),
            _ => None,
        }
    }

    /// Check if this is the final result message.
    pub fn is_result(&self) -> bool {
        matches!(self, BridgeMessage::Result(_))
    }
}
