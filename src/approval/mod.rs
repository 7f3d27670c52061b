//! Tool-use approval handshake.
//!
//! Every tool the agent wants to run is gated by an approval. Unless the tool
//! is on the auto-approve list, an [`ApprovalRequest`] is delivered on the
//! stream that triggered it and the tool stays blocked until the caller
//! answers with an [`ApprovalResponse`] carrying the same request id.

mod coordinator;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use coordinator::{ApprovalCoordinator, ApprovalPolicy, PendingDecision, ToolCall};

use crate::protocol::PermissionDecision;
use crate::stream::StreamId;

/// The decision handed back to the agent.
pub type ApprovalResult = PermissionDecision;

/// Deny message used when the caller rejects without giving a reason.
pub const DEFAULT_DENY_MESSAGE: &str = "The user denied this tool use";

/// Correlation id of one approval handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh id.
    pub fn generate() -> Self {
        RequestId(uuid::Uuid::new_v4().to_string())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId(s.to_string())
    }
}

/// Asks the caller whether a tool may run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub request_id: RequestId,
    pub stream_id: StreamId,
    pub tool_name: String,
    pub tool_input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
}

/// The caller's answer to an [`ApprovalRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResponse {
    pub request_id: RequestId,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Replacement for the tool input; the original input is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_input: Option<Value>,
}

impl ApprovalResponse {
    /// Approve with the original input.
    pub fn allow(request_id: impl Into<RequestId>) -> Self {
        Self {
            request_id: request_id.into(),
            approved: true,
            message: None,
            updated_input: None,
        }
    }

    /// Approve with a modified input.
    pub fn allow_with_input(request_id: impl Into<RequestId>, input: Value) -> Self {
        Self {
            updated_input: Some(input),
            ..Self::allow(request_id)
        }
    }

    /// Reject, telling the agent why.
    pub fn deny(request_id: impl Into<RequestId>, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            approved: false,
            message: Some(message.into()),
            updated_input: None,
        }
    }

    /// Turn the answer into the decision the agent expects.
    ///
    /// An allow always carries an input object: the replacement if one was
    /// given, else `original_input`, else `{}`.
    pub fn into_decision(self, original_input: &Value) -> ApprovalResult {
        if self.approved {
            let input = self
                .updated_input
                .filter(|v| !v.is_null())
                .unwrap_or_else(|| non_null_input(original_input));
            PermissionDecision::allow(input)
        } else {
            PermissionDecision::deny(
                self.message
                    .unwrap_or_else(|| DEFAULT_DENY_MESSAGE.to_string()),
            )
        }
    }
}

/// The input to echo back on allow; `null` becomes an empty object.
pub(crate) fn non_null_input(input: &Value) -> Value {
    if input.is_null() {
        Value::Object(Default::default())
    } else {
        input.clone()
    }
}
