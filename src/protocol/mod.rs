//! JSON protocol types for Claude CLI communication.
//!
//! The CLI runs in bidirectional `stream-json` mode. It writes
//! newline-delimited [`CliMessage`]s to stdout and reads
//! [`OutboundMessage`]s from stdin.
//!
//! - [`SystemMessage`]: Initialization info (session ID, tools, model, cwd)
//! - [`AssistantMessage`]: Model responses with text and tool use
//! - [`UserMessage`]: Tool results returned to the model
//! - [`ResultMessage`]: Final summary with cost and usage
//! - [`ControlRequestMessage`]: Permission checks (`can_use_tool`)
//!
//! # Example
//!
//! ```
//! use claude_bridge::protocol::CliMessage;
//!
//! let json = r#"{"type": "assistant", "message": {"id": "msg_01", "model": "claude-sonnet-4-5", "role": "assistant", "content": [{"type": "text", "text": "Hello!"}]}}"#;
//! let msg: CliMessage = serde_json::from_str(json).unwrap();
//!
//! if let CliMessage::Assistant(assistant) = msg {
//!     assert_eq!(assistant.message.text(), "Hello!");
//! }
//! ```

mod content;
mod control;
mod messages;
mod usage;

pub use content::{
    ContentBlock, RedactedThinkingBlock, TextBlock, ThinkingBlock, ToolResultBlock,
    ToolResultContent, ToolUseBlock, WebSearchToolResultBlock,
};
pub use control::{
    Behavior, CanUseToolRequest, ControlCancelRequest, ControlRequest, ControlRequestMessage,
    ControlResponse, ControlResponseMessage, OutboundMessage, PermissionDecision, UserPrompt,
    UserPromptContent,
};
pub use messages::{
    AssistantMessage, AssistantMessageContent, CliMessage, ResultMessage, SystemMessage,
    UserMessage, UserMessageContent,
};
pub use usage::Usage;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CliMessage>();
        assert_send_sync::<OutboundMessage>();
        assert_send_sync::<ContentBlock>();
        assert_send_sync::<Usage>();
    }

    #[test]
    fn assistant_message_survives_reserialization() {
        let original = CliMessage::Assistant(AssistantMessage {
            message: AssistantMessageContent {
                id: "msg_test".into(),
                model: "claude-sonnet-4-5".into(),
                role: "assistant".into(),
                content: vec![ContentBlock::Text(TextBlock {
                    text: "Hello, world!".into(),
                })],
                stop_reason: Some("end_turn".into()),
                stop_sequence: None,
                usage: Some(Usage {
                    input_tokens: 100,
                    output_tokens: 50,
                    ..Default::default()
                }),
            },
            parent_tool_use_id: None,
            session_id: Some("session-123".into()),
        });

        let json = serde_json::to_string(&original).unwrap();
        let parsed: CliMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(original, parsed);
    }
}
