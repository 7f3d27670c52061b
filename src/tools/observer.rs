//! Tool observer trait and implementations.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::config::tools;
use crate::protocol::{AssistantMessage, UserMessage};
use crate::stream::StreamId;

/// Error type observers may return. It is logged, never propagated.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// A tool call proposed by the agent.
#[derive(Debug, Clone, Copy)]
pub struct ToolUse<'a> {
    /// Unique identifier for this tool use (e.g., "toolu_01234").
    pub id: &'a str,
    /// Name of the tool being invoked (e.g., "Edit", "Bash").
    pub name: &'a str,
    /// Input parameters as JSON object.
    pub input: &'a Value,
}

/// The result of a tool call, as reported back to the model.
#[derive(Debug, Clone, Copy)]
pub struct ToolOutcome<'a> {
    /// ID of the tool_use this result corresponds to.
    pub tool_use_id: &'a str,
    /// Name of the tool, when its tool_use was seen on the same stream.
    pub tool_name: Option<&'a str>,
    /// The result content as text.
    pub content: &'a str,
    /// Whether the tool execution resulted in an error.
    pub is_error: bool,
}

/// Observer for tool execution on a stream.
///
/// This is where downstream side effects hang off the message flow, e.g.
/// tracking the files an `Edit` touched. Whatever an observer does, a failure
/// is logged at `warn` and the stream carries on.
///
/// # Implementation Notes
///
/// - Observers are called inline by the backend; keep them fast.
/// - Methods have default no-op implementations for selective observation.
///
/// # Example
///
/// ```ignore
/// use claude_bridge::config::tools;
/// use claude_bridge::tools::{ObserverError, ToolObserver, ToolOutcome};
/// use claude_bridge::StreamId;
///
/// struct EditTracker;
///
/// impl ToolObserver for EditTracker {
///     fn on_tool_result(&self, _stream: &StreamId, outcome: &ToolOutcome<'_>) -> Result<(), ObserverError> {
///         if outcome.tool_name.is_some_and(tools::is_file_mutating) && !outcome.is_error {
///             record_edit(outcome.tool_use_id)?;
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait ToolObserver: Send + Sync {
    /// Called for each tool_use block in an assistant message.
    fn on_tool_use(&self, stream_id: &StreamId, tool: &ToolUse<'_>) -> Result<(), ObserverError> {
        let _ = (stream_id, tool);
        Ok(())
    }

    /// Called for each tool_result block in a user message.
    fn on_tool_result(
        &self,
        stream_id: &StreamId,
        outcome: &ToolOutcome<'_>,
    ) -> Result<(), ObserverError> {
        let _ = (stream_id, outcome);
        Ok(())
    }
}

/// Feeds one stream's messages to an observer.
///
/// Remembers tool names by tool_use id so results can be attributed.
pub(crate) struct ObserverDispatch {
    observer: Arc<dyn ToolObserver>,
    stream_id: StreamId,
    tool_names: HashMap<String, String>,
}

impl ObserverDispatch {
    pub(crate) fn new(observer: Arc<dyn ToolObserver>, stream_id: StreamId) -> Self {
        Self {
            observer,
            stream_id,
            tool_names: HashMap::new(),
        }
    }

    pub(crate) fn assistant(&mut self, message: &AssistantMessage) {
        for tool_use in message.message.tool_uses() {
            self.tool_names
                .insert(tool_use.id.clone(), tool_use.name.clone());
            let tool = ToolUse {
                id: &tool_use.id,
                name: &tool_use.name,
                input: &tool_use.input,
            };
            if let Err(e) = self.observer.on_tool_use(&self.stream_id, &tool) {
                tracing::warn!(
                    stream_id = %self.stream_id,
                    tool_name = %tool_use.name,
                    error = %e,
                    "tool observer failed on tool_use"
                );
            }
        }
    }

    pub(crate) fn user(&mut self, message: &UserMessage) {
        for result in message.message.tool_results() {
            let content = result.content.as_text();
            let tool_name = self.tool_names.remove(&result.tool_use_id);
            let outcome = ToolOutcome {
                tool_use_id: &result.tool_use_id,
                tool_name: tool_name.as_deref(),
                content: &content,
                is_error: result.is_error,
            };
            if let Err(e) = self.observer.on_tool_result(&self.stream_id, &outcome) {
                let file_change = tool_name.as_deref().is_some_and(tools::is_file_mutating);
                tracing::warn!(
                    stream_id = %self.stream_id,
                    tool_use_id = %result.tool_use_id,
                    tool_name = ?tool_name,
                    file_change,
                    error = %e,
                    "tool observer failed on tool_result"
                );
            }
        }
    }
}

/// Simple logging observer that logs tool events using tracing.
#[derive(Debug, Clone, Default)]
pub struct LoggingObserver {
    level: LogLevel,
}

/// Log level for LoggingObserver.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogLevel {
    /// Log at trace level.
    Trace,
    /// Log at debug level (default).
    #[default]
    Debug,
    /// Log at info level.
    Info,
}

const MAX_LOGGED_CHARS: usize = 200;

impl LoggingObserver {
    /// Create a new logging observer with debug level.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logging observer with a specific level.
    pub fn with_level(level: LogLevel) -> Self {
        Self { level }
    }
}

fn truncate_for_log(content: &str) -> String {
    match content.char_indices().nth(MAX_LOGGED_CHARS) {
        Some((cut, _)) => format!("{}... ({} bytes total)", &content[..cut], content.len()),
        None => content.to_string(),
    }
}

impl ToolObserver for LoggingObserver {
    fn on_tool_use(&self, stream_id: &StreamId, tool: &ToolUse<'_>) -> Result<(), ObserverError> {
        let (id, name, input) = (tool.id, tool.name, tool.input);
        match self.level {
            LogLevel::Trace => {
                tracing::trace!(%stream_id, tool_id = %id, tool_name = %name, ?input, "tool_use");
            }
            LogLevel::Debug => {
                tracing::debug!(%stream_id, tool_id = %id, tool_name = %name, ?input, "tool_use");
            }
            LogLevel::Info => {
                tracing::info!(%stream_id, tool_id = %id, tool_name = %name, ?input, "tool_use");
            }
        }
        Ok(())
    }

    fn on_tool_result(
        &self,
        stream_id: &StreamId,
        outcome: &ToolOutcome<'_>,
    ) -> Result<(), ObserverError> {
        let content = truncate_for_log(outcome.content);
        let (tool_use_id, tool_name, is_error) =
            (outcome.tool_use_id, outcome.tool_name, outcome.is_error);

        match self.level {
            LogLevel::Trace => {
                tracing::trace!(%stream_id, %tool_use_id, ?tool_name, is_error, %content, "tool_result");
            }
            LogLevel::Debug => {
                tracing::debug!(%stream_id, %tool_use_id, ?tool_name, is_error, %content, "tool_result");
            }
            LogLevel::Info => {
                tracing::info!(%stream_id, %tool_use_id, ?tool_name, is_error, %content, "tool_result");
            }
        }
        Ok(())
    }
}
