//! Test utilities for claude-bridge integration tests.
//!
//! [`ScriptedLauncher`] stands in for the Claude CLI: each launch plays one
//! script of [`Step`]s, and everything the bridge writes back is recorded.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use claude_bridge::backend::filter::SYNTHETIC_MODEL;
use claude_bridge::process::{MessageReader, MessageWriter, SpawnOptions};
use claude_bridge::protocol::{
    AssistantMessage, AssistantMessageContent, CanUseToolRequest, CliMessage, ContentBlock,
    ControlCancelRequest, ControlRequest, ControlRequestMessage, ControlResponse,
    OutboundMessage, PermissionDecision, ResultMessage, SystemMessage, TextBlock,
    ToolResultBlock, ToolResultContent, ToolUseBlock, Usage, UserMessage, UserMessageContent,
};
use claude_bridge::{AgentLauncher, AgentSession, BridgeClient, BridgeClientBuilder, Error, Result};

/// One thing the scripted agent does.
pub enum Step {
    /// Write a message to stdout.
    Emit(CliMessage),
    /// Block until the host answers the control request with this id.
    AwaitResponse(String),
    /// Fail the read.
    Fail(Error),
    /// Never produce anything again.
    Hang,
}

/// A scripted agent run.
pub struct Script {
    steps: Vec<Step>,
    session_id: String,
}

impl Script {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            session_id: "test-session-123".to_string(),
        }
    }

    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = id.into();
        self
    }

    pub fn emit(mut self, message: CliMessage) -> Self {
        self.steps.push(Step::Emit(message));
        self
    }

    pub fn system_init(self) -> Self {
        let message = system_init(&self.session_id);
        self.emit(message)
    }

    pub fn text(self, text: &str) -> Self {
        let message = assistant_text(&self.session_id, text);
        self.emit(message)
    }

    pub fn tool_use(self, id: &str, name: &str, input: Value) -> Self {
        let message = assistant_tool_use(&self.session_id, id, name, input);
        self.emit(message)
    }

    pub fn tool_result(self, tool_use_id: &str, content: &str) -> Self {
        let message = tool_result(&self.session_id, tool_use_id, content);
        self.emit(message)
    }

    /// Ask permission for a tool and wait for the decision.
    pub fn permission(self, request_id: &str, tool_name: &str, input: Value) -> Self {
        let mut script = self.emit(can_use_tool(request_id, tool_name, input));
        script.steps.push(Step::AwaitResponse(request_id.to_string()));
        script
    }

    /// Ask permission for a tool without waiting.
    pub fn ask(self, request_id: &str, tool_name: &str, input: Value) -> Self {
        self.emit(can_use_tool(request_id, tool_name, input))
    }

    pub fn withdraw(self, request_id: &str) -> Self {
        self.emit(CliMessage::ControlCancelRequest(ControlCancelRequest {
            request_id: request_id.to_string(),
        }))
    }

    pub fn success(self, text: &str, cost_usd: f64) -> Self {
        let message = success_result(&self.session_id, text, cost_usd);
        self.emit(message)
    }

    pub fn fail(mut self, error: Error) -> Self {
        self.steps.push(Step::Fail(error));
        self
    }

    pub fn hang(mut self) -> Self {
        self.steps.push(Step::Hang);
        self
    }
}

/// Launches scripted agents, one script per launch.
#[derive(Default)]
pub struct ScriptedLauncher {
    scripts: Mutex<VecDeque<Script>>,
    launches: Mutex<Vec<SpawnOptions>>,
    written: Arc<Mutex<Vec<OutboundMessage>>>,
    closed: Arc<Mutex<usize>>,
}

impl ScriptedLauncher {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            ..Default::default()
        })
    }

    /// Options of every launch so far.
    pub fn launches(&self) -> Vec<SpawnOptions> {
        self.launches.lock().unwrap().clone()
    }

    /// Everything written to any agent, in order.
    pub fn written(&self) -> Vec<OutboundMessage> {
        self.written.lock().unwrap().clone()
    }

    /// How many agents had their input closed.
    pub fn closed(&self) -> usize {
        *self.closed.lock().unwrap()
    }

    /// The decision sent for a `can_use_tool` request.
    pub fn decision(&self, request_id: &str) -> Option<PermissionDecision> {
        self.written().into_iter().find_map(|message| match message {
            OutboundMessage::ControlResponse(r) => match r.response {
                ControlResponse::Success {
                    request_id: id,
                    response: Some(body),
                } if id == request_id => serde_json::from_value(body).ok(),
                _ => None,
            },
            _ => None,
        })
    }

    pub fn saw_interrupt(&self) -> bool {
        self.written().iter().any(|message| {
            matches!(
                message,
                OutboundMessage::ControlRequest(ControlRequestMessage {
                    request: ControlRequest::Interrupt,
                    ..
                })
            )
        })
    }
}

#[async_trait]
impl AgentLauncher for ScriptedLauncher {
    async fn launch(&self, options: &SpawnOptions) -> Result<AgentSession> {
        self.launches.lock().unwrap().push(options.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::CliError {
                message: "no script left".into(),
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = ScriptedReader {
            steps: script.steps.into(),
            inbox: rx,
        };
        let writer = RecordingWriter {
            inbox: tx,
            written: Arc::clone(&self.written),
            closed: Arc::clone(&self.closed),
        };
        Ok(AgentSession::new(Box::new(reader), Box::new(writer)))
    }
}

struct ScriptedReader {
    steps: VecDeque<Step>,
    inbox: mpsc::UnboundedReceiver<OutboundMessage>,
}

#[async_trait]
impl MessageReader for ScriptedReader {
    async fn read_message(&mut self) -> Result<Option<CliMessage>> {
        loop {
            match self.steps.pop_front() {
                None => return Ok(None),
                Some(Step::Emit(message)) => return Ok(Some(message)),
                Some(Step::Fail(error)) => return Err(error),
                Some(Step::Hang) => {
                    self.steps.push_front(Step::Hang);
                    futures::future::pending::<()>().await;
                }
                Some(Step::AwaitResponse(request_id)) => loop {
                    match self.inbox.recv().await {
                        Some(OutboundMessage::ControlResponse(r))
                            if r.response.request_id() == request_id =>
                        {
                            break
                        }
                        Some(_) => continue,
                        None => return Ok(None),
                    }
                },
            }
        }
    }
}

struct RecordingWriter {
    inbox: mpsc::UnboundedSender<OutboundMessage>,
    written: Arc<Mutex<Vec<OutboundMessage>>>,
    closed: Arc<Mutex<usize>>,
}

#[async_trait]
impl MessageWriter for RecordingWriter {
    async fn write_message(&mut self, message: &OutboundMessage) -> Result<()> {
        self.written.lock().unwrap().push(message.clone());
        let _ = self.inbox.send(message.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        *self.closed.lock().unwrap() += 1;
        Ok(())
    }
}

/// A client builder wired to `launcher`.
pub fn client_builder(launcher: Arc<ScriptedLauncher>) -> BridgeClientBuilder {
    BridgeClient::builder().launcher(launcher)
}

pub fn client(launcher: Arc<ScriptedLauncher>) -> BridgeClient {
    client_builder(launcher).build().unwrap()
}

// -----------------------------------------------------------------------------
// Message constructors
// -----------------------------------------------------------------------------

pub fn usage(input: u64, output: u64) -> Usage {
    Usage {
        input_tokens: input,
        output_tokens: output,
        ..Default::default()
    }
}

pub fn system_init(session_id: &str) -> CliMessage {
    CliMessage::System(SystemMessage {
        subtype: "init".to_string(),
        cwd: Some("/tmp".to_string()),
        session_id: Some(session_id.to_string()),
        tools: vec!["Read".to_string(), "Write".to_string(), "Bash".to_string()],
        model: Some("claude-sonnet-4-5".to_string()),
        permission_mode: Some("default".to_string()),
        claude_code_version: Some("2.0.0".to_string()),
    })
}

fn assistant(session_id: &str, model: &str, content: Vec<ContentBlock>, usage: Option<Usage>) -> CliMessage {
    CliMessage::Assistant(AssistantMessage {
        message: AssistantMessageContent {
            id: "msg_01".to_string(),
            model: model.to_string(),
            role: "assistant".to_string(),
            content,
            stop_reason: None,
            stop_sequence: None,
            usage,
        },
        parent_tool_use_id: None,
        session_id: Some(session_id.to_string()),
    })
}

pub fn assistant_text(session_id: &str, text: &str) -> CliMessage {
    assistant(
        session_id,
        "claude-sonnet-4-5",
        vec![ContentBlock::Text(TextBlock {
            text: text.to_string(),
        })],
        Some(usage(10, 5)),
    )
}

pub fn assistant_tool_use(session_id: &str, id: &str, name: &str, input: Value) -> CliMessage {
    assistant(
        session_id,
        "claude-sonnet-4-5",
        vec![ContentBlock::ToolUse(ToolUseBlock {
            id: id.to_string(),
            name: name.to_string(),
            input,
        })],
        Some(usage(10, 5)),
    )
}

pub fn tool_result(session_id: &str, tool_use_id: &str, content: &str) -> CliMessage {
    CliMessage::User(UserMessage {
        message: UserMessageContent {
            role: "user".to_string(),
            content: vec![ContentBlock::ToolResult(ToolResultBlock {
                tool_use_id: tool_use_id.to_string(),
                content: ToolResultContent::Text(content.to_string()),
                is_error: false,
            })],
        },
        parent_tool_use_id: None,
        session_id: Some(session_id.to_string()),
    })
}

pub fn can_use_tool(request_id: &str, tool_name: &str, input: Value) -> CliMessage {
    CliMessage::ControlRequest(ControlRequestMessage {
        request_id: request_id.to_string(),
        request: ControlRequest::CanUseTool(CanUseToolRequest {
            tool_name: tool_name.to_string(),
            input,
            tool_use_id: Some(format!("toolu_{request_id}")),
            permission_suggestions: None,
        }),
    })
}

pub fn success_result(session_id: &str, text: &str, cost_usd: f64) -> CliMessage {
    CliMessage::Result(ResultMessage {
        subtype: "success".to_string(),
        is_error: false,
        duration_ms: Some(1200),
        duration_api_ms: Some(900),
        num_turns: Some(1),
        result: Some(text.to_string()),
        total_cost_usd: Some(cost_usd),
        usage: Some(usage(100, 50)),
        session_id: Some(session_id.to_string()),
    })
}

pub const AUTH_NOTICE: &str = "Invalid API key · Please run /login";

/// The assistant message the CLI fabricates when it has no credentials.
pub fn synthetic_auth_assistant(session_id: &str) -> CliMessage {
    assistant(
        session_id,
        SYNTHETIC_MODEL,
        vec![ContentBlock::Text(TextBlock {
            text: AUTH_NOTICE.to_string(),
        })],
        Some(Usage::default()),
    )
}

/// The error result that follows it.
pub fn synthetic_auth_result(session_id: &str) -> CliMessage {
    CliMessage::Result(ResultMessage {
        subtype: "success".to_string(),
        is_error: true,
        duration_ms: Some(10),
        duration_api_ms: Some(0),
        num_turns: Some(1),
        result: Some(AUTH_NOTICE.to_string()),
        total_cost_usd: Some(0.0),
        usage: Some(Usage::default()),
        session_id: Some(session_id.to_string()),
    })
}

/// Real model output that happens to quote the notice.
pub fn assistant_quoting_auth_notice(session_id: &str) -> CliMessage {
    assistant_text(
        session_id,
        "If you see \"Invalid API key\", run /login in the CLI.",
    )
}
