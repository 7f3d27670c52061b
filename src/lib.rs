//! # claude-bridge
//!
//! Streaming request/response bridge to the Claude Code CLI.
//!
//! Every request gets its own ordered stream of messages. Tool uses the agent
//! proposes are gated by an approval handshake delivered on that same stream:
//! - Streams are registered before the agent starts and carry exactly one
//!   terminal event
//! - Tool approvals are correlated by request id and can be auto-approved
//! - The CLI's synthetic "Invalid API key" output becomes a typed error
//! - Requests can be cancelled through a cancellation token
//!
//! ## Quick Start
//!
//! ```ignore
//! use claude_bridge::{BridgeClient, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = BridgeClient::builder()
//!         .auto_approve_tools(["Read", "Grep", "Glob"])
//!         .build()?;
//!     let response = client.send_and_collect("Summarize src/lib.rs").await?;
//!     println!("{}", response);
//!     Ok(())
//! }
//! ```
//!
//! ## Streaming with approvals
//!
//! ```ignore
//! use futures::StreamExt;
//! use claude_bridge::{ApprovalResponse, BridgeClient, BridgeMessage};
//!
//! let id = client.send("Rename foo to bar")?;
//! let mut stream = client.consume(&id)?;
//! while let Some(message) = stream.next().await {
//!     match message? {
//!         BridgeMessage::ToolApprovalRequest(req) if req.tool_name == "Bash" => {
//!             client.respond_to_approval(ApprovalResponse::deny(req.request_id, "no shell"));
//!         }
//!         BridgeMessage::ToolApprovalRequest(req) => {
//!             client.respond_to_approval(ApprovalResponse::allow(req.request_id));
//!         }
//!         _ => {}
//!     }
//! }
//! ```
//!
//! ## Multi-turn Sessions
//!
//! ```ignore
//! let session = client.start_session();
//! session.send_and_collect("My name is Alice").await?;
//! let response = session.send_and_collect("What's my name?").await?;
//! ```

pub mod approval;
pub mod backend;
mod client;
pub mod config;
mod error;
pub mod process;
pub mod protocol;
mod session;
pub mod stream;
pub mod tools;

pub use error::{Error, Result};

// Re-export the main client types at crate root
pub use client::{BridgeClient, BridgeClientBuilder};
pub use session::{Session, UNATTENDED_DENY_MESSAGE};

// Re-export commonly used config types at crate root
pub use config::{BridgeConfig, BridgeConfigBuilder, Model, PermissionMode, SessionId};

// Re-export the approval handshake types at crate root
pub use approval::{ApprovalRequest, ApprovalResponse, ApprovalResult, RequestId};

// Re-export the backend seam at crate root
pub use backend::{AgentLauncher, AgentSession, BackendDriver, ClaudeCliLauncher, Request};

// Re-export commonly used protocol types at crate root
pub use protocol::{CliMessage, ContentBlock, PermissionDecision, Usage};

// Re-export commonly used stream types at crate root
pub use stream::{BridgeMessage, CollectedResponse, MessageStream, SessionInfo, StreamId};

// Re-export tool observation at crate root
pub use tools::{LoggingObserver, ToolObserver};

pub use tokio_util::sync::CancellationToken;
