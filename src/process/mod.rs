//! Process management for the Claude CLI.
//!
//! Each request spawns one CLI process in bidirectional stream-json mode. The
//! prompt, permission decisions and interrupts are written to stdin; protocol
//! messages are read from stdout.
//!
//! # Architecture
//!
//! ```text
//! claude-bridge                            claude CLI
//! ┌──────────────┐                        ┌─────────────┐
//! │ ProcessWriter│──stdin (user, control)─▶│             │
//! │ ProcessReader│◀─stdout (stream-json)───│             │
//! │ StderrReader │◀─stderr (diagnostics)───│             │
//! └──────────────┘                        └─────────────┘
//! ```
//!
//! The backend only sees the [`MessageReader`] and [`MessageWriter`] traits,
//! so any transport that speaks the protocol can stand in for the process.

mod io;
mod spawn;

use async_trait::async_trait;

pub use io::{ProcessReader, ProcessWriter, StderrReader};
pub use spawn::{build_args, ClaudeProcess, SpawnOptions};

use crate::protocol::{CliMessage, OutboundMessage};
use crate::Result;

/// Source of protocol messages from the agent.
#[async_trait]
pub trait MessageReader: Send {
    /// Read the next message. `Ok(None)` means the agent closed its output.
    async fn read_message(&mut self) -> Result<Option<CliMessage>>;
}

/// Sink for messages to the agent.
#[async_trait]
pub trait MessageWriter: Send {
    /// Write one message.
    async fn write_message(&mut self, message: &OutboundMessage) -> Result<()>;

    /// Signal that no more input will follow.
    async fn close(&mut self) -> Result<()>;
}
