//! The seam between the driver and the agent it talks to.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{resolve_cli, BridgeConfig};
use crate::process::{ClaudeProcess, MessageReader, MessageWriter, SpawnOptions};
use crate::{Error, Result};

/// Starts one agent conversation per request.
///
/// The production launcher spawns the Claude CLI; tests substitute a
/// scripted agent.
#[async_trait]
pub trait AgentLauncher: Send + Sync {
    /// Start the agent for one request.
    async fn launch(&self, options: &SpawnOptions) -> Result<AgentSession>;
}

/// A running agent: its output, its input, and the process behind them.
pub struct AgentSession {
    reader: Box<dyn MessageReader>,
    writer: Box<dyn MessageWriter>,
    process: Option<ClaudeProcess>,
}

impl AgentSession {
    /// A session over an arbitrary transport.
    pub fn new(reader: Box<dyn MessageReader>, writer: Box<dyn MessageWriter>) -> Self {
        Self {
            reader,
            writer,
            process: None,
        }
    }

    /// Attach the process backing this session. It is killed with the session.
    pub fn with_process(mut self, process: ClaudeProcess) -> Self {
        self.process = Some(process);
        self
    }

    pub(crate) fn into_parts(self) -> (Box<dyn MessageReader>, Box<dyn MessageWriter>, ProcessGuard) {
        (self.reader, self.writer, ProcessGuard(self.process))
    }
}

impl std::fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSession")
            .field("pid", &self.process.as_ref().and_then(ClaudeProcess::pid))
            .finish()
    }
}

/// Owns the agent process, if any, for the lifetime of a run.
pub(crate) struct ProcessGuard(Option<ClaudeProcess>);

impl ProcessGuard {
    /// Kill the process now.
    pub(crate) fn kill(&mut self) {
        if let Some(process) = self.0.as_mut() {
            if let Err(e) = process.start_kill() {
                tracing::debug!(pid = ?process.pid(), error = %e, "kill failed");
            }
        }
    }

    /// Give the process `grace` to exit on its own, then kill it.
    pub(crate) async fn shutdown(&mut self, grace: Duration) {
        let Some(process) = self.0.as_mut() else {
            return;
        };
        match tokio::time::timeout(grace, process.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(pid = ?process.pid(), %status, "claude process exited");
            }
            Ok(Err(e)) => {
                tracing::debug!(pid = ?process.pid(), error = %e, "wait failed");
            }
            Err(_) => {
                tracing::debug!(pid = ?process.pid(), "claude process still running; killing");
                self.kill();
            }
        }
    }
}

/// Launches the Claude CLI in bidirectional stream-json mode.
#[derive(Debug, Clone)]
pub struct ClaudeCliLauncher {
    config: Arc<BridgeConfig>,
    cli: PathBuf,
}

impl ClaudeCliLauncher {
    /// Locate the CLI for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CliNotFound`] if the CLI cannot be found, so a
    /// misconfigured bridge fails before any stream is opened.
    pub fn new(config: Arc<BridgeConfig>) -> Result<Self> {
        let cli = resolve_cli(&config)?;
        Ok(Self { config, cli })
    }

    /// The CLI executable this launcher runs.
    pub fn cli(&self) -> &std::path::Path {
        &self.cli
    }
}

#[async_trait]
impl AgentLauncher for ClaudeCliLauncher {
    async fn launch(&self, options: &SpawnOptions) -> Result<AgentSession> {
        let mut process = ClaudeProcess::spawn(&self.config, &self.cli, options)?;
        let missing = || Error::ProcessSpawn(std::io::Error::other("process pipes already taken"));
        let reader = process.take_reader().ok_or_else(missing)?;
        let writer = process.take_writer().ok_or_else(missing)?;
        Ok(AgentSession::new(Box::new(reader), Box::new(writer)).with_process(process))
    }
}
