//! The backend: runs the agent for each request and feeds its stream.
//!
//! - [`BackendDriver`] - owns the stream table, the approval coordinator and
//!   every in-flight run
//! - [`AgentLauncher`] - how an agent is started; [`ClaudeCliLauncher`] runs
//!   the Claude CLI
//! - [`filter`] - recognizes the CLI's synthetic authentication errors
//! - [`bootstrap`] - prepares the working directory before a run

mod agent;
pub mod bootstrap;
mod driver;
pub mod filter;

use std::path::PathBuf;

pub use agent::{AgentLauncher, AgentSession, ClaudeCliLauncher};
pub use driver::BackendDriver;

use crate::config::{Model, SessionId};
use crate::process::SpawnOptions;
use crate::stream::StreamId;

/// One prompt to run.
///
/// # Example
///
/// ```ignore
/// use claude_bridge::Request;
///
/// let request = Request::new("Fix the failing test")
///     .working_directory("/path/to/project")
///     .resume(session_id);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub prompt: String,
    /// Correlation id to use; generated when absent.
    pub stream_id: Option<StreamId>,
    /// Continue this session instead of starting a new one.
    pub resume: Option<SessionId>,
    pub working_directory: Option<PathBuf>,
    pub model: Option<Model>,
}

impl Request {
    /// A request for `prompt` with everything else defaulted.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            stream_id: None,
            resume: None,
            working_directory: None,
            model: None,
        }
    }

    /// Use a caller-chosen stream id.
    pub fn with_stream_id(mut self, id: impl Into<StreamId>) -> Self {
        self.stream_id = Some(id.into());
        self
    }

    /// Resume an earlier session.
    pub fn resume(mut self, session_id: impl Into<SessionId>) -> Self {
        self.resume = Some(session_id.into());
        self
    }

    /// Run in this directory instead of the configured one.
    pub fn working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(path.into());
        self
    }

    /// Use this model instead of the configured one.
    pub fn model(mut self, model: impl Into<Model>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub(crate) fn spawn_options(&self) -> SpawnOptions {
        SpawnOptions {
            resume: self.resume.clone(),
            working_directory: self.working_directory.clone(),
            model: self.model.clone(),
        }
    }
}

impl From<&str> for Request {
    fn from(prompt: &str) -> Self {
        Request::new(prompt)
    }
}

impl From<String> for Request {
    fn from(prompt: String) -> Self {
        Request::new(prompt)
    }
}
