//! Type-safe options shared by the config and the protocol layers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Model passed to `--model`.
///
/// The three aliases track the CLI's own; anything else is sent verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    #[default]
    Sonnet,
    Opus,
    Haiku,
    /// A full model id such as `claude-sonnet-4-5-20250929`.
    #[serde(untagged)]
    Custom(String),
}

impl Model {
    /// The value given to the CLI.
    pub fn as_str(&self) -> &str {
        match self {
            Model::Sonnet => "sonnet",
            Model::Opus => "opus",
            Model::Haiku => "haiku",
            Model::Custom(id) => id,
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Model {
    fn from(s: &str) -> Self {
        [Model::Sonnet, Model::Opus, Model::Haiku]
            .into_iter()
            .find(|alias| alias.as_str().eq_ignore_ascii_case(s))
            .unwrap_or_else(|| Model::Custom(s.to_string()))
    }
}

impl From<String> for Model {
    fn from(s: String) -> Self {
        Model::from(s.as_str())
    }
}

/// The CLI's `--permission-mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Ask before anything that is not pre-allowed.
    #[default]
    Default,
    /// Plan only; tools are not run.
    Plan,
    /// File edits go through without asking.
    AcceptEdits,
    /// Nothing is asked.
    BypassPermissions,
}

impl PermissionMode {
    /// The flag value.
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::Plan => "plan",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::BypassPermissions => "bypassPermissions",
        }
    }

    /// Whether tool uses in this mode can reach the approval handshake.
    ///
    /// In `bypassPermissions` the CLI never asks; in `plan` it never runs tools.
    pub fn routes_approvals(&self) -> bool {
        matches!(self, PermissionMode::Default | PermissionMode::AcceptEdits)
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session id assigned by the CLI, used to resume a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        SessionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Names of the CLI's built-in tools, as they appear in approval requests.
///
/// MCP servers add tools of their own, so names stay plain strings.
pub mod tools {
    /// Read file contents.
    pub const READ: &str = "Read";
    /// Write a whole file.
    pub const WRITE: &str = "Write";
    /// Edit file with search/replace.
    pub const EDIT: &str = "Edit";
    /// Several search/replace edits on one file.
    pub const MULTI_EDIT: &str = "MultiEdit";
    /// Execute bash commands.
    pub const BASH: &str = "Bash";
    /// Find files by glob pattern.
    pub const GLOB: &str = "Glob";
    /// Search file contents with regex.
    pub const GREP: &str = "Grep";
    /// List directory contents.
    pub const LS: &str = "LS";
    /// Spawn sub-agents.
    pub const TASK: &str = "Task";
    /// Fetch web content.
    pub const WEB_FETCH: &str = "WebFetch";
    /// Search the web.
    pub const WEB_SEARCH: &str = "WebSearch";
    /// Write todo items.
    pub const TODO_WRITE: &str = "TodoWrite";
    /// Edit Jupyter notebooks.
    pub const NOTEBOOK_EDIT: &str = "NotebookEdit";

    /// Check whether a tool changes files in the workspace.
    pub fn is_file_mutating(name: &str) -> bool {
        matches!(name, WRITE | EDIT | MULTI_EDIT | NOTEBOOK_EDIT)
    }

    /// Tools that only look at the workspace. Safe to auto-approve.
    pub const READ_ONLY: [&str; 4] = [READ, GLOB, GREP, LS];
}
