//! Bridge configuration and builder.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use claude_bridge::config::{tools, BridgeConfig, Model};
//!
//! let config = BridgeConfig::builder()
//!     .model(Model::Opus)
//!     .working_directory("/path/to/project")
//!     .auto_approve_tools([tools::READ, tools::GLOB, tools::GREP])
//!     .approval_timeout(Duration::from_secs(300))
//!     .build()?;
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::options::{Model, PermissionMode};
use crate::{Error, Result};

/// Environment variable the API key is passed through.
pub const ENV_API_KEY: &str = "ANTHROPIC_API_KEY";

/// Configuration shared by every request issued through one bridge.
///
/// Use [`BridgeConfig::builder()`] to create a new configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    // Credentials
    pub(crate) api_key: Option<String>,

    // Model and permissions
    pub(crate) model: Option<Model>,
    pub(crate) permission_mode: PermissionMode,

    // System prompts
    pub(crate) system_prompt: Option<String>,
    pub(crate) append_system_prompt: Option<String>,

    // Tools configuration
    pub(crate) allowed_tools: Option<Vec<String>>,
    pub(crate) disallowed_tools: Option<Vec<String>>,
    pub(crate) max_budget_usd: Option<f64>,

    // Approval policy
    pub(crate) auto_approve_tools: HashSet<String>,
    pub(crate) approval_timeout: Option<Duration>,

    // Workspace
    pub(crate) working_directory: Option<PathBuf>,
    pub(crate) bootstrap_workspace: bool,

    // Process options
    pub(crate) cli_path: Option<PathBuf>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) env_vars: HashMap<String, String>,
    pub(crate) inherit_env: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: None,
            permission_mode: PermissionMode::default(),
            system_prompt: None,
            append_system_prompt: None,
            allowed_tools: None,
            disallowed_tools: None,
            max_budget_usd: None,
            auto_approve_tools: HashSet::new(),
            approval_timeout: None,
            working_directory: None,
            bootstrap_workspace: true,
            cli_path: None,
            timeout: None,
            env_vars: HashMap::new(),
            inherit_env: true,
        }
    }
}

impl BridgeConfig {
    /// Create a new builder for BridgeConfig.
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Get the model if set.
    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    /// Get the permission mode.
    pub fn permission_mode(&self) -> PermissionMode {
        self.permission_mode
    }

    /// Get the collect timeout if set.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// How long an approval may stay unanswered. `None` waits forever.
    pub fn approval_timeout(&self) -> Option<Duration> {
        self.approval_timeout
    }

    /// Get the working directory if set.
    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    /// Get the CLI path override if set.
    pub fn cli_path(&self) -> Option<&Path> {
        self.cli_path.as_deref()
    }

    /// Check whether a tool bypasses the approval handshake.
    pub fn is_auto_approved(&self, tool_name: &str) -> bool {
        self.auto_approve_tools.contains(tool_name)
    }

    /// Whether the workspace is bootstrapped before each request.
    pub fn bootstrap_workspace(&self) -> bool {
        self.bootstrap_workspace
    }

    /// Environment variables to set on the subprocess.
    ///
    /// The API key is forwarded as-is; it is never inspected here.
    pub(crate) fn build_env(&self) -> HashMap<String, String> {
        let mut env = self.env_vars.clone();
        if let Some(ref key) = self.api_key {
            env.insert(ENV_API_KEY.to_string(), key.clone());
        }
        env
    }
}

/// Builder for [`BridgeConfig`].
///
/// Validation happens in [`build()`](BridgeConfigBuilder::build). Locating the
/// CLI is deferred to [`resolve_cli`](super::resolve_cli) so a config can be
/// built on machines without the CLI installed.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    // -------------------------------------------------------------------------
    // Credentials
    // -------------------------------------------------------------------------

    /// API key passed to the subprocess as `ANTHROPIC_API_KEY`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    // -------------------------------------------------------------------------
    // Model and permissions
    // -------------------------------------------------------------------------

    /// Set the model to use.
    pub fn model(mut self, model: impl Into<Model>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    /// Set the permission mode for tool execution.
    pub fn permission_mode(mut self, mode: PermissionMode) -> Self {
        self.config.permission_mode = mode;
        self
    }

    // -------------------------------------------------------------------------
    // System prompts
    // -------------------------------------------------------------------------

    /// Set the system prompt (replaces default).
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Append to the system prompt (added after default).
    pub fn append_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.append_system_prompt = Some(prompt.into());
        self
    }

    // -------------------------------------------------------------------------
    // Tools configuration
    // -------------------------------------------------------------------------

    /// Tools the CLI may use without asking. Use constants from [`crate::config::tools`].
    pub fn allowed_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.allowed_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    /// Tools the CLI must not use.
    pub fn disallowed_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.disallowed_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    /// Set the maximum budget in USD per request.
    pub fn max_budget_usd(mut self, budget: f64) -> Self {
        self.config.max_budget_usd = Some(budget);
        self
    }

    // -------------------------------------------------------------------------
    // Approval policy
    // -------------------------------------------------------------------------

    /// Tools approved without asking the caller.
    ///
    /// Approval requests for these tools never reach the message stream.
    pub fn auto_approve_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config
            .auto_approve_tools
            .extend(tools.into_iter().map(Into::into));
        self
    }

    /// Approve the read-only built-in tools without asking.
    pub fn auto_approve_read_only(self) -> Self {
        self.auto_approve_tools(super::options::tools::READ_ONLY)
    }

    /// Deny approvals left unanswered for this long.
    ///
    /// Without it an unanswered approval blocks the tool until the stream is
    /// cancelled.
    pub fn approval_timeout(mut self, timeout: Duration) -> Self {
        self.config.approval_timeout = Some(timeout);
        self
    }

    // -------------------------------------------------------------------------
    // Workspace
    // -------------------------------------------------------------------------

    /// Working directory for the claude process.
    pub fn working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.working_directory = Some(path.into());
        self
    }

    /// Create missing `.claude/` settings before each request (default: on).
    pub fn bootstrap_workspace(mut self, enabled: bool) -> Self {
        self.config.bootstrap_workspace = enabled;
        self
    }

    // -------------------------------------------------------------------------
    // Process options
    // -------------------------------------------------------------------------

    /// Path to the claude CLI binary (default: search PATH for "claude").
    pub fn cli_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cli_path = Some(path.into());
        self
    }

    /// Timeout applied by the collect helpers.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.config.timeout = Some(duration);
        self
    }

    /// Add/override environment variable for subprocess.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.env_vars.insert(key.into(), value.into());
        self
    }

    /// Don't inherit parent environment (default: inherit).
    pub fn inherit_env(mut self, inherit: bool) -> Self {
        self.config.inherit_env = inherit;
        self
    }

    // -------------------------------------------------------------------------
    // Build
    // -------------------------------------------------------------------------

    /// Build the configuration.
    ///
    /// This validates:
    /// - Budget is positive if set
    /// - Approval timeout is non-zero if set
    /// - Working directory exists if set
    pub fn build(self) -> Result<BridgeConfig> {
        let config = self.config;

        if let Some(budget) = config.max_budget_usd {
            if budget <= 0.0 {
                return Err(Error::InvalidConfig(
                    "max_budget_usd must be positive".into(),
                ));
            }
        }

        if config.approval_timeout == Some(Duration::ZERO) {
            return Err(Error::InvalidConfig(
                "approval_timeout must be greater than zero".into(),
            ));
        }

        if let Some(ref dir) = config.working_directory {
            if !dir.is_dir() {
                return Err(Error::InvalidConfig(format!(
                    "working directory does not exist: {}",
                    dir.display()
                )));
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tools;

    #[test]
    fn defaults() {
        let config = BridgeConfig::builder().build().unwrap();
        assert!(config.bootstrap_workspace());
        assert!(config.inherit_env);
        assert_eq!(config.approval_timeout(), None);
        assert!(!config.is_auto_approved(tools::BASH));
        assert!(config.build_env().is_empty());
    }

    #[test]
    fn auto_approve_list_accumulates() {
        let config = BridgeConfig::builder()
            .auto_approve_tools([tools::READ])
            .auto_approve_tools(vec![tools::BASH.to_string()])
            .build()
            .unwrap();

        assert!(config.is_auto_approved("Read"));
        assert!(config.is_auto_approved("Bash"));
        assert!(!config.is_auto_approved("bash"));
        assert!(!config.is_auto_approved("Write"));
    }

    #[test]
    fn read_only_tools_can_be_auto_approved() {
        let config = BridgeConfig::builder()
            .auto_approve_read_only()
            .build()
            .unwrap();

        for tool in tools::READ_ONLY {
            assert!(config.is_auto_approved(tool));
        }
        assert!(!config.is_auto_approved(tools::EDIT));
        assert!(!config.is_auto_approved(tools::BASH));
    }

    #[test]
    fn api_key_forwarded_opaquely() {
        let config = BridgeConfig::builder()
            .api_key("not-even-a-key")
            .env("CUSTOM_VAR", "custom_value")
            .build()
            .unwrap();

        let env = config.build_env();
        assert_eq!(env.get(ENV_API_KEY).map(String::as_str), Some("not-even-a-key"));
        assert_eq!(env.get("CUSTOM_VAR").map(String::as_str), Some("custom_value"));
    }

    #[test]
    fn model_and_permissions() {
        let config = BridgeConfig::builder()
            .model(Model::Opus)
            .permission_mode(PermissionMode::AcceptEdits)
            .build()
            .unwrap();

        assert_eq!(config.model(), Some(&Model::Opus));
        assert_eq!(config.permission_mode(), PermissionMode::AcceptEdits);
    }

    #[test]
    fn invalid_budget() {
        let result = BridgeConfig::builder().max_budget_usd(-1.0).build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn zero_approval_timeout_rejected() {
        let result = BridgeConfig::builder()
            .approval_timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn invalid_working_directory() {
        let result = BridgeConfig::builder()
            .working_directory("/nonexistent/path/that/does/not/exist")
            .build();

        let err = result.unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn existing_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = BridgeConfig::builder()
            .working_directory(dir.path())
            .build()
            .unwrap();
        assert_eq!(config.working_directory(), Some(dir.path()));
    }

    #[test]
    fn types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BridgeConfig>();
        assert_send_sync::<BridgeConfigBuilder>();
    }
}
