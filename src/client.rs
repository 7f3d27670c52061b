//! The request-facing API.
//!
//! This module provides [`BridgeClient`], the main entry point for sending
//! prompts through the bridge.
//!
//! # Example
//!
//! ```ignore
//! use futures::StreamExt;
//! use claude_bridge::{ApprovalResponse, BridgeClient, BridgeMessage, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = BridgeClient::builder()
//!         .working_directory("/path/to/project")
//!         .auto_approve_tools(["Read", "Grep"])
//!         .build()?;
//!
//!     let mut stream = client.stream("Fix the failing test", None)?;
//!     while let Some(message) = stream.next().await {
//!         match message? {
//!             BridgeMessage::ToolApprovalRequest(req) => {
//!                 client.respond_to_approval(ApprovalResponse::allow(req.request_id));
//!             }
//!             BridgeMessage::Assistant(a) => print!("{}", a.message.text()),
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::approval::ApprovalResponse;
use crate::backend::{AgentLauncher, BackendDriver, ClaudeCliLauncher, Request};
use crate::config::{BridgeConfig, BridgeConfigBuilder, Model, PermissionMode, SessionId};
use crate::session::Session;
use crate::stream::{with_timeout, MessageStream, StreamId};
use crate::tools::ToolObserver;
use crate::Result;

/// A client for running prompts through the Claude CLI.
///
/// `BridgeClient` holds one [`BackendDriver`], which owns every stream and
/// pending approval issued through this client and its clones. It provides:
/// - Streaming requests ([`send`](Self::send) + [`consume`](Self::consume),
///   or [`stream`](Self::stream))
/// - One-shot requests ([`send_and_collect`](Self::send_and_collect))
/// - Multi-turn sessions ([`start_session`](Self::start_session),
///   [`resume_session`](Self::resume_session))
///
/// # Thread Safety
///
/// `BridgeClient` is `Send + Sync` and cheap to clone. Each request runs its
/// own agent process, so concurrent requests are supported.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    config: Arc<BridgeConfig>,
    driver: BackendDriver,
}

impl BridgeClient {
    /// Create a client with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CliNotFound`](crate::Error::CliNotFound) if the
    /// Claude CLI is not on `PATH`.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a client with the given configuration.
    ///
    /// The CLI is located now, so a missing installation is reported here
    /// rather than on the first request.
    pub fn with_config(config: BridgeConfig) -> Result<Self> {
        let config = Arc::new(config);
        let launcher = ClaudeCliLauncher::new(Arc::clone(&config))?;
        Ok(Self::assemble(config, Arc::new(launcher), None))
    }

    fn assemble(
        config: Arc<BridgeConfig>,
        launcher: Arc<dyn AgentLauncher>,
        observer: Option<Arc<dyn ToolObserver>>,
    ) -> Self {
        let driver = BackendDriver::new(Arc::clone(&config), launcher, observer);
        Self { config, driver }
    }

    /// Create a builder for configuring a new client.
    pub fn builder() -> BridgeClientBuilder {
        BridgeClientBuilder::new()
    }

    /// Start a request and return its stream id.
    ///
    /// The stream is registered before the agent starts, so nothing is lost
    /// between this call and [`consume`](Self::consume). Must be called from
    /// within a Tokio runtime.
    pub fn send(&self, request: impl Into<Request>) -> Result<StreamId> {
        self.driver.start(request.into(), None)
    }

    /// Start a request that is cancelled when `token` is.
    pub fn send_with_cancel(
        &self,
        request: impl Into<Request>,
        token: &CancellationToken,
    ) -> Result<StreamId> {
        self.driver.start(request.into(), Some(token))
    }

    /// Take the single consumer of a stream.
    ///
    /// # Errors
    ///
    /// - [`Error::StreamNotFound`](crate::Error::StreamNotFound) if the id was
    ///   never issued or its stream has already been drained
    /// - [`Error::StreamAlreadyConsumed`](crate::Error::StreamAlreadyConsumed)
    ///   if the stream already has a consumer
    pub fn consume(&self, id: &StreamId) -> Result<MessageStream> {
        self.driver.consume(id)
    }

    /// Start a request and take its stream in one step.
    ///
    /// # Cancellation
    ///
    /// Cancelling `token` stops the agent; the stream then ends after the
    /// messages already delivered. Dropping the stream also stops the agent.
    pub fn stream(
        &self,
        request: impl Into<Request>,
        token: Option<&CancellationToken>,
    ) -> Result<MessageStream> {
        let id = self.driver.start(request.into(), token)?;
        self.driver.consume(&id)
    }

    /// Send a prompt and collect the full text response.
    ///
    /// Tools that are not auto-approved will wait for an answer, so pair this
    /// with [`BridgeConfigBuilder::auto_approve_tools`] or answer approvals
    /// from another task. The configured timeout applies to the whole
    /// request; on expiry the request is cancelled.
    pub async fn send_and_collect(&self, request: impl Into<Request>) -> Result<String> {
        let id = self.send(request)?;
        let stream = self.consume(&id)?;

        match self.config.timeout() {
            Some(limit) => {
                let collected = with_timeout(limit, stream.collect_text()).await;
                if collected.is_err() {
                    self.cancel(&id);
                }
                collected
            }
            None => stream.collect_text().await,
        }
    }

    /// Cancel a running request. Returns `false` if it already finished.
    pub fn cancel(&self, id: &StreamId) -> bool {
        self.driver.cancel(id)
    }

    /// Answer an approval request. Answers for unknown ids are ignored.
    pub fn respond_to_approval(&self, response: ApprovalResponse) {
        self.driver.handle_approval_response(response);
    }

    /// Start an empty multi-turn session. The first turn creates the session.
    pub fn start_session(&self) -> Session {
        Session::new(self.clone(), None)
    }

    /// Continue an earlier session by id.
    pub fn resume_session(&self, session_id: impl Into<SessionId>) -> Session {
        Session::new(self.clone(), Some(session_id.into()))
    }

    /// Get a reference to the client's configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The driver behind this client.
    pub fn driver(&self) -> &BackendDriver {
        &self.driver
    }
}

/// Builder for [`BridgeClient`].
///
/// This wraps [`BridgeConfigBuilder`] and builds directly into a
/// [`BridgeClient`].
///
/// # Example
///
/// ```ignore
/// let client = BridgeClient::builder()
///     .model(Model::Opus)
///     .auto_approve_tools([tools::READ, tools::GLOB])
///     .approval_timeout(Duration::from_secs(600))
///     .build()?;
/// ```
#[derive(Default)]
pub struct BridgeClientBuilder {
    inner: BridgeConfigBuilder,
    launcher: Option<Arc<dyn AgentLauncher>>,
    observer: Option<Arc<dyn ToolObserver>>,
}

impl BridgeClientBuilder {
    /// Create a new client builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid (e.g., negative budget)
    /// - No custom launcher was given and the CLI cannot be found
    pub fn build(self) -> Result<BridgeClient> {
        let config = Arc::new(self.inner.build()?);
        let launcher: Arc<dyn AgentLauncher> = match self.launcher {
            Some(launcher) => launcher,
            None => Arc::new(ClaudeCliLauncher::new(Arc::clone(&config))?),
        };
        Ok(BridgeClient::assemble(config, launcher, self.observer))
    }

    /// Run agents through a custom launcher instead of the Claude CLI.
    pub fn launcher(mut self, launcher: Arc<dyn AgentLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Watch tool uses and results on every stream.
    pub fn tool_observer(mut self, observer: Arc<dyn ToolObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// API key passed to the CLI as `ANTHROPIC_API_KEY`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.inner = self.inner.api_key(key);
        self
    }

    // -------------------------------------------------------------------------
    // Model and permissions
    // -------------------------------------------------------------------------

    /// Set the model to use.
    pub fn model(mut self, model: impl Into<Model>) -> Self {
        self.inner = self.inner.model(model);
        self
    }

    /// Set the permission mode.
    pub fn permission_mode(mut self, mode: PermissionMode) -> Self {
        self.inner = self.inner.permission_mode(mode);
        self
    }

    /// Set the system prompt.
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.inner = self.inner.system_prompt(prompt);
        self
    }

    /// Append to the system prompt.
    pub fn append_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.inner = self.inner.append_system_prompt(prompt);
        self
    }

    // -------------------------------------------------------------------------
    // Tools and approvals
    // -------------------------------------------------------------------------

    /// Set allowed tools (whitelist).
    pub fn allowed_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.inner = self.inner.allowed_tools(tools);
        self
    }

    /// Set disallowed tools (blacklist).
    pub fn disallowed_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.inner = self.inner.disallowed_tools(tools);
        self
    }

    /// Tools approved without asking.
    pub fn auto_approve_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.inner = self.inner.auto_approve_tools(tools);
        self
    }

    /// Approve the read-only built-in tools without asking.
    pub fn auto_approve_read_only(mut self) -> Self {
        self.inner = self.inner.auto_approve_read_only();
        self
    }

    /// Deny approvals left unanswered for this long.
    pub fn approval_timeout(mut self, timeout: Duration) -> Self {
        self.inner = self.inner.approval_timeout(timeout);
        self
    }

    /// Set the maximum budget in USD.
    pub fn max_budget_usd(mut self, budget: f64) -> Self {
        self.inner = self.inner.max_budget_usd(budget);
        self
    }

    // -------------------------------------------------------------------------
    // Environment
    // -------------------------------------------------------------------------

    /// Set the working directory.
    pub fn working_directory(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.inner = self.inner.working_directory(path);
        self
    }

    /// Create missing `.claude` files in the working directory (default on).
    pub fn bootstrap_workspace(mut self, enabled: bool) -> Self {
        self.inner = self.inner.bootstrap_workspace(enabled);
        self
    }

    /// Set a custom path to the CLI executable.
    pub fn cli_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.inner = self.inner.cli_path(path);
        self
    }

    /// Set the timeout for collecting helpers.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.inner = self.inner.timeout(duration);
        self
    }

    /// Add an environment variable for the CLI process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner = self.inner.env(key, value);
        self
    }

    /// Whether the CLI inherits this process's environment (default true).
    pub fn inherit_env(mut self, inherit: bool) -> Self {
        self.inner = self.inner.inherit_env(inherit);
        self
    }
}

impl std::fmt::Debug for BridgeClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClientBuilder")
            .field("config", &self.inner)
            .field("custom_launcher", &self.launcher.is_some())
            .field("tool_observer", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::AgentSession;
    use crate::config::tools;
    use crate::process::SpawnOptions;
    use crate::tools::LoggingObserver;
    use crate::Error;
    use async_trait::async_trait;

    struct NoAgent;

    #[async_trait]
    impl AgentLauncher for NoAgent {
        async fn launch(&self, _: &SpawnOptions) -> Result<AgentSession> {
            Err(Error::StreamClosed)
        }
    }

    fn builder() -> BridgeClientBuilder {
        BridgeClient::builder().launcher(Arc::new(NoAgent))
    }

    #[test]
    fn client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BridgeClient>();
    }

    #[test]
    fn builder_forwards_configuration() {
        let client = builder()
            .model(Model::Opus)
            .permission_mode(PermissionMode::AcceptEdits)
            .auto_approve_tools([tools::READ, tools::BASH])
            .approval_timeout(Duration::from_secs(60))
            .timeout(Duration::from_secs(300))
            .bootstrap_workspace(false)
            .build()
            .unwrap();

        let config = client.config();
        assert_eq!(config.model(), Some(&Model::Opus));
        assert_eq!(config.permission_mode(), PermissionMode::AcceptEdits);
        assert!(config.is_auto_approved(tools::BASH));
        assert!(!config.is_auto_approved(tools::WRITE));
        assert_eq!(config.approval_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.timeout(), Some(Duration::from_secs(300)));
        assert!(!config.bootstrap_workspace());
    }

    #[test]
    fn builder_rejects_invalid_config() {
        let err = builder().max_budget_usd(-1.0).build().unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn missing_cli_is_a_config_error() {
        let err = BridgeClient::builder()
            .cli_path("/nonexistent/claude")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::CliNotFound { .. }));
        assert!(!err.user_message().is_empty());
    }

    #[test]
    fn builder_accepts_observer() {
        let client = builder()
            .tool_observer(Arc::new(LoggingObserver::new()))
            .build()
            .unwrap();
        assert!(format!("{:?}", client).contains("BackendDriver"));
    }

    #[tokio::test]
    async fn consume_unknown_stream_fails() {
        let client = builder().build().unwrap();
        let err = client.consume(&StreamId::from("missing")).unwrap_err();
        assert!(matches!(err, Error::StreamNotFound(_)));
    }

    #[tokio::test]
    async fn clones_share_streams() {
        let client = builder().build().unwrap();
        let other = client.clone();

        let id = client.send("hello").unwrap();
        let stream = other.consume(&id).unwrap();
        let err = stream.collect_all().await.unwrap_err();
        assert!(matches!(err, Error::StreamClosed));
    }
}
