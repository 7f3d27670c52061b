//! The backend driver: one agent run per stream.
//!
//! # Lifecycle
//!
//! ```text
//! start ─▶ bootstrap ─▶ launch ─▶ pump ─┬─▶ result            ─▶ end-of-stream
//!                                       ├─▶ cancel            ─▶ end-of-stream
//!                                       ├─▶ auth notice / EOF ─▶ error
//!                                       └─▶ consumer gone     ─▶ (nothing)
//! ```
//!
//! Tool permission requests are answered off the pump: the approval request
//! is pushed in order, the wait runs in its own task, and the decision goes
//! straight to the agent's stdin. The pump itself never stops reading.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use super::agent::{AgentLauncher, ProcessGuard};
use super::bootstrap::ensure_workspace;
use super::filter::{is_synthetic_auth_assistant, synthetic_auth_result};
use super::Request;
use crate::approval::{ApprovalCoordinator, ApprovalPolicy, ApprovalResponse, RequestId, ToolCall};
use crate::config::BridgeConfig;
use crate::process::{MessageReader, MessageWriter};
use crate::protocol::{CliMessage, ControlRequest, ControlRequestMessage, OutboundMessage, UserPrompt};
use crate::stream::{BridgeMessage, MessageStream, StreamId, StreamRegistry};
use crate::tools::{ObserverDispatch, ToolObserver};
use crate::{Error, Result};

/// How long the agent gets to exit after its result before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
/// How long a cancelled run waits for the interrupt to be written.
const INTERRUPT_GRACE: Duration = Duration::from_millis(500);

/// Owns every in-flight agent run of one bridge.
///
/// Cloning is cheap and clones share the same streams and approvals.
#[derive(Clone)]
pub struct BackendDriver {
    inner: Arc<DriverInner>,
}

struct DriverInner {
    config: Arc<BridgeConfig>,
    launcher: Arc<dyn AgentLauncher>,
    registry: Arc<StreamRegistry>,
    approvals: Arc<ApprovalCoordinator>,
    observer: Option<Arc<dyn ToolObserver>>,
    active: Mutex<HashMap<StreamId, ActiveRun>>,
    next_run: AtomicU64,
}

/// A run that has not emitted its terminal event yet.
struct ActiveRun {
    run: u64,
    token: CancellationToken,
}

/// How a run ended.
#[derive(Debug)]
enum Outcome {
    Completed,
    Cancelled,
    Failed(Error),
    /// The consumer dropped its stream; there is nobody to tell.
    Abandoned,
}

impl BackendDriver {
    /// Create a driver running agents through `launcher`.
    pub fn new(
        config: Arc<BridgeConfig>,
        launcher: Arc<dyn AgentLauncher>,
        observer: Option<Arc<dyn ToolObserver>>,
    ) -> Self {
        let registry = Arc::new(StreamRegistry::new());
        let approvals = Arc::new(ApprovalCoordinator::new(
            Arc::clone(&registry),
            ApprovalPolicy::from_config(&config),
        ));
        Self {
            inner: Arc::new(DriverInner {
                config,
                launcher,
                registry,
                approvals,
                observer,
                active: Mutex::new(HashMap::new()),
                next_run: AtomicU64::new(0),
            }),
        }
    }

    /// Open a stream for `request` and start the agent in the background.
    ///
    /// The stream exists when this returns, so no message can be missed.
    /// Cancelling `parent` cancels the run. Must be called from within a
    /// Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StreamExists`] if the request names an id that is
    /// still registered or whose previous run has not finished.
    pub fn start(&self, request: Request, parent: Option<&CancellationToken>) -> Result<StreamId> {
        let id = request.stream_id.clone().unwrap_or_else(StreamId::generate);
        let token = parent.map_or_else(CancellationToken::new, CancellationToken::child_token);
        let run = self.inner.next_run.fetch_add(1, Ordering::Relaxed);

        {
            let mut active = self.inner.lock_active();
            if active.contains_key(&id) {
                return Err(Error::StreamExists(id.to_string()));
            }
            self.inner.registry.open(&id)?;
            active.insert(
                id.clone(),
                ActiveRun {
                    run,
                    token: token.clone(),
                },
            );
        }

        tracing::debug!(stream_id = %id, run, resume = ?request.resume, "starting agent run");
        tokio::spawn(Arc::clone(&self.inner).run(id.clone(), run, request, token));
        Ok(id)
    }

    /// Take the single consumer of a stream.
    pub fn consume(&self, id: &StreamId) -> Result<MessageStream> {
        self.inner.registry.consume(id)
    }

    /// Cancel a running request. Returns `false` if it is not running.
    ///
    /// The stream still ends with exactly one end-of-stream, after whatever
    /// was already buffered.
    pub fn cancel(&self, id: &StreamId) -> bool {
        match self.inner.lock_active().get(id) {
            Some(active) => {
                tracing::debug!(stream_id = %id, run = active.run, "cancelling agent run");
                active.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Deliver the caller's answer to an approval request.
    pub fn handle_approval_response(&self, response: ApprovalResponse) {
        self.inner.approvals.resolve(response);
    }

    /// Check whether a request is still running.
    pub fn is_running(&self, id: &StreamId) -> bool {
        self.inner.lock_active().contains_key(id)
    }

    /// Number of requests still running.
    pub fn running(&self) -> usize {
        self.inner.lock_active().len()
    }

    /// The approval coordinator shared by all streams.
    pub fn approvals(&self) -> &ApprovalCoordinator {
        &self.inner.approvals
    }

    /// The stream table.
    pub fn registry(&self) -> &StreamRegistry {
        &self.inner.registry
    }

    /// The configuration in force.
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for BackendDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendDriver")
            .field("running", &self.running())
            .field("registry", &self.inner.registry)
            .field("approvals", &self.inner.approvals)
            .finish()
    }
}

impl DriverInner {
    fn lock_active(&self) -> MutexGuard<'_, HashMap<StreamId, ActiveRun>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(self: Arc<Self>, id: StreamId, run: u64, request: Request, token: CancellationToken) {
        let (outcome, teardown) = self.drive(&id, request, &token).await;
        let interrupt = matches!(outcome, Outcome::Cancelled | Outcome::Abandoned);
        self.finish(&id, run, outcome);
        if let Some(teardown) = teardown {
            teardown.run(interrupt).await;
        }
    }

    async fn drive(
        &self,
        id: &StreamId,
        request: Request,
        token: &CancellationToken,
    ) -> (Outcome, Option<Teardown>) {
        let options = request.spawn_options();

        if self.config.bootstrap_workspace() {
            if let Some(dir) = options.effective_working_directory(&self.config) {
                bootstrap(id, dir.to_path_buf()).await;
            }
        }

        let session = tokio::select! {
            _ = token.cancelled() => return (Outcome::Cancelled, None),
            launched = self.launcher.launch(&options) => match launched {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!(stream_id = %id, error = %e, "failed to launch agent");
                    return (Outcome::Failed(e), None);
                }
            },
        };

        let (reader, writer, process) = session.into_parts();
        let (commands, writer_task) = spawn_writer(id.clone(), writer);
        let _ = commands.send(WriterCommand::Message(OutboundMessage::User(UserPrompt::new(
            request.prompt,
        ))));

        let pump = Pump {
            stream_id: id.clone(),
            registry: Arc::clone(&self.registry),
            approvals: Arc::clone(&self.approvals),
            commands: commands.clone(),
            observer: self
                .observer
                .clone()
                .map(|observer| ObserverDispatch::new(observer, id.clone())),
            waiting: JoinSet::new(),
            by_agent_id: HashMap::new(),
        };

        // Holds a sender for the stream; it must be gone before `finish`.
        let abandoned = self.registry.closed(id);
        let outcome = tokio::select! {
            outcome = pump.run(reader) => outcome,
            _ = token.cancelled() => Outcome::Cancelled,
            _ = abandoned => Outcome::Abandoned,
        };

        let teardown = Teardown {
            stream_id: id.clone(),
            commands,
            writer_task,
            process,
        };
        (outcome, Some(teardown))
    }

    /// Emit the stream's single terminal event and forget the run.
    ///
    /// The id stays reserved until the terminal event is out, so a new run
    /// under the same id cannot receive it.
    fn finish(&self, id: &StreamId, run: u64, outcome: Outcome) {
        self.approvals.cancel_stream(id);

        match outcome {
            Outcome::Completed => {
                tracing::debug!(stream_id = %id, "agent run completed");
                self.registry.push(id, None);
            }
            Outcome::Cancelled => {
                tracing::debug!(stream_id = %id, "agent run cancelled");
                self.registry.push(id, None);
            }
            Outcome::Failed(e) => {
                tracing::debug!(stream_id = %id, error = %e, "agent run failed");
                self.registry.fail(id, e);
            }
            Outcome::Abandoned => {
                tracing::debug!(stream_id = %id, "stream consumer went away; stopping agent");
                self.registry.discard(id);
            }
        }

        let mut active = self.lock_active();
        if active.get(id).is_some_and(|entry| entry.run == run) {
            active.remove(id);
        }
    }
}

async fn bootstrap(id: &StreamId, dir: PathBuf) {
    let shown = dir.display().to_string();
    match tokio::task::spawn_blocking(move || ensure_workspace(&dir)).await {
        Ok(Ok(report)) if !report.created.is_empty() => {
            tracing::debug!(stream_id = %id, dir = %shown, created = ?report.created, "workspace bootstrapped");
        }
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            tracing::warn!(stream_id = %id, dir = %shown, error = %e, "workspace bootstrap failed");
        }
        Err(e) => {
            tracing::warn!(stream_id = %id, dir = %shown, error = %e, "workspace bootstrap task failed");
        }
    }
}

enum WriterCommand {
    Message(OutboundMessage),
    Close,
}

/// Serializes everything written to the agent through one task.
fn spawn_writer(
    stream_id: StreamId,
    mut writer: Box<dyn MessageWriter>,
) -> (mpsc::UnboundedSender<WriterCommand>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            match command {
                WriterCommand::Message(message) => {
                    if let Err(e) = writer.write_message(&message).await {
                        tracing::debug!(%stream_id, error = %e, "write to agent failed");
                        return;
                    }
                }
                WriterCommand::Close => break,
            }
        }
        if let Err(e) = writer.close().await {
            tracing::trace!(%stream_id, error = %e, "closing agent input failed");
        }
    });
    (tx, task)
}

/// Reads the agent's output and routes it.
struct Pump {
    stream_id: StreamId,
    registry: Arc<StreamRegistry>,
    approvals: Arc<ApprovalCoordinator>,
    commands: mpsc::UnboundedSender<WriterCommand>,
    observer: Option<ObserverDispatch>,
    /// Permission requests waiting on the caller, keyed by the agent's id.
    waiting: JoinSet<String>,
    by_agent_id: HashMap<String, AbortHandle>,
}

impl Pump {
    async fn run(mut self, mut reader: Box<dyn MessageReader>) -> Outcome {
        loop {
            while let Some(done) = self.waiting.try_join_next() {
                if let Ok(agent_request_id) = done {
                    self.by_agent_id.remove(&agent_request_id);
                }
            }

            let message = match reader.read_message().await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    tracing::debug!(stream_id = %self.stream_id, "agent output ended without a result");
                    return Outcome::Failed(Error::StreamClosed);
                }
                Err(e) => return Outcome::Failed(e),
            };

            if let Some(outcome) = self.handle(message) {
                return outcome;
            }
        }
    }

    fn handle(&mut self, message: CliMessage) -> Option<Outcome> {
        match message {
            CliMessage::System(system) => self.forward(BridgeMessage::System(system)),
            CliMessage::Assistant(assistant) => {
                if is_synthetic_auth_assistant(&assistant) {
                    tracing::debug!(stream_id = %self.stream_id, "suppressed synthetic auth notice");
                    return None;
                }
                if let Some(observer) = self.observer.as_mut() {
                    observer.assistant(&assistant);
                }
                self.forward(BridgeMessage::Assistant(assistant))
            }
            CliMessage::User(user) => {
                if let Some(observer) = self.observer.as_mut() {
                    observer.user(&user);
                }
                self.forward(BridgeMessage::User(user))
            }
            CliMessage::Result(result) => {
                if let Some(error) = synthetic_auth_result(&result) {
                    tracing::warn!(stream_id = %self.stream_id, "claude CLI is not authenticated");
                    return Some(Outcome::Failed(error));
                }
                tracing::debug!(
                    stream_id = %self.stream_id,
                    subtype = %result.subtype,
                    is_error = result.is_error(),
                    cost_usd = ?result.total_cost_usd,
                    "agent result"
                );
                Some(
                    self.forward(BridgeMessage::Result(result))
                        .unwrap_or(Outcome::Completed),
                )
            }
            CliMessage::ControlRequest(request) => self.control_request(request),
            CliMessage::ControlResponse(response) => {
                tracing::debug!(
                    stream_id = %self.stream_id,
                    request_id = %response.response.request_id(),
                    "control response from agent"
                );
                None
            }
            CliMessage::ControlCancelRequest(cancel) => {
                if let Some(handle) = self.by_agent_id.remove(&cancel.request_id) {
                    handle.abort();
                }
                self.approvals
                    .cancel_agent_request(&self.stream_id, &cancel.request_id);
                None
            }
            CliMessage::Unknown => {
                tracing::trace!(stream_id = %self.stream_id, "skipping unrecognized message");
                None
            }
        }
    }

    fn forward(&self, message: BridgeMessage) -> Option<Outcome> {
        if self.registry.push(&self.stream_id, Some(message)) {
            None
        } else {
            Some(Outcome::Abandoned)
        }
    }

    fn control_request(&mut self, message: ControlRequestMessage) -> Option<Outcome> {
        let agent_request_id = message.request_id;
        match message.request {
            ControlRequest::CanUseTool(call) => {
                let pending = self.approvals.begin(
                    &self.stream_id,
                    ToolCall {
                        tool_name: call.tool_name,
                        input: call.input,
                        tool_use_id: call.tool_use_id,
                        agent_request_id: Some(agent_request_id.clone()),
                    },
                );
                if !self.registry.is_active(&self.stream_id) {
                    // the request could not be delivered
                    return Some(Outcome::Abandoned);
                }
                let commands = self.commands.clone();
                let id = agent_request_id.clone();
                let handle = self.waiting.spawn(async move {
                    let decision = pending.wait().await;
                    let _ = commands.send(WriterCommand::Message(OutboundMessage::permission(
                        id.clone(),
                        &decision,
                    )));
                    id
                });
                self.by_agent_id.insert(agent_request_id, handle);
                None
            }
            ControlRequest::Interrupt | ControlRequest::Unsupported => {
                tracing::debug!(
                    stream_id = %self.stream_id,
                    request_id = %agent_request_id,
                    "rejecting unsupported control request"
                );
                let _ = self.commands.send(WriterCommand::Message(OutboundMessage::control_error(
                    agent_request_id,
                    "unsupported control request",
                )));
                None
            }
        }
    }
}

/// Stops the agent once the stream has its terminal event.
struct Teardown {
    stream_id: StreamId,
    commands: mpsc::UnboundedSender<WriterCommand>,
    writer_task: JoinHandle<()>,
    process: ProcessGuard,
}

impl Teardown {
    async fn run(mut self, interrupt: bool) {
        if interrupt {
            let interrupt = OutboundMessage::interrupt(RequestId::generate().to_string());
            let _ = self.commands.send(WriterCommand::Message(interrupt));
            drop(self.commands);
            if tokio::time::timeout(INTERRUPT_GRACE, &mut self.writer_task)
                .await
                .is_err()
            {
                self.writer_task.abort();
            }
            self.process.kill();
            tracing::debug!(stream_id = %self.stream_id, "agent interrupted");
        } else {
            let _ = self.commands.send(WriterCommand::Close);
            drop(self.commands);
            let _ = self.writer_task.await;
            self.process.shutdown(SHUTDOWN_GRACE).await;
        }
    }
}
