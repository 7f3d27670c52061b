//! Correlates approval requests with the caller's responses.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;

use super::{non_null_input, ApprovalRequest, ApprovalResponse, ApprovalResult, RequestId};
use crate::config::BridgeConfig;
use crate::protocol::PermissionDecision;
use crate::stream::{BridgeMessage, StreamId, StreamRegistry};

/// Which tools skip the handshake and how long a handshake may take.
#[derive(Debug, Clone, Default)]
pub struct ApprovalPolicy {
    /// Tools approved without asking.
    pub auto_approve: HashSet<String>,
    /// Deny after this long without an answer. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl ApprovalPolicy {
    /// Take the policy from a bridge configuration.
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            auto_approve: config.auto_approve_tools.clone(),
            timeout: config.approval_timeout,
        }
    }
}

/// A tool call awaiting a decision.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub tool_name: String,
    pub input: Value,
    pub tool_use_id: Option<String>,
    /// The agent's own id for its permission request, if it has one.
    pub agent_request_id: Option<String>,
}

impl ToolCall {
    /// A call with just a name and an input.
    pub fn new(tool_name: impl Into<String>, input: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            input,
            tool_use_id: None,
            agent_request_id: None,
        }
    }
}

struct PendingApproval {
    stream_id: StreamId,
    tool_input: Value,
    agent_request_id: Option<String>,
    tx: oneshot::Sender<ApprovalResult>,
}

type PendingMap = HashMap<RequestId, PendingApproval>;

/// Approval handshakes in flight, keyed by [`RequestId`].
///
/// [`request`](Self::request) publishes a `tool-approval-request` on the
/// owning stream and suspends until [`resolve`](Self::resolve) is called with
/// the same id. Entries are removed the moment they are resolved, cancelled
/// or abandoned.
pub struct ApprovalCoordinator {
    registry: Arc<StreamRegistry>,
    policy: ApprovalPolicy,
    pending: Arc<Mutex<PendingMap>>,
}

fn lock(pending: &Mutex<PendingMap>) -> MutexGuard<'_, PendingMap> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes an abandoned entry when the waiting request is dropped.
struct PendingGuard {
    pending: Arc<Mutex<PendingMap>>,
    request_id: RequestId,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        lock(&self.pending).remove(&self.request_id);
    }
}

/// A decision that may still be waiting on the caller.
///
/// Dropping it abandons the approval: the pending entry is removed and a
/// later response for its id is ignored.
pub struct PendingDecision {
    state: PendingState,
}

enum PendingState {
    Ready(ApprovalResult),
    Waiting {
        rx: oneshot::Receiver<ApprovalResult>,
        guard: PendingGuard,
        stream_id: StreamId,
        timeout: Option<Duration>,
    },
}

impl PendingDecision {
    fn ready(decision: ApprovalResult) -> Self {
        Self {
            state: PendingState::Ready(decision),
        }
    }

    /// The id the caller must answer, if a handshake was started.
    pub fn request_id(&self) -> Option<&RequestId> {
        match &self.state {
            PendingState::Ready(_) => None,
            PendingState::Waiting { guard, .. } => Some(&guard.request_id),
        }
    }

    /// Wait for the decision.
    pub async fn wait(self) -> ApprovalResult {
        let (rx, guard, stream_id, timeout) = match self.state {
            PendingState::Ready(decision) => return decision,
            PendingState::Waiting {
                rx,
                guard,
                stream_id,
                timeout,
            } => (rx, guard, stream_id, timeout),
        };
        let request_id = &guard.request_id;

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    tracing::warn!(%stream_id, %request_id, ?limit, "tool approval timed out");
                    return PermissionDecision::deny(format!(
                        "No approval was given within {} seconds",
                        limit.as_secs()
                    ));
                }
            },
            None => rx.await,
        };

        outcome.unwrap_or_else(|_| {
            tracing::debug!(%stream_id, %request_id, "tool approval cancelled");
            PermissionDecision::deny("The approval request was cancelled")
        })
    }
}

impl std::fmt::Debug for PendingDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingDecision")
            .field("request_id", &self.request_id())
            .finish()
    }
}

impl ApprovalCoordinator {
    /// Create a coordinator delivering requests through `registry`.
    pub fn new(registry: Arc<StreamRegistry>, policy: ApprovalPolicy) -> Self {
        Self {
            registry,
            policy,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Get the policy in force.
    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    /// Decide whether a tool call may proceed.
    ///
    /// Auto-approved tools are allowed at once, with their input (or `{}`)
    /// echoed back. Anything else is published on `stream_id` and awaited.
    /// A request whose stream is gone, that is cancelled, or that outlives
    /// the approval timeout resolves to deny.
    pub async fn request(&self, stream_id: &StreamId, call: ToolCall) -> ApprovalResult {
        self.begin(stream_id, call).wait().await
    }

    /// Publish the approval request now and return a handle to await.
    ///
    /// The `tool-approval-request` is on the stream by the time this returns,
    /// so it is ordered before anything pushed afterwards.
    pub fn begin(&self, stream_id: &StreamId, call: ToolCall) -> PendingDecision {
        if self.policy.auto_approve.contains(&call.tool_name) {
            tracing::debug!(%stream_id, tool_name = %call.tool_name, "tool auto-approved");
            return PendingDecision::ready(PermissionDecision::allow(non_null_input(&call.input)));
        }

        let request_id = RequestId::generate();
        let (tx, rx) = oneshot::channel();

        lock(&self.pending).insert(
            request_id.clone(),
            PendingApproval {
                stream_id: stream_id.clone(),
                tool_input: call.input.clone(),
                agent_request_id: call.agent_request_id.clone(),
                tx,
            },
        );
        let guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            request_id: request_id.clone(),
        };

        tracing::debug!(
            %stream_id,
            %request_id,
            tool_name = %call.tool_name,
            "awaiting tool approval"
        );

        let message = BridgeMessage::ToolApprovalRequest(ApprovalRequest {
            request_id: request_id.clone(),
            stream_id: stream_id.clone(),
            tool_name: call.tool_name,
            tool_input: call.input,
            tool_use_id: call.tool_use_id,
        });
        if !self.registry.push(stream_id, Some(message)) {
            return PendingDecision::ready(PermissionDecision::deny(
                "The request stream is no longer open",
            ));
        }

        PendingDecision {
            state: PendingState::Waiting {
                rx,
                guard,
                stream_id: stream_id.clone(),
                timeout: self.policy.timeout,
            },
        }
    }

    /// Deliver the caller's answer.
    ///
    /// Unknown ids (never issued, already resolved, timed out or cancelled)
    /// are ignored. A known id echoes a `tool-approval-response` on its
    /// stream before the waiting tool call resumes.
    pub fn resolve(&self, response: ApprovalResponse) {
        let Some(pending) = lock(&self.pending).remove(&response.request_id) else {
            tracing::debug!(request_id = %response.request_id, "approval response for unknown request ignored");
            return;
        };

        tracing::debug!(
            stream_id = %pending.stream_id,
            request_id = %response.request_id,
            approved = response.approved,
            "tool approval resolved"
        );

        self.registry.push(
            &pending.stream_id,
            Some(BridgeMessage::ToolApprovalResponse(response.clone())),
        );

        let decision = response.into_decision(&pending.tool_input);
        if pending.tx.send(decision).is_err() {
            tracing::warn!(stream_id = %pending.stream_id, "approval receiver already dropped");
        }
    }

    /// Drop every approval pending on a stream. Returns how many were dropped.
    pub fn cancel_stream(&self, stream_id: &StreamId) -> usize {
        let mut pending = lock(&self.pending);
        let before = pending.len();
        pending.retain(|_, p| &p.stream_id != stream_id);
        let dropped = before - pending.len();
        if dropped > 0 {
            tracing::debug!(%stream_id, dropped, "pending approvals cancelled");
        }
        dropped
    }

    /// Drop the approval behind an agent permission request the agent withdrew.
    pub fn cancel_agent_request(&self, stream_id: &StreamId, agent_request_id: &str) -> bool {
        let mut pending = lock(&self.pending);
        let found = pending
            .iter()
            .find(|(_, p)| {
                &p.stream_id == stream_id && p.agent_request_id.as_deref() == Some(agent_request_id)
            })
            .map(|(id, _)| id.clone());
        match found {
            Some(id) => {
                pending.remove(&id);
                tracing::debug!(%stream_id, request_id = %id, agent_request_id, "agent withdrew approval request");
                true
            }
            None => false,
        }
    }

    /// Number of unresolved approvals.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

impl std::fmt::Debug for ApprovalCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalCoordinator")
            .field("policy", &self.policy)
            .field("pending", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Behavior;
    use futures::StreamExt;
    use serde_json::json;

    fn setup(policy: ApprovalPolicy) -> (Arc<ApprovalCoordinator>, Arc<StreamRegistry>, StreamId) {
        let registry = Arc::new(StreamRegistry::new());
        let id = StreamId::from("s");
        registry.open(&id).unwrap();
        let coordinator = Arc::new(ApprovalCoordinator::new(registry.clone(), policy));
        (coordinator, registry, id)
    }

    fn auto(tools: &[&str]) -> ApprovalPolicy {
        ApprovalPolicy {
            auto_approve: tools.iter().map(|t| t.to_string()).collect(),
            timeout: None,
        }
    }

    #[test]
    fn coordinator_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ApprovalCoordinator>();
    }

    #[tokio::test]
    async fn auto_approved_tool_skips_handshake() {
        let (coordinator, registry, id) = setup(auto(&["Bash"]));

        let decision = coordinator
            .request(&id, ToolCall::new("Bash", json!({"command": "ls"})))
            .await;
        assert_eq!(decision.behavior, Behavior::Allow);
        assert_eq!(decision.updated_input, Some(json!({"command": "ls"})));

        let decision = coordinator.request(&id, ToolCall::new("Bash", Value::Null)).await;
        assert_eq!(decision.updated_input, Some(json!({})));

        registry.push(&id, None);
        let messages: Vec<_> = registry.consume(&id).unwrap().collect().await;
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn request_id_round_trips() {
        let (coordinator, registry, id) = setup(ApprovalPolicy::default());
        let mut stream = registry.consume(&id).unwrap();

        let waiter = {
            let coordinator = coordinator.clone();
            let id = id.clone();
            tokio::spawn(async move {
                coordinator
                    .request(&id, ToolCall::new("Write", json!({"file_path": "a.txt"})))
                    .await
            })
        };

        let message = stream.next().await.unwrap().unwrap();
        let request = message.as_approval_request().unwrap().clone();
        assert_eq!(request.tool_name, "Write");
        assert_eq!(request.stream_id, id);
        assert_eq!(coordinator.pending_count(), 1);

        coordinator.resolve(ApprovalResponse::allow(request.request_id.clone()));
        let decision = waiter.await.unwrap();
        assert!(decision.is_allow());
        assert_eq!(decision.updated_input, Some(json!({"file_path": "a.txt"})));
        assert_eq!(coordinator.pending_count(), 0);

        let echo = stream.next().await.unwrap().unwrap();
        assert!(matches!(
            echo,
            BridgeMessage::ToolApprovalResponse(ref r) if r.request_id == request.request_id
        ));
    }

    #[tokio::test]
    async fn begin_publishes_before_returning() {
        let (coordinator, registry, id) = setup(auto(&["Read"]));

        let auto = coordinator.begin(&id, ToolCall::new("Read", json!({})));
        assert!(auto.request_id().is_none());

        let pending = coordinator.begin(&id, ToolCall::new("Edit", json!({})));
        let request_id = pending.request_id().cloned().unwrap();
        registry.push(&id, None);

        let messages: Vec<_> = registry.consume(&id).unwrap().collect().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].as_ref().unwrap().as_approval_request().unwrap().request_id,
            request_id
        );

        drop(pending);
        assert_eq!(coordinator.pending_count(), 0);
        assert!(auto.wait().await.is_allow());
    }

    #[tokio::test]
    async fn resolve_unknown_is_silent() {
        let (coordinator, registry, id) = setup(ApprovalPolicy::default());
        coordinator.resolve(ApprovalResponse::deny("nope", "no"));
        assert_eq!(coordinator.pending_count(), 0);

        registry.push(&id, None);
        let messages: Vec<_> = registry.consume(&id).unwrap().collect().await;
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn second_resolve_is_ignored() {
        let (coordinator, registry, id) = setup(ApprovalPolicy::default());
        let mut stream = registry.consume(&id).unwrap();

        let waiter = {
            let coordinator = coordinator.clone();
            let id = id.clone();
            tokio::spawn(async move { coordinator.request(&id, ToolCall::new("Bash", json!({}))).await })
        };
        let request_id = stream.next().await.unwrap().unwrap().as_approval_request().unwrap().request_id.clone();

        coordinator.resolve(ApprovalResponse::deny(request_id.clone(), "first"));
        coordinator.resolve(ApprovalResponse::allow(request_id));

        let decision = waiter.await.unwrap();
        assert_eq!(decision.message.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn cancel_stream_denies_waiters() {
        let (coordinator, registry, id) = setup(ApprovalPolicy::default());
        let mut stream = registry.consume(&id).unwrap();

        let waiter = {
            let coordinator = coordinator.clone();
            let id = id.clone();
            tokio::spawn(async move { coordinator.request(&id, ToolCall::new("Bash", json!({}))).await })
        };
        stream.next().await.unwrap().unwrap();

        assert_eq!(coordinator.cancel_stream(&id), 1);
        let decision = waiter.await.unwrap();
        assert_eq!(decision.behavior, Behavior::Deny);
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn agent_withdrawal_drops_matching_request() {
        let (coordinator, registry, id) = setup(ApprovalPolicy::default());
        let mut stream = registry.consume(&id).unwrap();

        let waiter = {
            let coordinator = coordinator.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let call = ToolCall {
                    agent_request_id: Some("cli-7".into()),
                    ..ToolCall::new("Bash", json!({}))
                };
                coordinator.request(&id, call).await
            })
        };
        let request_id = stream.next().await.unwrap().unwrap().as_approval_request().unwrap().request_id.clone();

        assert!(!coordinator.cancel_agent_request(&id, "cli-8"));
        assert!(coordinator.cancel_agent_request(&id, "cli-7"));
        assert_eq!(waiter.await.unwrap().behavior, Behavior::Deny);

        // a late answer is a no-op
        coordinator.resolve(ApprovalResponse::allow(request_id));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_denies() {
        let (coordinator, registry, id) = setup(ApprovalPolicy {
            timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let _stream = registry.consume(&id).unwrap();

        let decision = coordinator.request(&id, ToolCall::new("Bash", json!({}))).await;
        assert_eq!(decision.behavior, Behavior::Deny);
        assert!(decision.message.unwrap().contains("30 seconds"));
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn closed_stream_denies_without_pending_entry() {
        let (coordinator, registry, id) = setup(ApprovalPolicy::default());
        registry.push(&id, None);

        let decision = coordinator.request(&id, ToolCall::new("Bash", json!({}))).await;
        assert_eq!(decision.behavior, Behavior::Deny);
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn dropped_request_cleans_up() {
        let (coordinator, registry, id) = setup(ApprovalPolicy::default());
        let mut stream = registry.consume(&id).unwrap();

        let waiter = {
            let coordinator = coordinator.clone();
            let id = id.clone();
            tokio::spawn(async move { coordinator.request(&id, ToolCall::new("Bash", json!({}))).await })
        };
        stream.next().await.unwrap().unwrap();
        assert_eq!(coordinator.pending_count(), 1);

        waiter.abort();
        let _ = waiter.await;
        assert_eq!(coordinator.pending_count(), 0);
    }
}
