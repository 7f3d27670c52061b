//! Multi-turn conversation sessions.
//!
//! The agent assigns a session id on the first answered turn. A [`Session`]
//! captures it and resumes it on every later turn, tracking usage and cost
//! across turns.
//!
//! # Example
//!
//! ```ignore
//! use claude_bridge::{ApprovalResponse, BridgeClient, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = BridgeClient::new()?;
//!     let session = client.start_session();
//!
//!     session.send_and_collect("My name is Alice").await?;
//!     let answer = session.send_and_collect("What's my name?").await?;
//!     println!("{}", answer);
//!
//!     // Answer tool approvals inline
//!     let response = session
//!         .send_with("Tidy up the README", |req| {
//!             ApprovalResponse::allow(req.request_id.clone())
//!         })
//!         .await?;
//!
//!     println!("Total cost: ${:.4}", session.total_cost_usd());
//!     Ok(())
//! }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::StreamExt;

use crate::approval::{ApprovalRequest, ApprovalResponse};
use crate::backend::Request;
use crate::client::BridgeClient;
use crate::config::SessionId;
use crate::protocol::Usage;
use crate::stream::{with_timeout, CollectedResponse, MessageStream};
use crate::Result;

/// Deny message used by [`Session::send`] for tools that need approval.
pub const UNATTENDED_DENY_MESSAGE: &str = "Tool use requires approval and no approver is attached";

#[derive(Debug, Default)]
struct Totals {
    session_id: Option<SessionId>,
    usage: Usage,
    cost_usd: f64,
    turns: u32,
}

/// A multi-turn conversation.
///
/// # Thread Safety
///
/// `Session` is `Send + Sync`. Concurrent turns are serialized so each one
/// resumes the session the previous turn left behind.
///
/// # Usage Tracking
///
/// Usage and cost are summed over every completed turn. Per turn, the
/// result message's cumulative figures are used when present.
#[derive(Debug)]
pub struct Session {
    client: BridgeClient,
    totals: Mutex<Totals>,
    turn_lock: tokio::sync::Mutex<()>,
}

impl Session {
    pub(crate) fn new(client: BridgeClient, resume: Option<SessionId>) -> Self {
        Self {
            client,
            totals: Mutex::new(Totals {
                session_id: resume,
                ..Default::default()
            }),
            turn_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn totals(&self) -> MutexGuard<'_, Totals> {
        self.totals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The session id, once a turn has been answered (or the one resumed).
    pub fn session_id(&self) -> Option<SessionId> {
        self.totals().session_id.clone()
    }

    /// Run one turn, denying every tool that is not auto-approved.
    pub async fn send(&self, prompt: &str) -> Result<CollectedResponse> {
        self.send_with(prompt, |req| {
            ApprovalResponse::deny(req.request_id.clone(), UNATTENDED_DENY_MESSAGE)
        })
        .await
    }

    /// Run one turn, answering approval requests with `decide`.
    pub async fn send_with<F>(&self, prompt: &str, decide: F) -> Result<CollectedResponse>
    where
        F: FnMut(&ApprovalRequest) -> ApprovalResponse + Send,
    {
        let _turn = self.turn_lock.lock().await;

        let mut request = Request::new(prompt);
        request.resume = self.session_id();

        let stream = self.client.stream(request, None)?;
        let id = stream.id().clone();
        let collected = match self.client.config().timeout() {
            Some(limit) => {
                let collected = with_timeout(limit, self.drive(stream, decide)).await;
                if collected.is_err() {
                    self.client.cancel(&id);
                }
                collected?
            }
            None => self.drive(stream, decide).await?,
        };

        let mut totals = self.totals();
        if let Some(session_id) = collected.session_id.clone() {
            totals.session_id = Some(session_id);
        }
        totals.usage.accumulate(&collected.usage);
        totals.cost_usd += collected.cost_usd.unwrap_or(0.0);
        totals.turns += 1;
        tracing::debug!(
            session_id = ?totals.session_id,
            turns = totals.turns,
            cost_usd = totals.cost_usd,
            "session turn completed"
        );

        Ok(collected)
    }

    async fn drive<F>(&self, mut stream: MessageStream, mut decide: F) -> Result<CollectedResponse>
    where
        F: FnMut(&ApprovalRequest) -> ApprovalResponse + Send,
    {
        let mut collected = CollectedResponse::default();
        while let Some(message) = stream.next().await {
            let message = message?;
            if let Some(request) = message.as_approval_request() {
                self.client.respond_to_approval(decide(request));
            }
            collected.record(message);
        }
        collected.session_id = stream.session_id().cloned();
        Ok(collected)
    }

    /// Run one turn and return its text.
    pub async fn send_and_collect(&self, prompt: &str) -> Result<String> {
        self.send(prompt).await?.into_text()
    }

    /// Usage summed over all turns.
    pub fn total_usage(&self) -> Usage {
        self.totals().usage.clone()
    }

    /// Cost in USD summed over all turns.
    pub fn total_cost_usd(&self) -> f64 {
        self.totals().cost_usd
    }

    /// Number of completed turns.
    pub fn turns(&self) -> u32 {
        self.totals().turns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Session>();
    }

    #[test]
    fn totals_start_empty() {
        let totals = Totals::default();
        assert!(totals.session_id.is_none());
        assert_eq!(totals.usage.total_tokens(), 0);
        assert_eq!(totals.turns, 0);
    }
}
