//! Consumer side of a stream.
//!
//! This module provides [`MessageStream`], which implements [`futures::Stream`]
//! to yield [`BridgeMessage`]s for one request.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::time::timeout as tokio_timeout;

use super::message::{BridgeMessage, SessionInfo};
use super::registry::{StreamId, StreamItem};
use crate::approval::ApprovalRequest;
use crate::config::SessionId;
use crate::protocol::{AssistantMessage, ResultMessage, Usage};
use crate::{Error, Result};

/// The messages of one request, in arrival order.
///
/// The stream is forward-only: each message is yielded once. It ends after
/// the backend's end-of-stream, or after yielding the single terminal error.
///
/// # Example
///
/// ```ignore
/// use futures::StreamExt;
/// use claude_bridge::{ApprovalResponse, BridgeMessage};
///
/// let mut stream = client.consume(&stream_id)?;
/// while let Some(message) = stream.next().await {
///     match message? {
///         BridgeMessage::Assistant(a) => print!("{}", a.message.text()),
///         BridgeMessage::ToolApprovalRequest(req) => {
///             client.respond_to_approval(ApprovalResponse::allow(req.request_id));
///         }
///         _ => {}
///     }
/// }
/// ```
pub struct MessageStream {
    id: StreamId,
    rx: mpsc::UnboundedReceiver<StreamItem>,
    finished: bool,
    session_id: Option<SessionId>,
    session_info: Option<SessionInfo>,
}

impl MessageStream {
    pub(crate) fn new(id: StreamId, rx: mpsc::UnboundedReceiver<StreamItem>) -> Self {
        Self {
            id,
            rx,
            finished: false,
            session_id: None,
            session_info: None,
        }
    }

    /// The stream's correlation id.
    pub fn id(&self) -> &StreamId {
        &self.id
    }

    /// Session id for resuming this conversation.
    ///
    /// Set from the first assistant message only; a session without an
    /// answered turn cannot be resumed.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Metadata from the `init` message, once seen.
    pub fn session_info(&self) -> Option<&SessionInfo> {
        self.session_info.as_ref()
    }

    fn observe(&mut self, message: &BridgeMessage) {
        match message {
            BridgeMessage::Assistant(a) if self.session_id.is_none() => {
                self.session_id = a.session_id.clone().map(SessionId::from);
            }
            BridgeMessage::System(_) if self.session_info.is_none() => {
                self.session_info = message.session_info();
            }
            _ => {}
        }
    }

    /// Collect all assistant text, ignoring other messages.
    ///
    /// Approval requests are not answered here; use [`collect_all`] only on
    /// streams whose tools are auto-approved.
    ///
    /// [`collect_all`]: MessageStream::collect_all
    pub async fn collect_text(self) -> Result<String> {
        self.collect_all().await?.into_text()
    }

    /// Drain the stream into a [`CollectedResponse`].
    pub async fn collect_all(mut self) -> Result<CollectedResponse> {
        use futures::StreamExt;

        let mut response = CollectedResponse::default();
        while let Some(message) = self.next().await {
            response.record(message?);
        }
        response.session_id = self.session_id.take();
        Ok(response)
    }
}

impl Stream for MessageStream {
    type Item = Result<BridgeMessage>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(message))) => {
                this.observe(&message);
                Poll::Ready(Some(Ok(message)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStream")
            .field("id", &self.id)
            .field("finished", &self.finished)
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// Everything a finished stream delivered.
#[derive(Debug, Clone, Default)]
pub struct CollectedResponse {
    /// Session id captured from the first assistant message.
    pub session_id: Option<SessionId>,
    /// All assistant text concatenated.
    pub text: String,
    /// All assistant messages in order.
    pub messages: Vec<AssistantMessage>,
    /// Approval requests seen on the stream.
    pub approvals: Vec<ApprovalRequest>,
    /// Every message in order.
    pub all: Vec<BridgeMessage>,
    /// Final result message.
    pub result: Option<ResultMessage>,
    /// Total usage; the result's cumulative figure when present.
    pub usage: Usage,
    /// Total cost in USD.
    pub cost_usd: Option<f64>,
}

impl CollectedResponse {
    /// Fold one message into the totals.
    pub(crate) fn record(&mut self, message: BridgeMessage) {
        match &message {
            BridgeMessage::Assistant(a) => {
                self.text.push_str(&a.message.text());
                if let Some(ref usage) = a.message.usage {
                    self.usage.accumulate(usage);
                }
                self.messages.push(a.clone());
            }
            BridgeMessage::ToolApprovalRequest(req) => {
                self.approvals.push(req.clone());
            }
            BridgeMessage::Result(result) => {
                if let Some(ref usage) = result.usage {
                    self.usage = usage.clone();
                }
                self.cost_usd = result.total_cost_usd;
                self.result = Some(result.clone());
            }
            _ => {}
        }
        self.all.push(message);
    }

    /// The text, or the error the agent ended with.
    pub fn into_text(self) -> Result<String> {
        if let Some(result) = self.result.as_ref().filter(|r| r.is_error()) {
            return Err(Error::CliError {
                message: result
                    .result
                    .clone()
                    .unwrap_or_else(|| result.subtype.clone()),
            });
        }
        Ok(self.text)
    }

    /// Check if the response was successful.
    pub fn is_success(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.is_success())
    }

    /// Get the final text result from the result message.
    pub fn result_text(&self) -> Option<&str> {
        self.result.as_ref().and_then(|r| r.result.as_deref())
    }
}

/// Run a future with a timeout.
///
/// Returns an error if the future doesn't complete within the specified duration.
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio_timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(duration)),
    }
}
