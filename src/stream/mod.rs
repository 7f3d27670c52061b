//! Streams: one ordered message channel per request.
//!
//! # Overview
//!
//! - [`StreamRegistry`] - the table of open streams the backend pushes into
//! - [`MessageStream`] - the single consumer of one stream
//! - [`BridgeMessage`] - what a stream carries
//! - [`CollectedResponse`] - a convenience type for collecting all messages
//!
//! # Lifecycle
//!
//! A stream is opened before the request is sent, receives messages until
//! the backend pushes end-of-stream or fails it, and is discarded once its
//! consumer has drained it. Pushes to a discarded id are ignored.

pub mod message;
pub mod registry;
pub mod response;

pub use message::{BridgeMessage, SessionInfo};
pub use registry::{StreamId, StreamRegistry};
pub use response::{with_timeout, CollectedResponse, MessageStream};
