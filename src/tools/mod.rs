//! Tool observation.
//!
//! The agent runs tools itself; this module lets callers watch tool calls
//! and their results as they pass through a stream, e.g. to track edits.
//! Observer failures never reach the stream.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use claude_bridge::{BridgeClient, LoggingObserver};
//!
//! let client = BridgeClient::builder()
//!     .tool_observer(Arc::new(LoggingObserver::new()))
//!     .build()?;
//! ```

mod observer;

pub(crate) use observer::ObserverDispatch;
pub use observer::{LogLevel, LoggingObserver, ObserverError, ToolObserver, ToolOutcome, ToolUse};
