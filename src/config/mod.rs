//! Configuration for the bridge.
//!
//! This module provides:
//!
//! - [`BridgeConfig`] and [`BridgeConfigBuilder`] for configuring the bridge
//! - [`resolve_cli`] for locating the Claude CLI before any stream is opened
//! - Type-safe options like [`Model`], [`PermissionMode`], and [`SessionId`]
//! - Built-in tool constants in [`tools`]
//!
//! # Example
//!
//! ```ignore
//! use claude_bridge::config::{resolve_cli, tools, BridgeConfig, Model};
//!
//! let config = BridgeConfig::builder()
//!     .model(Model::Sonnet)
//!     .auto_approve_tools([tools::READ, tools::GREP])
//!     .build()?;
//!
//! let cli = resolve_cli(&config)?;
//! ```

pub mod builder;
pub mod options;
pub mod resolve;

pub use builder::{BridgeConfig, BridgeConfigBuilder, ENV_API_KEY};
pub use options::{tools, Model, PermissionMode, SessionId};
pub use resolve::{resolve_cli, DEFAULT_CLI_NAME};
