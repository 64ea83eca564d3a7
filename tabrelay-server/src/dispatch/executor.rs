//! Collaborators the dispatcher drives
//!
//! The dispatcher itself knows no tools and no servers. The extension
//! side plugs in a [`ToolExecutor`]; the native host plugs in a
//! [`ServerLifecycle`].

use async_trait::async_trait;
use serde_json::Value;

use tabrelay_utils::Result;

use crate::mcp::protocol::Tool;

/// A tool failed to run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ToolExecutionError {
    pub message: String,
}

impl ToolExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Runs named tools with JSON arguments
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// The static tool catalog
    fn catalog(&self) -> Vec<Tool>;

    async fn execute(&self, name: &str, args: Value) -> std::result::Result<Value, ToolExecutionError>;
}

/// Starts and stops the protocol server
#[async_trait]
pub trait ServerLifecycle: Send + Sync {
    /// Start serving, returning the bound port
    ///
    /// Starting a running server returns its port.
    async fn start(&self) -> Result<u16>;

    /// Stop serving, returning the port it was bound to, if any
    async fn stop(&self) -> Result<Option<u16>>;
}
