//! tabrelay native host
//!
//! Relays MCP tool calls to the tabrelay browser extension over the
//! browser's native messaging channel.

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod host;
pub mod mcp;

pub use bridge::{BridgeError, BridgeSession, Endpoint, ToolBridge};
pub use config::{AppConfig, ConfigLoader};
pub use dispatch::{Dispatcher, StatusTracker};
pub use host::NativeHost;
