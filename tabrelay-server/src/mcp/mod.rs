//! MCP endpoint exposing the extension's tools
//!
//! A minimal MCP server over HTTP: `initialize`, `ping`, `tools/list`, and
//! `tools/call`, the last two forwarded to the browser extension.

pub mod error;
pub mod protocol;
pub mod server;

pub use error::McpError;
pub use server::{McpHandler, McpServerControl};
