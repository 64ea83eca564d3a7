//! Tool bridge
//!
//! The two calls the MCP endpoint needs from the extension, each carried
//! as one correlated request over the bridge session.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use tabrelay_protocol::FrameType;

use super::error::BridgeError;
use super::session::BridgeSession;
use crate::mcp::protocol::{Tool, ToolContent, ToolResult};

/// How long a tool request may wait for the extension
pub const TOOL_REQUEST_TIMEOUT: Duration = Duration::from_millis(30_000);

#[derive(Clone)]
pub struct ToolBridge {
    session: Arc<BridgeSession>,
    timeout: Duration,
}

impl ToolBridge {
    pub fn new(session: Arc<BridgeSession>) -> Self {
        Self {
            session,
            timeout: TOOL_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn session(&self) -> &Arc<BridgeSession> {
        &self.session
    }

    /// Ask the extension for its tool catalog
    ///
    /// Timeouts and channel failures are returned to the caller.
    pub async fn list_tools(&self) -> Result<Vec<Tool>, BridgeError> {
        let data = self
            .session
            .request(FrameType::ToolListQuery, json!({}), self.timeout)
            .await?;

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Catalog {
            Bare(Vec<Tool>),
            Wrapped { tools: Vec<Tool> },
        }

        match serde_json::from_value::<Catalog>(data) {
            Ok(Catalog::Bare(tools)) | Ok(Catalog::Wrapped { tools }) => Ok(tools),
            Err(e) => Err(BridgeError::UnexpectedReply(format!(
                "tool catalog is malformed: {}",
                e
            ))),
        }
    }

    /// Run a tool in the extension
    ///
    /// Never fails: any error comes back as a result flagged `isError`.
    pub async fn call_tool(&self, name: &str, args: Value) -> ToolResult {
        info!(tool = %name, "Forwarding tool call");

        match self
            .session
            .request(
                FrameType::ToolCall,
                json!({ "name": name, "args": args }),
                self.timeout,
            )
            .await
        {
            Ok(data) => into_tool_result(data),
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool call failed");
                ToolResult::error(describe_failure(name, &e))
            }
        }
    }
}

fn into_tool_result(data: Value) -> ToolResult {
    match data {
        Value::Null => ToolResult {
            content: Vec::new(),
            is_error: None,
        },
        Value::String(text) => ToolResult::text(text),
        Value::Object(ref map) if map.get("content").is_some_and(Value::is_array) => {
            match serde_json::from_value::<ToolResult>(data.clone()) {
                Ok(result) => result,
                Err(_) => pretty(&data),
            }
        }
        other => pretty(&other),
    }
}

fn pretty(value: &Value) -> ToolResult {
    ToolResult {
        content: vec![ToolContent::Text {
            text: serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
        }],
        is_error: None,
    }
}

fn describe_failure(name: &str, err: &BridgeError) -> String {
    match err {
        BridgeError::Timeout { timeout_ms, .. } => format!(
            "Tool '{}' did not respond within {}ms",
            name, timeout_ms
        ),
        BridgeError::Remote(message) => format!("Tool '{}' failed: {}", name, message),
        e if e.is_connection_error() => format!(
            "Tool '{}' could not run: the browser extension is not connected ({})",
            name, e
        ),
        e => format!("Tool '{}' failed: {}", name, e),
    }
}
