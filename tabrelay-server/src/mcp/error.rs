//! MCP error types

use super::protocol::JsonRpcError;
use crate::bridge::BridgeError;

/// MCP endpoint errors
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// The request could not be carried to the browser extension
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<McpError> for JsonRpcError {
    fn from(err: McpError) -> Self {
        match err {
            McpError::Json(err) => {
                JsonRpcError::new(JsonRpcError::PARSE_ERROR, format!("JSON error: {}", err))
            }
            McpError::InvalidRequest(msg) => JsonRpcError::new(JsonRpcError::INVALID_REQUEST, msg),
            McpError::MethodNotFound(method) => JsonRpcError::new(
                JsonRpcError::METHOD_NOT_FOUND,
                format!("Method not found: {}", method),
            ),
            McpError::InvalidParams(msg) => JsonRpcError::new(JsonRpcError::INVALID_PARAMS, msg),
            McpError::Bridge(err @ BridgeError::Timeout { .. }) => {
                JsonRpcError::new(JsonRpcError::EXTENSION_TIMEOUT, err.to_string())
            }
            McpError::Bridge(err) if err.is_connection_error() => {
                JsonRpcError::new(JsonRpcError::EXTENSION_UNAVAILABLE, err.to_string())
            }
            McpError::Bridge(err) => JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, err.to_string()),
            McpError::Internal(msg) => JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, msg),
        }
    }
}
