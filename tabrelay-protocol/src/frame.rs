//! Frame types exchanged between the native host and the extension

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque request identifier
///
/// Present on requests as `requestId` and echoed on the matching reply as
/// `responseToRequestId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Frame type vocabulary
///
/// Both ends must agree on this list. Names outside it are preserved in
/// [`FrameType::Unrecognized`] so the receiver can log what it ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FrameType {
    /// Ask the native host to start the protocol server
    Start,
    /// Ask the native host to stop the protocol server
    Stop,
    /// Ask the extension for its tool catalog
    ToolListQuery,
    /// Reply to [`FrameType::ToolListQuery`]
    ToolListResult,
    /// Ask the extension to run a tool
    ToolCall,
    /// Reply to [`FrameType::ToolCall`]
    ToolCallResult,
    /// Echo request used for channel checks
    ProcessData,
    /// Reply to [`FrameType::ProcessData`]
    ProcessDataResult,
    /// The protocol server is listening
    ServerStarted,
    /// The protocol server has stopped
    ServerStopped,
    /// An error reported by the native host
    Error,
    /// A type name neither end knows about
    Unrecognized(String),
}

impl FrameType {
    /// Wire name of this frame type
    pub fn as_str(&self) -> &str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::ToolListQuery => "tool-list-query",
            Self::ToolListResult => "tool-list-result",
            Self::ToolCall => "tool-call",
            Self::ToolCallResult => "tool-call-result",
            Self::ProcessData => "process-data",
            Self::ProcessDataResult => "process-data-result",
            Self::ServerStarted => "server-started",
            Self::ServerStopped => "server-stopped",
            Self::Error => "error",
            Self::Unrecognized(name) => name,
        }
    }

    /// Frame type used when replying to a request of this type
    pub fn reply_type(&self) -> Option<FrameType> {
        match self {
            Self::ToolListQuery => Some(Self::ToolListResult),
            Self::ToolCall => Some(Self::ToolCallResult),
            Self::ProcessData => Some(Self::ProcessDataResult),
            Self::Start => Some(Self::ServerStarted),
            Self::Stop => Some(Self::ServerStopped),
            _ => None,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl From<String> for FrameType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "start" => Self::Start,
            "stop" => Self::Stop,
            "tool-list-query" => Self::ToolListQuery,
            "tool-list-result" => Self::ToolListResult,
            "tool-call" => Self::ToolCall,
            "tool-call-result" => Self::ToolCallResult,
            "process-data" => Self::ProcessData,
            "process-data-result" => Self::ProcessDataResult,
            "server-started" => Self::ServerStarted,
            "server-stopped" => Self::ServerStopped,
            "error" | "error-from-native-host" => Self::Error,
            _ => Self::Unrecognized(name),
        }
    }
}

impl From<FrameType> for String {
    fn from(kind: FrameType) -> Self {
        match kind {
            FrameType::Unrecognized(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of channel traffic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: FrameType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_to_request_id: Option<RequestId>,
    #[serde(default)]
    pub payload: Value,
}

impl Frame {
    /// Frame that expects no reply
    pub fn notification(kind: FrameType, payload: Value) -> Self {
        Self {
            kind,
            request_id: None,
            response_to_request_id: None,
            payload,
        }
    }

    /// Frame that expects exactly one correlated reply
    pub fn request(kind: FrameType, request_id: RequestId, payload: Value) -> Self {
        Self {
            kind,
            request_id: Some(request_id),
            response_to_request_id: None,
            payload,
        }
    }

    /// Reply to the request identified by `to`
    pub fn reply(kind: FrameType, to: RequestId, body: ReplyBody) -> Self {
        Self {
            kind,
            request_id: None,
            response_to_request_id: Some(to),
            payload: body.into_value(),
        }
    }

    pub fn is_reply(&self) -> bool {
        self.response_to_request_id.is_some()
    }
}

/// Outcome marker carried by every reply payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Success,
    Error,
}

/// Payload of a reply frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyBody {
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReplyBody {
    pub fn success(data: Value) -> Self {
        Self {
            status: ReplyStatus::Success,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Split into the reply data or the reported error message
    pub fn into_result(self) -> Result<Value, String> {
        match self.status {
            ReplyStatus::Success => Ok(self.data.unwrap_or(Value::Null)),
            ReplyStatus::Error => Err(self
                .error
                .unwrap_or_else(|| "remote reported an error without a message".to_string())),
        }
    }

    fn into_value(self) -> Value {
        // Derived Serialize for a struct of Value/String/enum fields cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Payload of a `tool-call` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPayload {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// Payload of a `server-started` notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStartedPayload {
    pub port: u16,
}

/// Payload of a `server-stopped` notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerStoppedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Payload of an `error` notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_type_wire_names() {
        let frame = Frame::notification(FrameType::ToolListQuery, json!({}));
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "tool-list-query");
        assert!(value.get("requestId").is_none());
        assert!(value.get("responseToRequestId").is_none());
    }

    #[test]
    fn test_legacy_error_name_maps_to_error() {
        let frame: Frame =
            serde_json::from_value(json!({"type": "error-from-native-host", "payload": {}}))
                .unwrap();
        assert_eq!(frame.kind, FrameType::Error);
    }

    #[test]
    fn test_unrecognized_type_keeps_name() {
        let frame: Frame = serde_json::from_value(json!({"type": "reload-tab"})).unwrap();
        assert_eq!(frame.kind, FrameType::Unrecognized("reload-tab".into()));
        assert!(!frame.kind.is_recognized());
        assert_eq!(frame.payload, Value::Null);

        let back = serde_json::to_value(&frame).unwrap();
        assert_eq!(back["type"], "reload-tab");
    }

    #[test]
    fn test_request_and_reply_ids_use_camel_case() {
        let request = Frame::request(
            FrameType::ToolCall,
            RequestId::from("abc"),
            json!({"name": "screenshot", "args": {}}),
        );
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["requestId"], "abc");

        let reply = Frame::reply(
            FrameType::ToolCallResult,
            RequestId::from("abc"),
            ReplyBody::success(json!("ok")),
        );
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["responseToRequestId"], "abc");
        assert_eq!(value["payload"]["status"], "success");
        assert!(reply.is_reply());
    }

    #[test]
    fn test_reply_types() {
        assert_eq!(FrameType::ToolCall.reply_type(), Some(FrameType::ToolCallResult));
        assert_eq!(FrameType::ToolListQuery.reply_type(), Some(FrameType::ToolListResult));
        assert_eq!(FrameType::ProcessData.reply_type(), Some(FrameType::ProcessDataResult));
        assert_eq!(FrameType::ServerStarted.reply_type(), None);
    }

    #[test]
    fn test_reply_body_into_result() {
        assert_eq!(ReplyBody::success(json!(1)).into_result(), Ok(json!(1)));
        assert_eq!(
            ReplyBody::failure("tab closed").into_result(),
            Err("tab closed".to_string())
        );

        let bare: ReplyBody = serde_json::from_value(json!({"status": "error"})).unwrap();
        assert!(bare.into_result().unwrap_err().contains("without a message"));
    }

    #[test]
    fn test_tool_call_payload_defaults_args() {
        let payload: ToolCallPayload =
            serde_json::from_value(json!({"name": "get_tabs"})).unwrap();
        assert_eq!(payload.name, "get_tabs");
        assert_eq!(payload.args, Value::Null);
    }
}
