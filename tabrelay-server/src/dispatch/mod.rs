//! Inbound frame dispatch
//!
//! Every inbound frame goes through [`Dispatcher::dispatch`]. Replies are
//! routed to the correlator; everything else is matched against the frame
//! vocabulary and answered with exactly one reply when it carried a
//! request id.

pub mod executor;
pub mod status;


use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use tabrelay_protocol::{
    ErrorPayload, Frame, FrameType, ReplyBody, RequestId, ServerStartedPayload,
    ServerStoppedPayload, ToolCallPayload,
};
use tabrelay_utils::RelayError;

use crate::bridge::session::BridgeSession;
use crate::bridge::transport::InboundFrames;

pub use executor::{ServerLifecycle, ToolExecutor, ToolExecutionError};
pub use status::{FileStatusStore, MemoryStatusStore, ServerStatus, StatusStore, StatusTracker};

/// What the dispatcher did with a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// A reply settled a pending request
    Resolved,
    /// A reply that matched nothing pending
    Stale,
    /// Answered (or notified) inline
    Replied,
    /// Tool execution continues on its own task
    Spawned,
    /// Status recorded, no reply
    Recorded,
    /// Logged only
    Logged,
    /// Unknown or unusable frame, dropped
    Ignored,
}

#[derive(Clone)]
pub struct Dispatcher {
    session: Arc<BridgeSession>,
    tools: Option<Arc<dyn ToolExecutor>>,
    lifecycle: Option<Arc<dyn ServerLifecycle>>,
}

impl Dispatcher {
    pub fn new(session: Arc<BridgeSession>) -> Self {
        Self {
            session,
            tools: None,
            lifecycle: None,
        }
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolExecutor>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn ServerLifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    pub fn session(&self) -> &Arc<BridgeSession> {
        &self.session
    }

    /// Dispatch inbound frames in order until the channel closes
    pub async fn run(&self, mut inbound: InboundFrames) {
        while let Some(frame) = inbound.recv().await {
            self.dispatch(frame).await;
        }
        info!("Inbound queue closed; dispatcher stopping");
    }

    pub async fn dispatch(&self, frame: Frame) -> Handled {
        if frame.is_reply() {
            return if self.session.correlator().resolve(&frame) {
                Handled::Resolved
            } else {
                Handled::Stale
            };
        }

        let Frame {
            kind,
            request_id,
            payload,
            ..
        } = frame;

        match kind {
            FrameType::ToolCall => self.handle_tool_call(request_id, payload),
            FrameType::ToolListQuery => {
                let catalog = self
                    .tools
                    .as_ref()
                    .map(|tools| tools.catalog())
                    .unwrap_or_default();
                self.answer(request_id, &kind, ReplyBody::success(json!(catalog)))
                    .await;
                Handled::Replied
            }
            FrameType::ProcessData => {
                self.answer(request_id, &kind, ReplyBody::success(payload))
                    .await;
                Handled::Replied
            }
            FrameType::ServerStarted => {
                match serde_json::from_value::<ServerStartedPayload>(payload) {
                    Ok(started) => {
                        self.session.status().record_started(started.port);
                        Handled::Recorded
                    }
                    Err(e) => {
                        warn!("Ignoring server-started without a port: {}", e);
                        Handled::Ignored
                    }
                }
            }
            FrameType::ServerStopped => {
                self.session.status().record_stopped();
                Handled::Recorded
            }
            FrameType::Error => {
                let message = serde_json::from_value::<ErrorPayload>(payload.clone())
                    .map(|p| p.message)
                    .unwrap_or_else(|_| payload.to_string());
                error!(%message, "Peer reported an error");
                Handled::Logged
            }
            FrameType::Start | FrameType::Stop if self.lifecycle.is_some() => {
                self.handle_lifecycle(kind, request_id).await
            }
            other => {
                warn!(kind = %other, req_id = ?request_id, "Ignoring unrecognized frame");
                Handled::Ignored
            }
        }
    }

    fn handle_tool_call(&self, request_id: Option<RequestId>, payload: Value) -> Handled {
        let Some(tools) = self.tools.clone() else {
            let session = Arc::clone(&self.session);
            tokio::spawn(async move {
                let body = ReplyBody::failure("no tool executor is available");
                send_reply(&session, request_id, &FrameType::ToolCall, body).await;
            });
            return Handled::Spawned;
        };

        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            let body = match serde_json::from_value::<ToolCallPayload>(payload) {
                Ok(call) => run_tool(tools.as_ref(), call).await,
                Err(e) => ReplyBody::failure(format!("invalid tool-call payload: {}", e)),
            };
            send_reply(&session, request_id, &FrameType::ToolCall, body).await;
        });
        Handled::Spawned
    }

    async fn handle_lifecycle(&self, kind: FrameType, request_id: Option<RequestId>) -> Handled {
        let body = if kind == FrameType::Start {
            match self.start_server().await {
                Ok(port) => ReplyBody::success(json!({ "port": port })),
                Err(e) => ReplyBody::failure(format!("failed to start protocol server: {}", e)),
            }
        } else {
            match self.stop_server().await {
                Ok(port) => ReplyBody::success(json!({ "port": port })),
                Err(e) => ReplyBody::failure(format!("failed to stop protocol server: {}", e)),
            }
        };

        self.answer(request_id, &kind, body).await;
        Handled::Replied
    }

    /// Start the protocol server, record it, and tell the peer
    pub async fn start_server(&self) -> tabrelay_utils::Result<u16> {
        let lifecycle = self.lifecycle()?;
        match lifecycle.start().await {
            Ok(port) => {
                self.session.status().record_started(port);
                self.notify(FrameType::ServerStarted, json!(ServerStartedPayload { port }))
                    .await;
                Ok(port)
            }
            Err(e) => {
                error!("Failed to start protocol server: {}", e);
                let message = format!("failed to start protocol server: {}", e);
                self.notify(FrameType::Error, json!(ErrorPayload { message }))
                    .await;
                Err(e)
            }
        }
    }

    /// Stop the protocol server, record it, and tell the peer
    pub async fn stop_server(&self) -> tabrelay_utils::Result<Option<u16>> {
        let lifecycle = self.lifecycle()?;
        match lifecycle.stop().await {
            Ok(port) => {
                self.session.status().record_stopped();
                self.notify(FrameType::ServerStopped, json!(ServerStoppedPayload { port }))
                    .await;
                Ok(port)
            }
            Err(e) => {
                error!("Failed to stop protocol server: {}", e);
                Err(e)
            }
        }
    }

    fn lifecycle(&self) -> tabrelay_utils::Result<&Arc<dyn ServerLifecycle>> {
        self.lifecycle
            .as_ref()
            .ok_or_else(|| RelayError::internal("no server lifecycle configured"))
    }

    async fn answer(&self, request_id: Option<RequestId>, kind: &FrameType, body: ReplyBody) {
        send_reply(&self.session, request_id, kind, body).await;
    }

    async fn notify(&self, kind: FrameType, payload: Value) {
        if let Err(e) = self.session.notify(kind.clone(), payload).await {
            warn!(%kind, "Failed to send notification: {}", e);
        }
    }
}

async fn run_tool(tools: &dyn ToolExecutor, call: ToolCallPayload) -> ReplyBody {
    debug!(tool = %call.name, "Executing tool");
    let outcome = AssertUnwindSafe(tools.execute(&call.name, call.args))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(data)) => ReplyBody::success(data),
        Ok(Err(e)) => {
            warn!(tool = %call.name, "Tool failed: {}", e);
            ReplyBody::failure(e.message)
        }
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(tool = %call.name, %reason, "Tool panicked");
            ReplyBody::failure(format!("tool '{}' panicked: {}", call.name, reason))
        }
    }
}

/// Reply if the frame asked for one
async fn send_reply(
    session: &BridgeSession,
    request_id: Option<RequestId>,
    kind: &FrameType,
    body: ReplyBody,
) {
    let Some(request_id) = request_id else {
        return;
    };
    let Some(reply_kind) = kind.reply_type() else {
        return;
    };

    if let Err(e) = session.reply(request_id.clone(), reply_kind, body).await {
        warn!(req_id = %request_id, "Failed to send reply: {}", e);
    }
}
