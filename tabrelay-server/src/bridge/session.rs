//! Bridge session
//!
//! One per process: the pending-request table (inside the correlator),
//! the channel and its connection state (inside the transport), and the
//! protocol server status. Everything that talks over the channel holds
//! an `Arc<BridgeSession>`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use tabrelay_protocol::{Frame, FrameType, ReplyBody, RequestId};

use super::correlator::{Correlator, PendingReply};
use super::error::BridgeError;
use super::transport::{ConnectionState, Endpoint, InboundFrames, TransportAdapter};
use crate::dispatch::status::StatusTracker;

pub struct BridgeSession {
    correlator: Arc<Correlator>,
    transport: TransportAdapter,
    status: StatusTracker,
}

impl BridgeSession {
    pub fn new(status: StatusTracker) -> Arc<Self> {
        Self::with_transport(status, |transport| transport)
    }

    /// Build a session, letting the caller tune the transport
    pub fn with_transport(
        status: StatusTracker,
        configure: impl FnOnce(TransportAdapter) -> TransportAdapter,
    ) -> Arc<Self> {
        let correlator = Arc::new(Correlator::new());
        let transport = configure(TransportAdapter::new(Arc::clone(&correlator)));
        Arc::new(Self {
            correlator,
            transport,
            status,
        })
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    pub fn transport(&self) -> &TransportAdapter {
        &self.transport
    }

    pub fn status(&self) -> &StatusTracker {
        &self.status
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub async fn open(&self, endpoint: &Endpoint) -> Result<InboundFrames, BridgeError> {
        self.transport.open(endpoint).await
    }

    pub async fn close(&self) {
        self.transport.close().await
    }

    /// Send a request without waiting for its reply
    pub async fn submit(
        &self,
        kind: FrameType,
        payload: Value,
        timeout: Duration,
    ) -> Result<PendingReply, BridgeError> {
        self.correlator
            .send(&self.transport, kind, payload, timeout)
            .await
    }

    /// Send a request and wait for its reply
    pub async fn request(
        &self,
        kind: FrameType,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, BridgeError> {
        self.submit(kind, payload, timeout).await?.await
    }

    /// Send a frame that expects no reply
    pub async fn notify(&self, kind: FrameType, payload: Value) -> Result<(), BridgeError> {
        debug!(%kind, "Sending notification");
        self.transport
            .send(Frame::notification(kind, payload))
            .await
    }

    /// Answer the request identified by `to`
    pub async fn reply(
        &self,
        to: RequestId,
        kind: FrameType,
        body: ReplyBody,
    ) -> Result<(), BridgeError> {
        debug!(req_id = %to, %kind, status = ?body.status, "Sending reply");
        match self
            .transport
            .send(Frame::reply(kind.clone(), to.clone(), body))
            .await
        {
            Err(BridgeError::FrameTooLarge { size, max }) => {
                warn!(req_id = %to, %kind, size, max, "Reply too large; sending a failure instead");
                let body = ReplyBody::failure(format!(
                    "reply too large for the channel: {} bytes (max {})",
                    size, max
                ));
                self.transport.send(Frame::reply(kind, to, body)).await
            }
            other => other,
        }
    }
}
