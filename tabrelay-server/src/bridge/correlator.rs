//! Request correlator
//!
//! Turns the fire-and-forget channel into independent request/reply
//! exchanges. Each request gets a fresh id and a timer; the first of
//! reply, timeout, or disconnect to reach the pending table settles it.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use tabrelay_protocol::{Frame, FrameType, ReplyBody, RequestId};

use super::error::BridgeError;
use super::pending::{PendingExchange, PendingTable, ReplyOutcome};
use super::transport::TransportAdapter;

/// Matches replies to the requests that caused them
#[derive(Debug, Default)]
pub struct Correlator {
    pending: Mutex<PendingTable>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request and submit it to the transport
    ///
    /// The returned [`PendingReply`] resolves with the reply data, or with
    /// the error that ended the exchange. If the transport refuses the
    /// frame the exchange is withdrawn and the error returned directly.
    pub async fn send(
        self: &Arc<Self>,
        transport: &TransportAdapter,
        kind: FrameType,
        payload: Value,
        timeout: Duration,
    ) -> Result<PendingReply, BridgeError> {
        let deadline = Instant::now() + timeout;
        let reply = self.register(kind.clone(), timeout);
        let frame = Frame::request(kind, reply.request_id.clone(), payload);

        // A stalled writer must not hold the caller past its deadline
        let sent = match tokio::time::timeout_at(deadline, transport.send(frame)).await {
            Ok(sent) => sent,
            Err(_) => Err(BridgeError::Timeout {
                request_id: reply.request_id.clone(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        if let Err(e) = sent {
            if let Some(exchange) = self.pending.lock().take(&reply.request_id) {
                exchange.settle(Err(e.clone()));
            }
            debug!(req_id = %reply.request_id, "Request not sent: {}", e);
            return Err(e);
        }

        Ok(reply)
    }

    /// Create a pending exchange and start its timer
    pub fn register(self: &Arc<Self>, kind: FrameType, timeout: Duration) -> PendingReply {
        let (reply_tx, rx) = oneshot::channel();

        let request_id = {
            let mut pending = self.pending.lock();
            let mut request_id = next_request_id();
            while pending.contains(&request_id) {
                request_id = next_request_id();
            }
            // Checked free under the same lock, so this cannot be refused
            let _ = pending.insert(PendingExchange::new(request_id.clone(), kind, reply_tx));
            request_id
        };

        let timer = tokio::spawn(expire_after(
            Arc::downgrade(self),
            request_id.clone(),
            timeout,
        ));
        self.pending.lock().attach_timer(&request_id, timer);

        debug!(req_id = %request_id, timeout_ms = timeout.as_millis() as u64, "Registered request");
        PendingReply { request_id, rx }
    }

    /// Route a reply frame to its pending exchange
    ///
    /// Returns false for frames that match nothing pending; those change
    /// no state.
    pub fn resolve(&self, frame: &Frame) -> bool {
        let Some(request_id) = frame.response_to_request_id.as_ref() else {
            return false;
        };

        let Some(exchange) = self.pending.lock().take(request_id) else {
            debug!(req_id = %request_id, kind = %frame.kind, "Discarding stale reply");
            return false;
        };

        let outcome = match serde_json::from_value::<ReplyBody>(frame.payload.clone()) {
            Ok(body) => body.into_result().map_err(BridgeError::Remote),
            Err(e) => Err(BridgeError::UnexpectedReply(e.to_string())),
        };

        debug!(
            req_id = %request_id,
            kind = %exchange.kind(),
            elapsed_ms = exchange.age().as_millis() as u64,
            ok = outcome.is_ok(),
            "Resolved request"
        );

        if !exchange.settle(outcome) {
            debug!(req_id = %request_id, "Requester stopped waiting before the reply arrived");
        }
        true
    }

    /// Fail every pending exchange with `err` and clear the table
    pub fn fail_all(&self, err: BridgeError) -> usize {
        let drained = self.pending.lock().drain();
        let count = drained.len();
        for exchange in drained {
            exchange.settle(Err(err.clone()));
        }
        if count > 0 {
            warn!(count, error = %err, "Failed all pending requests");
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_pending(&self, request_id: &RequestId) -> bool {
        self.pending.lock().contains(request_id)
    }

    fn expire(&self, request_id: &RequestId, timeout: Duration) {
        let Some(exchange) = self.pending.lock().take(request_id) else {
            return;
        };
        let timeout_ms = timeout.as_millis() as u64;
        warn!(req_id = %request_id, kind = %exchange.kind(), timeout_ms, "Request timed out");
        exchange.expire(Err(BridgeError::Timeout {
            request_id: request_id.clone(),
            timeout_ms,
        }));
    }
}

async fn expire_after(correlator: Weak<Correlator>, request_id: RequestId, timeout: Duration) {
    tokio::time::sleep(timeout).await;
    if let Some(correlator) = correlator.upgrade() {
        correlator.expire(&request_id, timeout);
    }
}

fn next_request_id() -> RequestId {
    RequestId::new(Uuid::new_v4().to_string())
}

/// Awaitable reply to one request
#[derive(Debug)]
pub struct PendingReply {
    request_id: RequestId,
    rx: oneshot::Receiver<ReplyOutcome>,
}

impl PendingReply {
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }
}

impl Future for PendingReply {
    type Output = ReplyOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(BridgeError::ChannelClosed)))
    }
}
