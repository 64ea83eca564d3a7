//! Pending-request table
//!
//! Every outstanding request owns one [`PendingExchange`]. An exchange is
//! removed from the table by whichever of reply, timeout, or disconnect
//! reaches it first, and settling consumes it, so it can only ever be
//! resolved once.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use tabrelay_protocol::{FrameType, RequestId};

use super::error::BridgeError;

/// Outcome delivered to the waiting requester
pub type ReplyOutcome = Result<Value, BridgeError>;

/// One outstanding request awaiting its reply
#[derive(Debug)]
pub struct PendingExchange {
    request_id: RequestId,
    kind: FrameType,
    reply_tx: oneshot::Sender<ReplyOutcome>,
    timer: Option<JoinHandle<()>>,
    created_at: Instant,
}

impl PendingExchange {
    pub fn new(request_id: RequestId, kind: FrameType, reply_tx: oneshot::Sender<ReplyOutcome>) -> Self {
        Self {
            request_id,
            kind,
            reply_tx,
            timer: None,
            created_at: Instant::now(),
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn kind(&self) -> &FrameType {
        &self.kind
    }

    /// Time since the request was registered
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Resolve the exchange and cancel its timer
    ///
    /// Returns false if the requester stopped waiting.
    pub fn settle(mut self, outcome: ReplyOutcome) -> bool {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.reply_tx.send(outcome).is_ok()
    }

    /// Resolve the exchange from inside its own timer task
    pub fn expire(mut self, outcome: ReplyOutcome) -> bool {
        // Aborting here would cancel the task that is running us
        self.timer.take();
        self.reply_tx.send(outcome).is_ok()
    }
}

/// Map from request id to its outstanding exchange
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<RequestId, PendingExchange>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an exchange
    ///
    /// Refuses to replace a live exchange with the same id and hands the
    /// new one back instead.
    pub fn insert(&mut self, exchange: PendingExchange) -> Result<(), PendingExchange> {
        if self.entries.contains_key(&exchange.request_id) {
            return Err(exchange);
        }
        self.entries.insert(exchange.request_id.clone(), exchange);
        Ok(())
    }

    /// Attach the timeout task to a registered exchange
    ///
    /// If the exchange already settled the timer is aborted instead.
    pub fn attach_timer(&mut self, request_id: &RequestId, timer: JoinHandle<()>) {
        match self.entries.get_mut(request_id) {
            Some(exchange) => exchange.timer = Some(timer),
            None => timer.abort(),
        }
    }

    /// Remove and return the exchange for `request_id`
    pub fn take(&mut self, request_id: &RequestId) -> Option<PendingExchange> {
        self.entries.remove(request_id)
    }

    /// Remove every exchange
    pub fn drain(&mut self) -> Vec<PendingExchange> {
        self.entries.drain().map(|(_, exchange)| exchange).collect()
    }

    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.entries.contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
