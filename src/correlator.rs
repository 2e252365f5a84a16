//! Correlator (component E).
//!
//! Grounded on `codex::mcp::jsonrpc::JsonRpcTransport`: an atomic id
//! counter, a `PendingRequests`-shaped table of oneshot waiters, and a
//! single writer channel that funnels every outbound frame (requests,
//! notifications, and cancel notifications) through one path, preserving
//! wire order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::cancellation::CancellationToken;
use crate::error::RpcError;
use crate::protocol::{Message, RequestId};

type PendingTable = Mutex<HashMap<RequestId, oneshot::Sender<Result<Value, RpcError>>>>;

/// Allocates outbound request ids, tracks in-flight calls, and funnels
/// outbound frames through a single writer channel.
pub struct Correlator {
    next_id: AtomicI64,
    pending: PendingTable,
    writer: mpsc::UnboundedSender<Message>,
}

impl Correlator {
    pub fn new(writer: mpsc::UnboundedSender<Message>) -> Self {
        Correlator {
            next_id: AtomicI64::new(1),
            pending: Mutex::new(HashMap::new()),
            writer,
        }
    }

    /// Issue an outbound request and await its response. `params` must
    /// already have been passed through the serializer facade by the
    /// caller.
    pub async fn invoke(
        &self,
        method: &str,
        params: Value,
        token: CancellationToken,
    ) -> Result<Value, RpcError> {
        if token.is_cancelled() {
            return Err(RpcError::Canceled);
        }

        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id.clone(), tx);
        }

        let message = Message::request(id.clone(), method, params);
        if self.writer.send(message).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(RpcError::InvalidOperation(
                "sending stream is no longer available".into(),
            ));
        }

        // Register the cancellation hook only after the request frame has
        // been enqueued, so a cancel notification can never precede it on
        // the wire.
        let writer = self.writer.clone();
        let cancel_id = id.clone();
        token.on_cancel(move || {
            let _ = writer.send(Message::cancel(cancel_id));
        });

        rx.await.unwrap_or_else(|_| Err(RpcError::disconnected_for(&id)))
    }

    /// Emit a notification; never creates a pending slot.
    pub fn notify(&self, method: &str, params: Value) -> Result<(), RpcError> {
        self.writer
            .send(Message::notification(method, params))
            .map_err(|_| RpcError::InvalidOperation("sending stream is no longer available".into()))
    }

    /// Complete a pending call from an inbound response. Responses for
    /// unknown/already-completed ids are dropped silently, which gives
    /// at-most-once delivery for free.
    pub async fn complete(&self, id: RequestId, result: Result<Value, RpcError>) {
        let waiter = self.pending.lock().await.remove(&id);
        if let Some(waiter) = waiter {
            let _ = waiter.send(result);
        }
    }

    /// Fail every outstanding call with a disconnection error.
    pub async fn disconnect_all(&self, description: &str) {
        let mut pending = self.pending.lock().await;
        for (_, waiter) in pending.drain() {
            let _ = waiter.send(Err(RpcError::Disconnected(description.to_string())));
        }
    }
}
