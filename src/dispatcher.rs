//! Dispatcher (component F).
//!
//! Grounded on `codex::mcp::jsonrpc::reader_task`'s decode-then-branch
//! loop, generalized to also invoke a local target: `codex`'s own reader
//! only ever sees notifications and responses (it drives a client-only
//! transport), so the request branch and the inbound-cancellation table
//! are new here.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::binder;
use crate::cancellation::{CancellationToken, CancellationTrigger};
use crate::correlator::Correlator;
use crate::error::RpcError;
use crate::lifecycle::Lifecycle;
use crate::protocol::{ErrorData, Message, Params, RequestId, ERROR_METHOD_NOT_FOUND, METHOD_CANCEL};
use crate::registry::MethodRegistry;
use crate::serializer::Serializer;

/// Fallback JSON-RPC error code for target execution failures that carry
/// no platform-specific code.
const ERROR_INTERNAL: i64 = -32000;

pub struct Dispatcher {
    registry: Arc<MethodRegistry>,
    serializer: Arc<Serializer>,
    correlator: Option<Arc<Correlator>>,
    writer: Option<mpsc::UnboundedSender<Message>>,
    lifecycle: Arc<Lifecycle>,
    inbound_cancellations: Mutex<HashMap<RequestId, CancellationTrigger>>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<MethodRegistry>,
        serializer: Arc<Serializer>,
        correlator: Option<Arc<Correlator>>,
        writer: Option<mpsc::UnboundedSender<Message>>,
        lifecycle: Arc<Lifecycle>,
    ) -> Self {
        Dispatcher {
            registry,
            serializer,
            correlator,
            writer,
            lifecycle,
            inbound_cancellations: Mutex::new(HashMap::new()),
        }
    }

    /// Route one decoded envelope: request, notification, or response.
    pub async fn handle_message(&self, message: Message) {
        match message {
            Message::Request { id, method, params } => {
                self.handle_request(id, method, params).await;
            }
            Message::Notification { method, params } => {
                self.handle_notification(method, params).await;
            }
            Message::Success { id, result } => {
                self.complete(id, Ok(self.serializer.from_wire(result))).await;
            }
            Message::Error { id, error } => {
                let result = if error.code == ERROR_METHOD_NOT_FOUND {
                    Err(RpcError::RemoteMethodNotFound(error.message))
                } else {
                    let data = error.data.unwrap_or_default();
                    Err(RpcError::remote_invocation_failure(
                        error.message,
                        data.code,
                        data.stack,
                    ))
                };
                self.complete(id, result).await;
            }
        }
    }

    async fn complete(&self, id: RequestId, result: Result<Value, RpcError>) {
        if let Some(correlator) = &self.correlator {
            correlator.complete(id, result).await;
        }
    }

    async fn handle_request(&self, id: RequestId, method: String, params: Params) {
        if self.writer.is_none() {
            // A peer with no sending stream cannot fulfill its duty to
            // respond to any inbound request, so the target is never
            // invoked.
            self.lifecycle
                .fire_disconnected("cannot respond to an inbound request: no sending stream");
            return;
        }

        if self.registry.is_empty() {
            // No target was ever registered on this peer; inbound
            // requests are rejected, but this is distinct from an
            // ordinary per-method lookup miss.
            self.emit(Message::error(
                id,
                ERROR_METHOD_NOT_FOUND,
                RpcError::TargetNotSet.to_string(),
                None,
            ))
            .await;
            return;
        }

        let Some((entry, args)) = self
            .registry
            .candidates(&method)
            .and_then(|candidates| binder::bind(candidates, &params, &self.serializer))
        else {
            self.emit(Message::method_not_found(id, &method)).await;
            return;
        };

        let token = if entry.accepts_cancellation {
            let (token, trigger) = CancellationToken::new();
            self.inbound_cancellations
                .lock()
                .await
                .insert(id.clone(), trigger);
            Some(token)
        } else {
            None
        };

        let result = (entry.invoke)(args, token).await;
        self.inbound_cancellations.lock().await.remove(&id);

        match result {
            Ok(value) => {
                let value = self.serializer.to_wire(value);
                self.emit(Message::success(id, value)).await;
            }
            Err(RpcError::Canceled) => {
                self.emit(Message::error(id, ERROR_INTERNAL, "request was canceled", None))
                    .await;
            }
            Err(err) => {
                let data = ErrorData {
                    stack: None,
                    code: None,
                };
                self.emit(Message::error(id, ERROR_INTERNAL, err.to_string(), Some(data)))
                    .await;
            }
        }
    }

    async fn handle_notification(&self, method: String, params: Params) {
        if method == METHOD_CANCEL {
            if let Some(id) = extract_cancel_id(&params) {
                let trigger = self.inbound_cancellations.lock().await.get(&id).cloned();
                if let Some(trigger) = trigger {
                    trigger.cancel();
                }
            }
            return;
        }

        let Some((entry, args)) = self
            .registry
            .candidates(&method)
            .and_then(|candidates| binder::bind(candidates, &params, &self.serializer))
        else {
            return;
        };

        let token = entry.accepts_cancellation.then(CancellationToken::none);

        if let Err(err) = (entry.invoke)(args, token).await {
            tracing::warn!(%method, error = %err, "notification handler failed; result discarded");
        }
    }

    /// Emit a response frame. Only reachable once `handle_request` has
    /// already confirmed a sending stream exists.
    async fn emit(&self, message: Message) {
        if let Some(writer) = &self.writer {
            let _ = writer.send(message);
        }
    }
}

fn extract_cancel_id(params: &Params) -> Option<RequestId> {
    match params {
        Params::Object(map) => map.get("id").and_then(RequestId::from_value),
        Params::Array(items) => items.first().and_then(RequestId::from_value),
        Params::None => None,
    }
}
