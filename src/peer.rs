//! Peer (component G) and its builder.
//!
//! Grounded on `codex::mcp::client::{CodexMcpServer, CodexAppServer}`'s
//! `start`/`with_capabilities`/`shutdown` shape, generalized from "spawn a
//! child process and speak JSON-RPC over its stdio" to "attach to
//! caller-supplied streams" — this crate has no process to spawn;
//! establishing the underlying transport is the caller's job.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cancellation::CancellationToken;
use crate::correlator::Correlator;
use crate::dispatcher::Dispatcher;
use crate::error::RpcError;
use crate::frame::{FrameReader, FrameWriter};
use crate::lifecycle::{DisconnectEvent, Lifecycle, PeerState};
use crate::protocol::Message;
use crate::registry::{MethodRegistry, ParamSpec, RegistryBuilder};
use crate::serializer::{Encoding, Serializer, ValueConverter};

/// Boxed sending half; generic enough to wrap a socket, a pipe, or an
/// in-memory duplex half for tests.
pub type SendingStream = Box<dyn AsyncWrite + Send + Unpin>;
/// Boxed receiving half.
pub type ReceivingStream = Box<dyn AsyncRead + Send + Unpin>;

/// Builds an [`Rpc`] from optional streams and a declaratively populated
/// target registry.
#[derive(Default)]
pub struct PeerBuilder {
    sending: Option<SendingStream>,
    receiving: Option<ReceivingStream>,
    registry: RegistryBuilder,
}

impl PeerBuilder {
    pub fn new() -> Self {
        PeerBuilder::default()
    }

    pub fn sending_stream(mut self, stream: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.sending = Some(Box::new(stream));
        self
    }

    pub fn receiving_stream(mut self, stream: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.receiving = Some(Box::new(stream));
        self
    }

    /// Register one dispatchable method on the target.
    pub fn method<F, Fut>(
        mut self,
        name: impl Into<String>,
        params: Vec<ParamSpec>,
        accepts_cancellation: bool,
        handler: F,
    ) -> Self
    where
        F: Fn(Vec<Value>, Option<CancellationToken>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
    {
        self.registry = self.registry.method(name, params, accepts_cancellation, handler);
        self
    }

    /// Construct the peer and start its reader loop: it begins reading
    /// from the receiving stream eagerly, at construction.
    pub fn build(self) -> Result<Rpc, RpcError> {
        if self.sending.is_none() && self.receiving.is_none() {
            return Err(RpcError::InvalidArgument(
                "a peer requires at least one of a sending or receiving stream".into(),
            ));
        }
        Ok(Rpc::start(self.sending, self.receiving, self.registry.build()))
    }
}

/// A bidirectional JSON-RPC 2.0 peer attached to a pair of byte streams.
pub struct Rpc {
    serializer: Arc<Serializer>,
    correlator: Option<Arc<Correlator>>,
    lifecycle: Arc<Lifecycle>,
    reader_task: Option<JoinHandle<()>>,
    writer_task: Option<JoinHandle<()>>,
}

impl Rpc {
    pub fn builder() -> PeerBuilder {
        PeerBuilder::new()
    }

    fn start(
        sending: Option<SendingStream>,
        receiving: Option<ReceivingStream>,
        registry: MethodRegistry,
    ) -> Rpc {
        let serializer = Arc::new(Serializer::new());
        let lifecycle = Arc::new(Lifecycle::new());
        let registry = Arc::new(registry);

        let (correlator, dispatch_writer, writer_task) = match sending {
            Some(stream) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let correlator = Arc::new(Correlator::new(tx.clone()));
                let handle = tokio::spawn(writer_loop(
                    stream,
                    rx,
                    serializer.clone(),
                    lifecycle.clone(),
                ));
                (Some(correlator), Some(tx), Some(handle))
            }
            None => (None, None, None),
        };

        if let Some(correlator) = &correlator {
            let correlator = correlator.clone();
            lifecycle.on_disconnect(move |event: &DisconnectEvent| {
                let correlator = correlator.clone();
                let description = event.description.clone();
                tokio::spawn(async move {
                    correlator.disconnect_all(&description).await;
                });
            });
        }

        let dispatcher = Arc::new(Dispatcher::new(
            registry,
            serializer.clone(),
            correlator.clone(),
            dispatch_writer,
            lifecycle.clone(),
        ));

        let reader_task = receiving.map(|stream| {
            tokio::spawn(reader_loop(stream, dispatcher, lifecycle.clone()))
        });

        if reader_task.is_none() {
            tracing::debug!("peer attached with no receiving stream; inbound messages disabled");
        }

        Rpc {
            serializer,
            correlator,
            lifecycle,
            reader_task,
            writer_task,
        }
    }

    /// Issue an outbound request and await its response.
    pub async fn invoke(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.invoke_with_cancellation(method, params, CancellationToken::none())
            .await
    }

    /// Issue an outbound request with an explicit cancellation token.
    pub async fn invoke_with_cancellation(
        &self,
        method: &str,
        params: Value,
        token: CancellationToken,
    ) -> Result<Value, RpcError> {
        if self.lifecycle.is_disconnected() {
            return Err(RpcError::Disconnected(self.disconnect_description()));
        }
        let correlator = self
            .correlator
            .as_ref()
            .ok_or_else(|| RpcError::InvalidOperation("peer has no sending stream".into()))?;

        let wire_params = self.serializer.to_wire(params);
        let result = correlator.invoke(method, wire_params, token).await?;
        Ok(self.serializer.from_wire(result))
    }

    /// Emit an outbound notification.
    pub fn notify(&self, method: &str, params: Value) -> Result<(), RpcError> {
        if self.lifecycle.is_disconnected() {
            return Err(RpcError::Disconnected(self.disconnect_description()));
        }
        let correlator = self
            .correlator
            .as_ref()
            .ok_or_else(|| RpcError::InvalidOperation("peer has no sending stream".into()))?;

        let wire_params = self.serializer.to_wire(params);
        correlator.notify(method, wire_params)
    }

    pub fn encoding(&self) -> Encoding {
        self.serializer.encoding()
    }

    /// Set to `None` to get an "invalid argument" error.
    pub fn set_encoding(&self, encoding: Option<Encoding>) -> Result<(), RpcError> {
        self.serializer.set_encoding(encoding)
    }

    pub fn register_converter(&self, converter: Arc<dyn ValueConverter>) {
        self.serializer.register_converter(converter);
    }

    /// Subscribe to the disconnect event. Fires synchronously and
    /// immediately if the peer already disconnected.
    pub fn on_disconnect<F>(&self, handler: F)
    where
        F: Fn(&DisconnectEvent) + Send + Sync + 'static,
    {
        self.lifecycle.on_disconnect(handler);
    }

    pub fn state(&self) -> PeerState {
        self.lifecycle.state()
    }

    /// Idempotent shutdown.
    pub fn dispose(&self) {
        self.lifecycle.begin_disconnecting();
        self.lifecycle.fire_disconnected("peer disposed");
    }

    fn disconnect_description(&self) -> String {
        self.lifecycle
            .description()
            .unwrap_or_else(|| "peer disconnected".to_string())
    }
}

impl Drop for Rpc {
    fn drop(&mut self) {
        self.dispose();
        if let Some(handle) = self.reader_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.writer_task.take() {
            handle.abort();
        }
    }
}

async fn writer_loop(
    stream: SendingStream,
    mut rx: mpsc::UnboundedReceiver<Message>,
    serializer: Arc<Serializer>,
    lifecycle: Arc<Lifecycle>,
) {
    let mut writer = FrameWriter::new(stream);
    while let Some(message) = rx.recv().await {
        let body = message.to_value().to_string();
        if let Err(err) = writer.write_frame(&body, serializer.encoding()).await {
            tracing::warn!(error = %err, "failed to write frame; disconnecting");
            lifecycle.begin_disconnecting();
            lifecycle.fire_disconnected(format!("failed to write frame: {err}"));
            break;
        }
    }
}

async fn reader_loop(stream: ReceivingStream, dispatcher: Arc<Dispatcher>, lifecycle: Arc<Lifecycle>) {
    let mut reader = FrameReader::new(stream);
    loop {
        if lifecycle.is_disconnected() {
            break;
        }
        match reader.read_frame().await {
            Ok(Some(body)) => match serde_json::from_slice::<Value>(&body) {
                Ok(value) => match Message::parse(value) {
                    Ok(message) => {
                        // Invoke-and-forward: the reader loop must not
                        // block on target execution.
                        let dispatcher = dispatcher.clone();
                        tokio::spawn(async move {
                            dispatcher.handle_message(message).await;
                        });
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "malformed envelope; disconnecting");
                        lifecycle.begin_disconnecting();
                        lifecycle.fire_disconnected(err.to_string());
                        break;
                    }
                },
                Err(err) => {
                    tracing::warn!(error = %err, "invalid JSON frame body; disconnecting");
                    lifecycle.begin_disconnecting();
                    lifecycle.fire_disconnected(format!("invalid JSON frame body: {err}"));
                    break;
                }
            },
            Ok(None) => {
                tracing::debug!("receiving stream reached end of stream");
                lifecycle.begin_disconnecting();
                lifecycle.fire_disconnected("receiving stream reached end of stream");
                break;
            }
            Err(err) => {
                tracing::warn!(error = %err, "frame decode error; disconnecting");
                lifecycle.begin_disconnecting();
                lifecycle.fire_disconnected(err.to_string());
                break;
            }
        }
    }
}
