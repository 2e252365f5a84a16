//! Error domain for the peer.
//!
//! One closed enum in the style of `codex::error::CodexError` /
//! `codex::mcp::client::McpError`: every failure the library can produce
//! is a variant here, with `#[source]` chaining into the underlying
//! IO/serde error where one exists.

use thiserror::Error;

use crate::protocol::RequestId;

/// Errors produced by the peer, spanning local misuse, remote method
/// resolution failure, remote execution failure, and framing failure.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Local misuse: a malformed call-site argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Local misuse: the peer cannot perform the requested operation in its
    /// current configuration (e.g. `invoke` with no sending stream).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Local misuse: a request or notification was dispatched to a peer
    /// with no target attached.
    #[error("no target attached to this peer")]
    TargetNotSet,

    /// Remote method resolution failure: no registered method bound the
    /// outbound call.
    #[error("remote method not found: {0}")]
    RemoteMethodNotFound(String),

    /// Remote execution failure: the target raised an error while
    /// handling the request.
    #[error("remote invocation failed: {message}")]
    RemoteInvocationFailure {
        message: String,
        remote_code: Option<String>,
        remote_stack: Option<String>,
    },

    /// The in-flight call was canceled locally before it could be sent, or
    /// the remote side reported a canceled execution.
    #[error("request was canceled")]
    Canceled,

    /// The peer has transitioned to `Disconnected`; no further calls can
    /// complete.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// A decode/parse failure at the frame layer; always fatal to the
    /// connection.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// A decode/parse failure at the frame layer caused by a missing or
    /// invalid `Content-Length` header, or a body shorter than advertised.
    #[error("frame error: {0}")]
    Frame(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RpcError {
    /// Build the `RemoteInvocationFailure` variant from a decoded error
    /// envelope's `data` fields.
    pub fn remote_invocation_failure(
        message: String,
        remote_code: Option<String>,
        remote_stack: Option<String>,
    ) -> RpcError {
        RpcError::RemoteInvocationFailure {
            message,
            remote_code,
            remote_stack,
        }
    }

    pub fn disconnected_for(id: &RequestId) -> RpcError {
        RpcError::Disconnected(format!("peer disconnected while request {id} was in flight"))
    }
}
