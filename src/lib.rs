#![forbid(unsafe_code)]
//! A bidirectional JSON-RPC 2.0 peer: duplex dispatch, correlation, and
//! cancellation over a pair of byte streams.
//!
//! An [`Rpc`] attaches to a sending stream, a receiving stream, or both.
//! With both attached it behaves symmetrically: either side can issue
//! outbound requests/notifications via [`Rpc::invoke`]/[`Rpc::notify`]
//! while inbound requests are resolved against a declaratively registered
//! target (see [`PeerBuilder::method`]) and dispatched concurrently.
//! Outbound calls are correlated by id and may be canceled locally (which
//! emits a `$/cancelRequest` notification) or interrupted remotely (which
//! hands the target's handler a [`CancellationToken`]).
//!
//! ```rust,no_run
//! use rpc_peer::{Rpc, ParamSpec};
//! use serde_json::Value;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let (sending, receiving): (tokio::io::DuplexStream, tokio::io::DuplexStream) = tokio::io::duplex(4096);
//! let peer = Rpc::builder()
//!     .sending_stream(sending)
//!     .receiving_stream(receiving)
//!     .method("Echo", vec![ParamSpec::required::<Value>("value")], false, |args, _cancel| async move {
//!         Ok(args.into_iter().next().unwrap_or(Value::Null))
//!     })
//!     .build()?;
//!
//! let reply = peer.invoke("Echo", Value::from("hello")).await?;
//! assert_eq!(reply, Value::from("hello"));
//! # Ok(()) }
//! ```

mod binder;
mod cancellation;
mod correlator;
mod dispatcher;
mod error;
mod frame;
mod lifecycle;
mod peer;
mod protocol;
mod registry;
mod serializer;

pub use cancellation::{CancellationToken, CancellationTrigger};
pub use error::RpcError;
pub use frame::{FrameReader, FrameWriter};
pub use lifecycle::{DisconnectEvent, PeerState};
pub use peer::{PeerBuilder, ReceivingStream, Rpc, SendingStream};
pub use protocol::{ErrorData, ErrorObject, Message, Params, RequestId, METHOD_CANCEL};
pub use registry::{MethodEntry, MethodRegistry, ParamSpec, RegistryBuilder};
pub use serializer::{Encoding, Serializer, ValueConverter};
