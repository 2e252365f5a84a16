//! Serializer facade (component D).
//!
//! Converters apply only to method parameters, return values, and error
//! `data` — never to envelope fields (`method`, `id`, `jsonrpc`, or
//! `params`-level shape). The dispatcher and correlator enforce this by
//! construction: they call [`Serializer::to_wire`]/[`Serializer::from_wire`]
//! on payload values only, then hand the result to
//! [`crate::protocol::Message`], whose own (de)serialization never consults
//! a `Serializer`. Modeled after `codex::mcp::jsonrpc::map_response`'s
//! generic conversion helper, generalized into a registrable converter set.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::error::RpcError;

/// Wire text encoding. Only UTF-8 is implemented (DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::Utf8
    }
}

/// A converter hook applied to payload values only. Both methods default
/// to "does not apply"; implementors override whichever direction they
/// handle.
pub trait ValueConverter: Send + Sync {
    /// Claim and transform a value before it is written to the wire.
    /// Returning `None` leaves the value untouched for this converter.
    fn to_wire(&self, _value: &Value) -> Option<Value> {
        None
    }

    /// Claim and transform a value after it is read off the wire.
    fn from_wire(&self, _value: &Value) -> Option<Value> {
        None
    }
}

/// The configurable converter set plus the peer's mutable `encoding`
/// property. Shared for the peer's lifetime and thread-safe.
pub struct Serializer {
    converters: Mutex<Vec<Arc<dyn ValueConverter>>>,
    encoding: Mutex<Option<Encoding>>,
}

impl Default for Serializer {
    fn default() -> Self {
        Serializer {
            converters: Mutex::new(Vec::new()),
            encoding: Mutex::new(Some(Encoding::default())),
        }
    }
}

impl Serializer {
    pub fn new() -> Self {
        Serializer::default()
    }

    /// Register a converter. Converters are tried in registration order;
    /// the first to claim a value wins.
    pub fn register_converter(&self, converter: Arc<dyn ValueConverter>) {
        self.converters.lock().expect("serializer poisoned").push(converter);
    }

    /// Current wire encoding.
    pub fn encoding(&self) -> Encoding {
        self.encoding
            .lock()
            .expect("serializer poisoned")
            .unwrap_or_default()
    }

    /// Set the wire encoding. Setting it to `None` is an "invalid
    /// argument" error; the encoding is otherwise mutable at any point
    /// prior to the next outbound frame.
    pub fn set_encoding(&self, encoding: Option<Encoding>) -> Result<(), RpcError> {
        let encoding = encoding
            .ok_or_else(|| RpcError::InvalidArgument("encoding must not be unset".into()))?;
        *self.encoding.lock().expect("serializer poisoned") = Some(encoding);
        Ok(())
    }

    /// Run `value` through the converter chain before it is written to the
    /// wire (a parameter, a return value, or `error.data`).
    pub fn to_wire(&self, value: Value) -> Value {
        let converters = self.converters.lock().expect("serializer poisoned");
        for converter in converters.iter() {
            if let Some(converted) = converter.to_wire(&value) {
                return converted;
            }
        }
        value
    }

    /// Run `value` through the converter chain after it is read off the
    /// wire, in reverse registration order (innermost converter first).
    pub fn from_wire(&self, value: Value) -> Value {
        let converters = self.converters.lock().expect("serializer poisoned");
        for converter in converters.iter().rev() {
            if let Some(converted) = converter.from_wire(&value) {
                return converted;
            }
        }
        value
    }
}
