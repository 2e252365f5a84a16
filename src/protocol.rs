//! JSON-RPC 2.0 envelope types and wire constants.
//!
//! Mirrors the request/response/notification shapes `codex::mcp::jsonrpc`
//! decodes from stdio, but distinguishes inbound *requests* from
//! responses (`codex`'s own transport is client-only and never needed
//! that branch).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RpcError;

/// JSON-RPC protocol version string; always `"2.0"`.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method name for the cancellation notification.
pub const METHOD_CANCEL: &str = "$/cancelRequest";

/// Reserved JSON-RPC 2.0 error code for an unresolved method.
pub const ERROR_METHOD_NOT_FOUND: i64 = -32601;

/// A request id, preserved bit-for-bit across the wire: numeric ids stay
/// numeric, string ids stay strings. `null` is never a valid id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl Serialize for RequestId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            RequestId::Number(n) => serializer.serialize_i64(*n),
            RequestId::String(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        RequestId::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom("id must be a non-null number or string"))
    }
}

impl RequestId {
    pub fn from_value(value: &Value) -> Option<RequestId> {
        match value {
            Value::Number(n) => n.as_i64().map(RequestId::Number),
            Value::String(s) => Some(RequestId::String(s.clone())),
            _ => None,
        }
    }
}

/// `params`: positional (array) or named (object). Absent params and JSON
/// `null` params are distinct at the wire level but the binder (§4.3)
/// collapses both into the same "no params supplied" case.
#[derive(Debug, Clone)]
pub enum Params {
    Array(Vec<Value>),
    Object(Map<String, Value>),
    None,
}

impl Params {
    pub fn from_value(value: Option<Value>) -> Params {
        match value {
            None | Some(Value::Null) => Params::None,
            Some(Value::Array(items)) => Params::Array(items),
            Some(Value::Object(map)) => Params::Object(map),
            Some(_) => Params::None,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Params::Array(items) => Value::Array(items),
            Params::Object(map) => Value::Object(map),
            Params::None => Value::Null,
        }
    }
}

/// Structured remote-error payload data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// JSON-RPC error object.
#[derive(Debug, Clone)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    pub data: Option<ErrorData>,
}

/// A single decoded envelope, classified by wire shape.
#[derive(Debug, Clone)]
pub enum Message {
    Request {
        id: RequestId,
        method: String,
        params: Params,
    },
    Notification {
        method: String,
        params: Params,
    },
    Success {
        id: RequestId,
        result: Value,
    },
    Error {
        id: RequestId,
        error: ErrorObject,
    },
}

impl Message {
    pub fn request(id: RequestId, method: impl Into<String>, params: Value) -> Message {
        Message::Request {
            id,
            method: method.into(),
            params: Params::from_value(Some(params)),
        }
    }

    pub fn notification(method: impl Into<String>, params: Value) -> Message {
        Message::Notification {
            method: method.into(),
            params: Params::from_value(Some(params)),
        }
    }

    pub fn cancel(id: RequestId) -> Message {
        Message::notification(METHOD_CANCEL, serde_json::json!({ "id": id }))
    }

    pub fn success(id: RequestId, result: Value) -> Message {
        Message::Success { id, result }
    }

    pub fn error(id: RequestId, code: i64, message: impl Into<String>, data: Option<ErrorData>) -> Message {
        Message::Error {
            id,
            error: ErrorObject {
                code,
                message: message.into(),
                data,
            },
        }
    }

    pub fn method_not_found(id: RequestId, method: &str) -> Message {
        Message::error(
            id,
            ERROR_METHOD_NOT_FOUND,
            format!("method not found: {method}"),
            None,
        )
    }

    /// Serialize the envelope only; payload values (`params`, `result`,
    /// `error.data`) must already have been produced by the serializer
    /// facade (§4.4) before reaching here. The envelope itself is never
    /// touched by user converters.
    pub fn to_value(self) -> Value {
        match self {
            Message::Request { id, method, params } => serde_json::json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "method": method,
                "params": params.into_value(),
            }),
            Message::Notification { method, params } => serde_json::json!({
                "jsonrpc": JSONRPC_VERSION,
                "method": method,
                "params": params.into_value(),
            }),
            Message::Success { id, result } => serde_json::json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "result": result,
            }),
            Message::Error { id, error } => serde_json::json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "error": {
                    "code": error.code,
                    "message": error.message,
                    "data": error.data,
                },
            }),
        }
    }

    /// Classify a raw decoded JSON value into an envelope. Unknown
    /// top-level fields are ignored; malformed shapes are a parse error,
    /// which is fatal to the connection at the frame layer.
    pub fn parse(value: Value) -> Result<Message, RpcError> {
        let Value::Object(mut obj) = value else {
            return Err(RpcError::MalformedEnvelope("envelope is not a JSON object".into()));
        };

        let id = obj.remove("id").and_then(|v| RequestId::from_value(&v));
        let method = obj.remove("method").and_then(|v| v.as_str().map(str::to_owned));
        let params = Params::from_value(obj.remove("params"));

        if let Some(method) = method {
            return Ok(match id {
                Some(id) => Message::Request { id, method, params },
                None => Message::Notification { method, params },
            });
        }

        let id = id.ok_or_else(|| {
            RpcError::MalformedEnvelope("response envelope missing id".into())
        })?;

        let result = obj.remove("result");
        let error = obj.remove("error");

        match (result, error) {
            (Some(result), None) => Ok(Message::Success { id, result }),
            (None, Some(error)) => {
                let error: RawError = serde_json::from_value(error).map_err(|e| {
                    RpcError::MalformedEnvelope(format!("invalid error object: {e}"))
                })?;
                Ok(Message::Error {
                    id,
                    error: ErrorObject {
                        code: error.code,
                        message: error.message,
                        data: error.data,
                    },
                })
            }
            (Some(_), Some(_)) => Err(RpcError::MalformedEnvelope(
                "response carries both result and error".into(),
            )),
            (None, None) => Err(RpcError::MalformedEnvelope(
                "response missing both result and error".into(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<ErrorData>,
}
