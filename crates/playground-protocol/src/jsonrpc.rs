//! Frames exchanged on the `/rpc` WebSocket: incoming calls, replies, and
//! the notices the listener pushes unprompted.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{ErrorObject, RpcFault};

/// Method of the notice sent to every client right after it connects.
pub const CONNECTED_NOTICE: &str = "server/connected";

/// Result of dispatching one call to an engine sub-interface.
pub type CallResult = Result<Value, RpcFault>;

/// The `"jsonrpc": "2.0"` member. Any other value fails to deserialize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TwoPointZero;

impl Serialize for TwoPointZero {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("2.0")
    }
}

impl<'de> Deserialize<'de> for TwoPointZero {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let version = String::deserialize(deserializer)?;
        if version == "2.0" {
            Ok(Self)
        } else {
            Err(D::Error::custom(format!("unsupported jsonrpc version {version:?}")))
        }
    }
}

/// Call id, echoed back unchanged in the reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    Text(String),
}

/// A validated incoming call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub id: Option<RequestId>,
    pub method: String,
    pub params: Option<Value>,
}

impl Call {
    /// Parse one text frame. A rejected frame still yields whatever id could
    /// be read, so the reply can echo it.
    pub fn parse(text: &str) -> Result<Self, (Option<RequestId>, RpcFault)> {
        let frame: Value =
            serde_json::from_str(text).map_err(|e| (None, RpcFault::Parse(e.to_string())))?;

        let id = frame
            .get("id")
            .cloned()
            .and_then(|v| serde_json::from_value::<RequestId>(v).ok());

        let Some(object) = frame.as_object() else {
            return Err((id, RpcFault::InvalidRequest("frame is not an object")));
        };
        let version = object
            .get("jsonrpc")
            .cloned()
            .map(serde_json::from_value::<TwoPointZero>);
        if !matches!(version, Some(Ok(_))) {
            return Err((id, RpcFault::InvalidRequest("jsonrpc must be \"2.0\"")));
        }
        let method = match object.get("method").and_then(Value::as_str) {
            Some(method) if !method.is_empty() => method.to_string(),
            _ => return Err((id, RpcFault::InvalidRequest("method must be a non-empty string"))),
        };

        Ok(Self {
            id,
            method,
            params: object.get("params").cloned(),
        })
    }

    /// Engine namespace the method belongs to (text before the first `/`).
    pub fn namespace(&self) -> &str {
        self.method.split('/').next().unwrap_or_default()
    }
}

/// `result` or `error`, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(ErrorObject),
}

/// Reply to one call. The id is `null` when the call carried none or could
/// not be read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub jsonrpc: TwoPointZero,
    pub id: Option<RequestId>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Reply {
    pub fn new(id: Option<RequestId>, result: CallResult) -> Self {
        let outcome = match result {
            Ok(value) => Outcome::Result(value),
            Err(fault) => Outcome::Error(fault.into()),
        };
        Self {
            jsonrpc: TwoPointZero,
            id,
            outcome,
        }
    }

    pub fn fault(id: Option<RequestId>, fault: RpcFault) -> Self {
        Self::new(id, Err(fault))
    }

    pub fn error(&self) -> Option<&ErrorObject> {
        match &self.outcome {
            Outcome::Error(error) => Some(error),
            Outcome::Result(_) => None,
        }
    }

    /// Serialized frame. Falls back to a bare internal-error reply if the
    /// result itself cannot be serialized.
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            let fallback = Reply::fault(self.id.clone(), RpcFault::Internal(e.to_string()));
            serde_json::to_string(&fallback).unwrap_or_default()
        })
    }
}

/// Message pushed to a client without a matching call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice<P> {
    pub jsonrpc: TwoPointZero,
    pub method: String,
    pub params: P,
}

impl<P: Serialize> Notice<P> {
    pub fn new(method: impl Into<String>, params: P) -> Self {
        Self {
            jsonrpc: TwoPointZero,
            method: method.into(),
            params,
        }
    }
}

/// Payload of the [`CONNECTED_NOTICE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    pub client_id: String,
    pub server_version: String,
    pub namespaces: Vec<String>,
}

impl Notice<Welcome> {
    pub fn welcome(welcome: Welcome) -> Self {
        Self::new(CONNECTED_NOTICE, welcome)
    }
}
