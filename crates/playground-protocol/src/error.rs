//! Faults reported by the engine RPC listener and their wire form.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::methods::EngineInterface;

/// Why a call produced no result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcFault {
    #[error("frame is not valid JSON: {0}")]
    Parse(String),

    #[error("not a JSON-RPC 2.0 call: {0}")]
    InvalidRequest(&'static str),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("engine sub-interfaces are not initialized")]
    NotInitialized,

    #[error("RPC listener is shutting down")]
    ShuttingDown,

    /// The namespace names a real sub-interface this listener does not expose.
    #[error("engine sub-interface {0} is disabled")]
    InterfaceDisabled(EngineInterface),
}

impl RpcFault {
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse(_) => -32700,
            Self::InvalidRequest(_) => -32600,
            Self::MethodNotFound(_) => -32601,
            Self::InvalidParams(_) => -32602,
            Self::Internal(_) => -32603,
            Self::NotInitialized => -32001,
            Self::ShuttingDown => -32002,
            Self::InterfaceDisabled(_) => -32003,
        }
    }

    /// Structured detail for clients that branch on more than the code.
    fn data(&self) -> Option<Value> {
        match self {
            Self::MethodNotFound(method) => Some(json!({ "method": method })),
            Self::InterfaceDisabled(interface) => Some(json!({
                "namespace": interface,
                "enableWith": interface.enable_flag(),
            })),
            _ => None,
        }
    }
}

/// JSON-RPC error object as it appears under `error` in a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<&RpcFault> for ErrorObject {
    fn from(fault: &RpcFault) -> Self {
        Self {
            code: fault.code(),
            message: fault.to_string(),
            data: fault.data(),
        }
    }
}

impl From<RpcFault> for ErrorObject {
    fn from(fault: RpcFault) -> Self {
        Self::from(&fault)
    }
}
