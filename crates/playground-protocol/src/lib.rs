//! Playground RPC protocol types.
//!
//! Frames and faults of the engine RPC listener, plus the method names of
//! every engine sub-interface.

pub mod error;
pub mod jsonrpc;
pub mod methods;

pub use error::{ErrorObject, RpcFault};
pub use jsonrpc::{
    CONNECTED_NOTICE, Call, CallResult, Notice, Outcome, Reply, RequestId, TwoPointZero, Welcome,
};
pub use methods::{EngineInterface, MethodName, Methods};
