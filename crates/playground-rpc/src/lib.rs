//! Playground RPC listener.
//!
//! Hosts the engine sub-interfaces (`config`, `configmanager`, `diagnostic`,
//! `engine`, `product`) over JSON-RPC 2.0 via WebSocket. The listener handles:
//! - Connection lifecycle (open, message, close)
//! - Routing requests to the sub-interface that owns the method namespace
//! - Hiding sub-interfaces that the configuration does not enable
//!
//! The listener is decoupled from routing via the `RequestHandler` trait, and
//! construction is split from binding so a caller can build everything up
//! front and decide later whether to accept connections at all.

pub mod diagnostic;
pub mod product;
pub mod router;
pub mod server;
pub mod service;

pub use router::{InterfaceFlags, RpcRouter};
pub use server::{BoundRpcListener, RequestHandler, RpcListener, RpcListenerConfig, TransportError};
pub use diagnostic::DiagnosticService;
pub use product::ProductService;
pub use service::{Service, parse_params, parse_params_optional};
