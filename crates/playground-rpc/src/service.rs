//! The `Service` trait implemented by every engine sub-interface provider.

use playground_protocol::{CallResult, RpcFault};
use serde::Deserialize;

/// Trait implemented by all engine sub-interface providers.
///
/// Each service handles one namespace of methods (e.g., "engine/*",
/// "product/*"). The router dispatches on the namespace prefix.
pub trait Service: Send + Sync {
    /// The namespace prefix this service handles (e.g., "engine", "product").
    fn namespace(&self) -> &str;

    /// Handle a JSON-RPC request within this service's namespace.
    ///
    /// `method` is the full method string (e.g., "product/getVersion").
    fn handle(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> impl std::future::Future<Output = CallResult> + Send;

    /// Initialize the service (called once at startup).
    fn init(&self) -> impl std::future::Future<Output = Result<(), Box<dyn std::error::Error + Send + Sync>>> + Send {
        async { Ok(()) }
    }

    /// Shutdown the service (called once at server shutdown).
    fn shutdown(&self) -> impl std::future::Future<Output = ()> + Send {
        async {}
    }
}

/// Deserialize required params, mapping failures to `InvalidParams`.
pub fn parse_params<T: for<'de> Deserialize<'de>>(params: Option<serde_json::Value>) -> Result<T, RpcFault> {
    match params {
        Some(v) => serde_json::from_value(v)
            .map_err(|e| RpcFault::InvalidParams(e.to_string())),
        None => Err(RpcFault::InvalidParams("parameters required".into())),
    }
}

/// Deserialize optional params, falling back to `T::default()`.
pub fn parse_params_optional<T: for<'de> Deserialize<'de> + Default>(params: Option<serde_json::Value>) -> T {
    params
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}
