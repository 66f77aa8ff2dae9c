//! Product sub-interface: version and license information.

use playground_protocol::{CallResult, Methods, RpcFault};
use serde_json::{Value, json};

use crate::Service;

/// Product service: handles `product/getVersion` and `product/getLicense`.
pub struct ProductService {
    instance_name: String,
}

impl ProductService {
    pub fn new(instance_name: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
        }
    }
}

impl Service for ProductService {
    fn namespace(&self) -> &str {
        "product"
    }

    async fn handle(&self, method: &str, _params: Option<Value>) -> CallResult {
        match method {
            Methods::PRODUCT_GET_VERSION => Ok(json!({
                "productName": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "instanceName": self.instance_name,
            })),
            Methods::PRODUCT_GET_LICENSE => Ok(json!({
                "productName": env!("CARGO_PKG_NAME"),
                "licenseType": "EVAL",
                "recordLimit": 500,
            })),
            _ => Err(RpcFault::MethodNotFound(method.to_string())),
        }
    }
}
