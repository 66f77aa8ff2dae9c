//! Diagnostic sub-interface: host facts and a liveness probe.

use chrono::{DateTime, Utc};
use playground_protocol::{CallResult, Methods, RpcFault};
use serde_json::{Value, json};

use crate::Service;

/// Diagnostic service: handles `diagnostic/getSystemInfo` and
/// `diagnostic/checkHealth`.
pub struct DiagnosticService {
    instance_name: String,
    started_at: DateTime<Utc>,
}

impl DiagnosticService {
    pub fn new(instance_name: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            started_at: Utc::now(),
        }
    }

    fn system_info(&self) -> Value {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_default();
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        json!({
            "hostname": host,
            "numCpus": cpus,
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "instanceName": self.instance_name,
            "startedAt": self.started_at.to_rfc3339(),
        })
    }
}

impl Service for DiagnosticService {
    fn namespace(&self) -> &str {
        "diagnostic"
    }

    async fn handle(&self, method: &str, _params: Option<Value>) -> CallResult {
        match method {
            Methods::DIAGNOSTIC_GET_SYSTEM_INFO => Ok(self.system_info()),
            Methods::DIAGNOSTIC_CHECK_HEALTH => {
                let uptime = Utc::now().signed_duration_since(self.started_at);
                Ok(json!({
                    "healthy": true,
                    "uptimeSeconds": uptime.num_seconds(),
                }))
            }
            _ => Err(RpcFault::MethodNotFound(method.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn system_info_has_host_facts() {
        let svc = DiagnosticService::new("diag");
        let info = svc.handle(Methods::DIAGNOSTIC_GET_SYSTEM_INFO, None).await.unwrap();
        assert!(info["numCpus"].as_u64().unwrap() >= 1);
        assert_eq!(info["instanceName"], "diag");
        assert!(info["startedAt"].is_string());
    }

    #[tokio::test]
    async fn health_is_reported() {
        let svc = DiagnosticService::new("diag");
        let health = svc.handle(Methods::DIAGNOSTIC_CHECK_HEALTH, None).await.unwrap();
        assert_eq!(health["healthy"], true);
        assert!(health["uptimeSeconds"].as_i64().unwrap() >= 0);
    }
}
