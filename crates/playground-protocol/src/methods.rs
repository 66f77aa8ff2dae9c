//! Engine method name constants, grouped by sub-interface.
//!
//! Each constant is the exact string sent over the wire as the `method`
//! field of a JSON-RPC request. The namespace before the first `/` names the
//! engine sub-interface that serves it.

use serde::{Deserialize, Serialize};

/// All engine method names, grouped by sub-interface namespace.
pub struct Methods;

impl Methods {
    // ── Config ──────────────────────────────────────────────────────────
    pub const CONFIG_ADD_DATA_SOURCE: &str = "config/addDataSource";
    pub const CONFIG_DELETE_DATA_SOURCE: &str = "config/deleteDataSource";
    pub const CONFIG_EXPORT: &str = "config/export";
    pub const CONFIG_GET_DATA_SOURCES: &str = "config/getDataSources";

    // ── Config manager ──────────────────────────────────────────────────
    pub const CONFIG_MANAGER_CREATE_CONFIG: &str = "configmanager/createConfig";
    pub const CONFIG_MANAGER_GET_CONFIG: &str = "configmanager/getConfig";
    pub const CONFIG_MANAGER_GET_CONFIGS: &str = "configmanager/getConfigs";
    pub const CONFIG_MANAGER_GET_DEFAULT_CONFIG_ID: &str = "configmanager/getDefaultConfigId";
    pub const CONFIG_MANAGER_REGISTER_CONFIG: &str = "configmanager/registerConfig";
    pub const CONFIG_MANAGER_REPLACE_DEFAULT_CONFIG_ID: &str = "configmanager/replaceDefaultConfigId";
    pub const CONFIG_MANAGER_SET_DEFAULT_CONFIG_ID: &str = "configmanager/setDefaultConfigId";

    // ── Diagnostic ──────────────────────────────────────────────────────
    pub const DIAGNOSTIC_CHECK_DATASTORE_PERFORMANCE: &str = "diagnostic/checkDatastorePerformance";
    pub const DIAGNOSTIC_CHECK_HEALTH: &str = "diagnostic/checkHealth";
    pub const DIAGNOSTIC_GET_DATASTORE_INFO: &str = "diagnostic/getDatastoreInfo";
    pub const DIAGNOSTIC_GET_FEATURE: &str = "diagnostic/getFeature";
    pub const DIAGNOSTIC_GET_SYSTEM_INFO: &str = "diagnostic/getSystemInfo";
    pub const DIAGNOSTIC_PURGE_REPOSITORY: &str = "diagnostic/purgeRepository";

    // ── Engine ──────────────────────────────────────────────────────────
    pub const ENGINE_ADD_RECORD: &str = "engine/addRecord";
    pub const ENGINE_COUNT_REDO_RECORDS: &str = "engine/countRedoRecords";
    pub const ENGINE_DELETE_RECORD: &str = "engine/deleteRecord";
    pub const ENGINE_FIND_NETWORK_BY_ENTITY_ID: &str = "engine/findNetworkByEntityId";
    pub const ENGINE_FIND_PATH_BY_ENTITY_ID: &str = "engine/findPathByEntityId";
    pub const ENGINE_GET_ENTITY_BY_ENTITY_ID: &str = "engine/getEntityByEntityId";
    pub const ENGINE_GET_ENTITY_BY_RECORD_ID: &str = "engine/getEntityByRecordId";
    pub const ENGINE_GET_RECORD: &str = "engine/getRecord";
    pub const ENGINE_GET_STATS: &str = "engine/getStats";
    pub const ENGINE_GET_VIRTUAL_ENTITY_BY_RECORD_ID: &str = "engine/getVirtualEntityByRecordId";
    pub const ENGINE_HOW_ENTITY_BY_ENTITY_ID: &str = "engine/howEntityByEntityId";
    pub const ENGINE_PRIME_ENGINE: &str = "engine/primeEngine";
    pub const ENGINE_PROCESS_REDO_RECORD: &str = "engine/processRedoRecord";
    pub const ENGINE_REEVALUATE_ENTITY: &str = "engine/reevaluateEntity";
    pub const ENGINE_REEVALUATE_RECORD: &str = "engine/reevaluateRecord";
    pub const ENGINE_SEARCH_BY_ATTRIBUTES: &str = "engine/searchByAttributes";
    pub const ENGINE_WHY_ENTITIES: &str = "engine/whyEntities";
    pub const ENGINE_WHY_RECORD_IN_ENTITY: &str = "engine/whyRecordInEntity";
    pub const ENGINE_WHY_RECORDS: &str = "engine/whyRecords";

    // ── Product ─────────────────────────────────────────────────────────
    pub const PRODUCT_GET_LICENSE: &str = "product/getLicense";
    pub const PRODUCT_GET_VERSION: &str = "product/getVersion";
}

/// An engine sub-interface, exposed over RPC as one method namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineInterface {
    Config,
    ConfigManager,
    Diagnostic,
    Engine,
    Product,
}

impl EngineInterface {
    pub const ALL: [EngineInterface; 5] = [
        Self::Config,
        Self::ConfigManager,
        Self::Diagnostic,
        Self::Engine,
        Self::Product,
    ];

    /// Wire namespace, the part of the method name before the first `/`.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::ConfigManager => "configmanager",
            Self::Diagnostic => "diagnostic",
            Self::Engine => "engine",
            Self::Product => "product",
        }
    }

    /// Command-line switch that exposes this sub-interface.
    pub fn enable_flag(&self) -> &'static str {
        match self {
            Self::Config => "--enable-sz-config",
            Self::ConfigManager => "--enable-sz-config-manager",
            Self::Diagnostic => "--enable-sz-diagnostic",
            Self::Engine => "--enable-sz-engine",
            Self::Product => "--enable-sz-product",
        }
    }

    pub fn from_namespace(namespace: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.namespace() == namespace)
    }

    /// The sub-interface a method belongs to, if any.
    pub fn of_method(method: &str) -> Option<Self> {
        method.split('/').next().and_then(Self::from_namespace)
    }
}

impl std::fmt::Display for EngineInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.namespace())
    }
}

/// Returns true if the given string belongs to a known engine namespace.
pub fn is_known_method(method: &str) -> bool {
    match method.split_once('/') {
        Some((_, rest)) if rest.is_empty() => false,
        Some(_) => EngineInterface::of_method(method).is_some(),
        None => false,
    }
}

/// Type alias: the method name is always a `&str` at the protocol level.
pub type MethodName = &'static str;
