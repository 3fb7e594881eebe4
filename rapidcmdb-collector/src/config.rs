use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use rapidcmdb_common::{Credential, LoggingConfig};

/// Root configuration for the collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Root directory for per-device capture output.
    #[serde(default = "default_capture_directory")]
    pub capture_directory: String,

    /// Per-credential session open timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Bounded worker pool size.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Environment variable prefix for credential sets.
    #[serde(default = "default_credential_prefix")]
    pub credential_env_prefix: String,

    /// Inline credential sets; merged with environment credentials.
    #[serde(default)]
    pub credentials: Vec<Credential>,

    /// Collection method toggles. `get_facts` always runs first.
    #[serde(default = "default_collection_methods")]
    pub collection_methods: BTreeMap<String, bool>,

    /// Working-credential cache settings.
    #[serde(default)]
    pub credential_caching: CredentialCachingConfig,

    /// Store-level device filters.
    #[serde(default)]
    pub device_filters: DeviceFilters,

    /// Driver overrides: `{vendor}_{model-substring}` -> driver name.
    #[serde(default)]
    pub vendor_overrides: BTreeMap<String, String>,

    /// Driver-specific session options, by driver name.
    #[serde(default)]
    pub driver_options: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            capture_directory: default_capture_directory(),
            timeout_secs: default_timeout(),
            max_workers: default_max_workers(),
            credential_env_prefix: default_credential_prefix(),
            credentials: Vec::new(),
            collection_methods: default_collection_methods(),
            credential_caching: CredentialCachingConfig::default(),
            device_filters: DeviceFilters::default(),
            vendor_overrides: BTreeMap::new(),
            driver_options: BTreeMap::new(),
        }
    }
}

fn default_capture_directory() -> String {
    "captures".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_max_workers() -> usize {
    10
}

fn default_credential_prefix() -> String {
    "NAPALM".to_string()
}

fn default_collection_methods() -> BTreeMap<String, bool> {
    // get_route_to needs a destination argument, so it stays opt-in.
    crate::driver::COLLECTION_METHODS
        .iter()
        .map(|m| (m.to_string(), *m != "get_route_to"))
        .collect()
}

/// Working-credential cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialCachingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Device fields composing the shape key; the resolved driver is
    /// always appended.
    #[serde(default = "default_cache_by")]
    pub cache_by: Vec<String>,
}

impl Default for CredentialCachingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_by: default_cache_by(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_by() -> Vec<String> {
    vec![
        "site_code".to_string(),
        "vendor".to_string(),
        "device_role".to_string(),
    ]
}

/// Filters applied when listing devices from an inventory source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceFilters {
    #[serde(default = "default_true")]
    pub active_only: bool,

    #[serde(default)]
    pub site_codes: Vec<String>,

    #[serde(default)]
    pub device_roles: Vec<String>,

    #[serde(default)]
    pub vendors: Vec<String>,

    #[serde(default)]
    pub exclude_models: Vec<String>,

    /// Include printers, UPSes and other non-network vendors.
    #[serde(default)]
    pub include_non_network: bool,

    /// Minimum fingerprint confidence for scan-file devices.
    #[serde(default)]
    pub min_confidence: u32,

    #[serde(default)]
    pub device_types: Vec<String>,
}

impl Default for DeviceFilters {
    fn default() -> Self {
        Self {
            active_only: true,
            site_codes: Vec::new(),
            device_roles: Vec::new(),
            vendors: Vec::new(),
            exclude_models: Vec::new(),
            include_non_network: false,
            min_confidence: 0,
            device_types: Vec::new(),
        }
    }
}

/// Case-insensitive substring filters applied after listing.
#[derive(Debug, Clone, Default)]
pub struct RuntimeFilters {
    pub name: Vec<String>,
    pub site: Vec<String>,
    pub vendor: Vec<String>,
    pub role: Vec<String>,
    pub model: Vec<String>,
    pub ip: Vec<String>,
    /// Legacy form: matches any string field.
    pub legacy: Vec<String>,
}

impl RuntimeFilters {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.site.is_empty()
            && self.vendor.is_empty()
            && self.role.is_empty()
            && self.model.is_empty()
            && self.ip.is_empty()
            && self.legacy.is_empty()
    }
}

impl CollectorConfig {
    /// Load configuration from a JSON5 file.
    pub fn load(path: impl AsRef<Path>) -> rapidcmdb_common::Result<Self> {
        rapidcmdb_common::load_config(path)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> rapidcmdb_common::Result<Self> {
        rapidcmdb_common::parse_config(content)
    }

    pub fn validate(&self) -> rapidcmdb_common::Result<()> {
        if self.max_workers == 0 {
            return Err(rapidcmdb_common::Error::config(
                "max_workers must be at least 1",
            ));
        }
        if self.capture_directory.is_empty() {
            return Err(rapidcmdb_common::Error::config(
                "capture_directory cannot be empty",
            ));
        }
        Ok(())
    }

    /// The ordered method list: `get_facts` first, the rest of the
    /// enabled set sorted for determinism.
    pub fn methods_to_collect(&self) -> Vec<String> {
        let mut methods = Vec::new();
        if self
            .collection_methods
            .get("get_facts")
            .copied()
            .unwrap_or(false)
        {
            methods.push("get_facts".to_string());
        }
        for (method, enabled) in &self.collection_methods {
            if *enabled && method != "get_facts" {
                methods.push(method.clone());
            }
        }
        methods
    }
}
