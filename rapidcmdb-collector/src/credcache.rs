//! Process-lifetime cache of working credentials, keyed by device shape.
//!
//! Devices that look alike (same site, vendor, role, driver) almost always
//! share credentials; remembering the first working set skips most of the
//! fallback churn. Never persisted.

use std::collections::HashMap;
use std::sync::Mutex;

use rapidcmdb_common::InventoryDevice;

use crate::config::CredentialCachingConfig;

pub struct CredentialCache {
    enabled: bool,
    cache_by: Vec<String>,
    entries: Mutex<HashMap<String, String>>,
}

impl CredentialCache {
    pub fn new(config: &CredentialCachingConfig) -> Self {
        Self {
            enabled: config.enabled,
            cache_by: config.cache_by.clone(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Deterministic shape key for credential sharing across similar
    /// devices. The resolved driver is always part of the key.
    pub fn shape_key(&self, device: &InventoryDevice, driver: Option<&str>) -> String {
        let mut parts = Vec::new();
        for field in &self.cache_by {
            let value = match field.as_str() {
                "site_code" => device.site_code.clone(),
                "vendor" => device.vendor.clone(),
                "device_role" => device.device_role.as_str().to_string(),
                "model" => device.model.clone(),
                "device_name" => device.device_name.clone(),
                _ => String::new(),
            };
            if !value.is_empty() {
                parts.push(format!("{}:{}", field, value.to_lowercase()));
            }
        }

        let mut key = if parts.is_empty() {
            "default".to_string()
        } else {
            parts.join("|")
        };
        if let Some(driver) = driver {
            key.push_str("|driver:");
            key.push_str(driver);
        }
        key
    }

    /// Look up the cached credential name for a shape key.
    pub fn get(&self, shape_key: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(shape_key).cloned()
    }

    /// Remember a working credential for a shape key.
    pub fn put(&self, shape_key: &str, credential_name: &str) {
        if !self.enabled {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(shape_key.to_string(), credential_name.to_string());
        tracing::debug!(shape_key = %shape_key, credential = %credential_name, "Cached working credential");
    }

    /// Log a summary of the cache contents.
    pub fn log_stats(&self) {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.is_empty() {
            tracing::info!("Credential cache is empty");
        } else {
            tracing::info!(entries = entries.len(), "Credential cache populated");
            for (key, name) in entries.iter() {
                tracing::debug!(shape_key = %key, credential = %name, "Cache entry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapidcmdb_common::DeviceRole;

    fn device(site: &str, vendor: &str, role: DeviceRole) -> InventoryDevice {
        InventoryDevice {
            database_id: None,
            device_key: "abcd1234abcd1234".to_string(),
            device_name: "frc-swl-01".to_string(),
            hostname: String::new(),
            fqdn: String::new(),
            vendor: vendor.to_string(),
            model: "C2960X".to_string(),
            serial_number: "FOC1".to_string(),
            os_version: String::new(),
            sys_descr: String::new(),
            site_code: site.to_string(),
            device_role: role,
            primary_ip: "10.0.0.1".to_string(),
            first_discovered: None,
            last_updated: None,
            is_active: true,
        }
    }

    #[test]
    fn test_shape_key_composition() {
        let cache = CredentialCache::new(&CredentialCachingConfig::default());
        let key = cache.shape_key(&device("FRC", "Cisco", DeviceRole::Access), Some("ios"));
        assert_eq!(
            key,
            "site_code:frc|vendor:cisco|device_role:access|driver:ios"
        );
    }

    #[test]
    fn test_shape_key_skips_empty_fields() {
        let cache = CredentialCache::new(&CredentialCachingConfig::default());
        let key = cache.shape_key(&device("", "cisco", DeviceRole::Unknown), None);
        assert_eq!(key, "vendor:cisco|device_role:unknown");
    }

    #[test]
    fn test_get_and_put() {
        let cache = CredentialCache::new(&CredentialCachingConfig::default());
        assert_eq!(cache.get("k"), None);

        cache.put("k", "primary");
        assert_eq!(cache.get("k"), Some("primary".to_string()));
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let config = CredentialCachingConfig {
            enabled: false,
            ..CredentialCachingConfig::default()
        };
        let cache = CredentialCache::new(&config);

        cache.put("k", "primary");
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_same_shape_same_key() {
        let cache = CredentialCache::new(&CredentialCachingConfig::default());
        let a = cache.shape_key(&device("FRC", "cisco", DeviceRole::Access), Some("ios"));
        let b = cache.shape_key(&device("frc", "CISCO", DeviceRole::Access), Some("ios"));
        assert_eq!(a, b);
    }
}
