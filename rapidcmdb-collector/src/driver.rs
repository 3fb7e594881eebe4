//! Device driver abstraction.
//!
//! The collector never knows a vendor's transport specifics. It selects a
//! driver name through a layered lookup, opens one session per device and
//! calls named methods on it; the actual transports are registered from
//! outside the core.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use rapidcmdb_common::{Credential, Result};

/// The method-name surface the collector may call on a session.
pub const COLLECTION_METHODS: &[&str] = &[
    "get_facts",
    "get_config",
    "get_interfaces",
    "get_interfaces_ip",
    "get_arp_table",
    "get_mac_address_table",
    "get_lldp_neighbors",
    "get_environment",
    "get_users",
    "get_optics",
    "get_network_instances",
    "get_route_to",
    "get_vlans",
];

/// Vendors that never get a driver; kept out of collection by default.
pub const NON_NETWORK_VENDORS: &[&str] = &[
    "apc",
    "brother",
    "dell",
    "hp_printer",
    "ion",
    "lexmark",
    "linux_embedded",
    "samsung",
    "unknown",
    "xerox",
    "zebra",
    "bluecat",
];

/// Vendor -> default driver name.
const VENDOR_DEFAULTS: &[(&str, &str)] = &[
    ("cisco", "ios"),
    ("arista", "eos"),
    ("palo_alto", "panos"),
    ("palo_alto_sdwan", "panos"),
    ("hp", "procurve"),
    ("hp_network", "procurve"),
    ("aruba", "arubaoss"),
    ("fortinet", "fortios"),
    ("juniper", "junos"),
];

/// Connection parameters common to every driver.
#[derive(Debug, Clone)]
pub struct SessionTarget {
    pub hostname: String,
    pub timeout: Duration,
}

/// Driver-specific open options (e.g. `transport: ssh`). The elevated
/// secret travels under the `secret` key when the credential carries one.
pub type DriverOptions = BTreeMap<String, String>;

/// A vendor transport capability.
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    fn name(&self) -> &str;

    async fn open(
        &self,
        target: &SessionTarget,
        credential: &Credential,
        options: &DriverOptions,
    ) -> Result<Box<dyn DriverSession>>;
}

/// One open session against a device.
///
/// Lifecycle is explicit: the collector always calls `close`, even after
/// method failures.
#[async_trait]
pub trait DriverSession: Send {
    async fn call(&mut self, method: &str) -> Result<Value>;

    async fn close(&mut self) -> Result<()>;
}

/// Registered drivers plus the layered name-selection logic.
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn DeviceDriver>>,
    overrides: BTreeMap<String, String>,
}

impl DriverRegistry {
    pub fn new(overrides: BTreeMap<String, String>) -> Self {
        Self {
            drivers: HashMap::new(),
            overrides,
        }
    }

    /// Register a driver implementation under its name.
    pub fn register(&mut self, driver: Arc<dyn DeviceDriver>) {
        self.drivers.insert(driver.name().to_string(), driver);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DeviceDriver>> {
        self.drivers.get(name).cloned()
    }

    /// Resolve the driver name for a device.
    ///
    /// Lookup order: explicit overrides, vendor heuristics on model and
    /// system description, the vendor-default table, otherwise none.
    pub fn driver_for(&self, vendor: &str, model: &str, sys_descr: &str) -> Option<String> {
        let vendor = vendor.trim().to_lowercase();
        let model = model.to_lowercase();
        let sys_descr = sys_descr.to_lowercase();

        let vendor_model = format!("{}_{}", vendor, model);
        for (key, driver) in &self.overrides {
            if vendor_model.contains(&key.to_lowercase()) {
                return Some(driver.clone());
            }
        }

        if vendor == "cisco" {
            let haystack = format!("{} {}", model, sys_descr);
            if ["nx-os", "nxos", "nexus", "n9k", "n7k", "n5k", "n3k"]
                .iter()
                .any(|k| haystack.contains(k))
            {
                return Some("nxos".to_string());
            }
            if ["asa", "firepower"].iter().any(|k| haystack.contains(k)) {
                return Some("asa".to_string());
            }
            return Some("ios".to_string());
        }

        VENDOR_DEFAULTS
            .iter()
            .find(|(v, _)| *v == vendor)
            .map(|(_, driver)| driver.to_string())
    }
}

#[cfg(test)]
pub mod testing {
    //! A scripted in-memory driver for collector tests.

    use super::*;
    use rapidcmdb_common::Error;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Driver whose sessions answer from canned data.
    pub struct ScriptedDriver {
        name: String,
        /// When set, only this credential name opens a session.
        pub accept_credential: Option<String>,
        /// Methods that fail inside an open session.
        pub failing_methods: Vec<String>,
        /// Canned per-method results; other methods get a stub document.
        pub method_results: Mutex<BTreeMap<String, Value>>,
        /// Sessions closed so far.
        pub close_count: Arc<AtomicU32>,
    }

    impl ScriptedDriver {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                accept_credential: None,
                failing_methods: Vec::new(),
                method_results: Mutex::new(BTreeMap::new()),
                close_count: Arc::new(AtomicU32::new(0)),
            }
        }

        pub fn with_result(self, method: &str, value: Value) -> Self {
            self.method_results
                .lock()
                .unwrap()
                .insert(method.to_string(), value);
            self
        }
    }

    #[async_trait]
    impl DeviceDriver for ScriptedDriver {
        fn name(&self) -> &str {
            &self.name
        }

        async fn open(
            &self,
            _target: &SessionTarget,
            credential: &Credential,
            _options: &DriverOptions,
        ) -> Result<Box<dyn DriverSession>> {
            if let Some(accepted) = &self.accept_credential {
                if &credential.name != accepted {
                    return Err(Error::CredentialRejected {
                        credential: credential.name.clone(),
                        message: "authentication failed".to_string(),
                    });
                }
            }
            Ok(Box::new(ScriptedSession {
                failing_methods: self.failing_methods.clone(),
                method_results: self.method_results.lock().unwrap().clone(),
                close_count: self.close_count.clone(),
            }))
        }
    }

    pub struct ScriptedSession {
        failing_methods: Vec<String>,
        method_results: BTreeMap<String, Value>,
        close_count: Arc<AtomicU32>,
    }

    #[async_trait]
    impl DriverSession for ScriptedSession {
        async fn call(&mut self, method: &str) -> Result<Value> {
            if self.failing_methods.iter().any(|m| m == method) {
                return Err(Error::MethodFailed {
                    method: method.to_string(),
                    message: "scripted failure".to_string(),
                });
            }
            Ok(self
                .method_results
                .get(method)
                .cloned()
                .unwrap_or_else(|| json!({ "method": method })))
        }

        async fn close(&mut self) -> Result<()> {
            self.close_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
