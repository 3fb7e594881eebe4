//! Per-device collection: credential fallback, one session per device,
//! sequential method execution.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use rapidcmdb_common::{
    CollectionRun, Credential, InventoryDevice, MethodOutcome, safe_device_name,
};

use crate::config::CollectorConfig;
use crate::credcache::CredentialCache;
use crate::driver::{DriverOptions, DriverRegistry, DriverSession, SessionTarget};

/// Runs the bounded per-device collection pool.
pub struct DeviceCollector {
    config: Arc<CollectorConfig>,
    registry: Arc<DriverRegistry>,
    credentials: Arc<Vec<Credential>>,
    cache: Arc<CredentialCache>,
}

impl DeviceCollector {
    pub fn new(
        config: CollectorConfig,
        registry: DriverRegistry,
        credentials: Vec<Credential>,
    ) -> Self {
        let cache = CredentialCache::new(&config.credential_caching);
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            credentials: Arc::new(credentials),
            cache: Arc::new(cache),
        }
    }

    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    /// Collect every device with one worker per device, bounded by
    /// `max_workers`. Duplicate collection IPs are skipped; results come
    /// back sorted by device name regardless of completion order.
    pub async fn collect_all(
        &self,
        devices: Vec<InventoryDevice>,
        cancel: CancellationToken,
    ) -> Vec<CollectionRun> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let mut workers: JoinSet<CollectionRun> = JoinSet::new();
        let mut submitted: HashSet<String> = HashSet::new();

        for device in devices {
            if cancel.is_cancelled() {
                tracing::warn!("Collection cancelled, no further devices dispatched");
                break;
            }
            if !submitted.insert(device.primary_ip.clone()) {
                tracing::warn!(
                    device = %device.device_name,
                    ip = %device.primary_ip,
                    "Skipping duplicate device"
                );
                continue;
            }

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };

            let config = self.config.clone();
            let registry = self.registry.clone();
            let credentials = self.credentials.clone();
            let cache = self.cache.clone();
            let cancel = cancel.clone();

            workers.spawn(async move {
                let _permit = permit;
                collect_device(&config, &registry, &credentials, &cache, device, cancel).await
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = workers.join_next().await {
            if let Ok(run) = joined {
                tracing::info!(
                    device = %run.device_name,
                    success = run.success,
                    collected = run.methods_collected.len(),
                    failed = run.methods_failed.len(),
                    "Device collection finished"
                );
                results.push(run);
            }
        }

        results.sort_by(|a, b| a.device_name.cmp(&b.device_name));
        results
    }
}

/// One device, start to finish: driver selection, credential fallback,
/// sequential methods over the single session, unconditional close.
async fn collect_device(
    config: &CollectorConfig,
    registry: &DriverRegistry,
    credentials: &[Credential],
    cache: &CredentialCache,
    device: InventoryDevice,
    cancel: CancellationToken,
) -> CollectionRun {
    let mut run = CollectionRun::started(device.primary_ip.clone(), device.device_name.clone());
    run.database_id = device.database_id;

    let Some(driver_name) =
        registry.driver_for(&device.vendor, &device.model, &device.sys_descr)
    else {
        run.errors.push(format!(
            "No driver available for vendor '{}' model '{}'",
            device.vendor, device.model
        ));
        run.finalize();
        return run;
    };
    run.driver = Some(driver_name.clone());

    let Some(driver) = registry.get(&driver_name) else {
        run.errors
            .push(format!("Driver '{}' is not registered", driver_name));
        run.finalize();
        return run;
    };

    tracing::info!(
        device = %device.device_name,
        ip = %device.primary_ip,
        driver = %driver_name,
        "Starting collection"
    );

    let target = SessionTarget {
        hostname: device.primary_ip.clone(),
        timeout: Duration::from_secs(config.timeout_secs),
    };
    let shape_key = cache.shape_key(&device, Some(&driver_name));
    let ordered = credential_order(credentials, cache.get(&shape_key).as_deref());

    let mut session: Option<Box<dyn DriverSession>> = None;
    let mut working: Option<&Credential> = None;

    for credential in ordered.iter().copied() {
        if cancel.is_cancelled() {
            run.errors.push("Cancelled before connecting".to_string());
            break;
        }

        let mut options: DriverOptions = config
            .driver_options
            .get(&driver_name)
            .cloned()
            .unwrap_or_default();
        if !credential.enable_password.is_empty() {
            options.insert("secret".to_string(), credential.enable_password.clone());
        }

        tracing::debug!(
            device = %device.device_name,
            credential = %credential.name,
            "Attempting connection"
        );

        let opened = timeout(
            Duration::from_secs(config.timeout_secs),
            driver.open(&target, credential, &options),
        )
        .await;

        match opened {
            Ok(Ok(opened_session)) => {
                tracing::info!(
                    device = %device.device_name,
                    credential = %credential.name,
                    "Connected"
                );
                session = Some(opened_session);
                working = Some(credential);
                break;
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    device = %device.device_name,
                    credential = %credential.name,
                    error = %e,
                    "Connection failed"
                );
                run.errors.push(format!(
                    "Credential {} ({}): {}",
                    credential.name,
                    credential.source.as_str(),
                    e
                ));
            }
            Err(_) => {
                run.errors.push(format!(
                    "Credential {} ({}): session open timed out after {}s",
                    credential.name,
                    credential.source.as_str(),
                    config.timeout_secs
                ));
            }
        }
    }

    let (Some(mut session), Some(working)) = (session, working) else {
        tracing::error!(
            device = %device.device_name,
            attempts = ordered.len(),
            "Could not establish a session with any credential"
        );
        run.finalize();
        return run;
    };

    cache.put(&shape_key, &working.name);

    let methods = config.methods_to_collect();
    tracing::debug!(
        device = %device.device_name,
        methods = methods.len(),
        "Collecting methods sequentially"
    );

    for method in &methods {
        if cancel.is_cancelled() {
            run.errors.push("Cancelled mid-collection".to_string());
            break;
        }

        let started = Instant::now();
        match session.call(method).await {
            Ok(mut value) => {
                let duration = started.elapsed().as_secs_f64();

                if method == "get_vlans" {
                    let dropped = sanitize_vlans(&mut value);
                    if dropped > 0 {
                        tracing::warn!(
                            device = %run.device_name,
                            dropped,
                            "Dropped VLAN entries outside [1, 4094]"
                        );
                    }
                }

                let data_size = serde_json::to_string(&value)
                    .map(|s| s.len() as u64)
                    .unwrap_or(0);

                if method == "get_facts" {
                    refresh_device_name(&mut run, &value);
                }

                run.methods_collected
                    .push(MethodOutcome::collected(method.clone(), duration, data_size));
                run.data.insert(method.clone(), value);
            }
            Err(e) => {
                let duration = started.elapsed().as_secs_f64();
                tracing::warn!(
                    device = %run.device_name,
                    method = %method,
                    error = %e,
                    "Method failed, continuing"
                );
                run.methods_failed
                    .push(MethodOutcome::failed(method.clone(), duration, e.to_string()));
            }
        }
    }

    if let Err(e) = session.close().await {
        tracing::warn!(device = %run.device_name, error = %e, "Error closing session");
    }

    if !run.methods_collected.is_empty() {
        run.credential_used = Some(working.name.clone());
        run.credential_source = Some(working.source.as_str().to_string());
    }
    run.finalize();
    run
}

/// Credential try-order: the cached credential first when present, then
/// the remaining list in priority order.
fn credential_order<'a>(credentials: &'a [Credential], cached: Option<&str>) -> Vec<&'a Credential> {
    let mut ordered: Vec<&Credential> = Vec::with_capacity(credentials.len());
    if let Some(cached_name) = cached {
        if let Some(hit) = credentials.iter().find(|c| c.name == cached_name) {
            ordered.push(hit);
        }
    }
    for credential in credentials {
        if !ordered.iter().any(|c| c.name == credential.name) {
            ordered.push(credential);
        }
    }
    ordered
}

/// After `get_facts`, take the reported hostname (or fqdn) as the device
/// name when it differs from the collection address.
fn refresh_device_name(run: &mut CollectionRun, facts: &Value) {
    let hostname = facts
        .get("hostname")
        .and_then(Value::as_str)
        .filter(|h| !h.is_empty())
        .or_else(|| {
            facts
                .get("fqdn")
                .and_then(Value::as_str)
                .filter(|h| !h.is_empty())
        });

    if let Some(hostname) = hostname {
        if hostname != run.device_ip {
            let cleaned = safe_device_name(hostname);
            if cleaned != run.device_name {
                tracing::info!(
                    device = %run.device_name,
                    new_name = %cleaned,
                    "Updated device name from facts"
                );
                run.device_name = cleaned;
            }
        }
    }
}

/// Drop VLAN ids outside `[1, 4094]` from a `get_vlans` result document.
/// Returns the number of dropped entries.
fn sanitize_vlans(value: &mut Value) -> usize {
    let Some(map) = value.as_object_mut() else {
        return 0;
    };

    let invalid: Vec<String> = map
        .keys()
        .filter(|key| !matches!(key.parse::<u32>(), Ok(id) if (1..=4094).contains(&id)))
        .cloned()
        .collect();

    for key in &invalid {
        map.remove(key);
    }
    invalid.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::ScriptedDriver;
    use rapidcmdb_common::{CredentialSource, DeviceRole};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    fn credential(name: &str, priority: u32) -> Credential {
        Credential {
            name: name.to_string(),
            username: "admin".to_string(),
            password: "pw".to_string(),
            enable_password: String::new(),
            priority,
            source: CredentialSource::Config,
        }
    }

    fn device(name: &str, ip: &str, vendor: &str) -> InventoryDevice {
        InventoryDevice {
            database_id: Some(7),
            device_key: "abcd1234abcd1234".to_string(),
            device_name: name.to_string(),
            hostname: String::new(),
            fqdn: String::new(),
            vendor: vendor.to_string(),
            model: "C2960X".to_string(),
            serial_number: "FOC1".to_string(),
            os_version: String::new(),
            sys_descr: String::new(),
            site_code: "FRC".to_string(),
            device_role: DeviceRole::Access,
            primary_ip: ip.to_string(),
            first_discovered: None,
            last_updated: None,
            is_active: true,
        }
    }

    fn small_config() -> CollectorConfig {
        CollectorConfig::parse(
            r#"
        {
            timeout_secs: 5,
            collection_methods: {
                get_facts: true,
                get_config: true,
                get_interfaces: true,
            },
        }
        "#,
        )
        .unwrap()
    }

    fn registry_with(driver: ScriptedDriver) -> DriverRegistry {
        let mut registry = DriverRegistry::new(BTreeMap::new());
        registry.register(Arc::new(driver));
        registry
    }

    #[tokio::test]
    async fn test_credential_fallback() {
        let mut driver = ScriptedDriver::new("ios");
        driver.accept_credential = Some("cred_backup".to_string());

        let collector = DeviceCollector::new(
            small_config(),
            registry_with(driver),
            vec![credential("cred_primary", 1), credential("cred_backup", 2)],
        );

        let runs = collector
            .collect_all(
                vec![device("core-sw-01", "10.0.0.1", "cisco")],
                CancellationToken::new(),
            )
            .await;

        assert_eq!(runs.len(), 1);
        let run = &runs[0];
        assert!(run.success);
        assert_eq!(run.credential_used.as_deref(), Some("cred_backup"));
        assert_eq!(run.errors.len(), 1);
        assert!(run.errors[0].contains("cred_primary"));
    }

    #[tokio::test]
    async fn test_partial_method_success() {
        let mut driver = ScriptedDriver::new("ios");
        driver.failing_methods = vec!["get_config".to_string()];

        let collector = DeviceCollector::new(
            small_config(),
            registry_with(driver),
            vec![credential("primary", 1)],
        );

        let runs = collector
            .collect_all(
                vec![device("core-sw-01", "10.0.0.1", "cisco")],
                CancellationToken::new(),
            )
            .await;

        let run = &runs[0];
        assert!(run.success);

        let collected: Vec<&str> = run
            .methods_collected
            .iter()
            .map(|m| m.method.as_str())
            .collect();
        assert!(collected.contains(&"get_facts"));
        assert!(collected.contains(&"get_interfaces"));
        assert!(!collected.contains(&"get_config"));

        assert_eq!(run.methods_failed.len(), 1);
        assert_eq!(run.methods_failed[0].method, "get_config");
        assert!(run.data.contains_key("get_facts"));
        assert!(!run.data.contains_key("get_config"));

        // No method appears in both lists.
        for failed in &run.methods_failed {
            assert!(!collected.contains(&failed.method.as_str()));
        }
    }

    #[tokio::test]
    async fn test_all_credentials_rejected() {
        let mut driver = ScriptedDriver::new("ios");
        driver.accept_credential = Some("nonexistent".to_string());

        let collector = DeviceCollector::new(
            small_config(),
            registry_with(driver),
            vec![credential("a", 1), credential("b", 2)],
        );

        let runs = collector
            .collect_all(
                vec![device("core-sw-01", "10.0.0.1", "cisco")],
                CancellationToken::new(),
            )
            .await;

        let run = &runs[0];
        assert!(!run.success);
        assert!(run.credential_used.is_none());
        assert_eq!(run.errors.len(), 2);
        assert!(run.methods_collected.is_empty());
    }

    #[tokio::test]
    async fn test_no_driver_for_vendor() {
        let collector = DeviceCollector::new(
            small_config(),
            DriverRegistry::new(BTreeMap::new()),
            vec![credential("primary", 1)],
        );

        let runs = collector
            .collect_all(
                vec![device("printer-01", "10.0.0.9", "zebra")],
                CancellationToken::new(),
            )
            .await;

        let run = &runs[0];
        assert!(!run.success);
        assert!(run.driver.is_none());
        assert!(run.errors[0].contains("No driver available"));
    }

    #[tokio::test]
    async fn test_session_closed_even_on_method_failures() {
        let mut driver = ScriptedDriver::new("ios");
        driver.failing_methods = vec![
            "get_facts".to_string(),
            "get_config".to_string(),
            "get_interfaces".to_string(),
        ];
        let close_count = driver.close_count.clone();

        let collector = DeviceCollector::new(
            small_config(),
            registry_with(driver),
            vec![credential("primary", 1)],
        );

        let runs = collector
            .collect_all(
                vec![device("core-sw-01", "10.0.0.1", "cisco")],
                CancellationToken::new(),
            )
            .await;

        assert!(!runs[0].success);
        assert_eq!(close_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_device_name_refresh_from_facts() {
        let driver = ScriptedDriver::new("ios").with_result(
            "get_facts",
            json!({ "hostname": "core-sw-01.example.com", "vendor": "Cisco" }),
        );

        let collector = DeviceCollector::new(
            small_config(),
            registry_with(driver),
            vec![credential("primary", 1)],
        );

        let runs = collector
            .collect_all(
                vec![device("10.0.0.1", "10.0.0.1", "cisco")],
                CancellationToken::new(),
            )
            .await;

        assert_eq!(runs[0].device_name, "core-sw-01");
    }

    #[tokio::test]
    async fn test_duplicate_ips_are_skipped() {
        let driver = ScriptedDriver::new("ios");
        let collector = DeviceCollector::new(
            small_config(),
            registry_with(driver),
            vec![credential("primary", 1)],
        );

        let runs = collector
            .collect_all(
                vec![
                    device("core-sw-01", "10.0.0.1", "cisco"),
                    device("core-sw-01-again", "10.0.0.1", "cisco"),
                ],
                CancellationToken::new(),
            )
            .await;

        assert_eq!(runs.len(), 1);
    }

    #[tokio::test]
    async fn test_results_sorted_by_device_name() {
        let driver = ScriptedDriver::new("ios");
        let collector = DeviceCollector::new(
            small_config(),
            registry_with(driver),
            vec![credential("primary", 1)],
        );

        let runs = collector
            .collect_all(
                vec![
                    device("zulu-sw", "10.0.0.2", "cisco"),
                    device("alpha-sw", "10.0.0.1", "cisco"),
                ],
                CancellationToken::new(),
            )
            .await;

        let names: Vec<&str> = runs.iter().map(|r| r.device_name.as_str()).collect();
        assert_eq!(names, vec!["alpha-sw", "zulu-sw"]);
    }

    #[tokio::test]
    async fn test_vlan_range_sanitation() {
        let driver = ScriptedDriver::new("ios").with_result(
            "get_vlans",
            json!({
                "1": { "name": "default", "interfaces": [] },
                "4094": { "name": "edge", "interfaces": [] },
                "4095": { "name": "invalid-high", "interfaces": [] },
                "0": { "name": "invalid-low", "interfaces": [] },
            }),
        );

        let config = CollectorConfig::parse(
            r#"
        {
            timeout_secs: 5,
            collection_methods: { get_vlans: true },
        }
        "#,
        )
        .unwrap();

        let collector = DeviceCollector::new(
            config,
            registry_with(driver),
            vec![credential("primary", 1)],
        );

        let runs = collector
            .collect_all(
                vec![device("core-sw-01", "10.0.0.1", "cisco")],
                CancellationToken::new(),
            )
            .await;

        let vlans = runs[0].data["get_vlans"].as_object().unwrap();
        assert!(vlans.contains_key("1"));
        assert!(vlans.contains_key("4094"));
        assert!(!vlans.contains_key("4095"));
        assert!(!vlans.contains_key("0"));
    }

    #[test]
    fn test_credential_order_with_cache_hit() {
        let creds = vec![credential("a", 1), credential("b", 2), credential("c", 3)];
        let ordered = credential_order(&creds, Some("c"));
        let names: Vec<&str> = ordered.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_credential_order_without_cache() {
        let creds = vec![credential("a", 1), credential("b", 2)];
        let ordered = credential_order(&creds, None);
        let names: Vec<&str> = ordered.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_sanitize_vlans_counts_dropped() {
        let mut value = json!({ "10": {}, "5000": {}, "abc": {} });
        assert_eq!(sanitize_vlans(&mut value), 2);
        assert_eq!(value.as_object().unwrap().len(), 1);

        let mut non_object = json!([1, 2, 3]);
        assert_eq!(sanitize_vlans(&mut non_object), 0);
    }
}
