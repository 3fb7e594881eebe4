//! Scan orchestration: CIDR expansion, bounded worker pool, per-host
//! pipeline and scan-document assembly.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ipnetwork::IpNetwork;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use rapidcmdb_common::{
    DeviceRecord, Error, InterfaceInfo, Result, ScanDocument, ScanFileConfig,
    SCAN_DOCUMENT_VERSION, SessionDeviceResult, SessionResult, device_id,
};

use crate::config::ScannerConfig;
use crate::fingerprint::{FingerprintEngine, Verdict};
use crate::oids;
use crate::probe;
use crate::progress::ScanProgress;
use crate::snmp::{CollectOutcome, SnmpClient};
use crate::stats;

/// Drives a full network scan.
pub struct ScanOrchestrator {
    config: ScannerConfig,
    engine: Arc<FingerprintEngine>,
    client: Arc<SnmpClient>,
}

impl ScanOrchestrator {
    pub fn new(config: ScannerConfig, engine: FingerprintEngine) -> Self {
        let client = Arc::new(SnmpClient::new(
            config.snmp.clone(),
            engine.rules().all_fingerprint_oids(),
        ));
        Self {
            config,
            engine: Arc::new(engine),
            client,
        }
    }

    /// Scan every host in `cidr` and assemble the scan document.
    ///
    /// Per-host failures never abort the scan; cancellation stops new
    /// dispatches and lets in-flight hosts finish their current step.
    pub async fn scan(&self, cidr: &str, cancel: CancellationToken) -> Result<ScanDocument> {
        let network: IpNetwork = cidr
            .parse()
            .map_err(|e| Error::ConfigInvalid(format!("Invalid CIDR '{}': {}", cidr, e)))?;

        let total_hosts = host_count(&network);
        let scan_id = scan_id_for(cidr);

        tracing::info!(
            cidr = %cidr,
            hosts = total_hosts,
            concurrency = self.config.scan.concurrency,
            tcp_ports = self.config.scan.tcp_probe_ports.len(),
            scan_id = %scan_id,
            "Starting scan"
        );

        let progress = Arc::new(ScanProgress::new(
            total_hosts,
            self.config.scan.progress_interval,
        ));
        let semaphore = Arc::new(Semaphore::new(self.config.scan.concurrency));
        let mut workers: JoinSet<Option<(DeviceRecord, SessionResult)>> = JoinSet::new();

        for address in expand_hosts(&network) {
            if cancel.is_cancelled() {
                tracing::warn!("Scan cancelled, no further hosts dispatched");
                break;
            }

            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => {
                    let Ok(permit) = permit else { break };
                    permit
                }
            };

            let config = self.config.clone();
            let client = self.client.clone();
            let engine = self.engine.clone();
            let progress = progress.clone();
            let cancel = cancel.clone();
            let scan_id = scan_id.clone();

            workers.spawn(async move {
                let _permit = permit;
                let result =
                    scan_host(address, &config, &client, &engine, &progress, &cancel, &scan_id)
                        .await;
                progress.complete_one();
                result
            });
        }

        let mut devices: BTreeMap<String, DeviceRecord> = BTreeMap::new();
        let mut sessions = Vec::new();

        while let Some(joined) = workers.join_next().await {
            if let Ok(Some((record, session))) = joined {
                devices.insert(record.id.clone(), record);
                sessions.push(session);
            }
        }

        // Serialization order must not depend on completion order.
        sessions.sort_by(|a, b| a.target_ip.cmp(&b.target_ip));

        let statistics = stats::generate_statistics(
            &devices,
            progress.v3_successful(),
            progress.v2c_successful(),
        );

        tracing::info!(
            devices = devices.len(),
            scanned = progress.completed(),
            tcp_responsive = progress.tcp_responsive(),
            tcp_failed = progress.tcp_failed(),
            snmp_failed = progress.snmp_failed(),
            v3 = progress.v3_successful(),
            v2c = progress.v2c_successful(),
            "Scan complete"
        );

        Ok(ScanDocument {
            version: SCAN_DOCUMENT_VERSION.to_string(),
            last_updated: Utc::now(),
            total_devices: devices.len() as u64,
            devices,
            sessions,
            statistics,
            config: ScanFileConfig::default(),
        })
    }
}

/// One host's pipeline: TCP probe, SNMP collection, fingerprint, record
/// assembly. Every failure is absorbed into the progress counters.
async fn scan_host(
    address: IpAddr,
    config: &ScannerConfig,
    client: &SnmpClient,
    engine: &FingerprintEngine,
    progress: &ScanProgress,
    cancel: &CancellationToken,
    scan_id: &str,
) -> Option<(DeviceRecord, SessionResult)> {
    if !config.scan.skip_tcp_probe {
        let outcome = probe::probe_host(
            address,
            &config.scan.tcp_probe_ports,
            Duration::from_secs(config.scan.tcp_probe_timeout_secs),
        )
        .await;
        progress.record_probe_anomalies(u64::from(outcome.anomalies));

        if !outcome.reachable {
            progress.record_tcp_failed();
            return None;
        }
    }
    progress.record_tcp_responsive();

    if cancel.is_cancelled() {
        return None;
    }

    let outcome = client.collect(address).await;
    let Some(version) = outcome.metadata.snmp_version_successful else {
        progress.record_snmp_failed();
        tracing::debug!(address = %address, "Responsive host without SNMP");
        return None;
    };

    if !outcome.identified() {
        progress.record_snmp_failed();
        tracing::debug!(address = %address, "SNMP answers but host is unidentifiable");
        return None;
    }

    let verdict = engine.fingerprint(&outcome.facts);
    progress.record_snmp_success(version);

    tracing::debug!(
        address = %address,
        vendor = %verdict.vendor,
        device_type = %verdict.device_type,
        version = %version,
        "Host fingerprinted"
    );

    let record = build_device_record(address, &outcome, &verdict, scan_id);
    let session = build_session_result(address, &outcome, &verdict);
    Some((record, session))
}

/// Assemble a device record in the scan-file schema.
fn build_device_record(
    address: IpAddr,
    outcome: &CollectOutcome,
    verdict: &Verdict,
    scan_id: &str,
) -> DeviceRecord {
    let ip = address.to_string();
    let now = Utc::now();

    let sys_descr = outcome.facts.get(oids::SYS_DESCR).cloned().unwrap_or_default();
    let sys_name = outcome.facts.get(oids::SYS_NAME).cloned().unwrap_or_default();

    let mut interfaces = BTreeMap::new();
    interfaces.insert(
        format!("ip_{}", ip.replace(['.', ':'], "_")),
        InterfaceInfo {
            name: format!("Interface-{}", ip),
            ip_address: ip.clone(),
            status: "discovered".to_string(),
            interface_type: "data".to_string(),
        },
    );

    let mut snmp_data: BTreeMap<String, String> = BTreeMap::new();
    for (_, oid) in oids::PRIORITY_OIDS {
        if let Some(value) = outcome.facts.get(*oid).filter(|v| !v.is_empty()) {
            snmp_data.insert(oid.to_string(), value.clone());
        }
    }
    for (oid, field_name) in oids::ENTITY_FIELD_NAMES {
        if let Some(value) = outcome.facts.get(*oid).filter(|v| !v.is_empty()) {
            snmp_data.insert(field_name.to_string(), value.clone());
        }
    }

    // Vendor-specific display fields mirror what the fingerprint found.
    if !verdict.model.is_empty() {
        match verdict.vendor.as_str() {
            "apc" => {
                snmp_data
                    .entry("APC Model Number".to_string())
                    .or_insert_with(|| verdict.model.clone());
            }
            "cisco" | "ion" => {
                snmp_data
                    .entry("Cisco Model".to_string())
                    .or_insert_with(|| verdict.model.clone());
            }
            _ => {}
        }
    }

    let mut snmp_data_by_ip = BTreeMap::new();
    snmp_data_by_ip.insert(ip.clone(), snmp_data);

    let version = outcome
        .metadata
        .snmp_version_successful
        .map(|v| v.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    DeviceRecord {
        id: device_id(&sys_name, &verdict.vendor, &verdict.device_type, &ip),
        primary_ip: ip.clone(),
        all_ips: vec![ip],
        mac_addresses: Vec::new(),
        interfaces,
        vendor: verdict.vendor.clone(),
        device_type: verdict.device_type.clone(),
        model: verdict.model.clone(),
        serial_number: verdict.serial_number.clone(),
        os_version: verdict.os_version.clone(),
        sys_descr,
        sys_name,
        first_seen: now,
        last_seen: now,
        scan_count: 1,
        last_scan_id: scan_id.to_string(),
        confidence_score: verdict.confidence_score,
        detection_method: verdict.detection_method.as_str().to_string(),
        snmp_version_used: version,
        snmp_data_by_ip,
    }
}

fn build_session_result(
    address: IpAddr,
    outcome: &CollectOutcome,
    verdict: &Verdict,
) -> SessionResult {
    let ip = address.to_string();
    let now = Utc::now();
    let version = outcome
        .metadata
        .snmp_version_successful
        .map(|v| v.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let duration_secs = (outcome.metadata.response_time_ms / 1000).max(1);

    SessionResult {
        id: scan_id_for(&ip),
        timestamp: now,
        target_ip: ip.clone(),
        scan_type: "single_device".to_string(),
        devices_found: 1,
        new_devices: 0,
        updated_devices: 0,
        snmp_version_used: version.clone(),
        results: vec![SessionDeviceResult {
            ip_address: ip,
            vendor: verdict.vendor.clone(),
            device_type: verdict.device_type.clone(),
            model: verdict.model.clone(),
            serial_number: verdict.serial_number.clone(),
            os_version: verdict.os_version.clone(),
            sys_descr: outcome.facts.get(oids::SYS_DESCR).cloned().unwrap_or_default(),
            sys_name: outcome.facts.get(oids::SYS_NAME).cloned().unwrap_or_default(),
            snmp_data: outcome.facts.clone(),
            confidence_score: verdict.confidence_score,
            detection_method: verdict.detection_method.as_str().to_string(),
            scan_timestamp: now,
            snmp_version: version,
        }],
        duration: format!("{}s", duration_secs),
    }
}

/// Lazily expand a network into scannable host addresses.
///
/// IPv4 prefixes of /30 and shorter exclude the network and broadcast
/// addresses; /31 and /32 enumerate every address.
pub fn expand_hosts(network: &IpNetwork) -> Box<dyn Iterator<Item = IpAddr> + Send> {
    match network {
        IpNetwork::V4(net) => {
            if net.prefix() <= 30 {
                let network_addr = net.network();
                let broadcast = net.broadcast();
                Box::new(
                    net.iter()
                        .filter(move |ip| *ip != network_addr && *ip != broadcast)
                        .map(IpAddr::V4),
                )
            } else {
                Box::new(net.iter().map(IpAddr::V4))
            }
        }
        IpNetwork::V6(net) => Box::new(net.iter().map(IpAddr::V6)),
    }
}

/// Number of hosts `expand_hosts` will yield, saturated at `u64::MAX`.
pub fn host_count(network: &IpNetwork) -> u64 {
    match network {
        IpNetwork::V4(net) => {
            let size = u64::from(net.size());
            if net.prefix() <= 30 {
                size.saturating_sub(2)
            } else {
                size
            }
        }
        IpNetwork::V6(net) => u64::try_from(net.size()).unwrap_or(u64::MAX),
    }
}

/// Derive a deterministic scan id: UTC timestamp plus a short digest of
/// the target.
fn scan_id_for(target: &str) -> String {
    let digest = Sha256::digest(target.as_bytes());
    let short: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();
    format!("scan_{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), short)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::DetectionMethod;
    use crate::snmp::SnmpVersion;

    #[test]
    fn test_expand_hosts_excludes_network_and_broadcast() {
        let network: IpNetwork = "198.51.100.0/30".parse().unwrap();
        let hosts: Vec<IpAddr> = expand_hosts(&network).collect();
        assert_eq!(
            hosts,
            vec![
                "198.51.100.1".parse::<IpAddr>().unwrap(),
                "198.51.100.2".parse::<IpAddr>().unwrap(),
            ]
        );
        assert_eq!(host_count(&network), 2);
    }

    #[test]
    fn test_expand_hosts_slash_31_and_32() {
        let network: IpNetwork = "10.0.0.0/31".parse().unwrap();
        assert_eq!(expand_hosts(&network).count(), 2);
        assert_eq!(host_count(&network), 2);

        let network: IpNetwork = "10.0.0.1/32".parse().unwrap();
        let hosts: Vec<IpAddr> = expand_hosts(&network).collect();
        assert_eq!(hosts, vec!["10.0.0.1".parse::<IpAddr>().unwrap()]);
        assert_eq!(host_count(&network), 1);
    }

    #[test]
    fn test_expand_hosts_slash_24_count() {
        let network: IpNetwork = "192.0.2.0/24".parse().unwrap();
        assert_eq!(host_count(&network), 254);
        assert_eq!(expand_hosts(&network).count(), 254);
    }

    #[test]
    fn test_scan_id_shape() {
        let id = scan_id_for("198.51.100.0/30");
        assert!(id.starts_with("scan_"));
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[3].len(), 8);
    }

    #[test]
    fn test_build_device_record_from_outcome() {
        let mut outcome = CollectOutcome::default();
        outcome.facts.insert(
            oids::SYS_DESCR.to_string(),
            "Cisco IOS Software, C2960X Software".to_string(),
        );
        outcome
            .facts
            .insert(oids::SYS_NAME.to_string(), "core-sw-01".to_string());
        outcome.metadata.snmp_version_successful = Some(SnmpVersion::V2c);

        let verdict = Verdict {
            vendor: "cisco".to_string(),
            device_type: "switch".to_string(),
            model: "C2960X".to_string(),
            serial_number: String::new(),
            os_version: String::new(),
            confidence_score: 90,
            detection_method: DetectionMethod::DefinitivePatternMatch,
            matched_oids: vec![],
            matched_patterns: vec!["cisco ios".to_string()],
        };

        let address: IpAddr = "198.51.100.1".parse().unwrap();
        let record = build_device_record(address, &outcome, &verdict, "scan_x");

        assert_eq!(record.id, "host_core_sw_01");
        assert_eq!(record.primary_ip, "198.51.100.1");
        assert!(record.is_consistent());
        assert_eq!(record.snmp_version_used, "v2c");
        assert_eq!(record.detection_method, "definitive_pattern_match");
        let inner = &record.snmp_data_by_ip["198.51.100.1"];
        assert_eq!(inner[oids::SYS_NAME], "core-sw-01");
        assert_eq!(inner["Cisco Model"], "C2960X");
        assert_eq!(
            record.interfaces["ip_198_51_100_1"].ip_address,
            "198.51.100.1"
        );
    }

    #[tokio::test]
    async fn test_scan_rejects_invalid_cidr() {
        let config = ScannerConfig::default();
        let engine =
            FingerprintEngine::new(crate::rules::FingerprintRules::default()).unwrap();
        let orchestrator = ScanOrchestrator::new(config, engine);

        let err = orchestrator
            .scan("not-a-cidr", CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.label(), "config_invalid");
    }

    #[tokio::test]
    async fn test_cancelled_scan_dispatches_nothing() {
        let config = ScannerConfig::default();
        let engine =
            FingerprintEngine::new(crate::rules::FingerprintRules::default()).unwrap();
        let orchestrator = ScanOrchestrator::new(config, engine);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let doc = orchestrator.scan("192.0.2.0/24", cancel).await.unwrap();
        assert_eq!(doc.total_devices, 0);
        assert!(doc.devices.is_empty());
    }
}
