//! Data model for discovered devices, scan documents and collection runs.
//!
//! Field names on these types are part of the on-disk contract: scan
//! documents and collection results written by one tool are read back by
//! the others, so the serde spellings here must stay stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single interface entry on a device record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterfaceInfo {
    pub name: String,
    pub ip_address: String,
    pub status: String,
    #[serde(rename = "type")]
    pub interface_type: String,
}

/// A device discovered by the scanner.
///
/// Records persist across scans and are updated in place by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceRecord {
    pub id: String,
    pub primary_ip: String,
    pub all_ips: Vec<String>,
    pub mac_addresses: Vec<String>,
    pub interfaces: BTreeMap<String, InterfaceInfo>,
    pub vendor: String,
    pub device_type: String,
    pub model: String,
    pub serial_number: String,
    pub os_version: String,
    pub sys_descr: String,
    pub sys_name: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub scan_count: u32,
    pub last_scan_id: String,
    pub confidence_score: u32,
    pub detection_method: String,
    pub snmp_version_used: String,
    /// Raw SNMP facts keyed by the IP they were collected from; inner keys
    /// are dotted-decimal OIDs (plus a handful of well-known field names).
    pub snmp_data_by_ip: BTreeMap<String, BTreeMap<String, String>>,
}

impl DeviceRecord {
    /// Whether the record satisfies its structural invariants.
    pub fn is_consistent(&self) -> bool {
        self.all_ips.contains(&self.primary_ip) && self.scan_count >= 1
    }
}

/// One device entry inside a session result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionDeviceResult {
    pub ip_address: String,
    pub vendor: String,
    pub device_type: String,
    pub model: String,
    pub serial_number: String,
    pub os_version: String,
    pub sys_descr: String,
    pub sys_name: String,
    pub snmp_data: BTreeMap<String, String>,
    pub confidence_score: u32,
    pub detection_method: String,
    pub scan_timestamp: DateTime<Utc>,
    pub snmp_version: String,
}

/// A per-host scan session entry accompanying a device record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionResult {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub target_ip: String,
    pub scan_type: String,
    pub devices_found: u32,
    pub new_devices: u32,
    pub updated_devices: u32,
    pub snmp_version_used: String,
    pub results: Vec<SessionDeviceResult>,
    pub duration: String,
}

/// SNMP version success split for a scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SnmpVersionBreakdown {
    pub v3_successful: u64,
    pub v2c_successful: u64,
    pub total_successful: u64,
}

/// Aggregate statistics for a scan document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanStatistics {
    pub total_devices: u64,
    pub vendor_breakdown: BTreeMap<String, u64>,
    pub type_breakdown: BTreeMap<String, u64>,
    pub snmp_version_breakdown: SnmpVersionBreakdown,
    pub devices_per_subnet: BTreeMap<String, u64>,
    pub avg_confidence: f64,
    pub last_scan_date: DateTime<Utc>,
}

/// Housekeeping settings embedded in a scan document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanFileConfig {
    pub max_sessions: u32,
    pub max_devices: u32,
    pub auto_cleanup: bool,
    pub cleanup_interval: u64,
    pub backup_enabled: bool,
    pub backup_count: u32,
    pub compress_backups: bool,
}

impl Default for ScanFileConfig {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            max_devices: 10_000,
            auto_cleanup: true,
            cleanup_interval: 86_400_000_000_000,
            backup_enabled: true,
            backup_count: 5,
            compress_backups: false,
        }
    }
}

/// The persistent scan file written by the scanner.
///
/// Devices are keyed by device id in a `BTreeMap` so serialization order
/// does not depend on worker completion order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanDocument {
    pub version: String,
    pub last_updated: DateTime<Utc>,
    pub total_devices: u64,
    pub devices: BTreeMap<String, DeviceRecord>,
    pub sessions: Vec<SessionResult>,
    pub statistics: ScanStatistics,
    pub config: ScanFileConfig,
}

pub const SCAN_DOCUMENT_VERSION: &str = "1.0.0";

/// Functional role of a device inside the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    Core,
    Access,
    Distribution,
    Firewall,
    Router,
    Switch,
    Wireless,
    LoadBalancer,
    Ups,
    Printer,
    Camera,
    Server,
    #[default]
    Unknown,
}

impl DeviceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceRole::Core => "core",
            DeviceRole::Access => "access",
            DeviceRole::Distribution => "distribution",
            DeviceRole::Firewall => "firewall",
            DeviceRole::Router => "router",
            DeviceRole::Switch => "switch",
            DeviceRole::Wireless => "wireless",
            DeviceRole::LoadBalancer => "load_balancer",
            DeviceRole::Ups => "ups",
            DeviceRole::Printer => "printer",
            DeviceRole::Camera => "camera",
            DeviceRole::Server => "server",
            DeviceRole::Unknown => "unknown",
        }
    }
}

impl DeviceRole {
    /// Parse a stored role name; anything unrecognized is `unknown`.
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "core" => DeviceRole::Core,
            "access" => DeviceRole::Access,
            "distribution" => DeviceRole::Distribution,
            "firewall" => DeviceRole::Firewall,
            "router" => DeviceRole::Router,
            "switch" => DeviceRole::Switch,
            "wireless" => DeviceRole::Wireless,
            "load_balancer" => DeviceRole::LoadBalancer,
            "ups" => DeviceRole::Ups,
            "printer" => DeviceRole::Printer,
            "camera" => DeviceRole::Camera,
            "server" => DeviceRole::Server,
            _ => DeviceRole::Unknown,
        }
    }
}

impl std::fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A device as listed by an inventory source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryDevice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_id: Option<i64>,
    pub device_key: String,
    pub device_name: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub fqdn: String,
    pub vendor: String,
    pub model: String,
    pub serial_number: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub sys_descr: String,
    #[serde(default)]
    pub site_code: String,
    #[serde(default)]
    pub device_role: DeviceRole,
    pub primary_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_discovered: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Outcome of one collection method call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MethodOutcome {
    pub method: String,
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub success: bool,
}

impl MethodOutcome {
    /// A successful method call.
    pub fn collected(method: impl Into<String>, duration: f64, data_size: u64) -> Self {
        Self {
            method: method.into(),
            duration,
            data_size: Some(data_size),
            error: None,
            success: true,
        }
    }

    /// A failed method call.
    pub fn failed(method: impl Into<String>, duration: f64, error: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            duration,
            data_size: None,
            error: Some(error.into()),
            success: false,
        }
    }
}

/// The append-only result of collecting one device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionRun {
    pub device_ip: String,
    pub device_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    pub success: bool,
    pub data: BTreeMap<String, serde_json::Value>,
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_source: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub methods_collected: Vec<MethodOutcome>,
    pub methods_failed: Vec<MethodOutcome>,
}

impl CollectionRun {
    /// A fresh run record for a device, stamped with the current time.
    pub fn started(device_ip: impl Into<String>, device_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            device_ip: device_ip.into(),
            device_name: device_name.into(),
            database_id: None,
            driver: None,
            success: false,
            data: BTreeMap::new(),
            errors: Vec::new(),
            credential_used: None,
            credential_source: None,
            started_at: now,
            ended_at: now,
            duration_seconds: 0.0,
            methods_collected: Vec::new(),
            methods_failed: Vec::new(),
        }
    }

    /// Stamp the end time and derive success from the collected methods.
    pub fn finalize(&mut self) {
        self.ended_at = Utc::now();
        self.duration_seconds = (self.ended_at - self.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        self.success = !self.methods_collected.is_empty();
    }
}
