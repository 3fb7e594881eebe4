//! Collection run summary aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use rapidcmdb_common::{CollectionRun, InventoryDevice};

/// Per-method aggregate statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MethodStats {
    pub success_count: u64,
    pub total_duration: f64,
    pub avg_duration: f64,
    pub bytes: u64,
}

/// The devices block of the summary, keyed by collection IP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryDevice {
    pub primary_ip: String,
    pub device_name: String,
    pub vendor: String,
    pub model: String,
    pub serial_number: String,
    pub site_code: String,
    pub device_role: String,
    pub device_type: String,
    pub sys_name: String,
    pub sys_descr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub scan_type: String,
    pub scan_time: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub total_runtime_seconds: f64,
    pub source: String,
    pub max_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSummaryBlock {
    pub total_devices: u64,
    pub successful_collections: u64,
    pub failed_collections: u64,
    pub success_rate: f64,
    pub average_device_time: f64,
    pub vendor_breakdown: BTreeMap<String, u64>,
    pub credential_breakdown: BTreeMap<String, u64>,
    pub method_stats: BTreeMap<String, MethodStats>,
}

/// The consolidated run summary document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub scan_metadata: RunMetadata,
    pub devices: BTreeMap<String, SummaryDevice>,
    pub collection_summary: CollectionSummaryBlock,
    pub collection_results: Vec<CollectionRun>,
}

/// Aggregate results and devices into the summary document.
pub fn build_summary(
    results: Vec<CollectionRun>,
    devices: &[InventoryDevice],
    scan_type: &str,
    source: &str,
    started_at: DateTime<Utc>,
    max_workers: usize,
) -> RunSummary {
    let ended_at = Utc::now();

    let mut summary_devices = BTreeMap::new();
    for device in devices {
        summary_devices.insert(
            device.primary_ip.clone(),
            SummaryDevice {
                primary_ip: device.primary_ip.clone(),
                device_name: device.device_name.clone(),
                vendor: device.vendor.clone(),
                model: device.model.clone(),
                serial_number: device.serial_number.clone(),
                site_code: device.site_code.clone(),
                device_role: device.device_role.as_str().to_string(),
                device_type: "network".to_string(),
                sys_name: if device.hostname.is_empty() {
                    device.device_name.clone()
                } else {
                    device.hostname.clone()
                },
                sys_descr: device.sys_descr.clone(),
                database_id: device.database_id,
            },
        );
    }

    let total = results.len() as u64;
    let successful = results.iter().filter(|r| r.success).count() as u64;

    let mut vendor_breakdown: BTreeMap<String, u64> = BTreeMap::new();
    let mut credential_breakdown: BTreeMap<String, u64> = BTreeMap::new();
    let mut method_stats: BTreeMap<String, MethodStats> = BTreeMap::new();
    let mut device_time_total = 0.0;

    for run in &results {
        device_time_total += run.duration_seconds;

        let vendor = summary_devices
            .get(&run.device_ip)
            .map(|d| d.vendor.clone())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        *vendor_breakdown.entry(vendor).or_default() += 1;

        if let Some(credential) = &run.credential_used {
            *credential_breakdown.entry(credential.clone()).or_default() += 1;
        }

        for method in &run.methods_collected {
            let stats = method_stats.entry(method.method.clone()).or_default();
            stats.success_count += 1;
            stats.total_duration += method.duration;
            stats.bytes += method.data_size.unwrap_or(0);
        }
    }

    for stats in method_stats.values_mut() {
        if stats.success_count > 0 {
            stats.avg_duration = stats.total_duration / stats.success_count as f64;
        }
    }

    let success_rate = if total > 0 {
        successful as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    let average_device_time = if total > 0 {
        device_time_total / total as f64
    } else {
        0.0
    };

    RunSummary {
        scan_metadata: RunMetadata {
            scan_type: scan_type.to_string(),
            scan_time: ended_at,
            started_at,
            ended_at,
            total_runtime_seconds: (ended_at - started_at)
                .to_std()
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
            source: source.to_string(),
            max_workers,
        },
        devices: summary_devices,
        collection_summary: CollectionSummaryBlock {
            total_devices: total,
            successful_collections: successful,
            failed_collections: total - successful,
            success_rate,
            average_device_time,
            vendor_breakdown,
            credential_breakdown,
            method_stats,
        },
        collection_results: results,
    }
}
