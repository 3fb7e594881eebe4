//! Scan statistics aggregation.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use chrono::Utc;

use rapidcmdb_common::{DeviceRecord, ScanStatistics, SnmpVersionBreakdown};

/// Build the statistics block for a scan document.
pub fn generate_statistics(
    devices: &BTreeMap<String, DeviceRecord>,
    v3_successful: u64,
    v2c_successful: u64,
) -> ScanStatistics {
    let mut vendor_breakdown: BTreeMap<String, u64> = BTreeMap::new();
    let mut type_breakdown: BTreeMap<String, u64> = BTreeMap::new();
    let mut devices_per_subnet: BTreeMap<String, u64> = BTreeMap::new();
    let mut confidence_total: u64 = 0;

    for device in devices.values() {
        let vendor = if device.vendor.is_empty() {
            "unknown"
        } else {
            &device.vendor
        };
        let device_type = if device.device_type.is_empty() {
            "unknown"
        } else {
            &device.device_type
        };

        *vendor_breakdown.entry(vendor.to_string()).or_default() += 1;
        *type_breakdown.entry(device_type.to_string()).or_default() += 1;
        *devices_per_subnet.entry(subnet_bucket(&device.primary_ip)).or_default() += 1;
        confidence_total += u64::from(device.confidence_score);
    }

    let avg_confidence = if devices.is_empty() {
        0.0
    } else {
        confidence_total as f64 / devices.len() as f64
    };

    ScanStatistics {
        total_devices: devices.len() as u64,
        vendor_breakdown,
        type_breakdown,
        snmp_version_breakdown: SnmpVersionBreakdown {
            v3_successful,
            v2c_successful,
            total_successful: v3_successful + v2c_successful,
        },
        devices_per_subnet,
        avg_confidence,
        last_scan_date: Utc::now(),
    }
}

/// Bucket an address into its /24 (IPv4) or a catch-all key.
fn subnet_bucket(ip: &str) -> String {
    match ip.parse::<Ipv4Addr>() {
        Ok(addr) => {
            let octets = addr.octets();
            format!("{}.{}.{}.0/24", octets[0], octets[1], octets[2])
        }
        Err(_) => "other".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn device(id: &str, ip: &str, vendor: &str, device_type: &str, confidence: u32) -> DeviceRecord {
        DeviceRecord {
            id: id.to_string(),
            primary_ip: ip.to_string(),
            all_ips: vec![ip.to_string()],
            mac_addresses: vec![],
            interfaces: BTreeMap::new(),
            vendor: vendor.to_string(),
            device_type: device_type.to_string(),
            model: String::new(),
            serial_number: String::new(),
            os_version: String::new(),
            sys_descr: String::new(),
            sys_name: String::new(),
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            scan_count: 1,
            last_scan_id: "scan_test".to_string(),
            confidence_score: confidence,
            detection_method: "pattern_match".to_string(),
            snmp_version_used: "v2c".to_string(),
            snmp_data_by_ip: BTreeMap::new(),
        }
    }

    #[test]
    fn test_statistics_breakdowns() {
        let mut devices = BTreeMap::new();
        for (id, ip, vendor, dtype, conf) in [
            ("a", "10.0.1.1", "cisco", "switch", 90),
            ("b", "10.0.1.2", "cisco", "router", 100),
            ("c", "10.0.2.1", "", "", 30),
        ] {
            devices.insert(id.to_string(), device(id, ip, vendor, dtype, conf));
        }

        let stats = generate_statistics(&devices, 1, 2);

        assert_eq!(stats.total_devices, 3);
        assert_eq!(stats.vendor_breakdown["cisco"], 2);
        assert_eq!(stats.vendor_breakdown["unknown"], 1);
        assert_eq!(stats.type_breakdown["switch"], 1);
        assert_eq!(stats.devices_per_subnet["10.0.1.0/24"], 2);
        assert_eq!(stats.devices_per_subnet["10.0.2.0/24"], 1);
        assert_eq!(stats.snmp_version_breakdown.v3_successful, 1);
        assert_eq!(stats.snmp_version_breakdown.v2c_successful, 2);
        assert_eq!(stats.snmp_version_breakdown.total_successful, 3);
        assert!((stats.avg_confidence - (220.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_empty_statistics() {
        let stats = generate_statistics(&BTreeMap::new(), 0, 0);
        assert_eq!(stats.total_devices, 0);
        assert_eq!(stats.avg_confidence, 0.0);
    }
}
