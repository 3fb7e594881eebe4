//! Inventory sources: where the collector finds its devices.
//!
//! Two implementations share one interface: a scan-file reader over the
//! scanner's output document, and a store reader over the embedded
//! relational inventory. IP preference (management, then primary, then any
//! non-virtual address) must match across both so the tools agree on what
//! they collect.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use rusqlite::Connection;

use rapidcmdb_common::{
    DeviceRole, Error, InventoryDevice, Result, ScanDocument, device_key, site_code,
};

use crate::config::{DeviceFilters, RuntimeFilters};
use crate::driver::NON_NETWORK_VENDORS;

/// Device types the scan-file source drops unless non-network devices are
/// explicitly requested.
const NON_NETWORK_TYPES: &[&str] = &["printer", "ups", "server", "workstation"];

/// A source of collectible devices.
pub trait InventorySource {
    fn list_devices(&self, filters: &DeviceFilters) -> Result<Vec<InventoryDevice>>;
}

/// Reads devices from a scan document written by the scanner.
pub struct ScanFileSource {
    path: PathBuf,
}

impl ScanFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl InventorySource for ScanFileSource {
    fn list_devices(&self, filters: &DeviceFilters) -> Result<Vec<InventoryDevice>> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::ConfigInvalid(format!("read scan file '{}': {}", self.path.display(), e))
        })?;
        let document: ScanDocument = serde_json::from_str(&content).map_err(|e| {
            Error::ConfigInvalid(format!("parse scan file '{}': {}", self.path.display(), e))
        })?;

        let mut devices = Vec::new();
        for record in document.devices.into_values() {
            if record.vendor.is_empty() || record.device_type == "unknown" {
                tracing::debug!(ip = %record.primary_ip, "Skipping device without vendor or type");
                continue;
            }
            if !filters.include_non_network
                && NON_NETWORK_TYPES.contains(&record.device_type.as_str())
            {
                continue;
            }
            if record.confidence_score < filters.min_confidence {
                continue;
            }
            if !filters.vendors.is_empty()
                && !contains_ci(&filters.vendors, &record.vendor)
            {
                continue;
            }
            if !filters.device_types.is_empty()
                && !contains_ci(&filters.device_types, &record.device_type)
            {
                continue;
            }

            let device_name = if record.sys_name.is_empty() {
                record.primary_ip.clone()
            } else {
                record.sys_name.clone()
            };
            let site = site_code(&device_name);
            if !filters.site_codes.is_empty() && !contains_ci(&filters.site_codes, &site) {
                continue;
            }

            devices.push(InventoryDevice {
                database_id: None,
                device_key: device_key(&record.vendor, &record.serial_number, &record.model),
                device_name,
                hostname: record.sys_name.clone(),
                fqdn: String::new(),
                vendor: record.vendor,
                model: record.model,
                serial_number: record.serial_number,
                os_version: record.os_version,
                sys_descr: record.sys_descr,
                site_code: site,
                device_role: DeviceRole::Unknown,
                primary_ip: record.primary_ip,
                first_discovered: Some(record.first_seen),
                last_updated: Some(record.last_seen),
                is_active: true,
            });
        }

        devices.sort_by(|a, b| {
            a.site_code
                .cmp(&b.site_code)
                .then_with(|| a.device_name.cmp(&b.device_name))
        });
        Ok(devices)
    }
}

/// Reads devices from the relational inventory store.
pub struct StoreSource {
    db_path: PathBuf,
}

impl StoreSource {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }
}

impl InventorySource for StoreSource {
    fn list_devices(&self, filters: &DeviceFilters) -> Result<Vec<InventoryDevice>> {
        let conn = Connection::open(&self.db_path)
            .map_err(|e| Error::ConfigInvalid(format!("open store '{}': {}", self.db_path.display(), e)))?;
        list_store_devices(&conn, filters)
    }
}

/// The `list_devices` query against an open store connection.
///
/// IP preference per device: a management address first, then the primary
/// flag, then any non-virtual address (management, loopback, vlan, rest).
fn list_store_devices(conn: &Connection, filters: &DeviceFilters) -> Result<Vec<InventoryDevice>> {
    let mut sql = String::from(
        "SELECT * FROM ( \
           SELECT d.id, d.device_key, d.device_name, d.hostname, d.fqdn, d.vendor, d.model, \
                  d.serial_number, d.os_version, d.site_code, d.device_role, d.is_active, \
                  COALESCE( \
                    (SELECT ip_address FROM device_ips \
                      WHERE device_id = d.id AND ip_type = 'management' \
                      ORDER BY is_primary DESC, id LIMIT 1), \
                    (SELECT ip_address FROM device_ips \
                      WHERE device_id = d.id AND is_primary = 1 \
                      ORDER BY id LIMIT 1), \
                    (SELECT ip_address FROM device_ips \
                      WHERE device_id = d.id AND ip_type NOT IN ('virtual', 'hsrp', 'vrrp') \
                      ORDER BY CASE ip_type \
                                 WHEN 'management' THEN 1 \
                                 WHEN 'loopback' THEN 2 \
                                 WHEN 'vlan' THEN 3 \
                                 ELSE 4 \
                               END, is_primary DESC, id LIMIT 1) \
                  ) AS ip_address \
           FROM devices d WHERE 1=1",
    );

    let mut params: Vec<String> = Vec::new();

    if filters.active_only {
        sql.push_str(" AND d.is_active = 1");
    }
    if !filters.site_codes.is_empty() {
        sql.push_str(&format!(
            " AND d.site_code IN ({})",
            placeholders(filters.site_codes.len())
        ));
        params.extend(filters.site_codes.iter().cloned());
    }
    if !filters.device_roles.is_empty() {
        sql.push_str(&format!(
            " AND d.device_role IN ({})",
            placeholders(filters.device_roles.len())
        ));
        params.extend(filters.device_roles.iter().cloned());
    }
    if !filters.vendors.is_empty() {
        sql.push_str(&format!(
            " AND LOWER(d.vendor) IN ({})",
            placeholders(filters.vendors.len())
        ));
        params.extend(filters.vendors.iter().map(|v| v.to_lowercase()));
    }
    if !filters.exclude_models.is_empty() {
        sql.push_str(&format!(
            " AND d.model NOT IN ({})",
            placeholders(filters.exclude_models.len())
        ));
        params.extend(filters.exclude_models.iter().cloned());
    }
    if !filters.include_non_network {
        sql.push_str(&format!(
            " AND LOWER(d.vendor) NOT IN ({})",
            placeholders(NON_NETWORK_VENDORS.len())
        ));
        params.extend(NON_NETWORK_VENDORS.iter().map(|v| v.to_string()));
    }

    sql.push_str(") WHERE ip_address IS NOT NULL ORDER BY site_code, device_name");

    let mut statement = conn
        .prepare(&sql)
        .map_err(|e| Error::ConfigInvalid(format!("prepare store query: {}", e)))?;

    let rows = statement
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok(InventoryDevice {
                database_id: Some(row.get::<_, i64>("id")?),
                device_key: row.get::<_, Option<String>>("device_key")?.unwrap_or_default(),
                device_name: row.get::<_, Option<String>>("device_name")?.unwrap_or_default(),
                hostname: row.get::<_, Option<String>>("hostname")?.unwrap_or_default(),
                fqdn: row.get::<_, Option<String>>("fqdn")?.unwrap_or_default(),
                vendor: row.get::<_, Option<String>>("vendor")?.unwrap_or_default(),
                model: row.get::<_, Option<String>>("model")?.unwrap_or_default(),
                serial_number: row
                    .get::<_, Option<String>>("serial_number")?
                    .unwrap_or_default(),
                os_version: row.get::<_, Option<String>>("os_version")?.unwrap_or_default(),
                sys_descr: String::new(),
                site_code: row.get::<_, Option<String>>("site_code")?.unwrap_or_default(),
                device_role: DeviceRole::from_name(
                    &row.get::<_, Option<String>>("device_role")?.unwrap_or_default(),
                ),
                primary_ip: row.get::<_, Option<String>>("ip_address")?.unwrap_or_default(),
                first_discovered: None,
                last_updated: None,
                is_active: row.get::<_, i64>("is_active")? != 0,
            })
        })
        .map_err(|e| Error::ConfigInvalid(format!("store query: {}", e)))?;

    let mut devices = Vec::new();
    for row in rows {
        let device = row.map_err(|e| Error::ConfigInvalid(format!("store row: {}", e)))?;
        if device.primary_ip.parse::<Ipv4Addr>().is_err() {
            tracing::warn!(
                device = %device.device_name,
                ip = %device.primary_ip,
                "No valid IP for device, skipping"
            );
            continue;
        }
        devices.push(device);
    }
    Ok(devices)
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

fn contains_ci(haystack: &[String], needle: &str) -> bool {
    let needle = needle.to_lowercase();
    haystack.iter().any(|h| h.to_lowercase() == needle)
}

fn matches_any(value: &str, needles: &[String]) -> bool {
    let value = value.to_lowercase();
    needles.iter().any(|n| value.contains(&n.to_lowercase()))
}

/// Case-insensitive substring filters applied after listing.
pub fn apply_runtime_filters(
    devices: Vec<InventoryDevice>,
    filters: &RuntimeFilters,
) -> Vec<InventoryDevice> {
    if filters.is_empty() {
        return devices;
    }
    let original = devices.len();

    let filtered: Vec<InventoryDevice> = devices
        .into_iter()
        .filter(|d| filters.name.is_empty() || matches_any(&d.device_name, &filters.name))
        .filter(|d| filters.site.is_empty() || matches_any(&d.site_code, &filters.site))
        .filter(|d| filters.vendor.is_empty() || matches_any(&d.vendor, &filters.vendor))
        .filter(|d| {
            filters.role.is_empty() || matches_any(d.device_role.as_str(), &filters.role)
        })
        .filter(|d| filters.model.is_empty() || matches_any(&d.model, &filters.model))
        .filter(|d| {
            filters.ip.is_empty() || filters.ip.iter().any(|n| d.primary_ip.contains(n.as_str()))
        })
        .filter(|d| {
            filters.legacy.is_empty()
                || matches_any(&d.device_name, &filters.legacy)
                || matches_any(&d.site_code, &filters.legacy)
                || matches_any(&d.vendor, &filters.legacy)
                || matches_any(d.device_role.as_str(), &filters.legacy)
                || matches_any(&d.model, &filters.legacy)
        })
        .collect();

    if filtered.len() != original {
        tracing::info!(
            kept = filtered.len(),
            from = original,
            "Applied runtime filters"
        );
    }
    filtered
}

/// Build the reference store schema the `list_devices` query runs against.
#[cfg(test)]
pub fn create_reference_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS devices ( \
            id INTEGER PRIMARY KEY AUTOINCREMENT, \
            device_key TEXT NOT NULL UNIQUE, \
            device_name TEXT NOT NULL UNIQUE, \
            hostname TEXT, \
            fqdn TEXT, \
            vendor TEXT, \
            model TEXT, \
            serial_number TEXT, \
            os_version TEXT, \
            site_code TEXT, \
            device_role TEXT DEFAULT 'unknown', \
            first_discovered TEXT, \
            last_updated TEXT, \
            is_active INTEGER DEFAULT 1 \
        ); \
        CREATE TABLE IF NOT EXISTS device_ips ( \
            id INTEGER PRIMARY KEY AUTOINCREMENT, \
            device_id INTEGER NOT NULL REFERENCES devices(id), \
            ip_address TEXT NOT NULL, \
            ip_type TEXT DEFAULT 'management', \
            is_primary INTEGER DEFAULT 0, \
            interface_name TEXT, \
            vlan_id INTEGER \
        ); \
        CREATE INDEX IF NOT EXISTS idx_devices_device_key ON devices(device_key); \
        CREATE INDEX IF NOT EXISTS idx_device_ips_device ON device_ips(device_id);",
    )
    .map_err(|e| Error::ConfigInvalid(format!("create schema: {}", e)))?;
    Ok(())
}
