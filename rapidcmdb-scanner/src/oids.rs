//! Standard MIB-II and Entity-MIB object identifiers.
//!
//! These are always collected: the system group drives identification and
//! fingerprinting, the Entity-MIB entries feed model/serial/firmware
//! extraction.

pub const SYS_DESCR: &str = "1.3.6.1.2.1.1.1.0";
pub const SYS_OBJECT_ID: &str = "1.3.6.1.2.1.1.2.0";
pub const SYS_UPTIME: &str = "1.3.6.1.2.1.1.3.0";
pub const SYS_CONTACT: &str = "1.3.6.1.2.1.1.4.0";
pub const SYS_NAME: &str = "1.3.6.1.2.1.1.5.0";
pub const SYS_LOCATION: &str = "1.3.6.1.2.1.1.6.0";
pub const SYS_SERVICES: &str = "1.3.6.1.2.1.1.7.0";

pub const ENT_PHYSICAL_DESCR: &str = "1.3.6.1.2.1.47.1.1.1.1.2.1";
pub const ENT_PHYSICAL_NAME: &str = "1.3.6.1.2.1.47.1.1.1.1.7.1";
pub const ENT_PHYSICAL_HARDWARE_REV: &str = "1.3.6.1.2.1.47.1.1.1.1.8.1";
pub const ENT_PHYSICAL_FIRMWARE_REV: &str = "1.3.6.1.2.1.47.1.1.1.1.9.1";
pub const ENT_PHYSICAL_SOFTWARE_REV: &str = "1.3.6.1.2.1.47.1.1.1.1.10.1";
pub const ENT_PHYSICAL_SERIAL_NUM: &str = "1.3.6.1.2.1.47.1.1.1.1.11.1";
pub const ENT_PHYSICAL_MFG_NAME: &str = "1.3.6.1.2.1.47.1.1.1.1.12.1";
pub const ENT_PHYSICAL_MODEL_NAME: &str = "1.3.6.1.2.1.47.1.1.1.1.13.1";

/// System-group OIDs collected on every responsive host, most critical
/// first.
pub const PRIORITY_OIDS: &[(&str, &str)] = &[
    ("sysDescr", SYS_DESCR),
    ("sysName", SYS_NAME),
    ("sysObjectID", SYS_OBJECT_ID),
    ("sysUpTime", SYS_UPTIME),
    ("sysContact", SYS_CONTACT),
    ("sysLocation", SYS_LOCATION),
    ("sysServices", SYS_SERVICES),
];

/// Entity-MIB OIDs collected best-effort for hardware details.
pub const EXTENDED_OIDS: &[(&str, &str)] = &[
    ("entPhysicalDescr", ENT_PHYSICAL_DESCR),
    ("entPhysicalModelName", ENT_PHYSICAL_MODEL_NAME),
    ("entPhysicalSerialNum", ENT_PHYSICAL_SERIAL_NUM),
    ("entPhysicalSoftwareRev", ENT_PHYSICAL_SOFTWARE_REV),
    ("entPhysicalFirmwareRev", ENT_PHYSICAL_FIRMWARE_REV),
    ("entPhysicalHardwareRev", ENT_PHYSICAL_HARDWARE_REV),
    ("entPhysicalMfgName", ENT_PHYSICAL_MFG_NAME),
];

/// The two OIDs used to probe whether an agent answers at all.
pub const CRITICAL_OIDS: &[&str] = &[SYS_DESCR, SYS_NAME];

/// Display names for Entity-MIB values carried into device records.
pub const ENTITY_FIELD_NAMES: &[(&str, &str)] = &[
    (ENT_PHYSICAL_MODEL_NAME, "Entity Model Name"),
    (ENT_PHYSICAL_SERIAL_NUM, "Entity Serial Number"),
    (ENT_PHYSICAL_HARDWARE_REV, "Entity Hardware Revision"),
];

/// Resolve a system-group OID to its short name.
pub fn standard_oid_name(oid: &str) -> Option<&'static str> {
    PRIORITY_OIDS
        .iter()
        .find(|(_, o)| *o == oid)
        .map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_oid_name() {
        assert_eq!(standard_oid_name(SYS_DESCR), Some("sysDescr"));
        assert_eq!(standard_oid_name(SYS_NAME), Some("sysName"));
        assert_eq!(standard_oid_name("1.3.6.1.4.1.9.1.1"), None);
    }

    #[test]
    fn test_critical_oids_are_in_priority_set() {
        for oid in CRITICAL_OIDS {
            assert!(PRIORITY_OIDS.iter().any(|(_, o)| o == oid));
        }
    }
}
