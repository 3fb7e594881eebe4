//! Vendor fingerprint rule bundle, loaded from YAML.
//!
//! The bundle has three sections: `vendors` (per-vendor detection and
//! extraction rules), `common_oids` (named MIB-II fields) and
//! `detection_rules.priority_order` (the vendor order that decides
//! classification tie-breaks).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use rapidcmdb_common::{Error, Result};

/// The full rule bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FingerprintRules {
    #[serde(default)]
    pub vendors: BTreeMap<String, VendorRules>,

    /// Name -> OID for standard MIB-II fields.
    #[serde(default)]
    pub common_oids: BTreeMap<String, String>,

    #[serde(default)]
    pub detection_rules: DetectionRules,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionRules {
    /// Vendor names in classification order.
    #[serde(default)]
    pub priority_order: Vec<String>,
}

/// Detection and extraction rules for one vendor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VendorRules {
    #[serde(default)]
    pub enterprise_oid: Option<String>,

    #[serde(default)]
    pub device_types: Vec<String>,

    #[serde(default)]
    pub fingerprint_oids: Vec<FingerprintOid>,

    /// Substrings that definitively identify the vendor.
    #[serde(default)]
    pub definitive_patterns: Vec<String>,

    /// Substrings that disqualify the vendor outright.
    #[serde(default)]
    pub exclusion_patterns: Vec<String>,

    #[serde(default)]
    pub device_type_rules: BTreeMap<String, DeviceTypeRule>,

    #[serde(default)]
    pub model_extraction: Vec<ExtractionRule>,

    #[serde(default)]
    pub serial_extraction: Vec<ExtractionRule>,

    #[serde(default)]
    pub firmware_extraction: Vec<ExtractionRule>,
}

/// A vendor-specific OID probed during collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintOid {
    pub oid: String,

    /// Stable identifier used across implementations; never empty.
    pub name: String,

    #[serde(default = "default_oid_priority")]
    pub priority: u32,

    /// A definitive OID identifies the vendor on its own.
    #[serde(default)]
    pub definitive: bool,

    #[serde(default)]
    pub description: String,

    /// When non-empty, the returned value must match one of these
    /// (case-insensitive) for the OID to count.
    #[serde(default)]
    pub expected_values: Vec<String>,
}

fn default_oid_priority() -> u32 {
    10
}

/// Pattern scoring rules for one device type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceTypeRule {
    #[serde(default)]
    pub definitive_patterns: Vec<String>,

    /// All mandatory patterns must hit or the type is disqualified.
    #[serde(default)]
    pub mandatory_patterns: Vec<String>,

    #[serde(default)]
    pub optional_patterns: Vec<String>,

    /// Lower values win ties.
    #[serde(default = "default_type_priority")]
    pub priority: u32,
}

fn default_type_priority() -> u32 {
    99
}

/// A regex field-extraction rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRule {
    pub regex: String,

    #[serde(default = "default_capture_group")]
    pub capture_group: usize,

    /// When non-empty, the rule only applies to these device types.
    #[serde(default)]
    pub device_types: Vec<String>,
}

fn default_capture_group() -> usize {
    1
}

impl FingerprintRules {
    /// Load a rule bundle from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigInvalid(format!(
                "Failed to read rules file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    /// Parse a rule bundle from a YAML string and validate it.
    pub fn parse(content: &str) -> Result<Self> {
        let rules: FingerprintRules = serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigInvalid(format!("Failed to parse rules YAML: {}", e)))?;
        rules.validate()?;
        Ok(rules)
    }

    fn validate(&self) -> Result<()> {
        for (vendor, vendor_rules) in &self.vendors {
            for oid in &vendor_rules.fingerprint_oids {
                if oid.name.trim().is_empty() {
                    return Err(Error::ConfigInvalid(format!(
                        "Vendor '{}' has a fingerprint OID '{}' without a name",
                        vendor, oid.oid
                    )));
                }
                if oid.oid.trim().is_empty() {
                    return Err(Error::ConfigInvalid(format!(
                        "Vendor '{}' has a fingerprint OID entry with an empty OID",
                        vendor
                    )));
                }
            }
        }
        Ok(())
    }

    /// Vendor names in classification order, restricted to vendors that
    /// actually have rules.
    pub fn vendor_priority(&self) -> impl Iterator<Item = (&String, &VendorRules)> {
        self.detection_rules
            .priority_order
            .iter()
            .filter_map(|name| self.vendors.get(name).map(|rules| (name, rules)))
    }

    /// All fingerprint OIDs across vendors, as `oid -> name`.
    pub fn all_fingerprint_oids(&self) -> BTreeMap<String, String> {
        let mut oids = BTreeMap::new();
        for vendor_rules in self.vendors.values() {
            for oid in &vendor_rules.fingerprint_oids {
                oids.insert(oid.oid.clone(), oid.name.clone());
            }
        }
        oids
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
vendors:
  cisco:
    enterprise_oid: "1.3.6.1.4.1.9"
    device_types: [switch, router]
    fingerprint_oids:
      - oid: "1.3.6.1.4.1.9.2.1.73.0"
        name: "Cisco Model"
        priority: 1
        definitive: true
    definitive_patterns:
      - "cisco ios"
    device_type_rules:
      switch:
        mandatory_patterns: ["switch"]
        priority: 2
common_oids:
  sysDescr: "1.3.6.1.2.1.1.1.0"
detection_rules:
  priority_order: [cisco]
"#;

    #[test]
    fn test_parse_sample_rules() {
        let rules = FingerprintRules::parse(SAMPLE).unwrap();

        let cisco = rules.vendors.get("cisco").unwrap();
        assert_eq!(cisco.fingerprint_oids.len(), 1);
        assert!(cisco.fingerprint_oids[0].definitive);
        assert_eq!(cisco.fingerprint_oids[0].priority, 1);
        assert_eq!(cisco.device_type_rules["switch"].priority, 2);
        assert_eq!(rules.detection_rules.priority_order, vec!["cisco"]);
    }

    #[test]
    fn test_fingerprint_oid_requires_name() {
        let yaml = r#"
vendors:
  broken:
    fingerprint_oids:
      - oid: "1.3.6.1.4.1.9.2.1.73.0"
        name: ""
"#;
        let err = FingerprintRules::parse(yaml).unwrap_err();
        assert_eq!(err.label(), "config_invalid");
    }

    #[test]
    fn test_vendor_priority_skips_unknown_names() {
        let yaml = r#"
vendors:
  cisco:
    definitive_patterns: ["cisco"]
detection_rules:
  priority_order: [arista, cisco]
"#;
        let rules = FingerprintRules::parse(yaml).unwrap();
        let order: Vec<&String> = rules.vendor_priority().map(|(name, _)| name).collect();
        assert_eq!(order, vec!["cisco"]);
    }

    #[test]
    fn test_all_fingerprint_oids() {
        let yaml = r#"
vendors:
  cisco:
    fingerprint_oids:
      - { oid: "1.3.6.1.4.1.9.2.1.73.0", name: "Cisco Model", priority: 1, definitive: true }
      - { oid: "1.3.6.1.4.1.9.9.92.1.1.1.2", name: "Cisco Extra", priority: 9 }
"#;
        let rules = FingerprintRules::parse(yaml).unwrap();
        let oids = rules.all_fingerprint_oids();
        assert_eq!(oids.len(), 2);
        assert_eq!(oids["1.3.6.1.4.1.9.2.1.73.0"], "Cisco Model");
    }

    #[test]
    fn test_defaults() {
        let yaml = r#"
vendors:
  apc:
    fingerprint_oids:
      - { oid: "1.3.6.1.4.1.318.1.1.1.1.1.1.0", name: "APC Model Number" }
"#;
        let rules = FingerprintRules::parse(yaml).unwrap();
        let oid = &rules.vendors["apc"].fingerprint_oids[0];
        assert_eq!(oid.priority, 10);
        assert!(!oid.definitive);
        assert!(oid.expected_values.is_empty());
    }
}
