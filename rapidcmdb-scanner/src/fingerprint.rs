//! Vendor and device-type classification from SNMP facts.
//!
//! The engine is a pure function of `(rules, facts)`: no I/O, no clock
//! reads, deterministic output for identical input.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use rapidcmdb_common::{Error, Result};

use crate::oids;
use crate::rules::{DeviceTypeRule, ExtractionRule, FingerprintRules, VendorRules};

/// How a verdict was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    DefinitiveOidMatch,
    DefinitivePatternMatch,
    PatternMatch,
    NoVendorDetected,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::DefinitiveOidMatch => "definitive_oid_match",
            DetectionMethod::DefinitivePatternMatch => "definitive_pattern_match",
            DetectionMethod::PatternMatch => "pattern_match",
            DetectionMethod::NoVendorDetected => "no_vendor_detected",
        }
    }
}

/// Classification result for one device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub vendor: String,
    pub device_type: String,
    pub model: String,
    pub serial_number: String,
    pub os_version: String,
    pub confidence_score: u32,
    pub detection_method: DetectionMethod,
    pub matched_oids: Vec<String>,
    pub matched_patterns: Vec<String>,
}

impl Verdict {
    /// The verdict for a device no vendor rule could claim.
    fn no_vendor() -> Self {
        Self {
            vendor: String::new(),
            device_type: String::new(),
            model: String::new(),
            serial_number: String::new(),
            os_version: String::new(),
            confidence_score: 30,
            detection_method: DetectionMethod::NoVendorDetected,
            matched_oids: Vec::new(),
            matched_patterns: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct CompiledExtraction {
    regex: Regex,
    capture_group: usize,
    device_types: Vec<String>,
}

#[derive(Default, Debug)]
struct CompiledVendor {
    model: Vec<CompiledExtraction>,
    serial: Vec<CompiledExtraction>,
    firmware: Vec<CompiledExtraction>,
}

/// Deterministic fingerprint engine.
#[derive(Debug)]
pub struct FingerprintEngine {
    rules: FingerprintRules,
    compiled: BTreeMap<String, CompiledVendor>,
}

impl FingerprintEngine {
    /// Build an engine, compiling every extraction regex up front.
    pub fn new(rules: FingerprintRules) -> Result<Self> {
        let mut compiled = BTreeMap::new();
        for (vendor, vendor_rules) in &rules.vendors {
            compiled.insert(
                vendor.clone(),
                CompiledVendor {
                    model: compile_rules(vendor, &vendor_rules.model_extraction)?,
                    serial: compile_rules(vendor, &vendor_rules.serial_extraction)?,
                    firmware: compile_rules(vendor, &vendor_rules.firmware_extraction)?,
                },
            );
        }
        Ok(Self { rules, compiled })
    }

    pub fn rules(&self) -> &FingerprintRules {
        &self.rules
    }

    /// Classify a device from its SNMP fact set.
    pub fn fingerprint(&self, facts: &BTreeMap<String, String>) -> Verdict {
        if let Some(verdict) = self.check_definitive_oids(facts) {
            return verdict;
        }
        self.pattern_based_fingerprint(facts)
    }

    /// Stage 1: definitive vendor OIDs, in vendor priority order.
    fn check_definitive_oids(&self, facts: &BTreeMap<String, String>) -> Option<Verdict> {
        for (vendor, vendor_rules) in self.rules.vendor_priority() {
            let mut matched_names = Vec::new();
            let mut matched_values = Vec::new();

            for oid_rule in &vendor_rules.fingerprint_oids {
                if !oid_rule.definitive {
                    continue;
                }
                let Some(value) = facts.get(&oid_rule.oid).filter(|v| !v.is_empty()) else {
                    continue;
                };
                if !oid_rule.expected_values.is_empty() {
                    let value_lower = value.to_lowercase();
                    if !oid_rule
                        .expected_values
                        .iter()
                        .any(|expected| expected.to_lowercase() == value_lower)
                    {
                        continue;
                    }
                }
                matched_names.push(oid_rule.name.to_lowercase());
                matched_values.push(value.clone());
            }

            if !matched_names.is_empty() {
                return Some(self.process_definitive_match(
                    vendor,
                    vendor_rules,
                    matched_names,
                    &matched_values,
                    facts,
                ));
            }
        }
        None
    }

    fn process_definitive_match(
        &self,
        vendor: &str,
        vendor_rules: &VendorRules,
        matched_oids: Vec<String>,
        matched_values: &[String],
        facts: &BTreeMap<String, String>,
    ) -> Verdict {
        let (mut model, mut serial, mut firmware) = smart_field_extraction(facts, vendor_rules);

        let matched_text = matched_values.join(" ").to_lowercase();
        let device_type = determine_device_type(vendor_rules, &matched_text);

        // Regex rules pick up whatever smart extraction missed.
        let all_values: String = facts.values().cloned().collect::<Vec<_>>().join(" ");
        let compiled = &self.compiled[vendor];
        if model.is_empty() {
            model = extract_field(&compiled.model, &all_values, &device_type);
        }
        if serial.is_empty() {
            serial = extract_field(&compiled.serial, &all_values, &device_type);
        }
        if firmware.is_empty() {
            firmware = extract_field(&compiled.firmware, &all_values, &device_type);
        }

        Verdict {
            vendor: vendor.to_string(),
            device_type: if device_type == "unknown" {
                "device".to_string()
            } else {
                device_type
            },
            model,
            serial_number: serial,
            os_version: firmware,
            confidence_score: 100,
            detection_method: DetectionMethod::DefinitiveOidMatch,
            matched_oids,
            matched_patterns: Vec::new(),
        }
    }

    /// Stage 2: substring pattern scoring over the concatenated facts.
    ///
    /// Patterns match against a lowercased haystack; field extraction runs
    /// on the original-case text so extracted values keep their spelling.
    fn pattern_based_fingerprint(&self, facts: &BTreeMap<String, String>) -> Verdict {
        let sys_descr = facts.get(oids::SYS_DESCR).cloned().unwrap_or_default();
        let sys_name = facts.get(oids::SYS_NAME).cloned().unwrap_or_default();

        let mut raw_text = format!("{} {}", sys_descr, sys_name);
        for value in facts.values() {
            if !value.is_empty() {
                raw_text.push(' ');
                raw_text.push_str(value);
            }
        }
        let all_text = raw_text.to_lowercase();

        for (vendor, vendor_rules) in self.rules.vendor_priority() {
            if let Some(verdict) = self.test_vendor(vendor, vendor_rules, &all_text, &raw_text) {
                return verdict;
            }
        }

        Verdict::no_vendor()
    }

    fn test_vendor(
        &self,
        vendor: &str,
        vendor_rules: &VendorRules,
        all_text: &str,
        raw_text: &str,
    ) -> Option<Verdict> {
        for exclusion in &vendor_rules.exclusion_patterns {
            if all_text.contains(&exclusion.to_lowercase()) {
                return None;
            }
        }

        let mut confidence: u32 = 0;
        let mut matched_patterns = Vec::new();
        let mut detection_method = DetectionMethod::PatternMatch;

        for pattern in &vendor_rules.definitive_patterns {
            if all_text.contains(&pattern.to_lowercase()) {
                matched_patterns.push(pattern.clone());
                confidence += 90;
                detection_method = DetectionMethod::DefinitivePatternMatch;
            }
        }

        // A vendor that declares definitive patterns must hit at least one.
        if !vendor_rules.definitive_patterns.is_empty() && matched_patterns.is_empty() {
            return None;
        }
        if confidence == 0 {
            return None;
        }

        let device_type = determine_device_type(vendor_rules, all_text);

        let compiled = &self.compiled[vendor];
        let model = extract_field(&compiled.model, raw_text, &device_type);
        let serial = extract_field(&compiled.serial, raw_text, &device_type);
        let firmware = extract_field(&compiled.firmware, raw_text, &device_type);

        Some(Verdict {
            vendor: vendor.to_string(),
            device_type,
            model,
            serial_number: serial,
            os_version: firmware,
            confidence_score: confidence.min(100),
            detection_method,
            matched_oids: Vec::new(),
            matched_patterns,
        })
    }
}

fn compile_rules(vendor: &str, rules: &[ExtractionRule]) -> Result<Vec<CompiledExtraction>> {
    rules
        .iter()
        .map(|rule| {
            let regex = RegexBuilder::new(&rule.regex)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    Error::ConfigInvalid(format!(
                        "Vendor '{}' has an invalid extraction regex '{}': {}",
                        vendor, rule.regex, e
                    ))
                })?;
            Ok(CompiledExtraction {
                regex,
                capture_group: rule.capture_group,
                device_types: rule.device_types.clone(),
            })
        })
        .collect()
}

/// Keyword sets for name-driven field discovery after a definitive match.
const MODEL_KEYWORDS: &[&str] = &["model", "product", "type"];
const SERIAL_KEYWORDS: &[&str] = &["serial", "serialnumber", "serial_number"];
const FIRMWARE_KEYWORDS: &[&str] = &["firmware", "version", "software", "os", "revision"];

/// Standard Entity-MIB positions consulted directly, by field.
const STANDARD_MODEL_OIDS: &[&str] = &[oids::ENT_PHYSICAL_MODEL_NAME, oids::ENT_PHYSICAL_NAME];
const STANDARD_SERIAL_OIDS: &[&str] = &[oids::ENT_PHYSICAL_SERIAL_NUM];
const STANDARD_FIRMWARE_OIDS: &[&str] = &[
    oids::ENT_PHYSICAL_SOFTWARE_REV,
    oids::ENT_PHYSICAL_FIRMWARE_REV,
];

/// Discover model/serial/firmware candidates by looking up the configured
/// name of each collected OID. First candidate per field wins.
fn smart_field_extraction(
    facts: &BTreeMap<String, String>,
    vendor_rules: &VendorRules,
) -> (String, String, String) {
    let mut model = String::new();
    let mut serial = String::new();
    let mut firmware = String::new();

    let oid_names: BTreeMap<&str, String> = vendor_rules
        .fingerprint_oids
        .iter()
        .map(|o| (o.oid.as_str(), o.name.to_lowercase()))
        .collect();

    for (oid, value) in facts {
        if value.is_empty() || value == "<nil>" {
            continue;
        }
        let Some(name) = oid_names.get(oid.as_str()) else {
            continue;
        };

        if model.is_empty() && MODEL_KEYWORDS.iter().any(|k| name.contains(k)) {
            model = value.trim().to_string();
        } else if serial.is_empty() && SERIAL_KEYWORDS.iter().any(|k| name.contains(k)) {
            serial = value.trim().to_string();
        } else if firmware.is_empty() && FIRMWARE_KEYWORDS.iter().any(|k| name.contains(k)) {
            firmware = value.trim().to_string();
        }
    }

    let standard_lookup = |oids: &[&str]| {
        oids.iter()
            .filter_map(|oid| facts.get(*oid))
            .find(|v| !v.is_empty() && *v != "<nil>")
            .map(|v| v.trim().to_string())
    };

    if model.is_empty() {
        if let Some(v) = standard_lookup(STANDARD_MODEL_OIDS) {
            model = v;
        }
    }
    if serial.is_empty() {
        if let Some(v) = standard_lookup(STANDARD_SERIAL_OIDS) {
            serial = v;
        }
    }
    if firmware.is_empty() {
        if let Some(v) = standard_lookup(STANDARD_FIRMWARE_OIDS) {
            firmware = v;
        }
    }

    (model, serial, firmware)
}

/// Score device types against the haystack; highest score wins, ties go to
/// the lower priority value.
fn determine_device_type(vendor_rules: &VendorRules, all_text: &str) -> String {
    let mut best: Option<(&str, i64, u32)> = None;

    for (device_type, type_rule) in &vendor_rules.device_type_rules {
        let Some(score) = score_device_type(type_rule, all_text) else {
            continue;
        };
        if score <= 0 {
            continue;
        }

        let better = match best {
            None => true,
            Some((_, best_score, best_priority)) => {
                score > best_score || (score == best_score && type_rule.priority < best_priority)
            }
        };
        if better {
            best = Some((device_type, score, type_rule.priority));
        }
    }

    best.map(|(t, _, _)| t.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Returns `None` when the type is disqualified by a missing mandatory
/// pattern.
fn score_device_type(type_rule: &DeviceTypeRule, all_text: &str) -> Option<i64> {
    let mut score: i64 = 0;

    for pattern in &type_rule.definitive_patterns {
        if all_text.contains(&pattern.to_lowercase()) {
            score += 100;
        }
    }

    for pattern in &type_rule.mandatory_patterns {
        if all_text.contains(&pattern.to_lowercase()) {
            score += 50;
        } else {
            return None;
        }
    }

    for pattern in &type_rule.optional_patterns {
        if all_text.contains(&pattern.to_lowercase()) {
            score += 20;
        }
    }

    score += (100 - i64::from(type_rule.priority)) * 5;
    Some(score)
}

fn extract_field(rules: &[CompiledExtraction], all_text: &str, device_type: &str) -> String {
    for rule in rules {
        if !rule.device_types.is_empty() && !rule.device_types.iter().any(|t| t == device_type) {
            continue;
        }
        if let Some(captures) = rule.regex.captures(all_text) {
            if let Some(capture) = captures.get(rule.capture_group) {
                let extracted = capture.as_str().trim();
                if !extracted.is_empty() {
                    return extracted.to_string();
                }
            }
        }
    }
    String::new()
}
