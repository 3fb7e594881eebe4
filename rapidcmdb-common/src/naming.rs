//! Deterministic naming helpers shared by the scanner and the collector.
//!
//! Device ids, device keys and safe file names are part of the cross-tool
//! contract: the same inputs must produce the same outputs on every run and
//! in every implementation.

use sha2::{Digest, Sha256};
use std::net::Ipv4Addr;

use crate::device::DeviceRole;

/// Build a deterministic device id from scan facts.
///
/// Preference order: system name, then vendor/type plus the last address
/// octet, then the raw address.
pub fn device_id(sys_name: &str, vendor: &str, device_type: &str, ip: &str) -> String {
    let sys_name = sys_name.trim();
    if !sys_name.is_empty() {
        return format!("host_{}", normalize_id_component(sys_name));
    }

    if !vendor.is_empty() && !device_type.is_empty() {
        let suffix = ip.rsplit(['.', ':']).next().unwrap_or(ip);
        return format!("host_{}_{}_{}", vendor, device_type, suffix);
    }

    format!("ip_{}", ip.replace(['.', ':'], "_"))
}

/// Lowercase, map non-alphanumerics to underscores, collapse runs.
fn normalize_id_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_underscore = false;
    for c in raw.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_underscore = false;
        } else if !last_underscore {
            out.push('_');
            last_underscore = true;
        }
    }
    out.trim_matches('_').to_string()
}

/// Stable 16-hex-char device key over `vendor|serial|model`, uppercased
/// before hashing so the key is case-insensitive.
pub fn device_key(vendor: &str, serial_number: &str, model: &str) -> String {
    let key_string = format!("{}|{}|{}", vendor, serial_number, model).to_uppercase();
    let digest = Sha256::digest(key_string.as_bytes());
    digest
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Make a device name safe for use as a directory/file name.
///
/// Bare IPv4 literals are kept whole; anything else has its DNS suffix
/// stripped. The result never contains filesystem-unsafe characters and
/// the function is idempotent.
pub fn safe_device_name(name: &str) -> String {
    if name.is_empty() {
        return "unknown_device".to_string();
    }

    let mut cleaned = if name.parse::<Ipv4Addr>().is_ok() {
        name.to_string()
    } else {
        name.split('.').next().unwrap_or(name).to_string()
    };

    for c in ['/', '\\', ':', '*', '?', '"', '<', '>', '|', ' '] {
        cleaned = cleaned.replace(c, "_");
    }

    while cleaned.contains("__") {
        cleaned = cleaned.replace("__", "_");
    }
    let cleaned = cleaned.trim_matches('_');

    if cleaned.is_empty() {
        "unknown_device".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Extract a site code from a device name.
///
/// The leading dash-separated token is taken as the site when it is three
/// or more alphabetic characters (e.g. `frc-c03h2-swl-01` -> `FRC`).
pub fn site_code(device_name: &str) -> String {
    if let Some(first) = device_name.split('-').next() {
        if first.len() >= 3 && first.chars().all(|c| c.is_ascii_alphabetic()) {
            return first.to_uppercase();
        }
    }
    "UNK".to_string()
}

/// Pluggable device-role classification.
///
/// Role heuristics based on naming conventions are site-specific, so the
/// core only ships a classifier that declines to guess.
pub trait RoleClassifier: Send + Sync {
    fn classify(&self, device_name: &str) -> DeviceRole;
}

/// Default classifier: every device is `unknown`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownRoleClassifier;

impl RoleClassifier for UnknownRoleClassifier {
    fn classify(&self, _device_name: &str) -> DeviceRole {
        DeviceRole::Unknown
    }
}
