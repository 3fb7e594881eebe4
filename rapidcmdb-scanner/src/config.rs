use serde::{Deserialize, Serialize};
use std::path::Path;

use rapidcmdb_common::LoggingConfig;

/// Root configuration for the scanner.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScannerConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// SNMP credential and timing settings.
    #[serde(default)]
    pub snmp: SnmpSettings,

    /// Scan pipeline settings.
    #[serde(default)]
    pub scan: ScanSettings,

    /// Fingerprint rules file (YAML).
    #[serde(default = "default_rules_file")]
    pub rules_file: String,
}

fn default_rules_file() -> String {
    "vendor_fingerprints.yaml".to_string()
}

/// SNMP access settings shared by every probed host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnmpSettings {
    /// SNMPv3 security settings. When present, v3 is attempted first.
    #[serde(default)]
    pub v3: Option<SnmpV3Security>,

    /// v2c community strings to try, in order.
    #[serde(default = "default_communities")]
    pub communities: Vec<CommunityConfig>,

    /// Fall back to v2c when v3 fails or is absent.
    #[serde(default = "default_true")]
    pub try_v2c_fallback: bool,

    /// Per-request timeout in seconds.
    #[serde(default = "default_snmp_timeout")]
    pub timeout_secs: u64,

    /// Retries per request.
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl Default for SnmpSettings {
    fn default() -> Self {
        Self {
            v3: None,
            communities: default_communities(),
            try_v2c_fallback: true,
            timeout_secs: default_snmp_timeout(),
            retries: default_retries(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_snmp_timeout() -> u64 {
    3
}

fn default_retries() -> u32 {
    1
}

fn default_communities() -> Vec<CommunityConfig> {
    vec![
        CommunityConfig {
            name: "public".to_string(),
            community: "public".to_string(),
        },
        CommunityConfig {
            name: "private".to_string(),
            community: "private".to_string(),
        },
    ]
}

/// A named v2c community string.
///
/// Result metadata references communities by name so the string itself
/// never leaks into scan documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommunityConfig {
    pub name: String,
    pub community: String,
}

/// SNMPv3 security configuration (USM - User Security Model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnmpV3Security {
    /// SNMPv3 username.
    pub username: String,

    /// Authentication protocol.
    #[serde(default)]
    pub auth_protocol: AuthProtocol,

    /// Authentication password (required if auth_protocol is not None).
    #[serde(default)]
    pub auth_password: Option<String>,

    /// Privacy/encryption protocol.
    #[serde(default)]
    pub priv_protocol: PrivProtocol,

    /// Privacy password (required if priv_protocol is not None).
    #[serde(default)]
    pub priv_password: Option<String>,
}

/// SNMPv3 authentication protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthProtocol {
    /// No authentication (noAuthNoPriv).
    #[default]
    #[serde(rename = "none")]
    None,
    /// MD5 authentication (RFC 3414).
    #[serde(rename = "MD5")]
    Md5,
    /// SHA-1 authentication (RFC 3414).
    #[serde(rename = "SHA")]
    Sha1,
    /// SHA-224 authentication (non-standard).
    #[serde(rename = "SHA224")]
    Sha224,
    /// SHA-256 authentication (non-standard).
    #[serde(rename = "SHA256")]
    Sha256,
    /// SHA-384 authentication (non-standard).
    #[serde(rename = "SHA384")]
    Sha384,
    /// SHA-512 authentication (non-standard).
    #[serde(rename = "SHA512")]
    Sha512,
}

/// SNMPv3 privacy/encryption protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PrivProtocol {
    /// No encryption (noPriv).
    #[default]
    #[serde(rename = "none")]
    None,
    /// DES encryption (RFC 3414) - may not be available.
    #[serde(rename = "DES")]
    Des,
    /// AES-128 encryption (RFC 3826).
    #[serde(rename = "AES")]
    Aes128,
    /// AES-192 encryption (non-standard).
    #[serde(rename = "AES192")]
    Aes192,
    /// AES-256 encryption (non-standard).
    #[serde(rename = "AES256")]
    Aes256,
}

/// Scan pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Bounded worker pool size.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// TCP pre-filter ports. An empty list disables the probe.
    #[serde(default = "default_probe_ports")]
    pub tcp_probe_ports: Vec<u16>,

    /// Per-port TCP connect timeout in seconds.
    #[serde(default = "default_probe_timeout")]
    pub tcp_probe_timeout_secs: u64,

    /// Skip TCP pre-filtering entirely.
    #[serde(default)]
    pub skip_tcp_probe: bool,

    /// Emit a progress event every this many completions.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            tcp_probe_ports: default_probe_ports(),
            tcp_probe_timeout_secs: default_probe_timeout(),
            skip_tcp_probe: false,
            progress_interval: default_progress_interval(),
        }
    }
}

fn default_concurrency() -> usize {
    100
}

fn default_probe_timeout() -> u64 {
    2
}

fn default_progress_interval() -> u64 {
    50
}

fn default_probe_ports() -> Vec<u16> {
    vec![20, 21, 22, 25, 53, 80, 161, 443, 515, 631, 993, 995, 9100]
}

impl ScannerConfig {
    /// Load configuration from a JSON5 file.
    pub fn load(path: impl AsRef<Path>) -> rapidcmdb_common::Result<Self> {
        rapidcmdb_common::load_config(path)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> rapidcmdb_common::Result<Self> {
        rapidcmdb_common::parse_config(content)
    }

    pub fn validate(&self) -> rapidcmdb_common::Result<()> {
        if self.snmp.v3.is_none() && self.snmp.communities.is_empty() {
            return Err(rapidcmdb_common::Error::config(
                "No SNMP credentials configured: need a v3 user or at least one v2c community",
            ));
        }
        if let Some(v3) = &self.snmp.v3 {
            if v3.username.is_empty() {
                return Err(rapidcmdb_common::Error::config(
                    "SNMPv3 security requires a username",
                ));
            }
            if v3.auth_protocol != AuthProtocol::None && v3.auth_password.is_none() {
                return Err(rapidcmdb_common::Error::config(
                    "SNMPv3 authentication protocol requires an auth password",
                ));
            }
            if v3.priv_protocol != PrivProtocol::None && v3.auth_protocol == AuthProtocol::None {
                return Err(rapidcmdb_common::Error::config(
                    "SNMPv3 privacy requires authentication",
                ));
            }
        }
        if self.scan.concurrency == 0 {
            return Err(rapidcmdb_common::Error::config(
                "Scan concurrency must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_defaults() {
        let config = ScannerConfig::parse("{}").unwrap();

        assert!(config.snmp.v3.is_none());
        assert_eq!(config.snmp.communities.len(), 2);
        assert_eq!(config.snmp.timeout_secs, 3);
        assert_eq!(config.scan.concurrency, 100);
        assert!(config.scan.tcp_probe_ports.contains(&161));
        assert!(config.scan.tcp_probe_ports.contains(&9100));
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_v3_config() {
        let json5 = r#"
        {
            snmp: {
                v3: {
                    username: "admin",
                    auth_protocol: "SHA256",
                    auth_password: "authpass123",
                    priv_protocol: "AES",
                    priv_password: "privpass456",
                },
                communities: [
                    { name: "public", community: "public" },
                ],
            },
        }
        "#;

        let config = ScannerConfig::parse(json5).unwrap();
        let v3 = config.snmp.v3.as_ref().unwrap();
        assert_eq!(v3.username, "admin");
        assert_eq!(v3.auth_protocol, AuthProtocol::Sha256);
        assert_eq!(v3.priv_protocol, PrivProtocol::Aes128);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_requires_some_credentials() {
        let json5 = r#"
        {
            snmp: { communities: [] },
        }
        "#;

        let config = ScannerConfig::parse(json5).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.label(), "config_invalid");
    }

    #[test]
    fn test_validate_rejects_priv_without_auth() {
        let json5 = r#"
        {
            snmp: {
                v3: {
                    username: "admin",
                    priv_protocol: "AES",
                    priv_password: "pw",
                },
            },
        }
        "#;

        let config = ScannerConfig::parse(json5).unwrap();
        assert!(config.validate().is_err());
    }
}
