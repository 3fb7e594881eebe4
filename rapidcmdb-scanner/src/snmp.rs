//! SNMP data collection with v3-preferred, v2c-fallback version strategy.
//!
//! A host is probed with two critical OIDs (`sysDescr.0`, `sysName.0`);
//! only when both answer does the client go on to collect the remaining
//! system group, the Entity MIB and the vendor fingerprint OIDs. Extended
//! and fingerprint OIDs are best-effort and never fail the host.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use snmp2::{AsyncSession, Value, v3};
use tokio::time::timeout;

use crate::config::{AuthProtocol, PrivProtocol, SnmpSettings, SnmpV3Security};
use crate::oid::parse_oid;
use crate::oids;

/// SNMP protocol version used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnmpVersion {
    #[serde(rename = "v2c")]
    V2c,
    #[serde(rename = "v3")]
    V3,
}

impl SnmpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnmpVersion::V2c => "v2c",
            SnmpVersion::V3 => "v3",
        }
    }
}

impl std::fmt::Display for SnmpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-host collection metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub snmp_version_attempted: Vec<SnmpVersion>,
    pub snmp_version_successful: Option<SnmpVersion>,
    pub oids_attempted: Vec<String>,
    pub oids_successful: Vec<String>,
    pub oids_failed: Vec<String>,
    pub response_time_ms: u64,
    /// Name of the community that answered; the string itself never
    /// leaves the config.
    pub community_used: Option<String>,
    pub errors: Vec<String>,
}

/// Facts plus metadata for one host.
#[derive(Debug, Clone, Default)]
pub struct CollectOutcome {
    /// OID (dotted-decimal) -> string value. Exception sentinels are
    /// absent, which is distinct from an empty string value.
    pub facts: BTreeMap<String, String>,
    pub metadata: CollectionMetadata,
}

impl CollectOutcome {
    /// Whether the critical system OIDs both answered.
    pub fn identified(&self) -> bool {
        self.facts.contains_key(oids::SYS_DESCR) && self.facts.contains_key(oids::SYS_NAME)
    }
}

/// SNMP collector shared by all scan workers.
pub struct SnmpClient {
    settings: SnmpSettings,
    /// Vendor fingerprint OIDs to collect, as `oid -> name`.
    fingerprint_oids: BTreeMap<String, String>,
    request_timeout: Duration,
}

impl SnmpClient {
    pub fn new(settings: SnmpSettings, fingerprint_oids: BTreeMap<String, String>) -> Self {
        let request_timeout = Duration::from_secs(settings.timeout_secs.max(1));
        Self {
            settings,
            fingerprint_oids,
            request_timeout,
        }
    }

    /// Collect facts from one host, trying v3 first and falling back to
    /// the configured v2c communities.
    pub async fn collect(&self, address: IpAddr) -> CollectOutcome {
        let started = Instant::now();
        let mut outcome = CollectOutcome::default();
        let target = format!("{}:161", address);

        let mut versions = Vec::new();
        if self
            .settings
            .v3
            .as_ref()
            .is_some_and(|v3| !v3.username.is_empty())
        {
            versions.push(SnmpVersion::V3);
        }
        if self.settings.try_v2c_fallback || versions.is_empty() {
            versions.push(SnmpVersion::V2c);
        }

        for version in versions {
            outcome.metadata.snmp_version_attempted.push(version);

            let succeeded = match version {
                SnmpVersion::V3 => self.try_v3(&target, &mut outcome).await,
                SnmpVersion::V2c => self.try_v2c(&target, &mut outcome).await,
            };

            if succeeded {
                outcome.metadata.snmp_version_successful = Some(version);
                break;
            }
        }

        outcome.metadata.response_time_ms = started.elapsed().as_millis() as u64;
        outcome
    }

    /// Attempt SNMPv3: open a USM session and probe the critical OIDs.
    async fn try_v3(&self, target: &str, outcome: &mut CollectOutcome) -> bool {
        let Some(security_config) = self.settings.v3.as_ref() else {
            return false;
        };

        let security = match build_v3_security(security_config) {
            Ok(security) => security,
            Err(e) => {
                outcome.metadata.errors.push(format!("v3: {}", e));
                return false;
            }
        };

        let mut session = match self.open_v3_session(target, security).await {
            Ok(session) => session,
            Err(e) => {
                outcome.metadata.errors.push(format!("v3: {}", e));
                return false;
            }
        };

        if !self.probe_critical(&mut session, outcome).await {
            return false;
        }

        self.collect_remaining(&mut session, outcome).await;
        true
    }

    async fn open_v3_session(&self, target: &str, security: v3::Security) -> Result<AsyncSession> {
        let mut session = timeout(self.request_timeout, AsyncSession::new_v3(target, 0, security))
            .await
            .map_err(|_| anyhow!("session open timed out"))?
            .context("Failed to create SNMPv3 session")?;

        // Engine ID discovery and time sync.
        timeout(self.request_timeout, session.init())
            .await
            .map_err(|_| anyhow!("engine discovery timed out"))?
            .context("Failed to initialize SNMPv3 session")?;

        Ok(session)
    }

    /// Attempt SNMPv2c with each configured community in order.
    async fn try_v2c(&self, target: &str, outcome: &mut CollectOutcome) -> bool {
        for community in &self.settings.communities {
            let mut session =
                match AsyncSession::new_v2c(target, community.community.as_bytes(), 0).await {
                    Ok(session) => session,
                    Err(e) => {
                        outcome
                            .metadata
                            .errors
                            .push(format!("v2c '{}': {:?}", community.name, e));
                        continue;
                    }
                };

            if self.probe_critical(&mut session, outcome).await {
                outcome.metadata.community_used = Some(community.name.clone());
                self.collect_remaining(&mut session, outcome).await;
                return true;
            }
        }
        false
    }

    /// GET the two critical OIDs; both must answer with non-exception
    /// values for the probe to succeed.
    async fn probe_critical(&self, session: &mut AsyncSession, outcome: &mut CollectOutcome) -> bool {
        let mut answered = 0;
        for oid_str in oids::CRITICAL_OIDS {
            match self.get_value(session, oid_str).await {
                Ok(Some(value)) => {
                    outcome.facts.insert(oid_str.to_string(), value);
                    outcome.metadata.oids_successful.push(oid_str.to_string());
                    answered += 1;
                }
                Ok(None) => {
                    outcome.metadata.oids_failed.push(oid_str.to_string());
                }
                Err(_) => return false,
            }
        }
        answered == oids::CRITICAL_OIDS.len()
    }

    /// Collect the rest of the priority set, then best-effort extended and
    /// fingerprint OIDs, over the already-established session.
    async fn collect_remaining(&self, session: &mut AsyncSession, outcome: &mut CollectOutcome) {
        self.collect_priority_batch(session, outcome).await;

        // Only dig deeper on hosts that answered the system group.
        if outcome.facts.len() >= 2 {
            self.collect_best_effort(session, oids::EXTENDED_OIDS.iter().map(|(_, o)| *o), outcome)
                .await;

            let fingerprint: Vec<String> = self.fingerprint_oids.keys().cloned().collect();
            self.collect_best_effort(session, fingerprint.iter().map(|s| s.as_str()), outcome)
                .await;
        }
    }

    /// The priority set is collected in one pass over the session under a
    /// shared deadline; when that batch pass fails part-way the leftovers
    /// are retried one OID at a time with individual timeouts.
    async fn collect_priority_batch(&self, session: &mut AsyncSession, outcome: &mut CollectOutcome) {
        let remaining: Vec<&str> = oids::PRIORITY_OIDS
            .iter()
            .map(|(_, oid)| *oid)
            .filter(|oid| !outcome.facts.contains_key(*oid))
            .collect();

        if remaining.is_empty() {
            return;
        }
        outcome
            .metadata
            .oids_attempted
            .extend(remaining.iter().map(|o| o.to_string()));

        let batch = async {
            let mut results = Vec::new();
            for oid_str in &remaining {
                let value = get_single(session, oid_str).await?;
                results.push((*oid_str, value));
            }
            Ok::<_, anyhow::Error>(results)
        };

        let batch_result = timeout(self.request_timeout, batch).await;
        match batch_result {
            Ok(Ok(results)) => {
                for (oid_str, value) in results {
                    record_value(oid_str, value, outcome);
                }
            }
            Ok(Err(e)) => {
                outcome.metadata.errors.push(format!("batch: {}", e));
                self.collect_individual(session, &remaining, outcome).await;
            }
            Err(_) => {
                outcome.metadata.errors.push("batch: timed out".to_string());
                self.collect_individual(session, &remaining, outcome).await;
            }
        }
    }

    /// Per-OID fallback with individual timeouts.
    async fn collect_individual(
        &self,
        session: &mut AsyncSession,
        oids: &[&str],
        outcome: &mut CollectOutcome,
    ) {
        for oid_str in oids {
            if outcome.facts.contains_key(*oid_str) {
                continue;
            }
            match self.get_value(session, oid_str).await {
                Ok(value) => record_value(oid_str, value, outcome),
                Err(_) => outcome.metadata.oids_failed.push(oid_str.to_string()),
            }
        }
    }

    /// Best-effort collection: failures are skipped silently and never
    /// fail the host.
    async fn collect_best_effort<'a>(
        &self,
        session: &mut AsyncSession,
        oids: impl Iterator<Item = &'a str>,
        outcome: &mut CollectOutcome,
    ) {
        for oid_str in oids {
            if outcome.facts.contains_key(oid_str) {
                continue;
            }
            if let Ok(Some(value)) = self.get_value(session, oid_str).await {
                outcome.facts.insert(oid_str.to_string(), value);
                outcome.metadata.oids_successful.push(oid_str.to_string());
            }
        }
    }

    /// GET one OID with the configured timeout and retry budget.
    async fn get_value(&self, session: &mut AsyncSession, oid_str: &str) -> Result<Option<String>> {
        let mut last_err = None;
        for _ in 0..=self.settings.retries {
            match timeout(self.request_timeout, get_single(session, oid_str)).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => last_err = Some(e),
                Err(_) => last_err = Some(anyhow!("request timed out")),
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("request failed")))
    }
}

/// GET one OID on an open session, decoding the value to its string form.
///
/// Returns `Ok(None)` for exception sentinels so the caller can keep the
/// OID out of the fact set.
async fn get_single(session: &mut AsyncSession, oid_str: &str) -> Result<Option<String>> {
    let oid = parse_oid(oid_str)?;
    let mut response = session.get(&oid).await.context("SNMP GET error")?;

    match response.varbinds.next() {
        Some((_, value)) => Ok(snmp_value_to_string(&value)),
        None => Ok(None),
    }
}

fn record_value(oid_str: &str, value: Option<String>, outcome: &mut CollectOutcome) {
    match value {
        Some(value) => {
            tracing::trace!(
                oid = %oid_str,
                name = oids::standard_oid_name(oid_str).unwrap_or(""),
                "Collected OID"
            );
            outcome.facts.insert(oid_str.to_string(), value);
            outcome.metadata.oids_successful.push(oid_str.to_string());
        }
        None => outcome.metadata.oids_failed.push(oid_str.to_string()),
    }
}

/// Convert an SNMP value to its string form.
///
/// Exception sentinels map to `None` and stay out of the fact set.
fn snmp_value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Integer(n) => Some(n.to_string()),
        Value::OctetString(s) => {
            let bytes = s.to_vec();
            Some(String::from_utf8_lossy(&bytes).to_string())
        }
        Value::ObjectIdentifier(oid) => Some(crate::oid::oid_to_string(oid)),
        Value::IpAddress(ip) => Some(format!("{}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3])),
        Value::Counter32(n) => Some(n.to_string()),
        Value::Unsigned32(n) => Some(n.to_string()),
        Value::Timeticks(n) => Some(n.to_string()),
        Value::Counter64(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        Value::NoSuchObject | Value::NoSuchInstance | Value::EndOfMibView => None,
        _ => None,
    }
}

/// Build SNMPv3 security parameters from configuration.
fn build_v3_security(config: &SnmpV3Security) -> Result<v3::Security> {
    let username = config.username.as_bytes();

    let auth_protocol = match config.auth_protocol {
        AuthProtocol::None => None,
        AuthProtocol::Md5 => Some(v3::AuthProtocol::Md5),
        AuthProtocol::Sha1 => Some(v3::AuthProtocol::Sha1),
        AuthProtocol::Sha224 => Some(v3::AuthProtocol::Sha224),
        AuthProtocol::Sha256 => Some(v3::AuthProtocol::Sha256),
        AuthProtocol::Sha384 => Some(v3::AuthProtocol::Sha384),
        AuthProtocol::Sha512 => Some(v3::AuthProtocol::Sha512),
    };

    let security = match (auth_protocol, config.priv_protocol) {
        // noAuthNoPriv
        (None, PrivProtocol::None) => v3::Security::new(username, b""),
        // authNoPriv
        (Some(auth_proto), PrivProtocol::None) => {
            let auth_password = config
                .auth_password
                .as_ref()
                .ok_or_else(|| anyhow!("Authentication password required for auth protocol"))?;
            v3::Security::new(username, auth_password.as_bytes()).with_auth_protocol(auth_proto)
        }
        // authPriv
        (Some(auth_proto), priv_proto) => {
            let auth_password = config
                .auth_password
                .as_ref()
                .ok_or_else(|| anyhow!("Authentication password required for auth protocol"))?;
            let priv_password = config
                .priv_password
                .as_ref()
                .ok_or_else(|| anyhow!("Privacy password required for privacy protocol"))?;

            let cipher = match priv_proto {
                PrivProtocol::None => unreachable!(),
                PrivProtocol::Des => v3::Cipher::Des,
                PrivProtocol::Aes128 => v3::Cipher::Aes128,
                PrivProtocol::Aes192 => v3::Cipher::Aes192,
                PrivProtocol::Aes256 => v3::Cipher::Aes256,
            };

            v3::Security::new(username, auth_password.as_bytes())
                .with_auth_protocol(auth_proto)
                .with_auth(v3::Auth::AuthPriv {
                    cipher,
                    privacy_password: priv_password.as_bytes().to_vec(),
                })
        }
        // noAuthPriv is not valid in SNMPv3
        (None, _) => {
            return Err(anyhow!("Privacy requires authentication in SNMPv3"));
        }
    };

    Ok(security)
}
