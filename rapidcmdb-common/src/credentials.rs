//! Credential loading from configuration, environment variables and
//! pluggable secret stores.
//!
//! Credentials are constructed once at process start, validated, ordered by
//! priority and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    #[default]
    Config,
    Environment,
    /// A config credential overridden by environment values.
    #[serde(rename = "environment+config")]
    Merged,
    SecretStore,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Config => "config",
            CredentialSource::Environment => "environment",
            CredentialSource::Merged => "environment+config",
            CredentialSource::SecretStore => "secret_store",
        }
    }
}

/// A named credential set for device access.
///
/// Lower `priority` values are tried first; ties are broken by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Credential {
    pub name: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub enable_password: String,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub source: CredentialSource,
}

fn default_priority() -> u32 {
    999
}

/// A partially specified credential collected from environment variables.
#[derive(Debug, Clone, Default)]
struct EnvCredential {
    username: Option<String>,
    password: Option<String>,
    enable_password: Option<String>,
    priority: Option<u32>,
}

/// Variable-name type tokens, longest first so `ENABLE_PASSWORD` is not
/// consumed as `ENABLE` with a mangled credential name.
const ENV_TYPE_TOKENS: &[&str] = &[
    "ENABLE_PASSWORD",
    "USERNAME",
    "PASSWORD",
    "PRIORITY",
    "ENABLE",
    "USER",
    "PASS",
];

/// Load credential sets from the process environment.
///
/// Variables follow `<PREFIX>_<TYPE>_<NAME>`, e.g. `NAPALM_USERNAME_PRIMARY`.
pub fn env_credentials(prefix: &str) -> Vec<Credential> {
    env_credentials_from(prefix, std::env::vars())
}

/// Load credential sets from an explicit variable iterator.
pub fn env_credentials_from(
    prefix: &str,
    vars: impl IntoIterator<Item = (String, String)>,
) -> Vec<Credential> {
    let marker = format!("{}_", prefix.to_uppercase());
    let mut partial: BTreeMap<String, EnvCredential> = BTreeMap::new();

    for (var, value) in vars {
        let Some(rest) = var.strip_prefix(&marker) else {
            continue;
        };

        let Some((token, name)) = ENV_TYPE_TOKENS.iter().find_map(|t| {
            rest.strip_prefix(t)
                .and_then(|r| r.strip_prefix('_'))
                .map(|name| (*t, name))
        }) else {
            continue;
        };

        if name.is_empty() {
            continue;
        }

        let entry = partial.entry(name.to_lowercase()).or_default();
        match token {
            "USERNAME" | "USER" => entry.username = Some(value),
            "PASSWORD" | "PASS" => entry.password = Some(value),
            "ENABLE" | "ENABLE_PASSWORD" => entry.enable_password = Some(value),
            "PRIORITY" => match value.parse::<u32>() {
                Ok(p) => entry.priority = Some(p),
                Err(_) => {
                    tracing::warn!(variable = %var, value = %value, "Invalid priority value, ignoring");
                }
            },
            _ => unreachable!(),
        }
    }

    partial
        .into_iter()
        .map(|(name, env)| Credential {
            name,
            username: env.username.unwrap_or_default(),
            password: env.password.unwrap_or_default(),
            enable_password: env.enable_password.unwrap_or_default(),
            priority: env.priority.unwrap_or_else(default_priority),
            source: CredentialSource::Environment,
        })
        .collect()
}

/// Merge config-file credentials with environment credentials.
///
/// Environment values win field-by-field; a credential present in both
/// sources is tagged `environment+config`.
pub fn merge_credentials(config: Vec<Credential>, env: Vec<Credential>) -> Vec<Credential> {
    let mut merged: BTreeMap<String, Credential> = BTreeMap::new();

    for mut cred in config {
        cred.name = cred.name.to_lowercase();
        cred.source = CredentialSource::Config;
        merged.insert(cred.name.clone(), cred);
    }

    for env_cred in env {
        match merged.get_mut(&env_cred.name) {
            Some(existing) => {
                if !env_cred.username.is_empty() {
                    existing.username = env_cred.username;
                }
                if !env_cred.password.is_empty() {
                    existing.password = env_cred.password;
                }
                if !env_cred.enable_password.is_empty() {
                    existing.enable_password = env_cred.enable_password;
                }
                if env_cred.priority != default_priority() {
                    existing.priority = env_cred.priority;
                }
                existing.source = CredentialSource::Merged;
            }
            None => {
                merged.insert(env_cred.name.clone(), env_cred);
            }
        }
    }

    merged.into_values().collect()
}

/// Drop incomplete credential sets and order the rest for fallback.
///
/// A credential must carry a name, a username and a non-empty password.
pub fn validate_credentials(credentials: Vec<Credential>) -> Vec<Credential> {
    let mut validated: Vec<Credential> = credentials
        .into_iter()
        .filter(|cred| {
            if cred.name.is_empty() {
                tracing::warn!("Skipping credential without name");
                return false;
            }
            if cred.username.is_empty() {
                tracing::warn!(credential = %cred.name, "Skipping credential with empty username");
                return false;
            }
            if cred.password.is_empty() {
                tracing::warn!(credential = %cred.name, "Skipping credential with empty password");
                return false;
            }
            true
        })
        .collect();

    validated.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
    validated
}

/// Load, merge and validate credentials from config plus environment.
pub fn load_credentials(config_credentials: Vec<Credential>, env_prefix: &str) -> Vec<Credential> {
    let env = env_credentials(env_prefix);
    let merged = merge_credentials(config_credentials, env);
    let validated = validate_credentials(merged);

    if validated.is_empty() {
        tracing::warn!("No valid credentials found in config or environment");
    } else {
        let sources: Vec<String> = validated
            .iter()
            .map(|c| format!("{} ({})", c.name, c.source.as_str()))
            .collect();
        tracing::info!(count = validated.len(), sets = %sources.join(", "), "Loaded credential sets");
    }

    validated
}

/// An encrypted credential store.
///
/// Encryption internals live outside the core; implementations hand back
/// plaintext credentials at call time.
pub trait SecretStore: Send + Sync {
    fn unlock(&self, master_password: &str) -> Result<Vec<Credential>>;
}
