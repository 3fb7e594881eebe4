//! RapidCMDB Common Library
//!
//! Shared types and utilities for the RapidCMDB discovery and collection
//! tools:
//!
//! - [`device`] - Device records, scan documents, collection runs
//! - [`naming`] - Deterministic device ids, device keys and safe names
//! - [`credentials`] - Credential loading, merging and validation
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`error`] - Error types with stable taxonomy labels

pub mod config;
pub mod credentials;
pub mod device;
pub mod error;
pub mod naming;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, load_config, parse_config};
pub use credentials::{
    Credential, CredentialSource, SecretStore, env_credentials, load_credentials,
    merge_credentials, validate_credentials,
};
pub use device::{
    CollectionRun, DeviceRecord, DeviceRole, InterfaceInfo, InventoryDevice, MethodOutcome,
    SCAN_DOCUMENT_VERSION, ScanDocument, ScanFileConfig, ScanStatistics, SessionDeviceResult,
    SessionResult, SnmpVersionBreakdown,
};
pub use error::{Error, Result};
pub use naming::{
    RoleClassifier, UnknownRoleClassifier, device_id, device_key, safe_device_name, site_code,
};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::ConfigInvalid(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::ConfigInvalid(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
