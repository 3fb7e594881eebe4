use thiserror::Error;

/// Common error type for RapidCMDB components.
///
/// Every variant carries a fixed label that is surfaced in logs and result
/// documents, so downstream tooling can count errors by category without
/// parsing free-form messages.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigInvalid(String),

    #[error("Name resolution failed for '{0}'")]
    ResolveFailed(String),

    #[error("No TCP port responded on {0}")]
    ProbeUnreachable(String),

    #[error("SNMPv3 authentication rejected: {0}")]
    SnmpAuthFailed(String),

    #[error("No SNMP response from {0}")]
    SnmpNoResponse(String),

    #[error("SNMP answered but vendor could not be determined for {0}")]
    FingerprintUnknown(String),

    #[error("No driver registered for vendor '{vendor}' model '{model}'")]
    DriverUnavailable { vendor: String, model: String },

    #[error("Credential '{credential}' rejected: {message}")]
    CredentialRejected { credential: String, message: String },

    #[error("All credentials exhausted for {0}")]
    SessionOpenFailed(String),

    #[error("Method '{method}' failed: {message}")]
    MethodFailed { method: String, message: String },

    #[error("Result writer failed: {0}")]
    WriterFailed(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigInvalid(msg.into())
    }

    /// The fixed taxonomy label for this error.
    pub fn label(&self) -> &'static str {
        match self {
            Error::ConfigInvalid(_) => "config_invalid",
            Error::ResolveFailed(_) => "resolve_failed",
            Error::ProbeUnreachable(_) => "probe_unreachable",
            Error::SnmpAuthFailed(_) => "snmp_auth_failed",
            Error::SnmpNoResponse(_) => "snmp_no_response",
            Error::FingerprintUnknown(_) => "fingerprint_unknown",
            Error::DriverUnavailable { .. } => "driver_unavailable",
            Error::CredentialRejected { .. } => "credential_rejected",
            Error::SessionOpenFailed(_) => "session_open_failed",
            Error::MethodFailed { .. } => "method_failed",
            Error::WriterFailed(_) => "writer_failed",
            Error::Json(_) => "writer_failed",
            Error::Io(_) => "writer_failed",
        }
    }
}

/// Result type alias using RapidCMDB's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(Error::config("x").label(), "config_invalid");
        assert_eq!(
            Error::DriverUnavailable {
                vendor: "zebra".into(),
                model: "ZT410".into()
            }
            .label(),
            "driver_unavailable"
        );
        assert_eq!(
            Error::CredentialRejected {
                credential: "primary".into(),
                message: "auth failed".into()
            }
            .label(),
            "credential_rejected"
        );
        assert_eq!(
            Error::MethodFailed {
                method: "get_facts".into(),
                message: "timed out".into()
            }
            .label(),
            "method_failed"
        );
    }

    #[test]
    fn test_display_includes_context() {
        let err = Error::SessionOpenFailed("core-sw-01".into());
        assert!(err.to_string().contains("core-sw-01"));
    }
}
