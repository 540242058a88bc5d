//! Error types for credvault
//!
//! Every failure a request can hit is one variant of [`Error`]. The audited
//! transaction converts each variant to a status code exactly once, so callers
//! below it only ever raise.

use serde::Serialize;
use thiserror::Error;

/// Result type alias using credvault-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Message returned whenever ciphertext cannot be decrypted with the known keys
pub const ENCRYPTION_KEY_UNAVAILABLE: &str = "The credential could not be accessed with the provided encryption keys. You must update your deployment configuration to continue.";

/// Message returned for any missing (or unauthorized) credential
pub const CREDENTIAL_NOT_FOUND: &str = "The request could not be completed because the credential does not exist or you do not have sufficient authorization.";

const INTERNAL_ERROR: &str =
    "An application error occurred. Please contact your administrator.";

/// Core error types for credvault
#[derive(Error, Debug)]
pub enum Error {
    /// Client-caused input error; always carries a specific message
    #[error("{message}")]
    Validation { message: String },

    /// The credential, version or referenced CA does not exist
    #[error("{message}")]
    NotFound { message: String },

    /// A key needed for this record is unknown or failed verification
    #[error("Encryption key {key_id} is unavailable: {reason}")]
    EncryptionUnavailable { key_id: String, reason: String },

    /// A freshly generated certificate failed to verify
    #[error("Certificate signature verification failed: {0}")]
    SignatureVerification(String),

    /// Cryptographic operation failed for a reason other than key availability
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    /// Persistence layer failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// The audit record could not be written
    #[error("Audit record could not be written: {0}")]
    AuditFailure(String),

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

/// Body returned to clients for any failed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error with a specific message
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// The standard not-found error for credential lookups
    pub fn credential_not_found() -> Self {
        Self::not_found(CREDENTIAL_NOT_FOUND)
    }

    /// Create an encryption unavailable error
    pub fn encryption_unavailable(key_id: impl ToString, reason: impl Into<String>) -> Self {
        Self::EncryptionUnavailable {
            key_id: key_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a crypto error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto(message.into())
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create an invalid config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// HTTP-like status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation { .. } | Error::Json(_) => 400,
            Error::NotFound { .. } => 404,
            Error::EncryptionUnavailable { .. }
            | Error::SignatureVerification(_)
            | Error::Crypto(_)
            | Error::Storage(_)
            | Error::AuditFailure(_)
            | Error::Config { .. }
            | Error::ConfigNotFound { .. }
            | Error::Io(_)
            | Error::Yaml(_) => 500,
        }
    }

    /// Client-facing message; internal failures are not described in detail
    pub fn client_message(&self) -> String {
        match self {
            Error::Validation { message } | Error::NotFound { message } => message.clone(),
            Error::Json(_) => "The request could not be fulfilled because the request path or body did not meet expectation. Please check the documentation for required formatting and retry your request.".to_string(),
            Error::EncryptionUnavailable { .. } => ENCRYPTION_KEY_UNAVAILABLE.to_string(),
            _ => INTERNAL_ERROR.to_string(),
        }
    }

    /// Render as the `{"error": ...}` response body
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.client_message(),
        }
    }

    /// Whether the failure was caused by the client
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::validation("bad").status_code(), 400);
        assert_eq!(Error::credential_not_found().status_code(), 404);
        assert_eq!(Error::encryption_unavailable("k", "gone").status_code(), 500);
        assert_eq!(
            Error::SignatureVerification("mismatch".into()).status_code(),
            500
        );
    }

    #[test]
    fn test_encryption_unavailable_response_hides_key_details() {
        let err = Error::encryption_unavailable("0000-1111", "provider offline");
        let body = err.to_response();
        assert_eq!(body.error, ENCRYPTION_KEY_UNAVAILABLE);
        assert!(!body.error.contains("0000-1111"));
    }

    #[test]
    fn test_internal_errors_are_not_described() {
        let err = Error::storage("disk full at /var/lib/credvault");
        assert!(!err.client_message().contains("/var/lib"));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_error_response_serializes_as_error_field() {
        let body = Error::validation("The request does not include a valid type.").to_response();
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(
            json,
            r#"{"error":"The request does not include a valid type."}"#
        );
    }
}
