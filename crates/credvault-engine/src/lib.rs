//! # credvault-engine
//!
//! Credential operations for credvault:
//! - Request validation and the closed set of credential kinds
//! - Value generation, including CA-signed certificates
//! - Audited transactions around every operation
//! - Permission checks and background key rotation

pub mod codec;
pub mod credential;
pub mod generate;
pub mod permissions;
pub mod request;
pub mod rotation;
pub mod service;
pub mod transaction;

pub use credential::{Credential, GenerationParameters, SecretString};
pub use generate::CredentialGenerator;
pub use permissions::PermissionPolicy;
pub use request::{parse_store_request, StoreMode, StoreRequest};
pub use rotation::{KeyRotationJob, RotationReport};
pub use service::{registry_from_config, CredentialService, PermissionGrant, StoredCredential};
pub use transaction::{AuditedTransaction, Staged};
