//! Configuration file schema (credvault.yaml)

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default number of versions re-encrypted per rotation page
pub const DEFAULT_ROTATION_PAGE_SIZE: usize = 50;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CredvaultConfig {
    pub encryption: EncryptionConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub rotation: RotationConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Configured encryption keys; exactly one must be active
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EncryptionConfig {
    #[serde(default)]
    pub keys: Vec<KeyConfig>,
}

/// Which provider implementation backs a key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyProviderKind {
    #[default]
    Software,
}

/// One configured encryption key
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KeyConfig {
    #[serde(default)]
    pub provider: KeyProviderKind,

    /// Passphrase the key is derived from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,

    /// Environment variable holding the passphrase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase_env: Option<String>,

    /// Raw 256-bit key as 64 hex characters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_key: Option<String>,

    #[serde(default)]
    pub active: bool,
}

/// Resolved secret material for a software key
#[derive(Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    Passphrase(String),
    DevKey(String),
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMaterial::Passphrase(_) => write!(f, "Passphrase([REDACTED])"),
            KeyMaterial::DevKey(_) => write!(f, "DevKey([REDACTED])"),
        }
    }
}

impl fmt::Debug for KeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyConfig")
            .field("provider", &self.provider)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("passphrase_env", &self.passphrase_env)
            .field("dev_key", &self.dev_key.as_ref().map(|_| "[REDACTED]"))
            .field("active", &self.active)
            .finish()
    }
}

/// Where credentials are persisted
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    #[serde(default)]
    pub path: Option<Utf8PathBuf>,
}

/// Background re-encryption settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RotationConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Run the job periodically when set
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_ROTATION_PAGE_SIZE,
            interval_secs: None,
        }
    }
}

fn default_page_size() -> usize {
    DEFAULT_ROTATION_PAGE_SIZE
}

/// Access control settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SecurityConfig {
    /// Check permission entries on every credential operation
    #[serde(default)]
    pub enforce_permissions: bool,
}
