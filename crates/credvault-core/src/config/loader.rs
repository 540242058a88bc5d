//! Configuration file loading and validation
//!
//! Precedence (low to high):
//! 1. Built-in defaults
//! 2. credvault.yaml (explicit path, working directory, or ~/.credvault/)
//! 3. Environment variables (CREDVAULT_* prefix)

use super::settings::{CredvaultConfig, KeyConfig, KeyMaterial};
use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::env;
use std::fs;
use tracing::debug;

/// Configuration file names to search for
const CONFIG_FILE_NAMES: &[&str] = &["credvault.yaml", "credvault.yml"];

/// Length of a hex-encoded 256-bit key
const DEV_KEY_HEX_LEN: usize = 64;

impl CredvaultConfig {
    /// Load configuration from the specified path or search for it
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        let (config_path, content) = match path {
            Some(p) => {
                let expanded = expand_path(p);
                let content = fs::read_to_string(&expanded).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        Error::config_not_found(expanded.as_str())
                    } else {
                        Error::Io(e)
                    }
                })?;
                (expanded, content)
            }
            None => Self::find_config()?,
        };

        debug!("Loading configuration from {}", config_path);
        let config = Self::from_yaml_str(&content)?;
        let config = config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML without consulting the environment
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let mut config: CredvaultConfig = serde_yaml_ng::from_str(content)?;
        if let Some(path) = config.storage.path.take() {
            config.storage.path = Some(expand_path(&path));
        }
        Ok(config)
    }

    /// Search the working directory, then ~/.credvault, for a config file
    fn find_config() -> Result<(Utf8PathBuf, String)> {
        let mut candidates: Vec<Utf8PathBuf> = CONFIG_FILE_NAMES
            .iter()
            .map(|name| Utf8PathBuf::from(*name))
            .collect();

        let home_dir = expand_path(Utf8Path::new("~/.credvault"));
        candidates.extend(CONFIG_FILE_NAMES.iter().map(|name| home_dir.join(name)));

        for candidate in candidates {
            if candidate.exists() {
                let content = fs::read_to_string(&candidate)?;
                return Ok((candidate, content));
            }
        }

        Err(Error::config_not_found(CONFIG_FILE_NAMES.join(" or ")))
    }

    /// Apply CREDVAULT_* environment overrides
    pub fn apply_env_overrides(mut self) -> Result<Self> {
        if let Ok(val) = env::var("CREDVAULT_STORE_PATH") {
            self.storage.path = Some(expand_path(Utf8Path::new(&val)));
        }

        if let Ok(val) = env::var("CREDVAULT_ROTATION_PAGE_SIZE") {
            self.rotation.page_size = val.parse().map_err(|_| {
                Error::config("CREDVAULT_ROTATION_PAGE_SIZE must be a valid number")
            })?;
        }

        if let Ok(val) = env::var("CREDVAULT_ROTATION_INTERVAL_SECS") {
            self.rotation.interval_secs = Some(val.parse().map_err(|_| {
                Error::config("CREDVAULT_ROTATION_INTERVAL_SECS must be a valid number")
            })?);
        }

        if let Ok(val) = env::var("CREDVAULT_ENFORCE_PERMISSIONS") {
            self.security.enforce_permissions = val.parse().map_err(|_| {
                Error::config("CREDVAULT_ENFORCE_PERMISSIONS must be true or false")
            })?;
        }

        Ok(self)
    }

    /// Check structural rules the file format cannot express
    pub fn validate(&self) -> Result<()> {
        let keys = &self.encryption.keys;
        if keys.is_empty() {
            return Err(Error::config("at least one encryption key must be configured"));
        }

        let active = keys.iter().filter(|k| k.active).count();
        if active != 1 {
            return Err(Error::config(format!(
                "exactly one encryption key must be active, found {}",
                active
            )));
        }

        for key in keys {
            key.material()?;
        }

        if self.rotation.page_size == 0 {
            return Err(Error::config("rotation page-size must be greater than zero"));
        }

        Ok(())
    }

    /// The configured active key
    pub fn active_key(&self) -> Option<&KeyConfig> {
        self.encryption.keys.iter().find(|k| k.active)
    }
}

impl KeyConfig {
    /// Resolve the secret material for this key
    pub fn material(&self) -> Result<KeyMaterial> {
        let sources = [
            self.passphrase.is_some(),
            self.passphrase_env.is_some(),
            self.dev_key.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();

        if sources != 1 {
            return Err(Error::config(
                "each encryption key needs exactly one of passphrase, passphrase-env or dev-key",
            ));
        }

        if let Some(passphrase) = &self.passphrase {
            return non_empty_passphrase(passphrase.clone());
        }

        if let Some(var) = &self.passphrase_env {
            let passphrase = env::var(var)
                .map_err(|_| Error::config(format!("environment variable {} not set", var)))?;
            return non_empty_passphrase(passphrase);
        }

        let dev_key = self.dev_key.clone().unwrap_or_default();
        if dev_key.len() != DEV_KEY_HEX_LEN || !dev_key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::config(format!(
                "dev-key must be {} hexadecimal characters",
                DEV_KEY_HEX_LEN
            )));
        }
        Ok(KeyMaterial::DevKey(dev_key))
    }
}

fn non_empty_passphrase(passphrase: String) -> Result<KeyMaterial> {
    if passphrase.is_empty() {
        return Err(Error::config("encryption passphrase must not be empty"));
    }
    Ok(KeyMaterial::Passphrase(passphrase))
}

fn expand_path(path: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(shellexpand::tilde(path.as_str()).to_string())
}
