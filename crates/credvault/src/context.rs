//! Opening the configured store, key registry and service

use anyhow::{anyhow, Context, Result};
use camino::Utf8PathBuf;
use credvault_core::types::CallerContext;
use credvault_core::CredvaultConfig;
use credvault_crypto::KeyRegistry;
use credvault_engine::{registry_from_config, CredentialService, PermissionPolicy};
use credvault_store::FileStore;
use std::sync::Arc;
use tracing::debug;

use crate::cli::GlobalArgs;

/// Everything a command needs, opened from configuration
pub struct AppContext {
    pub config: CredvaultConfig,
    pub store: Arc<FileStore>,
    pub registry: Arc<KeyRegistry>,
    pub service: CredentialService,
    pub caller: CallerContext,
}

impl AppContext {
    pub async fn open(global: &GlobalArgs) -> Result<Self> {
        let config = CredvaultConfig::load(global.config.as_deref())
            .context("Failed to load configuration")?;

        let path = match &config.storage.path {
            Some(path) => path.clone(),
            None => default_store_path()?,
        };
        debug!("Using credential store {}", path);
        let store = Arc::new(
            FileStore::open(&path)
                .await
                .with_context(|| format!("Failed to open credential store {}", path))?,
        );

        let registry = Arc::new(
            registry_from_config(&config, store.as_ref())
                .await
                .context("Encryption keys are not usable")?,
        );

        let service = CredentialService::new(
            store.clone(),
            registry.clone(),
            PermissionPolicy::new(config.security.enforce_permissions),
        );

        let caller = CallerContext::new(global.actor.clone()).with_scopes(global.scopes.clone());

        Ok(Self {
            config,
            store,
            registry,
            service,
            caller,
        })
    }
}

/// `~/.credvault/store.json`, preferring HOME over the passwd entry
fn default_store_path() -> Result<Utf8PathBuf> {
    let home = std::env::var_os("HOME")
        .map(std::path::PathBuf::from)
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow!("Could not determine home directory"))?;
    let path = home.join(".credvault").join("store.json");
    Utf8PathBuf::from_path_buf(path)
        .map_err(|p| anyhow!("Store path is not valid UTF-8: {}", p.display()))
}
