//! Background re-encryption of versions sealed under retired keys

use crate::codec;
use credvault_core::config::DEFAULT_ROTATION_PAGE_SIZE;
use credvault_core::Result;
use credvault_crypto::KeyRegistry;
use credvault_store::CredentialStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of one rotation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RotationReport {
    /// Versions moved to the active key during this pass
    pub rotated: usize,
    /// Retired keys skipped because their provider is unusable
    pub skipped_keys: Vec<Uuid>,
    /// Versions still sealed under known retired keys afterwards
    pub remaining: usize,
}

/// Moves every version onto the active key, a page at a time.
///
/// Version ids, timestamps and content never change. Each swap is a
/// compare-and-set on the old key id, so a pass can race foreground writes
/// and can be interrupted and rerun at any point. Pages advance past versions
/// that fail to re-encrypt; those stay under their key and count towards
/// `remaining`.
pub struct KeyRotationJob {
    store: Arc<dyn CredentialStore>,
    registry: Arc<KeyRegistry>,
    page_size: usize,
}

impl KeyRotationJob {
    pub fn new(store: Arc<dyn CredentialStore>, registry: Arc<KeyRegistry>) -> Self {
        Self {
            store,
            registry,
            page_size: DEFAULT_ROTATION_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub async fn rotate(&self) -> Result<RotationReport> {
        let active = self.registry.active_key_id();
        let mut report = RotationReport::default();

        for key in self.registry.all_known_keys() {
            if key.id == active {
                continue;
            }
            if !key.is_usable() {
                warn!(key_id = %key.id, "Skipping rotation for unusable key");
                report.skipped_keys.push(key.id);
                continue;
            }
            report.rotated += self.rotate_key(key.id).await?;
        }

        // Versions may be sealed under keys that are no longer configured
        for key_id in self.store.encryption_key_ids().await? {
            if key_id == active {
                continue;
            }
            if !self.registry.is_known(key_id) {
                warn!(key_id = %key_id, "Versions are sealed under an unknown key");
                report.skipped_keys.push(key_id);
            }
            report.remaining += self.store.count_encrypted_with(key_id).await?;
        }

        info!(
            rotated = report.rotated,
            remaining = report.remaining,
            skipped = report.skipped_keys.len(),
            "Key rotation pass complete"
        );
        Ok(report)
    }

    async fn rotate_key(&self, key_id: Uuid) -> Result<usize> {
        let mut rotated = 0;
        let mut failed = 0;
        let mut after = None;

        loop {
            let page = self
                .store
                .versions_encrypted_with(key_id, after, self.page_size)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.id);

            for version in &page {
                let envelope = match codec::reseal(version, &self.registry) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!(version = %version.id, key_id = %key_id, "Cannot re-encrypt version: {}", e);
                        failed += 1;
                        continue;
                    }
                };
                if self
                    .store
                    .replace_envelope(version.id, key_id, envelope)
                    .await?
                {
                    rotated += 1;
                } else {
                    debug!(version = %version.id, "Version changed during rotation");
                }
            }
        }

        if failed > 0 {
            warn!(key_id = %key_id, failed, "Some versions were left under the retired key");
        }
        Ok(rotated)
    }

    /// Run a pass every `interval` on the tokio runtime
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.rotate().await {
                    warn!("Key rotation pass failed: {}", e);
                }
            }
        })
    }
}
