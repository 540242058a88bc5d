//! Encryption key registry
//!
//! Keys are identified by the UUID of their canary: a fixed marker encrypted
//! under the key and persisted alongside the credentials. On startup every
//! configured provider is matched to the canary it can open, which recovers the
//! key id recorded on existing data. The active key gets a new canary when none
//! matches.

use crate::provider::{EncryptedValue, EncryptionProvider};
use async_trait::async_trait;
use credvault_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Marker sealed into every canary
pub const CANARY_VALUE: &[u8] = b"abcdefghijklmnopqrst";

/// Plaintext used for the startup round-trip check
const VERIFICATION_MARKER: &[u8] = b"credvault-key-verification";

/// Persisted canary for one encryption key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Canary {
    pub id: Uuid,
    pub value: EncryptedValue,
}

/// Persistence for canaries
#[async_trait]
pub trait CanaryStore: Send + Sync {
    async fn canaries(&self) -> Result<Vec<Canary>>;

    async fn save_canary(&self, canary: Canary) -> Result<()>;
}

/// A provider as configured, before its id is known
pub struct ConfiguredKey {
    pub provider: Arc<dyn EncryptionProvider>,
    pub active: bool,
}

impl ConfiguredKey {
    pub fn new(provider: Arc<dyn EncryptionProvider>, active: bool) -> Self {
        Self { provider, active }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Usable,
    Unusable,
}

/// A known key with its resolved id
#[derive(Clone)]
pub struct EncryptionKey {
    pub id: Uuid,
    pub provider: Arc<dyn EncryptionProvider>,
    pub status: KeyStatus,
}

impl EncryptionKey {
    pub fn is_usable(&self) -> bool {
        self.status == KeyStatus::Usable
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("id", &self.id)
            .field("provider", &self.provider.describe())
            .field("status", &self.status)
            .finish()
    }
}

/// Ordered set of known keys with exactly one active key
#[derive(Debug, Clone)]
pub struct KeyRegistry {
    keys: Vec<EncryptionKey>,
    active: usize,
}

impl KeyRegistry {
    /// Resolve key ids from canaries and verify every provider.
    ///
    /// Fails when the configuration does not name exactly one active key or
    /// when the active key cannot complete a round trip.
    pub async fn initialize(
        configured: Vec<ConfiguredKey>,
        canaries: &dyn CanaryStore,
    ) -> Result<Self> {
        let active_count = configured.iter().filter(|k| k.active).count();
        if active_count != 1 {
            return Err(Error::config(format!(
                "exactly one encryption key must be active, found {}",
                active_count
            )));
        }

        let existing = canaries.canaries().await?;
        let mut claimed: HashSet<Uuid> = HashSet::new();
        let mut resolved: Vec<Option<Uuid>> = Vec::with_capacity(configured.len());

        for key in &configured {
            let matched = existing
                .iter()
                .filter(|canary| !claimed.contains(&canary.id))
                .find(|canary| opens_canary(key.provider.as_ref(), canary))
                .map(|canary| canary.id);

            let id = match matched {
                Some(id) => {
                    debug!(key_id = %id, provider = %key.provider.describe(), "Matched canary");
                    Some(id)
                }
                None if key.active => {
                    let canary = Canary {
                        id: Uuid::new_v4(),
                        value: key.provider.encrypt(CANARY_VALUE)?,
                    };
                    let id = canary.id;
                    canaries.save_canary(canary).await?;
                    info!(key_id = %id, provider = %key.provider.describe(), "Created canary for active key");
                    Some(id)
                }
                None => None,
            };
            if let Some(id) = id {
                claimed.insert(id);
            }
            resolved.push(id);
        }

        // Retired keys that open no canary take the canaries nobody claimed,
        // in store order, so the data they sealed stays attributed to them
        let mut unclaimed = existing
            .iter()
            .map(|canary| canary.id)
            .filter(|id| !claimed.contains(id));

        let mut keys = Vec::with_capacity(configured.len());
        let mut active = None;

        for (key, id) in configured.into_iter().zip(resolved) {
            let (id, status) = match id {
                Some(id) => (id, verify(key.provider.as_ref())),
                None => {
                    let id = unclaimed.next().unwrap_or_else(Uuid::new_v4);
                    warn!(
                        key_id = %id,
                        provider = %key.provider.describe(),
                        "Configured key opens no canary; keeping it as unusable"
                    );
                    (id, KeyStatus::Unusable)
                }
            };

            if status == KeyStatus::Unusable {
                warn!(key_id = %id, "Encryption key failed verification and is unusable");
            }

            if key.active {
                if status == KeyStatus::Unusable {
                    return Err(Error::encryption_unavailable(
                        id,
                        "active encryption key failed verification",
                    ));
                }
                active = Some(keys.len());
            }

            keys.push(EncryptionKey {
                id,
                provider: key.provider,
                status,
            });
        }

        let active = active.ok_or_else(|| Error::config("no active encryption key"))?;
        info!(keys = keys.len(), active_key = %keys[active].id, "Key registry initialized");
        Ok(Self { keys, active })
    }

    /// The key used for all new writes
    pub fn active_key(&self) -> &EncryptionKey {
        &self.keys[self.active]
    }

    pub fn active_key_id(&self) -> Uuid {
        self.keys[self.active].id
    }

    /// Every known key, active one included, in configuration order
    pub fn all_known_keys(&self) -> &[EncryptionKey] {
        &self.keys
    }

    pub fn is_usable(&self, key_id: Uuid) -> bool {
        self.find(key_id).is_some_and(EncryptionKey::is_usable)
    }

    /// Whether `key_id` belongs to a configured key, usable or not
    pub fn is_known(&self, key_id: Uuid) -> bool {
        self.find(key_id).is_some()
    }

    /// Seal under the active key
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Uuid, EncryptedValue)> {
        let key = self.active_key();
        let sealed = key.provider.encrypt(plaintext)?;
        Ok((key.id, sealed))
    }

    /// Open a value sealed under `key_id`
    pub fn decrypt(
        &self,
        key_id: Uuid,
        value: &EncryptedValue,
    ) -> Result<zeroize::Zeroizing<Vec<u8>>> {
        let key = self
            .find(key_id)
            .ok_or_else(|| Error::encryption_unavailable(key_id, "unknown encryption key"))?;

        if !key.is_usable() {
            return Err(Error::encryption_unavailable(
                key_id,
                "encryption key failed verification",
            ));
        }

        key.provider.decrypt(value).map_err(|e| match e {
            Error::EncryptionUnavailable { .. } => e,
            other => Error::encryption_unavailable(key_id, other.to_string()),
        })
    }

    fn find(&self, key_id: Uuid) -> Option<&EncryptionKey> {
        self.keys.iter().find(|k| k.id == key_id)
    }
}

fn opens_canary(provider: &dyn EncryptionProvider, canary: &Canary) -> bool {
    provider
        .decrypt(&canary.value)
        .map(|plain| plain.as_slice() == CANARY_VALUE)
        .unwrap_or(false)
}

fn verify(provider: &dyn EncryptionProvider) -> KeyStatus {
    let round_trip = provider
        .encrypt(VERIFICATION_MARKER)
        .and_then(|sealed| provider.decrypt(&sealed));

    match round_trip {
        Ok(plain) if plain.as_slice() == VERIFICATION_MARKER => KeyStatus::Usable,
        _ => KeyStatus::Unusable,
    }
}
