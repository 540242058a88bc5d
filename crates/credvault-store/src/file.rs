//! JSON snapshot store
//!
//! The whole state is written to a sibling temp file and renamed over the
//! snapshot on every write. A write that fails to persist leaves both the file
//! and the in-memory state untouched.

use crate::records::{ChangeSet, CredentialVersion, Envelope, NameSummary};
use crate::state::StoreState;
use crate::CredentialStore;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use credvault_core::types::{AuditRecord, CredentialName, PermissionEntry};
use credvault_core::{Error, Result};
use credvault_crypto::{Canary, CanaryStore};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Store persisted as a single JSON document
#[derive(Debug)]
pub struct FileStore {
    path: Utf8PathBuf,
    state: RwLock<StoreState>,
}

impl FileStore {
    /// Open the snapshot at `path`, starting empty when it does not exist
    pub async fn open(path: impl AsRef<Utf8Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let state = match fs::read_to_string(&path).await {
            Ok(content) => {
                let state: StoreState = serde_json::from_str(&content).map_err(|e| {
                    Error::storage(format!("Corrupt store snapshot {}: {}", path, e))
                })?;
                debug!(
                    "Loaded store snapshot {} ({} versions)",
                    path,
                    state.versions.len()
                );
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
                    fs::create_dir_all(parent).await.map_err(|e| {
                        Error::storage(format!("Failed to create {}: {}", parent, e))
                    })?;
                }
                info!("Creating new credential store at {}", path);
                StoreState::default()
            }
            Err(e) => return Err(Error::storage(format!("Failed to read {}: {}", path, e))),
        };

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Apply `change` to a copy of the state, persist it, then publish it
    async fn write_with<T>(&self, change: impl FnOnce(&mut StoreState) -> T) -> Result<T> {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        let outcome = change(&mut next);
        self.persist(&next).await?;
        *guard = next;
        Ok(outcome)
    }

    async fn persist(&self, state: &StoreState) -> Result<()> {
        let json = serde_json::to_vec(state)
            .map_err(|e| Error::storage(format!("Failed to serialize store: {}", e)))?;
        let tmp = Utf8PathBuf::from(format!("{}.tmp", self.path));

        // A stale temp file would keep its old mode through a truncating open
        match fs::remove_file(&tmp).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::storage(format!("Failed to clear {}: {}", tmp, e)));
            }
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options
            .open(&tmp)
            .await
            .map_err(|e| Error::storage(format!("Failed to create {}: {}", tmp, e)))?;
        file.write_all(&json)
            .await
            .map_err(|e| Error::storage(format!("Failed to write {}: {}", tmp, e)))?;
        file.sync_all()
            .await
            .map_err(|e| Error::storage(format!("Failed to flush {}: {}", tmp, e)))?;
        drop(file);

        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::storage(format!("Failed to replace {}: {}", self.path, e)))?;
        Ok(())
    }
}

#[async_trait]
impl CanaryStore for FileStore {
    async fn canaries(&self) -> Result<Vec<Canary>> {
        Ok(self.state.read().await.canaries.clone())
    }

    async fn save_canary(&self, canary: Canary) -> Result<()> {
        self.write_with(|state| state.canaries.push(canary)).await
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn create_version(&self, version: CredentialVersion) -> Result<CredentialVersion> {
        let changes = ChangeSet::new().create_version(version.clone());
        self.write_with(|state| state.apply(changes)).await?;
        Ok(version)
    }

    async fn most_recent(&self, name: &CredentialName) -> Result<Option<CredentialVersion>> {
        Ok(self.state.read().await.most_recent(name))
    }

    async fn by_id(&self, id: Uuid) -> Result<Option<CredentialVersion>> {
        Ok(self.state.read().await.by_id(id))
    }

    async fn all_versions(&self, name: &CredentialName) -> Result<Vec<CredentialVersion>> {
        Ok(self.state.read().await.all_versions(name))
    }

    async fn delete_all(&self, name: &CredentialName) -> Result<bool> {
        if !self.state.read().await.contains(name) {
            return Ok(false);
        }
        let changes = ChangeSet::new().delete_all(name.clone());
        self.write_with(|state| {
            let existed = state.contains(name);
            state.apply(changes);
            existed
        })
        .await
    }

    async fn find_names_containing(&self, substring: &str) -> Result<Vec<NameSummary>> {
        let needle = substring.to_lowercase();
        Ok(self.state.read().await.find_names(|name| name.contains(&needle)))
    }

    async fn find_names_starting_with(&self, prefix: &str) -> Result<Vec<NameSummary>> {
        let needle = prefix.to_lowercase();
        Ok(self.state.read().await.find_names(|name| name.starts_with(&needle)))
    }

    async fn list_all_paths(&self) -> Result<Vec<String>> {
        Ok(self.state.read().await.list_all_paths())
    }

    async fn permissions(&self, name: &CredentialName) -> Result<Vec<PermissionEntry>> {
        Ok(self.state.read().await.permissions(name))
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        self.write_with(|state| state.apply(changes)).await
    }

    async fn versions_encrypted_with(
        &self,
        key_id: Uuid,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<CredentialVersion>> {
        Ok(self
            .state
            .read()
            .await
            .versions_encrypted_with(key_id, after, limit))
    }

    async fn encryption_key_ids(&self) -> Result<Vec<Uuid>> {
        Ok(self.state.read().await.encryption_key_ids())
    }

    async fn count_encrypted_with(&self, key_id: Uuid) -> Result<usize> {
        Ok(self.state.read().await.count_encrypted_with(key_id))
    }

    async fn replace_envelope(
        &self,
        version_id: Uuid,
        expected_key: Uuid,
        envelope: Envelope,
    ) -> Result<bool> {
        self.write_with(|state| state.replace_envelope(version_id, expected_key, envelope))
            .await
    }

    async fn audit_records(&self) -> Result<Vec<AuditRecord>> {
        Ok(self.state.read().await.audit.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credvault_core::types::{CallerContext, CredentialKind, OperationCode};
    use credvault_crypto::EncryptedValue;
    use serde_json::json;
    use tempfile::TempDir;

    fn utf8(dir: &TempDir, file: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(file)).unwrap()
    }

    fn version(raw: &str) -> CredentialVersion {
        CredentialVersion::new(
            CredentialName::parse(raw).unwrap(),
            CredentialKind::Password,
            json!({}),
            Envelope {
                key_id: Uuid::new_v4(),
                value: EncryptedValue {
                    ciphertext: vec![1, 2, 3],
                    nonce: vec![0; 12],
                },
                parameters: Some(EncryptedValue {
                    ciphertext: vec![4],
                    nonce: vec![1; 12],
                }),
            },
        )
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = utf8(&dir, "nested/store.json");

        let stored = {
            let store = FileStore::open(&path).await.unwrap();
            let stored = store.create_version(version("/persisted")).await.unwrap();
            let record = AuditRecord::new(
                OperationCode::CredentialUpdate,
                "/persisted",
                &CallerContext::new("alice"),
                200,
            );
            store.commit(ChangeSet::audit_only(vec![record])).await.unwrap();
            stored
        };

        let reopened = FileStore::open(&path).await.unwrap();
        let found = reopened.by_id(stored.id).await.unwrap().unwrap();
        assert_eq!(found, stored);
        assert_eq!(reopened.audit_records().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_canaries_persist() {
        let dir = TempDir::new().unwrap();
        let path = utf8(&dir, "store.json");
        let canary = Canary {
            id: Uuid::new_v4(),
            value: EncryptedValue {
                ciphertext: vec![7],
                nonce: vec![0; 12],
            },
        };

        FileStore::open(&path)
            .await
            .unwrap()
            .save_canary(canary.clone())
            .await
            .unwrap();

        let reopened = FileStore::open(&path).await.unwrap();
        assert_eq!(reopened.canaries().await.unwrap(), vec![canary]);
    }

    #[tokio::test]
    async fn test_failed_persist_rolls_back() {
        let dir = TempDir::new().unwrap();
        let path = utf8(&dir, "store.json");
        let store = FileStore::open(&path).await.unwrap();
        store.create_version(version("/kept")).await.unwrap();

        // A directory squatting on the temp path makes the next write fail
        std::fs::create_dir(format!("{}.tmp", path)).unwrap();

        let result = store.create_version(version("/lost")).await;
        assert!(matches!(result, Err(Error::Storage(_))));

        let lost = CredentialName::parse("/lost").unwrap();
        assert!(store.most_recent(&lost).await.unwrap().is_none());
        assert_eq!(store.list_all_paths().await.unwrap(), vec!["/kept"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_snapshot_is_private_to_owner() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = utf8(&dir, "store.json");

        // A leftover temp file with open permissions must not leak its mode
        std::fs::write(format!("{}.tmp", path), "stale").unwrap();
        std::fs::set_permissions(
            format!("{}.tmp", path),
            std::fs::Permissions::from_mode(0o644),
        )
        .unwrap();

        let store = FileStore::open(&path).await.unwrap();
        store.create_version(version("/private")).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = utf8(&dir, "store.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = FileStore::open(&path).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}
