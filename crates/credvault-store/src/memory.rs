//! Process-local store

use crate::records::{ChangeSet, CredentialVersion, Envelope, NameSummary};
use crate::state::StoreState;
use crate::CredentialStore;
use async_trait::async_trait;
use credvault_core::types::{AuditRecord, CredentialName, PermissionEntry};
use credvault_core::Result;
use credvault_crypto::{Canary, CanaryStore};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Store held entirely in memory behind one lock
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CanaryStore for MemoryStore {
    async fn canaries(&self) -> Result<Vec<Canary>> {
        Ok(self.state.read().await.canaries.clone())
    }

    async fn save_canary(&self, canary: Canary) -> Result<()> {
        self.state.write().await.canaries.push(canary);
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn create_version(&self, version: CredentialVersion) -> Result<CredentialVersion> {
        self.state
            .write()
            .await
            .apply(ChangeSet::new().create_version(version.clone()));
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
        let mut state = self.state.write().await;
        if !state.contains(name) {
            return Ok(false);
        }
        state.apply(ChangeSet::new().delete_all(name.clone()));
        Ok(true)
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
        self.state.write().await.apply(changes);
        Ok(())
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
        Ok(self
            .state
            .write()
            .await
            .replace_envelope(version_id, expected_key, envelope))
    }

    async fn audit_records(&self) -> Result<Vec<AuditRecord>> {
        Ok(self.state.read().await.audit.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use credvault_core::types::{CallerContext, CredentialKind, OperationCode, PermissionOperation};
    use credvault_crypto::EncryptedValue;
    use serde_json::json;

    fn name(raw: &str) -> CredentialName {
        CredentialName::parse(raw).unwrap()
    }

    fn envelope(key_id: Uuid, marker: u8) -> Envelope {
        Envelope {
            key_id,
            value: EncryptedValue {
                ciphertext: vec![marker],
                nonce: vec![0; 12],
            },
            parameters: None,
        }
    }

    fn version(raw: &str, key_id: Uuid, marker: u8) -> CredentialVersion {
        CredentialVersion::new(
            name(raw),
            CredentialKind::Value,
            json!({}),
            envelope(key_id, marker),
        )
    }

    #[tokio::test]
    async fn test_most_recent_is_case_insensitive_and_keeps_stored_case() {
        let store = MemoryStore::new();
        let key = Uuid::new_v4();
        store.create_version(version("/Team/Secret", key, 1)).await.unwrap();

        let found = store.most_recent(&name("/team/SECRET")).await.unwrap().unwrap();
        assert_eq!(found.name.as_str(), "/Team/Secret");
    }

    #[tokio::test]
    async fn test_equal_timestamps_resolve_by_insertion_order() {
        let store = MemoryStore::new();
        let key = Uuid::new_v4();
        let first = version("/same", key, 1);
        let mut second = version("/same", key, 2);
        second.created_at = first.created_at;

        store.create_version(first).await.unwrap();
        let second = store.create_version(second).await.unwrap();

        let latest = store.most_recent(&name("/same")).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        let history = store.all_versions(&name("/same")).await.unwrap();
        assert_eq!(history[0].id, second.id);
    }

    #[tokio::test]
    async fn test_history_is_newest_first() {
        let store = MemoryStore::new();
        let key = Uuid::new_v4();
        let mut old = version("/h", key, 1);
        old.created_at = Utc::now() - Duration::hours(1);
        let new = version("/h", key, 2);

        store.create_version(new.clone()).await.unwrap();
        store.create_version(old.clone()).await.unwrap();

        let history = store.all_versions(&name("/h")).await.unwrap();
        assert_eq!(
            history.iter().map(|v| v.id).collect::<Vec<_>>(),
            vec![new.id, old.id]
        );
    }

    #[tokio::test]
    async fn test_delete_all_removes_every_version_and_permission() {
        let store = MemoryStore::new();
        let key = Uuid::new_v4();
        store.create_version(version("/d", key, 1)).await.unwrap();
        store.create_version(version("/d", key, 2)).await.unwrap();
        store
            .commit(ChangeSet::new().put_permission(PermissionEntry::owner("alice", name("/d"))))
            .await
            .unwrap();

        assert!(store.delete_all(&name("/D")).await.unwrap());
        assert!(store.all_versions(&name("/d")).await.unwrap().is_empty());
        assert!(store.permissions(&name("/d")).await.unwrap().is_empty());
        assert!(!store.delete_all(&name("/d")).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_all_paths() {
        let store = MemoryStore::new();
        let key = Uuid::new_v4();
        for raw in ["/a/b/c", "/a/b/d", "/x"] {
            store.create_version(version(raw, key, 1)).await.unwrap();
        }

        assert_eq!(
            store.list_all_paths().await.unwrap(),
            vec!["/a/", "/a/b/", "/a/b/c", "/a/b/d", "/x"]
        );
    }

    #[tokio::test]
    async fn test_find_names() {
        let store = MemoryStore::new();
        let key = Uuid::new_v4();
        for raw in ["/app/db-password", "/app/api-key", "/other/db-user"] {
            store.create_version(version(raw, key, 1)).await.unwrap();
        }

        let containing = store.find_names_containing("DB").await.unwrap();
        let mut names: Vec<_> = containing.into_iter().map(|s| s.name).collect();
        names.sort();
        assert_eq!(names, vec!["/app/db-password", "/other/db-user"]);

        let under = store.find_names_starting_with("/APP/").await.unwrap();
        assert_eq!(under.len(), 2);
    }

    #[tokio::test]
    async fn test_commit_applies_mutations_and_audit_together() {
        let store = MemoryStore::new();
        let key = Uuid::new_v4();
        let caller = CallerContext::new("alice");
        let record = AuditRecord::new(OperationCode::CredentialUpdate, "/c", &caller, 200);

        store
            .commit(
                ChangeSet::new()
                    .create_version(version("/c", key, 1))
                    .with_audit([record.clone()]),
            )
            .await
            .unwrap();

        assert!(store.most_recent(&name("/c")).await.unwrap().is_some());
        assert_eq!(store.audit_records().await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_permission_upsert_and_delete() {
        let store = MemoryStore::new();
        let path = name("/p");
        store
            .commit(ChangeSet::new().put_permission(PermissionEntry::new(
                "bob",
                path.clone(),
                [PermissionOperation::Read],
            )))
            .await
            .unwrap();
        store
            .commit(ChangeSet::new().put_permission(PermissionEntry::new(
                "bob",
                path.clone(),
                [PermissionOperation::Read, PermissionOperation::Write],
            )))
            .await
            .unwrap();

        let entries = store.permissions(&path).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].allows(PermissionOperation::Write));

        store
            .commit(ChangeSet::new().delete_permission(path.clone(), "bob"))
            .await
            .unwrap();
        assert!(store.permissions(&path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_envelope_is_compare_and_set() {
        let store = MemoryStore::new();
        let old_key = Uuid::new_v4();
        let new_key = Uuid::new_v4();
        let stored = store.create_version(version("/r", old_key, 1)).await.unwrap();

        assert!(store
            .replace_envelope(stored.id, old_key, envelope(new_key, 9))
            .await
            .unwrap());
        // Second swap sees the new key and is refused
        assert!(!store
            .replace_envelope(stored.id, old_key, envelope(new_key, 10))
            .await
            .unwrap());

        let current = store.by_id(stored.id).await.unwrap().unwrap();
        assert_eq!(current.key_id(), new_key);
        assert_eq!(current.envelope.value.ciphertext, vec![9]);
        assert_eq!(current.created_at, stored.created_at);
        assert_eq!(store.count_encrypted_with(old_key).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_versions_encrypted_with_respects_limit() {
        let store = MemoryStore::new();
        let key = Uuid::new_v4();
        for idx in 0..5 {
            store
                .create_version(version(&format!("/k{}", idx), key, idx))
                .await
                .unwrap();
        }
        store
            .create_version(version("/other", Uuid::new_v4(), 0))
            .await
            .unwrap();

        assert_eq!(store.versions_encrypted_with(key, None, 3).await.unwrap().len(), 3);
        assert_eq!(store.count_encrypted_with(key).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_versions_encrypted_with_resumes_after_cursor() {
        let store = MemoryStore::new();
        let key = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut ids = Vec::new();
        for idx in 0..5 {
            let key_id = if idx == 2 { other } else { key };
            let stored = store
                .create_version(version(&format!("/k{}", idx), key_id, idx))
                .await
                .unwrap();
            ids.push(stored.id);
        }

        let first = store.versions_encrypted_with(key, None, 2).await.unwrap();
        assert_eq!(first.iter().map(|v| v.id).collect::<Vec<_>>(), vec![ids[0], ids[1]]);

        // The page after ids[1] skips the version under the other key
        let second = store
            .versions_encrypted_with(key, Some(ids[1]), 2)
            .await
            .unwrap();
        assert_eq!(second.iter().map(|v| v.id).collect::<Vec<_>>(), vec![ids[3], ids[4]]);

        assert!(store
            .versions_encrypted_with(key, Some(ids[4]), 2)
            .await
            .unwrap()
            .is_empty());

        let mut expected = vec![key, other];
        expected.sort();
        assert_eq!(store.encryption_key_ids().await.unwrap(), expected);
    }
}
