//! Shared fixtures for credvault-engine integration tests
//!
//! - A store wrapper whose commits can be made to fail on demand
//! - Registry and service builders over that store

#![allow(dead_code)]

use async_trait::async_trait;
use credvault_core::types::{AuditRecord, CallerContext, CredentialName, PermissionEntry};
use credvault_core::{Error, Result};
use credvault_crypto::{Canary, CanaryStore, ConfiguredKey, KeyRegistry, SoftwareKeyProvider};
use credvault_engine::{CredentialService, PermissionPolicy};
use credvault_store::{ChangeSet, CredentialStore, CredentialVersion, Envelope, MemoryStore, NameSummary};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Which commits the wrapper rejects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommitFailure {
    Never = 0,
    /// Commits carrying mutations fail; audit-only commits succeed
    WithMutations = 1,
    Always = 2,
}

/// Delegates to an inner store, optionally failing `commit`
pub struct FailingCommitStore {
    inner: Arc<dyn CredentialStore>,
    mode: AtomicU8,
}

impl FailingCommitStore {
    pub fn new(inner: Arc<dyn CredentialStore>) -> Self {
        Self {
            inner,
            mode: AtomicU8::new(CommitFailure::Never as u8),
        }
    }

    pub fn fail_commits(&self, mode: CommitFailure) {
        self.mode.store(mode as u8, Ordering::SeqCst);
    }

    fn should_fail(&self, changes: &ChangeSet) -> bool {
        match self.mode.load(Ordering::SeqCst) {
            1 => changes.has_mutations(),
            2 => true,
            _ => false,
        }
    }
}

#[async_trait]
impl CanaryStore for FailingCommitStore {
    async fn canaries(&self) -> Result<Vec<Canary>> {
        self.inner.canaries().await
    }

    async fn save_canary(&self, canary: Canary) -> Result<()> {
        self.inner.save_canary(canary).await
    }
}

#[async_trait]
impl CredentialStore for FailingCommitStore {
    async fn create_version(&self, version: CredentialVersion) -> Result<CredentialVersion> {
        self.inner.create_version(version).await
    }

    async fn most_recent(&self, name: &CredentialName) -> Result<Option<CredentialVersion>> {
        self.inner.most_recent(name).await
    }

    async fn by_id(&self, id: Uuid) -> Result<Option<CredentialVersion>> {
        self.inner.by_id(id).await
    }

    async fn all_versions(&self, name: &CredentialName) -> Result<Vec<CredentialVersion>> {
        self.inner.all_versions(name).await
    }

    async fn delete_all(&self, name: &CredentialName) -> Result<bool> {
        self.inner.delete_all(name).await
    }

    async fn find_names_containing(&self, substring: &str) -> Result<Vec<NameSummary>> {
        self.inner.find_names_containing(substring).await
    }

    async fn find_names_starting_with(&self, prefix: &str) -> Result<Vec<NameSummary>> {
        self.inner.find_names_starting_with(prefix).await
    }

    async fn list_all_paths(&self) -> Result<Vec<String>> {
        self.inner.list_all_paths().await
    }

    async fn permissions(&self, name: &CredentialName) -> Result<Vec<PermissionEntry>> {
        self.inner.permissions(name).await
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        if self.should_fail(&changes) {
            return Err(Error::storage("simulated commit failure"));
        }
        self.inner.commit(changes).await
    }

    async fn versions_encrypted_with(
        &self,
        key_id: Uuid,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<CredentialVersion>> {
        self.inner.versions_encrypted_with(key_id, after, limit).await
    }

    async fn count_encrypted_with(&self, key_id: Uuid) -> Result<usize> {
        self.inner.count_encrypted_with(key_id).await
    }

    async fn encryption_key_ids(&self) -> Result<Vec<Uuid>> {
        self.inner.encryption_key_ids().await
    }

    async fn replace_envelope(
        &self,
        version_id: Uuid,
        expected_key: Uuid,
        envelope: Envelope,
    ) -> Result<bool> {
        self.inner
            .replace_envelope(version_id, expected_key, envelope)
            .await
    }

    async fn audit_records(&self) -> Result<Vec<AuditRecord>> {
        self.inner.audit_records().await
    }
}

pub fn caller(actor: &str) -> CallerContext {
    CallerContext::new(actor)
        .with_scopes(vec!["credhub.read".into(), "credhub.write".into()])
        .with_requester_ip("127.0.0.1")
}

/// Registry over `store` with one software key per passphrase; `active`
/// indexes the active one
pub async fn registry(
    store: &dyn CanaryStore,
    passphrases: &[&str],
    active: usize,
) -> Arc<KeyRegistry> {
    let keys = passphrases
        .iter()
        .enumerate()
        .map(|(idx, passphrase)| {
            ConfiguredKey::new(
                Arc::new(SoftwareKeyProvider::from_passphrase(passphrase).unwrap()),
                idx == active,
            )
        })
        .collect();
    Arc::new(KeyRegistry::initialize(keys, store).await.unwrap())
}

pub struct Harness {
    pub store: Arc<FailingCommitStore>,
    pub registry: Arc<KeyRegistry>,
    pub service: CredentialService,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_policy(PermissionPolicy::default()).await
    }

    pub async fn enforcing() -> Self {
        Self::with_policy(PermissionPolicy::new(true)).await
    }

    async fn with_policy(policy: PermissionPolicy) -> Self {
        let store = Arc::new(FailingCommitStore::new(Arc::new(MemoryStore::new())));
        let registry = registry(store.as_ref(), &["primary passphrase"], 0).await;
        let service = CredentialService::new(store.clone(), registry.clone(), policy);
        Self {
            store,
            registry,
            service,
        }
    }

    pub async fn audit(&self) -> Vec<AuditRecord> {
        self.store.audit_records().await.unwrap()
    }

    pub async fn versions(&self, name: &str) -> Vec<CredentialVersion> {
        self.store
            .all_versions(&CredentialName::parse(name).unwrap())
            .await
            .unwrap()
    }
}
