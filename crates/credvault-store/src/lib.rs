//! # credvault-store
//!
//! Versioned, name-addressed persistence for credvault. Every write appends a
//! version; reads resolve names case-insensitively and return the stored case.
//! Staged mutations and their audit records are applied together by
//! [`CredentialStore::commit`].

mod file;
mod memory;
mod records;
mod state;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use records::{ChangeSet, CredentialVersion, Envelope, Mutation, NameSummary};

use async_trait::async_trait;
use credvault_core::types::{AuditRecord, CredentialName, PermissionEntry};
use credvault_core::Result;
use credvault_crypto::CanaryStore;
use uuid::Uuid;

/// Persistence facade used by the engine
#[async_trait]
pub trait CredentialStore: CanaryStore + Send + Sync {
    /// Append a single version outside any request transaction
    async fn create_version(&self, version: CredentialVersion) -> Result<CredentialVersion>;

    async fn most_recent(&self, name: &CredentialName) -> Result<Option<CredentialVersion>>;

    async fn by_id(&self, id: Uuid) -> Result<Option<CredentialVersion>>;

    /// All versions of a name, newest first
    async fn all_versions(&self, name: &CredentialName) -> Result<Vec<CredentialVersion>>;

    /// Remove every version; false when the name did not exist
    async fn delete_all(&self, name: &CredentialName) -> Result<bool>;

    /// Names containing `substring` (case-insensitive), newest first
    async fn find_names_containing(&self, substring: &str) -> Result<Vec<NameSummary>>;

    /// Names starting with `prefix` (case-insensitive), newest first
    async fn find_names_starting_with(&self, prefix: &str) -> Result<Vec<NameSummary>>;

    /// Every hierarchical prefix of every name, deduplicated and sorted
    async fn list_all_paths(&self) -> Result<Vec<String>>;

    async fn permissions(&self, name: &CredentialName) -> Result<Vec<PermissionEntry>>;

    /// Apply mutations and audit records atomically
    async fn commit(&self, changes: ChangeSet) -> Result<()>;

    /// Up to `limit` versions sealed under `key_id`, oldest first.
    ///
    /// `after` is the id of the last version of the previous page; the page
    /// starts past it, so versions that could not be rotated are not returned
    /// again in the same pass.
    async fn versions_encrypted_with(
        &self,
        key_id: Uuid,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<CredentialVersion>>;

    async fn count_encrypted_with(&self, key_id: Uuid) -> Result<usize>;

    /// Every key id that seals at least one stored version
    async fn encryption_key_ids(&self) -> Result<Vec<Uuid>>;

    /// Swap a version's envelope if it is still sealed under `expected_key`
    async fn replace_envelope(
        &self,
        version_id: Uuid,
        expected_key: Uuid,
        envelope: Envelope,
    ) -> Result<bool>;

    async fn audit_records(&self) -> Result<Vec<AuditRecord>>;
}
