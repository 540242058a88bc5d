//! In-memory store state shared by every store implementation

use crate::records::{ChangeSet, CredentialVersion, Envelope, Mutation, NameSummary};
use credvault_core::types::{AuditRecord, CredentialName, PermissionEntry};
use credvault_crypto::Canary;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Everything a store holds. Versions are kept in insertion order, which
/// breaks ties between equal creation timestamps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct StoreState {
    pub versions: Vec<CredentialVersion>,
    pub canaries: Vec<Canary>,
    pub permissions: Vec<PermissionEntry>,
    pub audit: Vec<AuditRecord>,
}

impl StoreState {
    /// Apply a change set; mutations first, then audit records
    pub fn apply(&mut self, changes: ChangeSet) {
        for mutation in changes.mutations {
            match mutation {
                Mutation::CreateVersion(version) => self.versions.push(version),
                Mutation::DeleteAll(name) => {
                    self.versions.retain(|v| v.name != name);
                    self.permissions.retain(|p| p.path != name);
                }
                Mutation::PutPermission(entry) => {
                    self.permissions
                        .retain(|p| !(p.path == entry.path && p.actor == entry.actor));
                    self.permissions.push(entry);
                }
                Mutation::DeletePermission { path, actor } => {
                    self.permissions
                        .retain(|p| !(p.path == path && p.actor == actor));
                }
            }
        }
        self.audit.extend(changes.audit);
    }

    pub fn most_recent(&self, name: &CredentialName) -> Option<CredentialVersion> {
        self.versions
            .iter()
            .enumerate()
            .filter(|(_, v)| v.name == *name)
            .max_by_key(|(idx, v)| (v.created_at, *idx))
            .map(|(_, v)| v.clone())
    }

    pub fn by_id(&self, id: Uuid) -> Option<CredentialVersion> {
        self.versions.iter().find(|v| v.id == id).cloned()
    }

    /// Newest first
    pub fn all_versions(&self, name: &CredentialName) -> Vec<CredentialVersion> {
        let mut matching: Vec<(usize, &CredentialVersion)> = self
            .versions
            .iter()
            .enumerate()
            .filter(|(_, v)| v.name == *name)
            .collect();
        matching.sort_by(|(ia, a), (ib, b)| (b.created_at, *ib).cmp(&(a.created_at, *ia)));
        matching.into_iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn contains(&self, name: &CredentialName) -> bool {
        self.versions.iter().any(|v| v.name == *name)
    }

    /// Latest version timestamp per distinct name, newest first
    pub fn find_names(&self, predicate: impl Fn(&str) -> bool) -> Vec<NameSummary> {
        let mut latest: HashMap<String, NameSummary> = HashMap::new();
        for version in &self.versions {
            if !predicate(&version.name.key()) {
                continue;
            }
            latest
                .entry(version.name.key())
                .and_modify(|summary| {
                    if version.created_at >= summary.version_created_at {
                        summary.version_created_at = version.created_at;
                        summary.name = version.name.to_string();
                    }
                })
                .or_insert_with(|| NameSummary {
                    name: version.name.to_string(),
                    version_created_at: version.created_at,
                });
        }

        let mut summaries: Vec<NameSummary> = latest.into_values().collect();
        summaries.sort_by(|a, b| {
            b.version_created_at
                .cmp(&a.version_created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        summaries
    }

    pub fn list_all_paths(&self) -> Vec<String> {
        let paths: BTreeSet<String> = self
            .versions
            .iter()
            .flat_map(|v| v.name.hierarchy())
            .collect();
        paths.into_iter().collect()
    }

    pub fn permissions(&self, name: &CredentialName) -> Vec<PermissionEntry> {
        self.permissions
            .iter()
            .filter(|p| p.path == *name)
            .cloned()
            .collect()
    }

    /// Oldest first, resuming after the version `after` when it still exists
    pub fn versions_encrypted_with(
        &self,
        key_id: Uuid,
        after: Option<Uuid>,
        limit: usize,
    ) -> Vec<CredentialVersion> {
        let start = after
            .and_then(|id| self.versions.iter().position(|v| v.id == id))
            .map_or(0, |idx| idx + 1);
        self.versions[start..]
            .iter()
            .filter(|v| v.key_id() == key_id)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Distinct key ids sealing at least one version
    pub fn encryption_key_ids(&self) -> Vec<Uuid> {
        let ids: BTreeSet<Uuid> = self.versions.iter().map(|v| v.key_id()).collect();
        ids.into_iter().collect()
    }

    pub fn count_encrypted_with(&self, key_id: Uuid) -> usize {
        self.versions.iter().filter(|v| v.key_id() == key_id).count()
    }

    /// Compare-and-set on the key id; returns whether the swap happened
    pub fn replace_envelope(&mut self, version_id: Uuid, expected_key: Uuid, envelope: Envelope) -> bool {
        match self
            .versions
            .iter_mut()
            .find(|v| v.id == version_id && v.key_id() == expected_key)
        {
            Some(version) => {
                version.envelope = envelope;
                true
            }
            None => false,
        }
    }
}
