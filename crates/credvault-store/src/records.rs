//! Persisted record types and staged mutations

use chrono::{DateTime, Utc};
use credvault_core::types::{AuditRecord, CredentialKind, CredentialName, PermissionEntry};
use credvault_crypto::EncryptedValue;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Encrypted part of a version: payload and parameters sealed under one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub key_id: Uuid,
    pub value: EncryptedValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<EncryptedValue>,
}

/// One immutable version of a credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialVersion {
    pub id: Uuid,
    pub name: CredentialName,
    pub kind: CredentialKind,
    pub created_at: DateTime<Utc>,
    /// Non-secret fields (public keys, certificates, CA names, usernames)
    #[serde(default)]
    pub clear: serde_json::Value,
    pub envelope: Envelope,
}

impl CredentialVersion {
    pub fn new(
        name: CredentialName,
        kind: CredentialKind,
        clear: serde_json::Value,
        envelope: Envelope,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            kind,
            created_at: Utc::now(),
            clear,
            envelope,
        }
    }

    pub fn key_id(&self) -> Uuid {
        self.envelope.key_id
    }
}

/// Result row of a name search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameSummary {
    pub name: String,
    pub version_created_at: DateTime<Utc>,
}

/// One staged store mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CreateVersion(CredentialVersion),
    /// Remove every version of a name and its permission entries
    DeleteAll(CredentialName),
    /// Insert or replace the entry for `(actor, path)`
    PutPermission(PermissionEntry),
    DeletePermission { path: CredentialName, actor: String },
}

/// Mutations and audit records applied together by `CredentialStore::commit`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub mutations: Vec<Mutation>,
    pub audit: Vec<AuditRecord>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A change set carrying only audit records
    pub fn audit_only(records: Vec<AuditRecord>) -> Self {
        Self {
            mutations: Vec::new(),
            audit: records,
        }
    }

    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    pub fn create_version(mut self, version: CredentialVersion) -> Self {
        self.push(Mutation::CreateVersion(version));
        self
    }

    pub fn delete_all(mut self, name: CredentialName) -> Self {
        self.push(Mutation::DeleteAll(name));
        self
    }

    pub fn put_permission(mut self, entry: PermissionEntry) -> Self {
        self.push(Mutation::PutPermission(entry));
        self
    }

    pub fn delete_permission(mut self, path: CredentialName, actor: impl Into<String>) -> Self {
        self.push(Mutation::DeletePermission {
            path,
            actor: actor.into(),
        });
        self
    }

    pub fn with_audit(mut self, records: impl IntoIterator<Item = AuditRecord>) -> Self {
        self.audit.extend(records);
        self
    }

    pub fn has_mutations(&self) -> bool {
        !self.mutations.is_empty()
    }
}
