//! Access control entries

use crate::error::{Error, Result};
use crate::types::CredentialName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A capability an actor may hold on a credential name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOperation {
    Read,
    Write,
    Delete,
    ReadAcl,
    WriteAcl,
}

impl PermissionOperation {
    pub const ALL: [PermissionOperation; 5] = [
        PermissionOperation::Read,
        PermissionOperation::Write,
        PermissionOperation::Delete,
        PermissionOperation::ReadAcl,
        PermissionOperation::WriteAcl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionOperation::Read => "read",
            PermissionOperation::Write => "write",
            PermissionOperation::Delete => "delete",
            PermissionOperation::ReadAcl => "read_acl",
            PermissionOperation::WriteAcl => "write_acl",
        }
    }
}

impl fmt::Display for PermissionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| {
                Error::validation(format!(
                    "The provided operation '{}' is not supported. Valid values include 'read', 'write', 'delete', 'read_acl' and 'write_acl'.",
                    s
                ))
            })
    }
}

/// Operations one actor may perform on one credential name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub actor: String,
    pub path: CredentialName,
    pub operations: BTreeSet<PermissionOperation>,
}

impl PermissionEntry {
    pub fn new(
        actor: impl Into<String>,
        path: CredentialName,
        operations: impl IntoIterator<Item = PermissionOperation>,
    ) -> Self {
        Self {
            actor: actor.into(),
            path,
            operations: operations.into_iter().collect(),
        }
    }

    /// Entry granting every operation, given to the creator of a credential
    pub fn owner(actor: impl Into<String>, path: CredentialName) -> Self {
        Self::new(actor, path, PermissionOperation::ALL)
    }

    pub fn allows(&self, operation: PermissionOperation) -> bool {
        self.operations.contains(&operation)
    }
}
