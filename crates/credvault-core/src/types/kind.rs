//! Credential kind discriminant

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const INVALID_TYPE: &str = "The request does not include a valid type. Valid values include 'value', 'password', 'user', 'certificate', 'root', 'ssh' and 'rsa'.";

/// The stored type of a credential version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    Value,
    Password,
    User,
    Certificate,
    Root,
    Ssh,
    Rsa,
}

impl CredentialKind {
    pub const ALL: [CredentialKind; 7] = [
        CredentialKind::Value,
        CredentialKind::Password,
        CredentialKind::User,
        CredentialKind::Certificate,
        CredentialKind::Root,
        CredentialKind::Ssh,
        CredentialKind::Rsa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::Value => "value",
            CredentialKind::Password => "password",
            CredentialKind::User => "user",
            CredentialKind::Certificate => "certificate",
            CredentialKind::Root => "root",
            CredentialKind::Ssh => "ssh",
            CredentialKind::Rsa => "rsa",
        }
    }

    /// Whether values of this kind can be produced by a generator
    pub fn is_generated(&self) -> bool {
        !matches!(self, CredentialKind::Value)
    }

    /// Whether the kind is a certificate (leaf or authority)
    pub fn is_certificate(&self) -> bool {
        matches!(self, CredentialKind::Certificate | CredentialKind::Root)
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialKind {
    type Err = Error;

    /// Exact match, ignoring case
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::validation(INVALID_TYPE))
    }
}
