//! Credential names

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

const MISSING_NAME: &str =
    "A credential name must be provided. Please validate your input and retry your request.";

const INVALID_NAME: &str = "A credential name cannot end with a '/' character or contain '//'. Credential names should be in the form of /[path]/[name] or [path]/[name]. Please update and retry your request.";

/// A slash-delimited credential path.
///
/// Always stored with a leading slash. Equality and hashing ignore case, but
/// the originally supplied case is preserved for display.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CredentialName(String);

impl CredentialName {
    /// Validate and normalize a raw name
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "/" {
            return Err(Error::validation(MISSING_NAME));
        }
        if trimmed.ends_with('/') || trimmed.contains("//") {
            return Err(Error::validation(INVALID_NAME));
        }

        if trimmed.starts_with('/') {
            Ok(Self(trimmed.to_string()))
        } else {
            Ok(Self(format!("/{}", trimmed)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-folded form used for lookups
    pub fn key(&self) -> String {
        self.0.to_lowercase()
    }

    /// Case-insensitive comparison against a raw (possibly un-normalized) name
    pub fn matches(&self, raw: &str) -> bool {
        match Self::parse(raw) {
            Ok(other) => other == *self,
            Err(_) => false,
        }
    }

    /// Every directory prefix of this name followed by the name itself.
    ///
    /// `/a/b/c` yields `/a/`, `/a/b/`, `/a/b/c`.
    pub fn hierarchy(&self) -> Vec<String> {
        let segments: Vec<&str> = self.0[1..].split('/').collect();
        let mut paths = Vec::with_capacity(segments.len());
        let mut prefix = String::from("/");

        for (idx, segment) in segments.iter().enumerate() {
            prefix.push_str(segment);
            if idx + 1 < segments.len() {
                prefix.push('/');
            }
            paths.push(prefix.clone());
        }

        paths
    }
}

impl PartialEq for CredentialName {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for CredentialName {}

impl Hash for CredentialName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for CredentialName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for CredentialName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialName({})", self.0)
    }
}

impl TryFrom<String> for CredentialName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<CredentialName> for String {
    fn from(name: CredentialName) -> Self {
        name.0
    }
}

impl std::str::FromStr for CredentialName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
