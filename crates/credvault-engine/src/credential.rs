//! Credential variants and their generation parameters

use credvault_core::types::CredentialKind;
use credvault_crypto::{
    rsa_public_key_length, CertificateParameters, PasswordParameters, SshPublicKey,
};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A secret string that is zeroed on drop and redacted in Debug output
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretString {
    inner: String,
}

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: value.into(),
        }
    }

    /// Get the string value (use with caution)
    pub fn expose(&self) -> &str {
        &self.inner
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED {} bytes])", self.inner.len())
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.inner)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserValue {
    pub username: Option<String>,
    pub password: SecretString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateValue {
    /// Normalized name of the signing CA, when CA-signed
    pub ca_name: Option<String>,
    pub certificate: String,
    pub private_key: SecretString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootValue {
    pub certificate: String,
    pub private_key: SecretString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPairValue {
    pub public_key: String,
    pub private_key: SecretString,
}

impl KeyPairValue {
    fn ssh(&self) -> Option<SshPublicKey> {
        SshPublicKey::parse(&self.public_key)
    }

    pub fn ssh_key_length(&self) -> Option<usize> {
        self.ssh().and_then(|key| key.key_length())
    }

    pub fn ssh_comment(&self) -> Option<String> {
        self.ssh().and_then(|key| key.comment().map(str::to_string))
    }

    pub fn ssh_fingerprint(&self) -> Option<String> {
        self.ssh().map(|key| key.fingerprint())
    }

    pub fn rsa_key_length(&self) -> Option<usize> {
        rsa_public_key_length(&self.public_key)
    }
}

/// Decrypted credential content, one variant per kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Value(SecretString),
    Password(SecretString),
    User(UserValue),
    Certificate(CertificateValue),
    Root(RootValue),
    Ssh(KeyPairValue),
    Rsa(KeyPairValue),
}

impl Credential {
    pub fn kind(&self) -> CredentialKind {
        match self {
            Credential::Value(_) => CredentialKind::Value,
            Credential::Password(_) => CredentialKind::Password,
            Credential::User(_) => CredentialKind::User,
            Credential::Certificate(_) => CredentialKind::Certificate,
            Credential::Root(_) => CredentialKind::Root,
            Credential::Ssh(_) => CredentialKind::Ssh,
            Credential::Rsa(_) => CredentialKind::Rsa,
        }
    }

    /// The `value` field of a response
    pub fn to_json(&self) -> Value {
        match self {
            Credential::Value(value) | Credential::Password(value) => json!(value),
            Credential::User(user) => json!({
                "username": user.username,
                "password": user.password,
            }),
            Credential::Certificate(cert) => {
                let mut value = json!({
                    "certificate": cert.certificate,
                    "private_key": cert.private_key,
                });
                if let Some(ca_name) = &cert.ca_name {
                    value["ca_name"] = json!(ca_name);
                }
                value
            }
            Credential::Root(root) => json!({
                "certificate": root.certificate,
                "private_key": root.private_key,
            }),
            Credential::Ssh(pair) => json!({
                "public_key": pair.public_key,
                "private_key": pair.private_key,
                "public_key_fingerprint": pair.ssh_fingerprint(),
                "key_length": pair.ssh_key_length(),
                "comment": pair.ssh_comment(),
            }),
            Credential::Rsa(pair) => json!({
                "public_key": pair.public_key,
                "private_key": pair.private_key,
                "key_length": pair.rsa_key_length(),
            }),
        }
    }
}

/// Parameters for `user` generation: a password policy plus an optional
/// fixed username
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub length: Option<usize>,
    #[serde(default)]
    pub exclude_lower: bool,
    #[serde(default)]
    pub exclude_upper: bool,
    #[serde(default)]
    pub exclude_number: bool,
    #[serde(default)]
    pub exclude_special: bool,
    #[serde(default)]
    pub only_hex: bool,
}

impl UserParameters {
    pub fn password_parameters(&self) -> PasswordParameters {
        let defaults = PasswordParameters::default();
        PasswordParameters {
            length: self.length.unwrap_or(defaults.length),
            exclude_lower: self.exclude_lower,
            exclude_upper: self.exclude_upper,
            exclude_number: self.exclude_number,
            exclude_special: self.exclude_special,
            only_hex: self.only_hex,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshParameters {
    #[serde(default = "default_key_length")]
    pub key_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_comment: Option<String>,
}

impl Default for SshParameters {
    fn default() -> Self {
        Self {
            key_length: default_key_length(),
            ssh_comment: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsaParameters {
    #[serde(default = "default_key_length")]
    pub key_length: usize,
}

impl Default for RsaParameters {
    fn default() -> Self {
        Self {
            key_length: default_key_length(),
        }
    }
}

fn default_key_length() -> usize {
    credvault_crypto::keypair::DEFAULT_KEY_LENGTH
}

/// Stored generation parameters, encrypted next to the value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "parameters", rename_all = "lowercase")]
pub enum GenerationParameters {
    Password(PasswordParameters),
    User(UserParameters),
    Certificate(CertificateParameters),
    Root(CertificateParameters),
    Ssh(SshParameters),
    Rsa(RsaParameters),
}

impl GenerationParameters {
    pub fn kind(&self) -> CredentialKind {
        match self {
            GenerationParameters::Password(_) => CredentialKind::Password,
            GenerationParameters::User(_) => CredentialKind::User,
            GenerationParameters::Certificate(_) => CredentialKind::Certificate,
            GenerationParameters::Root(_) => CredentialKind::Root,
            GenerationParameters::Ssh(_) => CredentialKind::Ssh,
            GenerationParameters::Rsa(_) => CredentialKind::Rsa,
        }
    }

    /// Defaults for kinds that can be regenerated without stored parameters
    pub fn defaults_for(kind: CredentialKind) -> Option<Self> {
        match kind {
            CredentialKind::Ssh => Some(GenerationParameters::Ssh(SshParameters::default())),
            CredentialKind::Rsa => Some(GenerationParameters::Rsa(RsaParameters::default())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_string_debug_is_redacted() {
        let secret = SecretString::from("hunter2");
        let debug = format!("{:?}", Credential::Password(secret));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_to_json_shapes() {
        assert_eq!(
            Credential::Value("v".into()).to_json(),
            json!("v")
        );

        let user = Credential::User(UserValue {
            username: Some("admin".into()),
            password: "pw".into(),
        });
        assert_eq!(
            user.to_json(),
            json!({"username": "admin", "password": "pw"})
        );

        let cert = Credential::Certificate(CertificateValue {
            ca_name: None,
            certificate: "C".into(),
            private_key: "K".into(),
        });
        assert!(cert.to_json().get("ca_name").is_none());
    }

    #[test]
    fn test_parameters_serialize_with_kind_tag() {
        let params = GenerationParameters::Password(PasswordParameters {
            length: 12,
            ..Default::default()
        });
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["kind"], "password");
        assert_eq!(json["parameters"]["length"], 12);

        let back: GenerationParameters = serde_json::from_value(json).unwrap();
        assert_eq!(back, params);
        assert_eq!(back.kind(), CredentialKind::Password);
    }

    #[test]
    fn test_user_parameters_default_length() {
        let params = UserParameters::default();
        assert_eq!(params.password_parameters().length, 30);
    }

    #[test]
    fn test_regeneration_defaults() {
        assert!(GenerationParameters::defaults_for(CredentialKind::Ssh).is_some());
        assert!(GenerationParameters::defaults_for(CredentialKind::Password).is_none());
    }
}
