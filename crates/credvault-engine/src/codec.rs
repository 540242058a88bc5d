//! Conversion between decrypted credentials and stored versions
//!
//! Secret material (values, passwords, private keys) is sealed in the
//! envelope; everything else lives in the version's clear fields.

use crate::credential::{
    CertificateValue, Credential, GenerationParameters, KeyPairValue, RootValue, SecretString,
    UserValue,
};
use credvault_core::types::CredentialKind;
use credvault_core::{Error, Result};
use credvault_crypto::{EncryptedValue, KeyRegistry};
use credvault_store::{CredentialVersion, Envelope};
use serde_json::{json, Map, Value};

/// Clear fields and the single secret payload of a credential
fn split(credential: &Credential) -> (Value, &SecretString) {
    match credential {
        Credential::Value(value) | Credential::Password(value) => (json!({}), value),
        Credential::User(user) => {
            let mut clear = Map::new();
            if let Some(username) = &user.username {
                clear.insert("username".into(), json!(username));
            }
            (Value::Object(clear), &user.password)
        }
        Credential::Certificate(cert) => {
            let mut clear = Map::new();
            clear.insert("certificate".into(), json!(cert.certificate));
            if let Some(ca_name) = &cert.ca_name {
                clear.insert("ca_name".into(), json!(ca_name));
            }
            (Value::Object(clear), &cert.private_key)
        }
        Credential::Root(root) => (
            json!({ "certificate": root.certificate }),
            &root.private_key,
        ),
        Credential::Ssh(pair) | Credential::Rsa(pair) => (
            json!({ "public_key": pair.public_key }),
            &pair.private_key,
        ),
    }
}

/// Seal a credential under the active key.
///
/// `reuse_parameters` is an existing parameter ciphertext already sealed
/// under the active key for identical parameters.
pub fn encode(
    credential: &Credential,
    parameters: Option<&GenerationParameters>,
    reuse_parameters: Option<EncryptedValue>,
    registry: &KeyRegistry,
) -> Result<(Value, Envelope)> {
    let (clear, payload) = split(credential);
    let (key_id, value) = registry.encrypt(payload.expose().as_bytes())?;

    let parameters = match (parameters, reuse_parameters) {
        (None, _) => None,
        (Some(_), Some(reused)) => Some(reused),
        (Some(params), None) => {
            let plain = zeroize::Zeroizing::new(serde_json::to_vec(params).map_err(|e| {
                Error::crypto(format!("Failed to serialize parameters: {}", e))
            })?);
            let (params_key, sealed) = registry.encrypt(&plain)?;
            if params_key != key_id {
                return Err(Error::crypto("active key changed while sealing a credential"));
            }
            Some(sealed)
        }
    };

    Ok((
        clear,
        Envelope {
            key_id,
            value,
            parameters,
        },
    ))
}

/// Decrypt a stored version back into a credential
pub fn decode(version: &CredentialVersion, registry: &KeyRegistry) -> Result<Credential> {
    let plain = registry.decrypt(version.key_id(), &version.envelope.value)?;
    let payload = SecretString::new(
        std::str::from_utf8(&plain)
            .map_err(|_| corrupt(version, "payload is not valid UTF-8"))?,
    );

    let clear = |field: &str| {
        version
            .clear
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let required = |field: &str| clear(field).ok_or_else(|| corrupt(version, field));

    Ok(match version.kind {
        CredentialKind::Value => Credential::Value(payload),
        CredentialKind::Password => Credential::Password(payload),
        CredentialKind::User => Credential::User(UserValue {
            username: clear("username"),
            password: payload,
        }),
        CredentialKind::Certificate => Credential::Certificate(CertificateValue {
            ca_name: clear("ca_name"),
            certificate: required("certificate")?,
            private_key: payload,
        }),
        CredentialKind::Root => Credential::Root(RootValue {
            certificate: required("certificate")?,
            private_key: payload,
        }),
        CredentialKind::Ssh => Credential::Ssh(KeyPairValue {
            public_key: required("public_key")?,
            private_key: payload,
        }),
        CredentialKind::Rsa => Credential::Rsa(KeyPairValue {
            public_key: required("public_key")?,
            private_key: payload,
        }),
    })
}

/// Decrypt the generation parameters, if the version has any
pub fn decode_parameters(
    version: &CredentialVersion,
    registry: &KeyRegistry,
) -> Result<Option<GenerationParameters>> {
    let Some(sealed) = &version.envelope.parameters else {
        return Ok(None);
    };
    let plain = registry.decrypt(version.key_id(), sealed)?;
    let params = serde_json::from_slice(&plain)
        .map_err(|e| corrupt(version, &format!("parameters: {}", e)))?;
    Ok(Some(params))
}

/// Re-seal a version's value and parameters under the active key without
/// interpreting them
pub fn reseal(version: &CredentialVersion, registry: &KeyRegistry) -> Result<Envelope> {
    let plain = registry.decrypt(version.key_id(), &version.envelope.value)?;
    let (key_id, value) = registry.encrypt(&plain)?;

    let parameters = match &version.envelope.parameters {
        Some(sealed) => {
            let plain = registry.decrypt(version.key_id(), sealed)?;
            let (params_key, sealed) = registry.encrypt(&plain)?;
            if params_key != key_id {
                return Err(Error::crypto("active key changed while sealing a credential"));
            }
            Some(sealed)
        }
        None => None,
    };

    Ok(Envelope {
        key_id,
        value,
        parameters,
    })
}

fn corrupt(version: &CredentialVersion, detail: &str) -> Error {
    Error::storage(format!(
        "Stored version {} of {} is malformed ({})",
        version.id, version.name, detail
    ))
}
