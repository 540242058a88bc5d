//! Parsing and validation of store requests
//!
//! Requests arrive as parsed JSON. Every object level is checked against the
//! keys its kind accepts before typed deserialization, so an unrecognized key
//! is reported by name.

use crate::credential::{
    CertificateValue, Credential, GenerationParameters, KeyPairValue, RootValue, RsaParameters,
    SecretString, SshParameters, UserParameters, UserValue,
};
use credvault_core::types::{CredentialKind, CredentialName};
use credvault_core::{Error, Result};
use credvault_crypto::certificate::MISSING_SIGNING_CA;
use credvault_crypto::keypair::validate_key_length;
use credvault_crypto::{CertificateParameters, PasswordParameters};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub const BAD_REQUEST: &str = "The request could not be fulfilled because the request path or body did not meet expectation. Please check the documentation for required formatting and retry your request.";
pub const CANNOT_GENERATE: &str = "Credentials of this type cannot be generated. Please adjust the credential type and retry your request.";
pub const MISSING_VALUE: &str =
    "A non-empty value must be specified for the credential. Please validate your input and retry your request.";
pub const MISSING_CA_KEYS: &str =
    "All keys are required to set a CA. Please validate your input and retry your request.";
pub const MISSING_CERTIFICATE: &str =
    "A certificate must be provided. Please validate your input and retry your request.";
pub const MISSING_KEY_PAIR: &str =
    "At least one key value must be set. Please validate your input and retry your request.";

const TOP_LEVEL_KEYS: &[&str] = &["name", "type", "value", "parameters", "overwrite", "regenerate"];
const REGENERATE_KEYS: &[&str] = &["name", "regenerate"];

const PASSWORD_KEYS: &[&str] = &[
    "length",
    "exclude_lower",
    "exclude_upper",
    "exclude_number",
    "exclude_special",
    "only_hex",
];
const USER_KEYS: &[&str] = &[
    "username",
    "length",
    "exclude_lower",
    "exclude_upper",
    "exclude_number",
    "exclude_special",
    "only_hex",
];
const CERTIFICATE_KEYS: &[&str] = &[
    "common_name",
    "organization",
    "organization_unit",
    "locality",
    "state",
    "country",
    "alternative_names",
    "key_length",
    "duration",
    "ca",
    "is_ca",
    "self_sign",
];
const ROOT_KEYS: &[&str] = &[
    "common_name",
    "organization",
    "organization_unit",
    "locality",
    "state",
    "country",
    "alternative_names",
    "key_length",
    "duration",
];
const SSH_KEYS: &[&str] = &["key_length", "ssh_comment"];
const RSA_KEYS: &[&str] = &["key_length"];

const USER_VALUE_KEYS: &[&str] = &["username", "password"];
const CERTIFICATE_VALUE_KEYS: &[&str] = &["ca_name", "certificate", "private_key"];
const ROOT_VALUE_KEYS: &[&str] = &["certificate", "private_key"];
const KEY_PAIR_VALUE_KEYS: &[&str] = &["public_key", "private_key"];

/// Message for a key the request does not accept
pub fn invalid_json_key(key: &str) -> Error {
    Error::validation(format!(
        "The request includes an unrecognized parameter '{}'. Please update or remove this field and retry your request.",
        key
    ))
}

/// What a store request asks for
#[derive(Debug, Clone, PartialEq)]
pub enum StoreMode {
    /// Store the supplied value
    Set(Credential),
    /// Generate a new value with these parameters
    Generate(GenerationParameters),
    /// Generate a new value with the parameters of the current version
    Regenerate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreRequest {
    pub name: CredentialName,
    /// Absent only for regenerate requests
    pub kind: Option<CredentialKind>,
    pub overwrite: bool,
    pub mode: StoreMode,
}

impl StoreRequest {
    /// Whether the request appends a version given the current one
    pub fn will_write(&self, exists: bool) -> bool {
        match self.mode {
            StoreMode::Regenerate => true,
            StoreMode::Set(_) | StoreMode::Generate(_) => !exists || self.overwrite,
        }
    }

    pub fn regenerate(name: CredentialName) -> Self {
        Self {
            name,
            kind: None,
            overwrite: true,
            mode: StoreMode::Regenerate,
        }
    }
}

/// Validate a JSON request body into a [`StoreRequest`]
pub fn parse_store_request(body: &Value) -> Result<StoreRequest> {
    let object = body.as_object().ok_or_else(|| Error::validation(BAD_REQUEST))?;
    reject_unknown_keys(object, TOP_LEVEL_KEYS)?;

    let name = CredentialName::parse(object.get("name").and_then(Value::as_str).unwrap_or(""))?;

    if optional_bool(object, "regenerate")? {
        reject_unknown_keys(object, REGENERATE_KEYS)?;
        return Ok(StoreRequest::regenerate(name));
    }

    let kind: CredentialKind = object
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("")
        .parse()?;
    let overwrite = optional_bool(object, "overwrite")?;

    let mode = match object.get("value") {
        Some(value) => {
            if object.contains_key("parameters") {
                return Err(invalid_json_key("parameters"));
            }
            StoreMode::Set(parse_value(kind, value)?)
        }
        None => StoreMode::Generate(parse_parameters(kind, object.get("parameters"))?),
    };

    Ok(StoreRequest {
        name,
        kind: Some(kind),
        overwrite,
        mode,
    })
}

fn parse_value(kind: CredentialKind, value: &Value) -> Result<Credential> {
    match kind {
        CredentialKind::Value => Ok(Credential::Value(non_empty_string(value)?)),
        CredentialKind::Password => Ok(Credential::Password(non_empty_string(value)?)),
        CredentialKind::User => {
            let fields = value_object(value, USER_VALUE_KEYS)?;
            let password = string_field(fields, "password")?
                .filter(|p| !p.is_empty())
                .ok_or_else(|| Error::validation(MISSING_VALUE))?;
            Ok(Credential::User(UserValue {
                username: string_field(fields, "username")?,
                password: SecretString::new(password),
            }))
        }
        CredentialKind::Certificate => {
            let fields = value_object(value, CERTIFICATE_VALUE_KEYS)?;
            let certificate = string_field(fields, "certificate")?
                .filter(|c| !c.is_empty())
                .ok_or_else(|| Error::validation(MISSING_CERTIFICATE))?;
            let ca_name = string_field(fields, "ca_name")?
                .map(|raw| CredentialName::parse(&raw).map(String::from))
                .transpose()?;
            Ok(Credential::Certificate(CertificateValue {
                ca_name,
                certificate,
                private_key: SecretString::new(
                    string_field(fields, "private_key")?.unwrap_or_default(),
                ),
            }))
        }
        CredentialKind::Root => {
            let fields = value_object(value, ROOT_VALUE_KEYS)?;
            let certificate = string_field(fields, "certificate")?.filter(|c| !c.is_empty());
            let private_key = string_field(fields, "private_key")?.filter(|k| !k.is_empty());
            match (certificate, private_key) {
                (Some(certificate), Some(private_key)) => Ok(Credential::Root(RootValue {
                    certificate,
                    private_key: SecretString::new(private_key),
                })),
                _ => Err(Error::validation(MISSING_CA_KEYS)),
            }
        }
        CredentialKind::Ssh | CredentialKind::Rsa => {
            let fields = value_object(value, KEY_PAIR_VALUE_KEYS)?;
            let public_key = string_field(fields, "public_key")?.unwrap_or_default();
            let private_key = string_field(fields, "private_key")?.unwrap_or_default();
            if public_key.is_empty() && private_key.is_empty() {
                return Err(Error::validation(MISSING_KEY_PAIR));
            }
            let pair = KeyPairValue {
                public_key,
                private_key: SecretString::new(private_key),
            };
            Ok(if kind == CredentialKind::Ssh {
                Credential::Ssh(pair)
            } else {
                Credential::Rsa(pair)
            })
        }
    }
}

/// Parse and validate generation parameters for `kind`
pub fn parse_parameters(
    kind: CredentialKind,
    parameters: Option<&Value>,
) -> Result<GenerationParameters> {
    let empty = Value::Object(Map::new());
    let parameters = match parameters {
        None | Some(Value::Null) => &empty,
        Some(value) => value,
    };

    let params = match kind {
        CredentialKind::Value => return Err(Error::validation(CANNOT_GENERATE)),
        CredentialKind::Password => {
            GenerationParameters::Password(typed::<PasswordParameters>(parameters, PASSWORD_KEYS)?)
        }
        CredentialKind::User => {
            GenerationParameters::User(typed::<UserParameters>(parameters, USER_KEYS)?)
        }
        CredentialKind::Certificate => GenerationParameters::Certificate(
            typed::<CertificateParameters>(parameters, CERTIFICATE_KEYS)?,
        ),
        CredentialKind::Root => {
            GenerationParameters::Root(typed::<CertificateParameters>(parameters, ROOT_KEYS)?)
        }
        CredentialKind::Ssh => GenerationParameters::Ssh(typed::<SshParameters>(parameters, SSH_KEYS)?),
        CredentialKind::Rsa => GenerationParameters::Rsa(typed::<RsaParameters>(parameters, RSA_KEYS)?),
    };

    validate_parameters(&params)?;
    Ok(params)
}

/// Check parameter bounds before any generation happens
pub fn validate_parameters(params: &GenerationParameters) -> Result<()> {
    match params {
        GenerationParameters::Password(p) => p.validate(),
        GenerationParameters::User(p) => p.password_parameters().validate(),
        GenerationParameters::Certificate(p) => {
            p.validate()?;
            let has_ca = p.ca.as_deref().is_some_and(|ca| !ca.trim().is_empty());
            if !has_ca && !p.self_sign && !p.is_ca {
                return Err(Error::validation(MISSING_SIGNING_CA));
            }
            if let Some(ca) = p.ca.as_deref().filter(|ca| !ca.trim().is_empty()) {
                CredentialName::parse(ca)?;
            }
            Ok(())
        }
        GenerationParameters::Root(p) => p.validate(),
        GenerationParameters::Ssh(p) => validate_key_length(p.key_length),
        GenerationParameters::Rsa(p) => validate_key_length(p.key_length),
    }
}

fn reject_unknown_keys(object: &Map<String, Value>, allowed: &[&str]) -> Result<()> {
    match object.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(invalid_json_key(key)),
        None => Ok(()),
    }
}

fn typed<T: DeserializeOwned>(value: &Value, allowed: &[&str]) -> Result<T> {
    let object = value.as_object().ok_or_else(|| Error::validation(BAD_REQUEST))?;
    reject_unknown_keys(object, allowed)?;
    Ok(serde_json::from_value(value.clone())?)
}

fn value_object<'a>(value: &'a Value, allowed: &[&str]) -> Result<&'a Map<String, Value>> {
    let object = value
        .as_object()
        .ok_or_else(|| Error::validation(MISSING_VALUE))?;
    reject_unknown_keys(object, allowed)?;
    Ok(object)
}

fn non_empty_string(value: &Value) -> Result<SecretString> {
    value
        .as_str()
        .filter(|s| !s.is_empty())
        .map(SecretString::from)
        .ok_or_else(|| Error::validation(MISSING_VALUE))
}

fn string_field(object: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(Error::validation(BAD_REQUEST)),
    }
}

fn optional_bool(object: &Map<String, Value>, key: &str) -> Result<bool> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(_) => Err(Error::validation(BAD_REQUEST)),
    }
}
