//! Value generation for generator-backed kinds

use crate::credential::{
    CertificateValue, Credential, GenerationParameters, KeyPairValue, RootValue, SecretString,
    UserValue,
};
use credvault_core::Result;
use credvault_crypto::{
    generate_password, generate_username, CertificateAuthority, CertificateAuthorityGenerator,
    RsaKeyPair,
};
use tracing::debug;

/// A signing CA resolved from the store, with its normalized name
pub struct ResolvedCa {
    pub name: String,
    pub authority: CertificateAuthority,
}

/// Produces fresh credential values from generation parameters
#[derive(Debug, Default, Clone, Copy)]
pub struct CredentialGenerator {
    certificates: CertificateAuthorityGenerator,
}

impl CredentialGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a value for `params`.
    ///
    /// `ca` must be supplied for certificates whose parameters name a CA.
    /// `username` pins the username of a regenerated user credential.
    pub fn generate(
        &self,
        params: &GenerationParameters,
        ca: Option<&ResolvedCa>,
        username: Option<&str>,
    ) -> Result<Credential> {
        debug!(kind = %params.kind(), "Generating credential value");

        match params {
            GenerationParameters::Password(p) => {
                Ok(Credential::Password(generate_password(p)?.into()))
            }
            GenerationParameters::User(p) => {
                let password = generate_password(&p.password_parameters())?;
                let username = username
                    .map(str::to_string)
                    .or_else(|| p.username.clone())
                    .unwrap_or_else(generate_username);
                Ok(Credential::User(UserValue {
                    username: Some(username),
                    password: password.into(),
                }))
            }
            GenerationParameters::Root(p) => {
                let key_pair = RsaKeyPair::generate(p.key_length)?;
                let certificate = self.certificates.generate_root_certificate(&key_pair, p)?;
                Ok(Credential::Root(RootValue {
                    certificate,
                    private_key: pem_secret(&key_pair)?,
                }))
            }
            GenerationParameters::Certificate(p) => {
                let key_pair = RsaKeyPair::generate(p.key_length)?;
                let (certificate, ca_name) = match ca {
                    Some(ca) => (
                        self.certificates
                            .sign_certificate(&ca.authority, &key_pair, p)?,
                        Some(ca.name.clone()),
                    ),
                    None => (self.certificates.generate_self_signed(&key_pair, p)?, None),
                };
                Ok(Credential::Certificate(CertificateValue {
                    ca_name,
                    certificate,
                    private_key: pem_secret(&key_pair)?,
                }))
            }
            GenerationParameters::Ssh(p) => {
                let key_pair = RsaKeyPair::generate(p.key_length)?;
                Ok(Credential::Ssh(KeyPairValue {
                    public_key: key_pair.ssh_public_key(p.ssh_comment.as_deref())?,
                    private_key: pem_secret(&key_pair)?,
                }))
            }
            GenerationParameters::Rsa(p) => {
                let key_pair = RsaKeyPair::generate(p.key_length)?;
                Ok(Credential::Rsa(KeyPairValue {
                    public_key: key_pair.public_key_pem()?,
                    private_key: pem_secret(&key_pair)?,
                }))
            }
        }
    }
}

fn pem_secret(key_pair: &RsaKeyPair) -> Result<SecretString> {
    Ok(SecretString::new(key_pair.private_key_pem()?.as_str()))
}
