//! # credvault-crypto
//!
//! Cryptography for credvault:
//! - Encryption providers (software and HSM-backed) and the key registry
//! - Password and username generation
//! - RSA key pairs with SSH encoding
//! - Certificate authority and certificate generation

pub mod certificate;
pub mod keypair;
pub mod password;
pub mod provider;
pub mod registry;

pub use certificate::{
    is_certificate_authority, CertificateAuthority, CertificateAuthorityGenerator,
    CertificateParameters,
};
pub use keypair::{rsa_public_key_length, RsaKeyPair, SshPublicKey};
pub use password::{generate_password, generate_username, PasswordParameters};
pub use provider::{
    EncryptedValue, EncryptionProvider, HsmClient, HsmProvider, SoftwareKeyProvider,
};
pub use registry::{
    Canary, CanaryStore, ConfiguredKey, EncryptionKey, KeyRegistry, KeyStatus, CANARY_VALUE,
};
