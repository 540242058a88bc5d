//! RSA key pairs and their SSH public key encoding

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use credvault_core::{Error, Result};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use ssh_key::public::KeyData;
use ssh_key::HashAlg;
use std::fmt;
use zeroize::Zeroizing;

pub const DEFAULT_KEY_LENGTH: usize = 2048;
pub const SUPPORTED_KEY_LENGTHS: [usize; 3] = [2048, 3072, 4096];

pub const INVALID_KEY_LENGTH: &str = "The provided key length is not supported. Valid values include '2048', '3072' and '4096'.";

pub fn validate_key_length(bits: usize) -> Result<()> {
    if SUPPORTED_KEY_LENGTHS.contains(&bits) {
        Ok(())
    } else {
        Err(Error::validation(INVALID_KEY_LENGTH))
    }
}

/// An RSA private key and the operations credentials need from it
#[derive(Clone)]
pub struct RsaKeyPair {
    private: RsaPrivateKey,
}

impl fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RsaKeyPair({} bits, [REDACTED])", self.bits())
    }
}

impl RsaKeyPair {
    pub fn generate(bits: usize) -> Result<Self> {
        validate_key_length(bits)?;
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| Error::crypto(format!("RSA key generation failed: {}", e)))?;
        Ok(Self { private })
    }

    /// Parse a PKCS#8 or PKCS#1 private key PEM
    pub fn from_pem(pem: &str) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| Error::validation(format!("The provided private key is invalid: {}", e)))?;
        Ok(Self { private })
    }

    pub fn bits(&self) -> usize {
        self.private.size() * 8
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.private.to_public_key()
    }

    /// PKCS#1 private key PEM, the stored form
    pub fn private_key_pem(&self) -> Result<Zeroizing<String>> {
        self.private
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| Error::crypto(format!("Failed to encode private key: {}", e)))
    }

    /// PKCS#8 private key PEM, the form the certificate builder consumes
    pub fn private_key_pkcs8_pem(&self) -> Result<Zeroizing<String>> {
        self.private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| Error::crypto(format!("Failed to encode private key: {}", e)))
    }

    /// SubjectPublicKeyInfo PEM
    pub fn public_key_pem(&self) -> Result<String> {
        self.public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::crypto(format!("Failed to encode public key: {}", e)))
    }

    /// SubjectPublicKeyInfo DER
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        self.public_key()
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| Error::crypto(format!("Failed to encode public key: {}", e)))
    }

    /// OpenSSH `authorized_keys` line
    pub fn ssh_public_key(&self, comment: Option<&str>) -> Result<String> {
        let key_data = ssh_key::public::RsaPublicKey::try_from(&self.public_key())
            .map_err(|e| Error::crypto(format!("Failed to encode SSH public key: {}", e)))?;
        let public = ssh_key::PublicKey::new(KeyData::Rsa(key_data), comment.unwrap_or_default());
        public
            .to_openssh()
            .map_err(|e| Error::crypto(format!("Failed to encode SSH public key: {}", e)))
    }
}

/// Key length of an SPKI public key PEM
pub fn rsa_public_key_length(pem: &str) -> Option<usize> {
    RsaPublicKey::from_public_key_pem(pem)
        .ok()
        .map(|key| key.size() * 8)
}

/// Parsed OpenSSH public key line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshPublicKey {
    key: ssh_key::PublicKey,
}

impl SshPublicKey {
    pub fn parse(line: &str) -> Option<Self> {
        ssh_key::PublicKey::from_openssh(line.trim())
            .ok()
            .map(|key| Self { key })
    }

    pub fn comment(&self) -> Option<&str> {
        Some(self.key.comment()).filter(|c| !c.is_empty())
    }

    /// `SHA256:`-style fingerprint without the prefix
    pub fn fingerprint(&self) -> String {
        let fingerprint = self.key.fingerprint(HashAlg::Sha256);
        STANDARD_NO_PAD.encode(fingerprint.as_bytes())
    }

    /// Modulus length in bits for `ssh-rsa` keys
    pub fn key_length(&self) -> Option<usize> {
        let rsa = self.key.key_data().rsa()?;
        RsaPublicKey::try_from(rsa).ok().map(|key| key.size() * 8)
    }
}
