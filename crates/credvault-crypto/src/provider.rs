//! Encryption providers
//!
//! A provider owns exactly one key's material and performs authenticated
//! symmetric encryption with it. Every call to `encrypt` draws a fresh random
//! 96-bit nonce, so ciphertexts under one key never share a nonce.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    ChaCha20Poly1305, Key, Nonce,
};
use credvault_core::config::KeyMaterial;
use credvault_core::{Error, Result};
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroizing;

/// Size of the nonce in bytes (96 bits for ChaCha20-Poly1305)
pub const NONCE_SIZE: usize = 12;

/// Size of the symmetric key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Fixed salt for passphrase-derived keys
const KDF_SALT: &[u8] = b"credvault-encryption-key-v1";

/// HKDF context string
const KDF_INFO: &[u8] = b"credvault/chacha20poly1305";

/// Ciphertext plus the nonce it was sealed with
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedValue {
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
}

impl fmt::Debug for EncryptedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EncryptedValue({} bytes, nonce {})",
            self.ciphertext.len(),
            hex::encode(&self.nonce)
        )
    }
}

/// Contract every key provider implements
#[cfg_attr(test, mockall::automock)]
pub trait EncryptionProvider: Send + Sync {
    /// Seal plaintext under this provider's key
    fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedValue>;

    /// Open a value sealed by `encrypt`
    fn decrypt(&self, value: &EncryptedValue) -> Result<Zeroizing<Vec<u8>>>;

    /// Short provider description for logs
    fn describe(&self) -> String;
}

/// Software key held in process memory
pub struct SoftwareKeyProvider {
    cipher: ChaCha20Poly1305,
    origin: &'static str,
}

impl SoftwareKeyProvider {
    /// Derive the key from a passphrase with HKDF-SHA256
    pub fn from_passphrase(passphrase: &str) -> Result<Self> {
        let hk = Hkdf::<Sha256>::new(Some(KDF_SALT), passphrase.as_bytes());
        let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
        hk.expand(KDF_INFO, okm.as_mut())
            .map_err(|e| Error::crypto(format!("Key derivation failed: {}", e)))?;

        Ok(Self::from_key_bytes(okm.as_ref(), "passphrase"))
    }

    /// Use a raw 256-bit key given as hex
    pub fn from_hex_key(hex_key: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            hex::decode(hex_key.trim())
                .map_err(|e| Error::config(format!("dev-key is not valid hex: {}", e)))?,
        );
        if bytes.len() != KEY_SIZE {
            return Err(Error::config(format!(
                "dev-key must be {} bytes, got {} bytes",
                KEY_SIZE,
                bytes.len()
            )));
        }

        Ok(Self::from_key_bytes(&bytes, "dev-key"))
    }

    /// Build from resolved configuration material
    pub fn from_material(material: &KeyMaterial) -> Result<Self> {
        match material {
            KeyMaterial::Passphrase(passphrase) => Self::from_passphrase(passphrase),
            KeyMaterial::DevKey(hex_key) => Self::from_hex_key(hex_key),
        }
    }

    /// Fresh random key, useful for tests and ephemeral deployments
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        OsRng.fill_bytes(key.as_mut());
        Self::from_key_bytes(key.as_ref(), "random")
    }

    fn from_key_bytes(bytes: &[u8], origin: &'static str) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(bytes)),
            origin,
        }
    }
}

impl EncryptionProvider for SoftwareKeyProvider {
    fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedValue> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| Error::crypto(format!("Encryption failed: {}", e)))?;

        Ok(EncryptedValue {
            ciphertext,
            nonce: nonce.to_vec(),
        })
    }

    fn decrypt(&self, value: &EncryptedValue) -> Result<Zeroizing<Vec<u8>>> {
        if value.nonce.len() != NONCE_SIZE {
            return Err(Error::crypto(format!(
                "Invalid nonce size: expected {}, got {}",
                NONCE_SIZE,
                value.nonce.len()
            )));
        }

        self.cipher
            .decrypt(Nonce::from_slice(&value.nonce), value.ciphertext.as_ref())
            .map(Zeroizing::new)
            .map_err(|e| Error::crypto(format!("Decryption failed: {}", e)))
    }

    fn describe(&self) -> String {
        format!("software ({})", self.origin)
    }
}

/// Session with a hardware security module.
///
/// Implementations own the device connection and protocol; the module keeps
/// the key material and chooses the nonce.
pub trait HsmClient: Send + Sync {
    fn encrypt(&self, key_label: &str, plaintext: &[u8]) -> Result<EncryptedValue>;

    fn decrypt(&self, key_label: &str, value: &EncryptedValue) -> Result<Vec<u8>>;
}

/// Provider backed by a key that never leaves an HSM
pub struct HsmProvider<C: HsmClient> {
    client: C,
    key_label: String,
}

impl<C: HsmClient> HsmProvider<C> {
    pub fn new(client: C, key_label: impl Into<String>) -> Self {
        Self {
            client,
            key_label: key_label.into(),
        }
    }
}

impl<C: HsmClient> EncryptionProvider for HsmProvider<C> {
    fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedValue> {
        self.client
            .encrypt(&self.key_label, plaintext)
            .map_err(|e| Error::encryption_unavailable(&self.key_label, e.to_string()))
    }

    fn decrypt(&self, value: &EncryptedValue) -> Result<Zeroizing<Vec<u8>>> {
        self.client
            .decrypt(&self.key_label, value)
            .map(Zeroizing::new)
            .map_err(|e| Error::encryption_unavailable(&self.key_label, e.to_string()))
    }

    fn describe(&self) -> String {
        format!("hsm ({})", self.key_label)
    }
}

mod base64_bytes {
    use super::BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}
