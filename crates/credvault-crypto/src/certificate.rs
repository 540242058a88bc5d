//! X.509 certificate generation
//!
//! Roots are self-signed CAs; leaves and intermediates are signed by a stored
//! CA. Every freshly built certificate has its signature checked against the
//! expected public key before it is returned.

use crate::keypair::{validate_key_length, RsaKeyPair, DEFAULT_KEY_LENGTH};
use credvault_core::{Error, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, SanType, SerialNumber,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::{FromDer, SubjectPublicKeyInfo, X509Certificate};

pub const DEFAULT_DURATION_DAYS: u32 = 365;
pub const MAX_DURATION_DAYS: u32 = 3650;

const SERIAL_BYTES: usize = 16;

pub const CA_NOT_FOUND: &str = "CA not found. Please validate your input and retry your request.";
pub const NOT_A_CERTIFICATE_AUTHORITY: &str = "The provided CA is not a certificate authority. Please validate your input and retry your request.";
pub const MISSING_CERTIFICATE_FIELDS: &str = "You must provide at least one of common_name, organization, organization_unit, locality, state or country. Please validate your input and retry your request.";
pub const INVALID_DURATION: &str =
    "The provided duration is invalid. Valid durations are between 1 and 3650 days.";
pub const MISSING_SIGNING_CA: &str = "A certificate must be signed by a CA, be self-signed or be a CA itself. Please validate your input and retry your request.";
pub const INVALID_ALTERNATIVE_NAME: &str =
    "A provided alternative name is invalid. Please validate your input and retry your request.";

/// Generation parameters for `certificate` and `root` credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CertificateParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternative_names: Vec<String>,
    #[serde(default = "default_key_length")]
    pub key_length: usize,
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,
    #[serde(default)]
    pub is_ca: bool,
    #[serde(default)]
    pub self_sign: bool,
}

fn default_key_length() -> usize {
    DEFAULT_KEY_LENGTH
}

fn default_duration() -> u32 {
    DEFAULT_DURATION_DAYS
}

impl Default for CertificateParameters {
    fn default() -> Self {
        Self {
            common_name: None,
            organization: None,
            organization_unit: None,
            locality: None,
            state: None,
            country: None,
            alternative_names: Vec::new(),
            key_length: DEFAULT_KEY_LENGTH,
            duration: DEFAULT_DURATION_DAYS,
            ca: None,
            is_ca: false,
            self_sign: false,
        }
    }
}

impl CertificateParameters {
    pub fn validate(&self) -> Result<()> {
        if self.dn_fields().all(|(_, value)| value.is_none()) {
            return Err(Error::validation(MISSING_CERTIFICATE_FIELDS));
        }
        validate_key_length(self.key_length)?;
        if !(1..=MAX_DURATION_DAYS).contains(&self.duration) {
            return Err(Error::validation(INVALID_DURATION));
        }
        self.subject_alt_names()?;
        Ok(())
    }

    /// Subject DN fields in encoding order; empty strings count as absent
    fn dn_fields(&self) -> impl Iterator<Item = (DnType, Option<&str>)> {
        [
            (DnType::OrganizationName, self.organization.as_deref()),
            (DnType::StateOrProvinceName, self.state.as_deref()),
            (DnType::CountryName, self.country.as_deref()),
            (DnType::CommonName, self.common_name.as_deref()),
            (DnType::OrganizationalUnitName, self.organization_unit.as_deref()),
            (DnType::LocalityName, self.locality.as_deref()),
        ]
        .into_iter()
        .map(|(ty, value)| (ty, value.filter(|v| !v.trim().is_empty())))
    }

    fn distinguished_name(&self) -> DistinguishedName {
        let mut dn = DistinguishedName::new();
        for (ty, value) in self.dn_fields() {
            if let Some(value) = value {
                dn.push(ty, value);
            }
        }
        dn
    }

    fn subject_alt_names(&self) -> Result<Vec<SanType>> {
        self.alternative_names
            .iter()
            .map(|name| match name.parse::<IpAddr>() {
                Ok(ip) => Ok(SanType::IpAddress(ip)),
                Err(_) => name
                    .clone()
                    .try_into()
                    .map(SanType::DnsName)
                    .map_err(|_| Error::validation(INVALID_ALTERNATIVE_NAME)),
            })
            .collect()
    }

    fn to_rcgen(&self, is_ca: bool) -> Result<CertificateParams> {
        let mut params = CertificateParams::default();
        params.distinguished_name = self.distinguished_name();
        params.subject_alt_names = self.subject_alt_names()?;
        params.serial_number = Some(random_serial());

        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + Duration::days(i64::from(self.duration));

        if is_ca {
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
            params.key_usages = vec![
                KeyUsagePurpose::KeyCertSign,
                KeyUsagePurpose::CrlSign,
                KeyUsagePurpose::DigitalSignature,
            ];
        } else {
            params.is_ca = IsCa::ExplicitNoCa;
        }

        Ok(params)
    }
}

/// A CA certificate together with its decrypted private key
pub struct CertificateAuthority {
    certificate: String,
    key_pair: RsaKeyPair,
}

impl CertificateAuthority {
    /// Accept only certificates that can sign others
    pub fn new(certificate: impl Into<String>, private_key_pem: &str) -> Result<Self> {
        let certificate = certificate.into();
        if !is_certificate_authority(&certificate) {
            return Err(Error::not_found(NOT_A_CERTIFICATE_AUTHORITY));
        }
        let key_pair = RsaKeyPair::from_pem(private_key_pem)?;
        Ok(Self {
            certificate,
            key_pair,
        })
    }

    pub fn certificate(&self) -> &str {
        &self.certificate
    }
}

/// Whether a PEM certificate may act as a CA: it carries the CA basic
/// constraint or is self-signed. Unparseable input is never a CA.
pub fn is_certificate_authority(pem: &str) -> bool {
    let Ok((_, pem)) = parse_x509_pem(pem.as_bytes()) else {
        return false;
    };
    let Ok(cert) = pem.parse_x509() else {
        return false;
    };

    let constrained_ca = cert
        .basic_constraints()
        .ok()
        .flatten()
        .is_some_and(|bc| bc.value.ca);
    let self_signed =
        cert.subject().as_raw() == cert.issuer().as_raw() && cert.verify_signature(None).is_ok();

    constrained_ca || self_signed
}

/// Builds root, self-signed and CA-signed certificates
#[derive(Debug, Default, Clone, Copy)]
pub struct CertificateAuthorityGenerator;

impl CertificateAuthorityGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Self-signed root CA for `key_pair`
    pub fn generate_root_certificate(
        &self,
        key_pair: &RsaKeyPair,
        params: &CertificateParameters,
    ) -> Result<String> {
        self.self_signed(key_pair, params, true)
    }

    /// Self-signed certificate that is a CA only when `params.is_ca` is set
    pub fn generate_self_signed(
        &self,
        key_pair: &RsaKeyPair,
        params: &CertificateParameters,
    ) -> Result<String> {
        self.self_signed(key_pair, params, params.is_ca)
    }

    /// Leaf or intermediate for `key_pair` signed by `ca`
    pub fn sign_certificate(
        &self,
        ca: &CertificateAuthority,
        key_pair: &RsaKeyPair,
        params: &CertificateParameters,
    ) -> Result<String> {
        params.validate()?;

        let issuer_key = signing_key(&ca.key_pair)?;
        let issuer_params = CertificateParams::from_ca_cert_pem(&ca.certificate)
            .map_err(|_| Error::not_found(NOT_A_CERTIFICATE_AUTHORITY))?;
        let issuer = issuer_params
            .self_signed(&issuer_key)
            .map_err(|e| Error::crypto(format!("Failed to load CA: {}", e)))?;

        let subject_key = signing_key(key_pair)?;
        let cert = params
            .to_rcgen(params.is_ca)?
            .signed_by(&subject_key, &issuer, &issuer_key)
            .map_err(|e| Error::crypto(format!("Certificate signing failed: {}", e)))?;

        let (_, ca_pem) = parse_x509_pem(ca.certificate.as_bytes())
            .map_err(|_| Error::not_found(NOT_A_CERTIFICATE_AUTHORITY))?;
        let ca_cert = ca_pem
            .parse_x509()
            .map_err(|_| Error::not_found(NOT_A_CERTIFICATE_AUTHORITY))?;
        verify_signed_by(cert.der(), ca_cert.public_key())?;

        debug!(is_ca = params.is_ca, "Issued CA-signed certificate");
        Ok(cert.pem())
    }

    fn self_signed(
        &self,
        key_pair: &RsaKeyPair,
        params: &CertificateParameters,
        is_ca: bool,
    ) -> Result<String> {
        params.validate()?;

        let signing = signing_key(key_pair)?;
        let cert = params
            .to_rcgen(is_ca)?
            .self_signed(&signing)
            .map_err(|e| Error::crypto(format!("Certificate generation failed: {}", e)))?;

        let spki_der = key_pair.public_key_der()?;
        let (_, spki) = SubjectPublicKeyInfo::from_der(&spki_der)
            .map_err(|e| Error::SignatureVerification(e.to_string()))?;
        verify_signed_by(cert.der(), &spki)?;

        debug!(is_ca, "Issued self-signed certificate");
        Ok(cert.pem())
    }
}

fn signing_key(key_pair: &RsaKeyPair) -> Result<KeyPair> {
    let pem = key_pair.private_key_pkcs8_pem()?;
    KeyPair::from_pem_and_sign_algo(&pem, &rcgen::PKCS_RSA_SHA256)
        .map_err(|e| Error::crypto(format!("Unusable signing key: {}", e)))
}

fn verify_signed_by(der: &[u8], signer: &SubjectPublicKeyInfo<'_>) -> Result<()> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| Error::SignatureVerification(e.to_string()))?;
    cert.verify_signature(Some(signer))
        .map_err(|e| Error::SignatureVerification(e.to_string()))
}

/// Random positive serial with a non-zero leading byte
fn random_serial() -> SerialNumber {
    let mut bytes = [0u8; SERIAL_BYTES];
    OsRng.fill_bytes(&mut bytes);
    bytes[0] = (bytes[0] & 0x7f) | 0x01;
    SerialNumber::from_slice(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn ca_key() -> &'static RsaKeyPair {
        static KEY: OnceLock<RsaKeyPair> = OnceLock::new();
        KEY.get_or_init(|| RsaKeyPair::generate(2048).unwrap())
    }

    fn leaf_key() -> &'static RsaKeyPair {
        static KEY: OnceLock<RsaKeyPair> = OnceLock::new();
        KEY.get_or_init(|| RsaKeyPair::generate(2048).unwrap())
    }

    fn named(common_name: &str) -> CertificateParameters {
        CertificateParameters {
            common_name: Some(common_name.to_string()),
            ..Default::default()
        }
    }

    fn parse(pem: &str) -> (Vec<u8>, String, String, bool) {
        let (_, pem) = parse_x509_pem(pem.as_bytes()).unwrap();
        let cert = pem.parse_x509().unwrap();
        let is_ca = cert
            .basic_constraints()
            .unwrap()
            .is_some_and(|bc| bc.value.ca);
        (
            cert.raw_serial().to_vec(),
            cert.subject().to_string(),
            cert.issuer().to_string(),
            is_ca,
        )
    }

    #[test]
    fn test_root_certificate() {
        let generator = CertificateAuthorityGenerator::new();
        let params = CertificateParameters {
            organization: Some("Example".into()),
            ..named("Example Root")
        };
        let pem = generator.generate_root_certificate(ca_key(), &params).unwrap();

        let (serial, subject, issuer, is_ca) = parse(&pem);
        assert_eq!(subject, issuer);
        assert!(subject.contains("CN=Example Root"));
        assert!(is_ca);
        assert!(serial[0] & 0x80 == 0);
        assert!(is_certificate_authority(&pem));
    }

    #[test]
    fn test_root_validity_uses_duration() {
        let pem = CertificateAuthorityGenerator::new()
            .generate_root_certificate(
                ca_key(),
                &CertificateParameters {
                    duration: 30,
                    ..named("Short Lived")
                },
            )
            .unwrap();

        let (_, pem) = parse_x509_pem(pem.as_bytes()).unwrap();
        let cert = pem.parse_x509().unwrap();
        let validity = cert.validity();
        let days = (validity.not_after.timestamp() - validity.not_before.timestamp()) / 86_400;
        assert_eq!(days, 30);
    }

    #[test]
    fn test_serials_differ() {
        let generator = CertificateAuthorityGenerator::new();
        let a = generator.generate_root_certificate(ca_key(), &named("A")).unwrap();
        let b = generator.generate_root_certificate(ca_key(), &named("A")).unwrap();
        assert_ne!(parse(&a).0, parse(&b).0);
    }

    #[test]
    fn test_sign_leaf_with_ca() {
        let generator = CertificateAuthorityGenerator::new();
        let root_pem = generator
            .generate_root_certificate(ca_key(), &named("Signing CA"))
            .unwrap();
        let ca = CertificateAuthority::new(
            root_pem.clone(),
            &ca_key().private_key_pem().unwrap(),
        )
        .unwrap();

        let params = CertificateParameters {
            alternative_names: vec!["app.example.com".into(), "10.0.0.1".into()],
            ..named("app.example.com")
        };
        let leaf = generator.sign_certificate(&ca, leaf_key(), &params).unwrap();

        let (_, subject, issuer, is_ca) = parse(&leaf);
        assert!(subject.contains("CN=app.example.com"));
        assert!(issuer.contains("CN=Signing CA"));
        assert!(!is_ca);
        assert!(!is_certificate_authority(&leaf));
    }

    #[test]
    fn test_sign_intermediate_is_ca() {
        let generator = CertificateAuthorityGenerator::new();
        let root_pem = generator
            .generate_root_certificate(ca_key(), &named("Root"))
            .unwrap();
        let ca = CertificateAuthority::new(root_pem, &ca_key().private_key_pem().unwrap()).unwrap();

        let params = CertificateParameters {
            is_ca: true,
            ..named("Intermediate")
        };
        let intermediate = generator.sign_certificate(&ca, leaf_key(), &params).unwrap();
        assert!(is_certificate_authority(&intermediate));
    }

    #[test]
    fn test_mismatched_ca_key_fails_verification() {
        let generator = CertificateAuthorityGenerator::new();
        let root_pem = generator
            .generate_root_certificate(ca_key(), &named("Root"))
            .unwrap();
        // The CA certificate belongs to ca_key but we hand over leaf_key
        let ca = CertificateAuthority::new(root_pem, &leaf_key().private_key_pem().unwrap()).unwrap();

        let err = generator
            .sign_certificate(&ca, leaf_key(), &named("leaf"))
            .unwrap_err();
        assert!(matches!(err, Error::SignatureVerification(_)));
    }

    #[test]
    fn test_leaf_is_not_accepted_as_ca() {
        let generator = CertificateAuthorityGenerator::new();
        let root_pem = generator
            .generate_root_certificate(ca_key(), &named("Root"))
            .unwrap();
        let ca = CertificateAuthority::new(root_pem, &ca_key().private_key_pem().unwrap()).unwrap();
        let leaf = generator.sign_certificate(&ca, leaf_key(), &named("leaf")).unwrap();

        let err = CertificateAuthority::new(leaf, &leaf_key().private_key_pem().unwrap())
            .err()
            .unwrap();
        assert_eq!(err.to_string(), NOT_A_CERTIFICATE_AUTHORITY);
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_garbage_is_not_a_ca() {
        assert!(!is_certificate_authority("C"));
    }

    #[test]
    fn test_parameter_validation() {
        let empty = CertificateParameters::default();
        assert_eq!(
            empty.validate().unwrap_err().to_string(),
            MISSING_CERTIFICATE_FIELDS
        );

        let blank = CertificateParameters {
            common_name: Some("  ".into()),
            ..Default::default()
        };
        assert!(blank.validate().is_err());

        for duration in [0, 3651] {
            let params = CertificateParameters {
                duration,
                ..named("x")
            };
            assert_eq!(params.validate().unwrap_err().to_string(), INVALID_DURATION);
        }
        for duration in [1, 3650] {
            let params = CertificateParameters {
                duration,
                ..named("x")
            };
            assert!(params.validate().is_ok());
        }

        let bad_length = CertificateParameters {
            key_length: 1024,
            ..named("x")
        };
        assert!(bad_length.validate().is_err());
    }

    #[test]
    fn test_parameters_defaults_from_json() {
        let params: CertificateParameters =
            serde_json::from_str(r#"{"common_name": "example"}"#).unwrap();
        assert_eq!(params.key_length, 2048);
        assert_eq!(params.duration, 365);
        assert!(!params.is_ca);

        let unknown: std::result::Result<CertificateParameters, _> =
            serde_json::from_str(r#"{"common_name": "example", "colour": "blue"}"#);
        assert!(unknown.is_err());
    }
}
