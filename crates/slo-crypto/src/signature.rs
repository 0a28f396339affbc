//! RSA signature operations.
//!
//! SAML 2.0 partners overwhelmingly expect RSA PKCS#1 v1.5 signatures, so
//! this module only covers that family. The signing key is parsed once and
//! reused for every message the engine signs during a logout pass.

use aws_lc_rs::{
    rand::SystemRandom,
    rsa::KeySize,
    signature::{self, KeyPair, RsaKeyPair, UnparsedPublicKey},
};
use thiserror::Error;

use crate::pem::pem_to_der;

/// Error type for signature operations.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// Key generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Verification failed.
    #[error("signature verification failed")]
    Verification,

    /// Invalid key format.
    #[error("invalid key format: {0}")]
    InvalidKey(String),

    /// Algorithm not supported.
    #[error("algorithm not supported: {0}")]
    UnsupportedAlgorithm(String),
}

/// RSA PKCS#1 v1.5 signature algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RsaAlgorithm {
    /// RSA PKCS#1 v1.5 with SHA-256.
    Rs256,
    /// RSA PKCS#1 v1.5 with SHA-384.
    Rs384,
    /// RSA PKCS#1 v1.5 with SHA-512.
    Rs512,
}

impl RsaAlgorithm {
    /// Returns the XML-DSig algorithm URI.
    #[must_use]
    pub const fn xml_dsig_uri(self) -> &'static str {
        match self {
            Self::Rs256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            Self::Rs384 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384",
            Self::Rs512 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
        }
    }

    /// Parses an XML-DSig algorithm URI.
    #[must_use]
    pub fn from_xml_dsig_uri(uri: &str) -> Option<Self> {
        match uri {
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256" => Some(Self::Rs256),
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384" => Some(Self::Rs384),
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512" => Some(Self::Rs512),
            _ => None,
        }
    }

    fn verification_algorithm(self) -> &'static dyn signature::VerificationAlgorithm {
        match self {
            Self::Rs256 => &signature::RSA_PKCS1_2048_8192_SHA256,
            Self::Rs384 => &signature::RSA_PKCS1_2048_8192_SHA384,
            Self::Rs512 => &signature::RSA_PKCS1_2048_8192_SHA512,
        }
    }
}

/// A parsed RSA private key.
pub struct RsaSigningKey {
    key_pair: RsaKeyPair,
    rng: SystemRandom,
}

impl std::fmt::Debug for RsaSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaSigningKey")
            .field("modulus_len", &self.key_pair.public_modulus_len())
            .finish_non_exhaustive()
    }
}

impl RsaSigningKey {
    /// Parses an RSA private key in DER format (PKCS#1 or PKCS#8).
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be parsed.
    pub fn from_der(key_der: &[u8]) -> Result<Self, SignatureError> {
        let key_pair = RsaKeyPair::from_der(key_der)
            .or_else(|_| RsaKeyPair::from_pkcs8(key_der))
            .map_err(|e| SignatureError::InvalidKey(format!("Invalid RSA key: {e}")))?;

        Ok(Self {
            key_pair,
            rng: SystemRandom::new(),
        })
    }

    /// Parses an RSA private key from PEM armor.
    ///
    /// Accepts `PRIVATE KEY` (PKCS#8) and `RSA PRIVATE KEY` (PKCS#1) blocks.
    ///
    /// # Errors
    ///
    /// Returns an error if no key block is found or the key cannot be parsed.
    pub fn from_pem(pem: &str) -> Result<Self, SignatureError> {
        let der = pem_to_der(pem, "PRIVATE KEY")
            .or_else(|| pem_to_der(pem, "RSA PRIVATE KEY"))
            .ok_or_else(|| SignatureError::InvalidKey("no private key PEM block".to_string()))?;
        Self::from_der(&der)
    }

    /// Generates a fresh 2048-bit key.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate() -> Result<Self, SignatureError> {
        let key_pair = RsaKeyPair::generate(KeySize::Rsa2048)
            .map_err(|e| SignatureError::KeyGeneration(e.to_string()))?;
        Ok(Self {
            key_pair,
            rng: SystemRandom::new(),
        })
    }

    /// Signs `data` with the given algorithm.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign(&self, data: &[u8], algorithm: RsaAlgorithm) -> Result<Vec<u8>, SignatureError> {
        let mut signature = vec![0u8; self.key_pair.public_modulus_len()];

        let padding = match algorithm {
            RsaAlgorithm::Rs256 => &signature::RSA_PKCS1_SHA256,
            RsaAlgorithm::Rs384 => &signature::RSA_PKCS1_SHA384,
            RsaAlgorithm::Rs512 => &signature::RSA_PKCS1_SHA512,
        };

        self.key_pair
            .sign(padding, &self.rng, data, &mut signature)
            .map_err(|e| SignatureError::Signing(format!("RSA signing failed: {e}")))?;

        Ok(signature)
    }

    /// Returns the public key as a PKCS#1 `RSAPublicKey` DER structure.
    #[must_use]
    pub fn public_key_der(&self) -> Vec<u8> {
        self.key_pair.public_key().as_ref().to_vec()
    }
}

/// Verifies an RSA signature.
///
/// `public_key_der` is a PKCS#1 `RSAPublicKey`, as found inside the
/// `SubjectPublicKeyInfo` of an X.509 certificate.
///
/// Returns `Ok(false)` when the signature does not match.
///
/// # Errors
///
/// Currently infallible; the `Result` leaves room for key-format checks.
pub fn rsa_verify(
    public_key_der: &[u8],
    data: &[u8],
    sig: &[u8],
    algorithm: RsaAlgorithm,
) -> Result<bool, SignatureError> {
    let public_key = UnparsedPublicKey::new(algorithm.verification_algorithm(), public_key_der);

    match public_key.verify(data, sig) {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}
