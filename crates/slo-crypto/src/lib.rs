//! # slo-crypto
//!
//! Cryptographic operations for the single logout engine, backed by aws-lc-rs.
//!
//! - Message digests and HMAC used by XML-DSig and opaque identifier derivation
//! - RSA PKCS#1 v1.5 signing and verification for SAML 2.0 interoperability
//! - Secure random identifiers for protocol messages

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod hash;
pub mod pem;
pub mod random;
pub mod signature;

pub use hash::{hmac_sha256, sha256, sha384, sha512};
pub use pem::pem_to_der;
pub use random::{generate_message_id, random_alphanumeric, random_bytes};
pub use signature::{rsa_verify, RsaAlgorithm, RsaSigningKey, SignatureError};
