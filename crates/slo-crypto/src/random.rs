//! Cryptographically secure random generation.
//!
//! Protocol message identifiers must be unguessable so that a peer cannot
//! forge an `InResponseTo` correlation.

use rand::distr::{Alphanumeric, SampleString};
use rand::Rng;

/// Generates a cryptographically secure random byte array.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

/// Generates a cryptographically secure alphanumeric string.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    Alphanumeric.sample_string(&mut rng, len)
}

/// Generates a SAML message identifier.
///
/// XML IDs must not start with a digit, so the identifier carries a leading
/// underscore followed by 40 alphanumeric characters (about 238 bits).
#[must_use]
pub fn generate_message_id() -> String {
    format!("_{}", random_alphanumeric(40))
}
