//! XML Signature support for SAML.
//!
//! Enveloped XML-DSig signatures over logout messages, plus the detached
//! query-string signatures used by the HTTP-Redirect binding.
//!
//! # Signing Algorithms
//!
//! - RSA-SHA256 (default)
//! - RSA-SHA384
//! - RSA-SHA512
//!
//! Canonicalization is a whitespace normalization of the serialized element.
//! Messages produced by this crate are serialized deterministically, so the
//! signer and validator always see the same canonical bytes.

mod signer;
mod validator;

pub use signer::*;
pub use validator::*;

use base64::Engine;
use serde::{Deserialize, Serialize};
use slo_crypto::RsaAlgorithm;

use crate::error::{SamlError, SamlResult};
use crate::types::{canonicalization_algorithms, digest_algorithms, signature_algorithms};

/// Signature algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureAlgorithm {
    /// RSA with SHA-256.
    #[default]
    RsaSha256,
    /// RSA with SHA-384.
    RsaSha384,
    /// RSA with SHA-512.
    RsaSha512,
}

impl SignatureAlgorithm {
    /// Returns the URI for this signature algorithm.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::RsaSha256 => signature_algorithms::RSA_SHA256,
            Self::RsaSha384 => signature_algorithms::RSA_SHA384,
            Self::RsaSha512 => signature_algorithms::RSA_SHA512,
        }
    }

    /// Returns the corresponding digest algorithm URI.
    #[must_use]
    pub const fn digest_uri(&self) -> &'static str {
        match self {
            Self::RsaSha256 => digest_algorithms::SHA256,
            Self::RsaSha384 => digest_algorithms::SHA384,
            Self::RsaSha512 => digest_algorithms::SHA512,
        }
    }

    /// Parses a signature algorithm from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            signature_algorithms::RSA_SHA256 => Some(Self::RsaSha256),
            signature_algorithms::RSA_SHA384 => Some(Self::RsaSha384),
            signature_algorithms::RSA_SHA512 => Some(Self::RsaSha512),
            _ => None,
        }
    }

    const fn rsa(self) -> RsaAlgorithm {
        match self {
            Self::RsaSha256 => RsaAlgorithm::Rs256,
            Self::RsaSha384 => RsaAlgorithm::Rs384,
            Self::RsaSha512 => RsaAlgorithm::Rs512,
        }
    }

    fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::RsaSha256 => slo_crypto::sha256(data),
            Self::RsaSha384 => slo_crypto::sha384(data),
            Self::RsaSha512 => slo_crypto::sha512(data),
        }
    }
}

/// XML Signature structure.
///
/// Represents the `<ds:Signature>` element of a signed SAML message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlSignature {
    /// The signature algorithm used.
    pub algorithm: SignatureAlgorithm,
    /// The reference URI (`#` followed by the ID of the signed element).
    pub reference_uri: String,
    /// The digest value (base64 encoded).
    pub digest_value: String,
    /// The signature value (base64 encoded).
    pub signature_value: String,
    /// Optional X.509 certificate (base64 encoded, DER format).
    pub x509_certificate: Option<String>,
}

/// Returns true if the document carries an enveloped `<ds:Signature>`.
#[must_use]
pub fn has_enveloped_signature(xml: &str) -> bool {
    signature_span(xml).is_some()
}

/// Removes the enveloped `<ds:Signature>` element, if any.
#[must_use]
pub fn remove_enveloped_signature(xml: &str) -> String {
    match signature_span(xml) {
        Some((start, end)) => format!("{}{}", &xml[..start], &xml[end..]),
        None => xml.to_string(),
    }
}

/// Locates the byte range of the first signature element.
fn signature_span(xml: &str) -> Option<(usize, usize)> {
    for (open, close) in [("<ds:Signature", "</ds:Signature>"), ("<Signature", "</Signature>")] {
        let mut from = 0;
        while let Some(offset) = xml[from..].find(open) {
            let start = from + offset;
            let next = xml.as_bytes().get(start + open.len()).copied();
            // Skip elements that merely share the prefix, like SignatureValue.
            if matches!(next, Some(b' ' | b'>' | b'\n' | b'\t' | b'\r')) {
                let end = xml[start..].find(close).map(|pos| start + pos + close.len())?;
                return Some((start, end));
            }
            from = start + open.len();
        }
    }
    None
}

/// Locates an element by its `ID` attribute.
///
/// Returns the element start, the end of its start tag, and the element end.
fn element_span(xml: &str, reference_id: &str) -> SamlResult<(usize, usize, usize)> {
    let id_pattern = format!("ID=\"{reference_id}\"");
    let id_pos = xml.find(&id_pattern).ok_or_else(|| {
        SamlError::SignatureInvalid(format!("element with ID '{reference_id}' not found"))
    })?;

    let start = xml[..id_pos]
        .rfind('<')
        .ok_or_else(|| SamlError::SignatureInvalid("malformed XML element".to_string()))?;

    let open_tag_end = xml[id_pos..]
        .find('>')
        .map(|pos| id_pos + pos + 1)
        .ok_or_else(|| SamlError::SignatureInvalid("malformed XML element".to_string()))?;

    let tag_name: String = xml[start + 1..]
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != '>' && *c != '/')
        .collect();

    let close_tag = format!("</{tag_name}>");
    let end = xml[open_tag_end..]
        .rfind(&close_tag)
        .map(|pos| open_tag_end + pos + close_tag.len())
        .ok_or_else(|| {
            SamlError::SignatureInvalid(format!("element '{tag_name}' is not properly closed"))
        })?;

    Ok((start, open_tag_end, end))
}

/// Normalizes XML whitespace (simplified canonicalization).
fn canonicalize(xml: &str) -> String {
    xml.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Computes the base64 digest of the canonical form of `element`.
fn digest_b64(element: &str, algorithm: SignatureAlgorithm) -> String {
    let digest = algorithm.digest(canonicalize(element).as_bytes());
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// Builds the `SignedInfo` element shared by signer and validator.
fn signed_info_xml(reference_uri: &str, digest_value: &str, algorithm: SignatureAlgorithm) -> String {
    format!(
        r#"<ds:SignedInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
<ds:CanonicalizationMethod Algorithm="{c14n}"/>
<ds:SignatureMethod Algorithm="{sig}"/>
<ds:Reference URI="{reference_uri}">
<ds:Transforms>
<ds:Transform Algorithm="{enveloped}"/>
<ds:Transform Algorithm="{c14n}"/>
</ds:Transforms>
<ds:DigestMethod Algorithm="{digest}"/>
<ds:DigestValue>{digest_value}</ds:DigestValue>
</ds:Reference>
</ds:SignedInfo>"#,
        c14n = canonicalization_algorithms::EXCLUSIVE_C14N,
        sig = algorithm.uri(),
        enveloped = canonicalization_algorithms::ENVELOPED_SIGNATURE,
        digest = algorithm.digest_uri(),
    )
}
