//! XML Signature validation.
//!
//! Validates enveloped signatures on SAML documents and detached
//! HTTP-Redirect signatures against a peer's published credentials.

use base64::Engine;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{SamlError, SamlResult};

use super::{
    canonicalize, digest_b64, element_span, signature_span, signed_info_xml, SignatureAlgorithm,
    XmlSignature,
};

/// A credential a peer publishes for verifying its signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationCredential {
    /// An X.509 certificate in DER format.
    Certificate(Vec<u8>),
    /// A bare RSA public key (PKCS#1 `RSAPublicKey`, DER).
    PublicKey(Vec<u8>),
}

impl VerificationCredential {
    /// Parses a PEM-encoded X.509 certificate.
    pub fn certificate_from_pem(pem: &str) -> SamlResult<Self> {
        slo_crypto::pem_to_der(pem, "CERTIFICATE")
            .map(Self::Certificate)
            .ok_or_else(|| SamlError::Crypto("Invalid certificate PEM".to_string()))
    }

    /// Returns the RSA public key carried by this credential.
    pub fn public_key_der(&self) -> SamlResult<Vec<u8>> {
        match self {
            Self::PublicKey(der) => Ok(der.clone()),
            Self::Certificate(der) => {
                use x509_parser::prelude::*;

                let (_, cert) = X509Certificate::from_der(der)
                    .map_err(|e| SamlError::Crypto(format!("Failed to parse certificate: {e}")))?;
                Ok(cert.public_key().subject_public_key.data.to_vec())
            }
        }
    }
}

/// XML signature validator.
///
/// Validates signatures using the trusted credentials of a single peer.
/// A validator without credentials rejects every signature.
#[derive(Debug, Clone, Default)]
pub struct XmlSignatureValidator {
    credentials: Vec<VerificationCredential>,
}

impl XmlSignatureValidator {
    /// Creates a new validator with the given trusted credentials.
    #[must_use]
    pub fn new(credentials: Vec<VerificationCredential>) -> Self {
        Self { credentials }
    }

    /// Validates the enveloped signature of a SAML document.
    ///
    /// The signature must reference the document's root element.
    ///
    /// # Returns
    ///
    /// Returns `Ok(XmlSignature)` if the signature is valid, or an error if not.
    pub fn validate(&self, xml: &str) -> SamlResult<XmlSignature> {
        let (sig_start, sig_end) = signature_span(xml)
            .ok_or_else(|| SamlError::SignatureInvalid("No Signature element found".to_string()))?;
        let signature = extract_signature(&xml[sig_start..sig_end])?;

        let reference_id = signature
            .reference_uri
            .strip_prefix('#')
            .unwrap_or(&signature.reference_uri);
        if root_id(xml)?.as_deref() != Some(reference_id) {
            return Err(SamlError::SignatureInvalid(
                "Signature does not reference the message root".to_string(),
            ));
        }

        self.verify_digest(xml, reference_id, (sig_start, sig_end), &signature)?;

        let signed_info = signed_info_xml(
            &signature.reference_uri,
            &signature.digest_value,
            signature.algorithm,
        );
        let signature_bytes = base64::engine::general_purpose::STANDARD
            .decode(&signature.signature_value)
            .map_err(|e| SamlError::SignatureInvalid(format!("Invalid signature encoding: {e}")))?;

        self.verify_with_any(
            canonicalize(&signed_info).as_bytes(),
            &signature_bytes,
            signature.algorithm,
        )?;

        Ok(signature)
    }

    /// Validates a detached signature for HTTP-Redirect binding.
    ///
    /// `signed_query` must be the raw, still URL-encoded query string portion
    /// exactly as received.
    pub fn validate_redirect_binding(
        &self,
        signed_query: &str,
        signature_b64: &str,
        sig_alg: &str,
    ) -> SamlResult<()> {
        let algorithm = SignatureAlgorithm::from_uri(sig_alg).ok_or_else(|| {
            SamlError::SignatureInvalid(format!("Unsupported signature algorithm: {sig_alg}"))
        })?;

        let signature = base64::engine::general_purpose::STANDARD
            .decode(signature_b64)
            .map_err(|e| SamlError::SignatureInvalid(format!("Invalid signature encoding: {e}")))?;

        self.verify_with_any(signed_query.as_bytes(), &signature, algorithm)
    }

    fn verify_digest(
        &self,
        xml: &str,
        reference_id: &str,
        (sig_start, sig_end): (usize, usize),
        signature: &XmlSignature,
    ) -> SamlResult<()> {
        let (start, _, end) = element_span(xml, reference_id)?;
        if !is_prolog(&xml[..start]) || !xml[end..].trim().is_empty() {
            return Err(SamlError::SignatureInvalid(
                "Signed element does not span the whole document".to_string(),
            ));
        }
        if sig_start < start || sig_end > end {
            return Err(SamlError::SignatureInvalid(
                "Signature is not enveloped by the referenced element".to_string(),
            ));
        }

        let element = format!("{}{}", &xml[start..sig_start], &xml[sig_end..end]);
        if digest_b64(&element, signature.algorithm) != signature.digest_value {
            return Err(SamlError::SignatureInvalid(
                "Digest value mismatch".to_string(),
            ));
        }
        Ok(())
    }

    fn verify_with_any(
        &self,
        data: &[u8],
        signature: &[u8],
        algorithm: SignatureAlgorithm,
    ) -> SamlResult<()> {
        if self.credentials.is_empty() {
            return Err(SamlError::SignatureInvalid(
                "No trusted signing credentials available".to_string(),
            ));
        }

        for credential in &self.credentials {
            let public_key = match credential.public_key_der() {
                Ok(key) => key,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unusable verification credential");
                    continue;
                }
            };
            if slo_crypto::rsa_verify(&public_key, data, signature, algorithm.rsa())? {
                return Ok(());
            }
        }

        Err(SamlError::SignatureInvalid(
            "Signature verification failed with all trusted credentials".to_string(),
        ))
    }
}

/// Reads the parts of a `<ds:Signature>` element needed for verification.
fn extract_signature(signature_xml: &str) -> SamlResult<XmlSignature> {
    let mut reader = Reader::from_str(signature_xml);
    let mut method = None;
    let mut reference_uri = None;
    let mut digest_value = None;
    let mut signature_value = None;
    let mut x509_certificate = None;
    let mut open: Option<Vec<u8>> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"SignatureMethod" => {
                        method = e
                            .try_get_attribute("Algorithm")?
                            .map(|a| a.unescape_value().map(|v| v.into_owned()))
                            .transpose()?;
                    }
                    b"Reference" if reference_uri.is_none() => {
                        reference_uri = e
                            .try_get_attribute("URI")?
                            .map(|a| a.unescape_value().map(|v| v.into_owned()))
                            .transpose()?;
                    }
                    other => open = Some(other.to_vec()),
                }
            }
            Event::Text(t) => {
                let text = strip_whitespace(&t.unescape()?);
                match open.as_deref() {
                    Some(b"DigestValue") => digest_value = Some(text),
                    Some(b"SignatureValue") => signature_value = Some(text),
                    Some(b"X509Certificate") => x509_certificate = Some(text),
                    _ => {}
                }
            }
            Event::End(_) => open = None,
            Event::Eof => break,
            _ => {}
        }
    }

    let algorithm = method
        .as_deref()
        .and_then(SignatureAlgorithm::from_uri)
        .ok_or_else(|| SamlError::SignatureInvalid("unsupported SignatureMethod".to_string()))?;
    let missing = |what: &str| SamlError::SignatureInvalid(format!("signature has no {what}"));

    Ok(XmlSignature {
        algorithm,
        reference_uri: reference_uri.ok_or_else(|| missing("Reference URI"))?,
        digest_value: digest_value.ok_or_else(|| missing("DigestValue"))?,
        signature_value: signature_value.ok_or_else(|| missing("SignatureValue"))?,
        x509_certificate,
    })
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Whitespace, optionally around a single XML declaration.
fn is_prolog(text: &str) -> bool {
    let text = text.trim();
    text.is_empty()
        || (text.starts_with("<?xml")
            && text.ends_with("?>")
            && text.matches('<').count() == 1)
}

/// Reads the `ID` attribute of the document's root element.
fn root_id(xml: &str) -> SamlResult<Option<String>> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                return Ok(match e.try_get_attribute("ID")? {
                    Some(attr) => Some(attr.unescape_value()?.into_owned()),
                    None => None,
                });
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}
