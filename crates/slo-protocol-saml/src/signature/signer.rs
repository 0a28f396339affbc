//! XML Signature creation.
//!
//! Provides functionality for signing SAML documents using XML-DSig.

use base64::Engine;
use slo_crypto::RsaSigningKey;

use crate::error::{SamlError, SamlResult};

use super::{canonicalize, digest_b64, element_span, signed_info_xml, SignatureAlgorithm};

/// XML document signer.
///
/// Holds a parsed RSA key so that one signer can be shared by every message
/// built during a logout pass.
#[derive(Debug)]
pub struct XmlSigner {
    key: RsaSigningKey,
    certificate_der: Option<Vec<u8>>,
    algorithm: SignatureAlgorithm,
}

impl XmlSigner {
    /// Creates a new signer.
    ///
    /// # Arguments
    ///
    /// * `key` - The RSA signing key
    /// * `certificate_der` - Optional X.509 certificate embedded in `KeyInfo`
    #[must_use]
    pub fn new(key: RsaSigningKey, certificate_der: Option<Vec<u8>>) -> Self {
        Self {
            key,
            certificate_der,
            algorithm: SignatureAlgorithm::default(),
        }
    }

    /// Creates a new signer from PEM-encoded key and certificate.
    pub fn from_pem(private_key_pem: &str, certificate_pem: Option<&str>) -> SamlResult<Self> {
        let key = RsaSigningKey::from_pem(private_key_pem)?;

        let certificate_der = certificate_pem
            .map(|pem| {
                slo_crypto::pem_to_der(pem, "CERTIFICATE")
                    .ok_or_else(|| SamlError::Crypto("Invalid certificate PEM".to_string()))
            })
            .transpose()?;

        Ok(Self::new(key, certificate_der))
    }

    /// Sets the signature algorithm.
    #[must_use]
    pub const fn with_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Returns the configured signature algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Returns the signer's public key (PKCS#1 DER).
    #[must_use]
    pub fn public_key_der(&self) -> Vec<u8> {
        self.key.public_key_der()
    }

    /// Signs an XML document.
    ///
    /// # Arguments
    ///
    /// * `xml` - The XML document to sign
    /// * `reference_id` - The ID of the element to sign (without the '#' prefix)
    ///
    /// # Returns
    ///
    /// The signed XML document with the `<ds:Signature>` element inserted
    /// after the element's `Issuer`.
    pub fn sign(&self, xml: &str, reference_id: &str) -> SamlResult<String> {
        let (start, open_tag_end, end) = element_span(xml, reference_id)
            .map_err(|e| SamlError::SignatureCreation(e.to_string()))?;

        let digest = digest_b64(&xml[start..end], self.algorithm);
        let signed_info = signed_info_xml(&format!("#{reference_id}"), &digest, self.algorithm);

        let signature_value = self.sign_data(canonicalize(&signed_info).as_bytes())?;
        let signature_b64 = base64::engine::general_purpose::STANDARD.encode(signature_value);

        let signature_element = self.signature_element(&signed_info, &signature_b64);

        let insert_at = find_issuer_end(&xml[open_tag_end..end])
            .map_or(open_tag_end, |pos| open_tag_end + pos);

        Ok(format!(
            "{}{}{}",
            &xml[..insert_at],
            signature_element,
            &xml[insert_at..]
        ))
    }

    /// Signs raw data using the configured algorithm.
    pub fn sign_data(&self, data: &[u8]) -> SamlResult<Vec<u8>> {
        self.key
            .sign(data, self.algorithm.rsa())
            .map_err(|e| SamlError::SignatureCreation(format!("RSA signing failed: {e}")))
    }

    /// Creates a detached signature for the HTTP-Redirect binding.
    ///
    /// `signed_query` is the already URL-encoded
    /// `SAMLRequest=..[&RelayState=..]&SigAlg=..` string. Returns the base64
    /// signature value.
    pub fn sign_redirect_query(&self, signed_query: &str) -> SamlResult<String> {
        let signature = self.sign_data(signed_query.as_bytes())?;
        Ok(base64::engine::general_purpose::STANDARD.encode(signature))
    }

    fn signature_element(&self, signed_info: &str, signature_value: &str) -> String {
        let mut signature = format!(
            r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
{signed_info}
<ds:SignatureValue>{signature_value}</ds:SignatureValue>"#
        );

        if let Some(cert) = &self.certificate_der {
            let cert_b64 = base64::engine::general_purpose::STANDARD.encode(cert);
            signature.push_str(&format!(
                r#"
<ds:KeyInfo>
<ds:X509Data>
<ds:X509Certificate>{cert_b64}</ds:X509Certificate>
</ds:X509Data>
</ds:KeyInfo>"#
            ));
        }

        signature.push_str("\n</ds:Signature>");
        signature
    }
}

/// Finds the end of the first `Issuer` element in `content`.
fn find_issuer_end(content: &str) -> Option<usize> {
    ["</saml:Issuer>", "</saml2:Issuer>", "</Issuer>"]
        .iter()
        .find_map(|pattern| content.find(pattern).map(|pos| pos + pattern.len()))
}
