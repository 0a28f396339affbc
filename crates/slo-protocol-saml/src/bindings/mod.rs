//! SAML bindings implementation.
//!
//! This module implements the SAML 2.0 bindings used for logout messages:
//!
//! - **HTTP-Redirect Binding** - Messages are deflated, base64-encoded, and URL-encoded
//! - **HTTP-POST Binding** - Messages are base64-encoded and sent in HTML forms
//! - **SOAP Binding** - Messages are wrapped in a SOAP 1.1 envelope for back-channel calls
//!
//! [`Binding`] is the single dispatch point: callers never pick a codec
//! directly.
//!
//! # Usage
//!
//! ```rust,ignore
//! use slo_protocol_saml::{Binding, SamlMessageType};
//!
//! let encoded = Binding::Redirect.encode(
//!     &request_xml,
//!     "https://sp.example.com/slo",
//!     SamlMessageType::Request,
//!     Some("relay_state"),
//!     None,
//! )?;
//! let decoded = Binding::Redirect.decode(&encoded.as_wire(), DEFAULT_MAX_MESSAGE_SIZE)?;
//! ```

mod post;
mod redirect;
mod soap;

pub use post::*;
pub use redirect::*;
pub use soap::*;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSigner;

/// Default upper bound for a decoded message, in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 512 * 1024;

/// SAML binding URIs.
pub mod binding_uris {
    /// HTTP-Redirect binding.
    pub const HTTP_REDIRECT: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect";
    /// HTTP-POST binding.
    pub const HTTP_POST: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";
    /// SOAP binding.
    pub const SOAP: &str = "urn:oasis:names:tc:SAML:2.0:bindings:SOAP";
}

/// SAML message type for binding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamlMessageType {
    /// `LogoutRequest` message.
    Request,
    /// `LogoutResponse` message.
    Response,
    /// Logout request for a non-federated service, sent as `logoutRequest`.
    PlainLogoutRequest,
}

impl SamlMessageType {
    /// Returns the form parameter name for this message type.
    #[must_use]
    pub const fn form_param(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
            Self::PlainLogoutRequest => "logoutRequest",
        }
    }

    fn from_param(name: &str) -> Option<Self> {
        match name {
            "SAMLRequest" => Some(Self::Request),
            "SAMLResponse" => Some(Self::Response),
            "logoutRequest" => Some(Self::PlainLogoutRequest),
            _ => None,
        }
    }
}

/// A SAML binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Binding {
    /// HTTP-Redirect binding (front-channel).
    Redirect,
    /// HTTP-POST binding.
    Post,
    /// SOAP binding (back-channel only).
    Soap,
}

impl Binding {
    /// Returns the binding URI.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::Redirect => binding_uris::HTTP_REDIRECT,
            Self::Post => binding_uris::HTTP_POST,
            Self::Soap => binding_uris::SOAP,
        }
    }

    /// Parses a binding from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            binding_uris::HTTP_REDIRECT => Some(Self::Redirect),
            binding_uris::HTTP_POST => Some(Self::Post),
            binding_uris::SOAP => Some(Self::Soap),
            _ => None,
        }
    }

    /// Encodes a message for this binding.
    ///
    /// When `signer` is given and the binding is Redirect, the embedded
    /// signature is replaced by a detached signature over the query string.
    /// Other bindings carry the message exactly as given, so any signature
    /// applied beforehand is preserved.
    pub fn encode(
        self,
        xml: &str,
        destination: &str,
        message_type: SamlMessageType,
        relay_state: Option<&str>,
        signer: Option<&XmlSigner>,
    ) -> SamlResult<EncodedMessage> {
        if xml.trim().is_empty() {
            return Err(SamlError::EmptyPayload);
        }

        match self {
            Self::Redirect => {
                let url = HttpRedirectBinding::encode(
                    xml,
                    destination,
                    message_type,
                    relay_state,
                    signer,
                )?;
                Ok(EncodedMessage::Redirect { url })
            }
            Self::Post => Ok(EncodedMessage::Post(HttpPostBinding::encode(
                xml,
                destination,
                message_type,
                relay_state,
            ))),
            Self::Soap => {
                if message_type == SamlMessageType::PlainLogoutRequest {
                    return Err(SamlError::UnsupportedBinding(
                        "SOAP cannot carry a plain logout request".to_string(),
                    ));
                }
                Ok(EncodedMessage::Soap {
                    endpoint: destination.to_string(),
                    body: SoapBinding::wrap(xml),
                })
            }
        }
    }

    /// Decodes a message received over this binding.
    ///
    /// `max_size` bounds the decoded XML length in bytes.
    pub fn decode(self, wire: &WireMessage<'_>, max_size: usize) -> SamlResult<DecodedMessage> {
        match (self, wire) {
            (Self::Redirect, WireMessage::Query(query)) => {
                HttpRedirectBinding::decode(query, max_size)
            }
            (Self::Post, WireMessage::Form(fields)) => HttpPostBinding::decode(fields, max_size),
            (Self::Soap, WireMessage::Body(body)) => SoapBinding::decode(body, max_size),
            (binding, wire) => Err(SamlError::UnsupportedBinding(format!(
                "{binding} cannot decode a {} message",
                wire.binding()
            ))),
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Redirect => "REDIRECT",
            Self::Post => "POST",
            Self::Soap => "SOAP",
        })
    }
}

impl FromStr for Binding {
    type Err = SamlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(binding) = Self::from_uri(s) {
            return Ok(binding);
        }
        match s.trim().to_ascii_uppercase().as_str() {
            "REDIRECT" | "HTTP-REDIRECT" => Ok(Self::Redirect),
            "POST" | "HTTP-POST" => Ok(Self::Post),
            "SOAP" => Ok(Self::Soap),
            _ => Err(SamlError::UnsupportedBinding(s.to_string())),
        }
    }
}

/// A message as received from the transport.
#[derive(Debug, Clone, Copy)]
pub enum WireMessage<'a> {
    /// Raw (still URL-encoded) query string of a GET request.
    Query(&'a str),
    /// Decoded form fields of a POST request.
    Form(&'a [(String, String)]),
    /// Raw body of a SOAP request.
    Body(&'a str),
}

impl WireMessage<'_> {
    /// Returns the binding implied by the transport shape.
    #[must_use]
    pub const fn binding(&self) -> Binding {
        match self {
            Self::Query(_) => Binding::Redirect,
            Self::Form(_) => Binding::Post,
            Self::Body(_) => Binding::Soap,
        }
    }
}

/// An encoded message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "binding", rename_all = "UPPERCASE")]
pub enum EncodedMessage {
    /// A URL the user agent is redirected to.
    Redirect {
        /// Destination URL including the encoded query.
        url: String,
    },
    /// Form fields posted to the destination.
    Post(PostForm),
    /// A SOAP envelope posted server-to-server.
    Soap {
        /// The SOAP endpoint.
        endpoint: String,
        /// The SOAP envelope.
        body: String,
    },
}

impl EncodedMessage {
    /// Returns the binding this message was encoded for.
    #[must_use]
    pub const fn binding(&self) -> Binding {
        match self {
            Self::Redirect { .. } => Binding::Redirect,
            Self::Post(_) => Binding::Post,
            Self::Soap { .. } => Binding::Soap,
        }
    }

    /// Returns the destination the message is addressed to.
    #[must_use]
    pub fn destination(&self) -> &str {
        match self {
            Self::Redirect { url } => url.split_once('?').map_or(url.as_str(), |(base, _)| base),
            Self::Post(form) => &form.action,
            Self::Soap { endpoint, .. } => endpoint,
        }
    }

    /// Views the encoded message the way a receiver's transport would see it.
    #[must_use]
    pub fn as_wire(&self) -> WireMessage<'_> {
        match self {
            Self::Redirect { url } => {
                WireMessage::Query(url.split_once('?').map_or("", |(_, query)| query))
            }
            Self::Post(form) => WireMessage::Form(&form.fields),
            Self::Soap { body, .. } => WireMessage::Body(body),
        }
    }
}

/// Decoded SAML binding message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    /// The binding the message arrived over.
    pub binding: Binding,
    /// The decoded XML message.
    pub xml: String,
    /// The message type (request or response).
    pub message_type: SamlMessageType,
    /// The RelayState if present.
    pub relay_state: Option<String>,
    /// The detached signature (Redirect binding only).
    pub signature: Option<String>,
    /// The detached signature algorithm (Redirect binding only).
    pub sig_alg: Option<String>,
    /// The raw query portion covered by the detached signature.
    pub signed_query: Option<String>,
}

fn ensure_within_limit(len: usize, max_size: usize) -> SamlResult<()> {
    if len > max_size {
        return Err(SamlError::MessageTooLarge { limit: max_size });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use slo_crypto::RsaSigningKey;

    use super::*;
    use crate::signature::{VerificationCredential, XmlSignatureValidator};
    use crate::types::{LogoutRequest, NameId};

    fn request_xml() -> String {
        LogoutRequest::new("https://sso.example.org", NameId::persistent("abc-123"))
            .with_destination("https://sp.example.org/slo")
            .with_session_index("ST-1-abc")
            .to_xml()
    }

    #[test]
    fn redirect_and_post_roundtrip_byte_for_byte() {
        let xml = request_xml();
        for binding in [Binding::Redirect, Binding::Post] {
            let encoded = binding
                .encode(
                    &xml,
                    "https://sp.example.org/slo",
                    SamlMessageType::Request,
                    Some("relay+state/&="),
                    None,
                )
                .unwrap();
            assert_eq!(encoded.binding(), binding);

            let decoded = binding
                .decode(&encoded.as_wire(), DEFAULT_MAX_MESSAGE_SIZE)
                .unwrap();
            assert_eq!(decoded.xml, xml);
            assert_eq!(decoded.binding, binding);
            assert_eq!(decoded.message_type, SamlMessageType::Request);
            assert_eq!(decoded.relay_state.as_deref(), Some("relay+state/&="));
        }
    }

    #[test]
    fn soap_roundtrip() {
        let xml = request_xml();
        let encoded = Binding::Soap
            .encode(&xml, "https://sp.example.org/soap", SamlMessageType::Request, None, None)
            .unwrap();

        let decoded = Binding::Soap
            .decode(&encoded.as_wire(), DEFAULT_MAX_MESSAGE_SIZE)
            .unwrap();
        assert_eq!(decoded.xml, xml);
        assert_eq!(decoded.message_type, SamlMessageType::Request);
        assert_eq!(encoded.destination(), "https://sp.example.org/soap");
    }

    #[test]
    fn empty_payload_is_rejected() {
        for binding in [Binding::Redirect, Binding::Post, Binding::Soap] {
            let result = binding.encode("  ", "https://sp", SamlMessageType::Request, None, None);
            assert!(matches!(result, Err(SamlError::EmptyPayload)));
        }
    }

    #[test]
    fn plain_logout_request_over_soap_is_unsupported() {
        let result = Binding::Soap.encode(
            "<samlp:LogoutRequest/>",
            "https://app.example.org",
            SamlMessageType::PlainLogoutRequest,
            None,
            None,
        );
        assert!(matches!(result, Err(SamlError::UnsupportedBinding(_))));
    }

    #[test]
    fn mismatched_transport_is_rejected() {
        let result = Binding::Post.decode(&WireMessage::Query("SAMLRequest=abc"), 1024);
        assert!(matches!(result, Err(SamlError::UnsupportedBinding(_))));
    }

    #[test]
    fn embedded_signature_survives_post_encoding() {
        let signer = XmlSigner::new(RsaSigningKey::generate().unwrap(), None);
        let request = LogoutRequest::new("https://sso.example.org", NameId::persistent("abc"));
        let signed = signer.sign(&request.to_xml(), &request.id).unwrap();

        let encoded = Binding::Post
            .encode(&signed, "https://sp", SamlMessageType::Request, None, Some(&signer))
            .unwrap();
        let decoded = Binding::Post.decode(&encoded.as_wire(), DEFAULT_MAX_MESSAGE_SIZE).unwrap();
        assert_eq!(decoded.xml, signed);
    }

    #[test]
    fn redirect_detached_signature_verifies() {
        let signer = XmlSigner::new(RsaSigningKey::generate().unwrap(), None);
        let validator = XmlSignatureValidator::new(vec![VerificationCredential::PublicKey(
            signer.public_key_der(),
        )]);
        let request = LogoutRequest::new("https://sso.example.org", NameId::persistent("abc"));
        let signed = signer.sign(&request.to_xml(), &request.id).unwrap();

        let encoded = Binding::Redirect
            .encode(&signed, "https://sp/slo", SamlMessageType::Request, Some("rs"), Some(&signer))
            .unwrap();
        let decoded = Binding::Redirect
            .decode(&encoded.as_wire(), DEFAULT_MAX_MESSAGE_SIZE)
            .unwrap();

        assert!(!crate::signature::has_enveloped_signature(&decoded.xml));
        assert_eq!(decoded.xml, request.to_xml());
        let signed_query = decoded.signed_query.as_deref().unwrap();
        assert!(signed_query.starts_with("SAMLRequest="));
        assert!(!signed_query.contains("Signature="));
        validator
            .validate_redirect_binding(
                signed_query,
                decoded.signature.as_deref().unwrap(),
                decoded.sig_alg.as_deref().unwrap(),
            )
            .unwrap();
    }

    #[test]
    fn binding_parsing() {
        assert_eq!("post".parse::<Binding>().unwrap(), Binding::Post);
        assert_eq!(
            binding_uris::HTTP_REDIRECT.parse::<Binding>().unwrap(),
            Binding::Redirect
        );
        assert_eq!(Binding::Soap.to_string(), "SOAP");
        assert!("ARTIFACT".parse::<Binding>().is_err());
    }
}
