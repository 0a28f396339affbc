//! SOAP 1.1 binding.
//!
//! Back-channel logout messages are sent as the single child of a SOAP
//! `Body`. No compression or base64 is involved.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{SamlError, SamlResult};
use crate::types::{root_local_name, SOAP11_NS};

use super::{ensure_within_limit, Binding, DecodedMessage, SamlMessageType};

/// SOAP binding encoder/decoder.
pub struct SoapBinding;

impl SoapBinding {
    /// Wraps a SAML message in a SOAP 1.1 envelope.
    ///
    /// Any XML declaration on the message is dropped.
    #[must_use]
    pub fn wrap(xml: &str) -> String {
        let inner = match xml.trim_start().strip_prefix("<?xml") {
            Some(rest) => rest.find("?>").map_or(xml, |end| rest[end + 2..].trim_start()),
            None => xml.trim_start(),
        };
        format!(
            r#"<soap11:Envelope xmlns:soap11="{SOAP11_NS}"><soap11:Body>{inner}</soap11:Body></soap11:Envelope>"#
        )
    }

    /// Extracts the message carried in a SOAP envelope's `Body`.
    pub fn unwrap(envelope: &str) -> SamlResult<String> {
        let mut reader = Reader::from_str(envelope);
        let mut depth = 0usize;
        let mut body_start = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    depth += 1;
                    let local = e.local_name();
                    if depth == 1 && local.as_ref() != b"Envelope" {
                        return Err(SamlError::InvalidRequest(
                            "SOAP message root is not an Envelope".to_string(),
                        ));
                    }
                    if depth == 2 && local.as_ref() == b"Body" {
                        body_start = Some(position(&reader)?);
                    }
                }
                Event::End(e) => {
                    if depth == 2 && e.local_name().as_ref() == b"Body" {
                        let start = body_start.ok_or_else(|| {
                            SamlError::XmlParse("unbalanced SOAP Body".to_string())
                        })?;
                        let after = position(&reader)?;
                        let end = envelope[..after].rfind("</").ok_or_else(|| {
                            SamlError::XmlParse("unbalanced SOAP Body".to_string())
                        })?;
                        let inner = envelope[start..end].trim();
                        if inner.is_empty() {
                            return Err(SamlError::EmptyPayload);
                        }
                        return Ok(inner.to_string());
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Empty(e) => {
                    if depth == 0 {
                        return Err(SamlError::InvalidRequest(
                            "SOAP message root is not an Envelope".to_string(),
                        ));
                    }
                    if depth == 1 && e.local_name().as_ref() == b"Body" {
                        return Err(SamlError::EmptyPayload);
                    }
                }
                Event::Eof => {
                    return Err(SamlError::MissingElement("soap11:Body".to_string()));
                }
                _ => {}
            }
        }
    }

    /// Decodes a SOAP request body into its logout message.
    pub fn decode(body: &str, max_size: usize) -> SamlResult<DecodedMessage> {
        ensure_within_limit(body.len(), max_size)?;
        if body.trim().is_empty() {
            return Err(SamlError::EmptyPayload);
        }

        let xml = Self::unwrap(body)?;
        let message_type = match root_local_name(&xml)?.as_str() {
            "LogoutRequest" => SamlMessageType::Request,
            "LogoutResponse" => SamlMessageType::Response,
            other => {
                return Err(SamlError::InvalidRequest(format!(
                    "Unexpected SOAP payload: {other}"
                )))
            }
        };

        Ok(DecodedMessage {
            binding: Binding::Soap,
            xml,
            message_type,
            relay_state: None,
            signature: None,
            sig_alg: None,
            signed_query: None,
        })
    }
}

fn position(reader: &Reader<&[u8]>) -> SamlResult<usize> {
    usize::try_from(reader.buffer_position())
        .map_err(|_| SamlError::XmlParse("document too large".to_string()))
}
