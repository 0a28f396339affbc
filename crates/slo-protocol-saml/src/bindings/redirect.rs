//! HTTP-Redirect Binding implementation.
//!
//! Implements the SAML 2.0 HTTP-Redirect binding for sending SAML messages
//! via URL query parameters with DEFLATE compression.

use std::io::Write;

use base64::Engine;
use flate2::write::DeflateEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};

use crate::error::{SamlError, SamlResult};
use crate::signature::{remove_enveloped_signature, XmlSigner};

use super::{ensure_within_limit, Binding, DecodedMessage, SamlMessageType};

/// HTTP-Redirect binding encoder/decoder.
pub struct HttpRedirectBinding;

impl HttpRedirectBinding {
    /// Encodes a message for HTTP-Redirect binding.
    ///
    /// Returns a URL with the encoded message in query parameters. With a
    /// signer, the query carries `SigAlg` and `Signature` and the XML itself
    /// is sent without its enveloped signature.
    pub fn encode(
        xml: &str,
        destination: &str,
        message_type: SamlMessageType,
        relay_state: Option<&str>,
        signer: Option<&XmlSigner>,
    ) -> SamlResult<String> {
        let xml = match signer {
            Some(_) => remove_enveloped_signature(xml),
            None => xml.to_string(),
        };

        let compressed = deflate_compress(xml.as_bytes())?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&compressed);

        let mut query = format!(
            "{}={}",
            message_type.form_param(),
            urlencoding::encode(&encoded)
        );

        if let Some(rs) = relay_state {
            query.push_str(&format!("&RelayState={}", urlencoding::encode(rs)));
        }

        if let Some(signer) = signer {
            query.push_str(&format!(
                "&SigAlg={}",
                urlencoding::encode(signer.algorithm().uri())
            ));
            let signature = signer.sign_redirect_query(&query)?;
            query.push_str(&format!("&Signature={}", urlencoding::encode(&signature)));
        }

        let separator = if destination.contains('?') { '&' } else { '?' };
        Ok(format!("{destination}{separator}{query}"))
    }

    /// Decodes a message from a raw HTTP-Redirect query string.
    ///
    /// The query must be passed exactly as received so that a detached
    /// signature can be verified over the original encoding. Each parameter
    /// may appear only once, and the signed portion is rebuilt from the very
    /// pairs that were decoded.
    pub fn decode(query: &str, max_size: usize) -> SamlResult<DecodedMessage> {
        let query = query.strip_prefix('?').unwrap_or(query);
        let params = RedirectParams::parse(query)?;

        let Some((message, message_type)) = &params.message else {
            return Err(SamlError::InvalidRequest(
                "No SAMLRequest or SAMLResponse parameter".to_string(),
            ));
        };
        let (encoded, message_type) = (message.value.as_str(), *message_type);
        if encoded.is_empty() {
            return Err(SamlError::EmptyPayload);
        }

        let compressed = base64::engine::general_purpose::STANDARD.decode(encoded.as_bytes())?;
        if compressed.is_empty() {
            return Err(SamlError::EmptyPayload);
        }

        let xml_bytes = deflate_decompress(&compressed, max_size)?;
        let xml = String::from_utf8(xml_bytes)
            .map_err(|e| SamlError::InvalidRequest(format!("Invalid UTF-8 in message: {e}")))?;
        if xml.trim().is_empty() {
            return Err(SamlError::EmptyPayload);
        }

        let signed_query = params.signature.as_ref().map(|_| params.signed_portion());

        Ok(DecodedMessage {
            binding: Binding::Redirect,
            xml,
            message_type,
            relay_state: params.relay_state.map(|p| p.value),
            signature: params.signature.map(|p| p.value),
            sig_alg: params.sig_alg.map(|p| p.value),
            signed_query,
        })
    }

    /// Decodes a message from a full URL.
    pub fn decode_url(url: &str, max_size: usize) -> SamlResult<DecodedMessage> {
        let parsed = url::Url::parse(url)
            .map_err(|e| SamlError::InvalidRequest(format!("Invalid URL: {e}")))?;
        Self::decode(parsed.query().unwrap_or_default(), max_size)
    }
}

/// One query parameter: its decoded value and the pair as received.
struct QueryParam<'a> {
    raw: &'a str,
    value: String,
}

/// The parameters of a redirect query that carry meaning.
#[derive(Default)]
struct RedirectParams<'a> {
    message: Option<(QueryParam<'a>, SamlMessageType)>,
    relay_state: Option<QueryParam<'a>>,
    sig_alg: Option<QueryParam<'a>>,
    signature: Option<QueryParam<'a>>,
}

impl<'a> RedirectParams<'a> {
    fn parse(query: &'a str) -> SamlResult<Self> {
        let mut params = Self::default();
        for raw in query.split('&').filter(|pair| !pair.is_empty()) {
            let Some((key, value)) = url::form_urlencoded::parse(raw.as_bytes()).next() else {
                continue;
            };
            let param = QueryParam {
                raw,
                value: value.into_owned(),
            };
            let slot = match key.as_ref() {
                "RelayState" => &mut params.relay_state,
                "SigAlg" => &mut params.sig_alg,
                "Signature" => &mut params.signature,
                other => match SamlMessageType::from_param(other) {
                    Some(message_type) => {
                        if params.message.is_some() {
                            return Err(duplicate_param("message"));
                        }
                        params.message = Some((param, message_type));
                        continue;
                    }
                    None => continue,
                },
            };
            if slot.is_some() {
                return Err(duplicate_param(&key));
            }
            *slot = Some(param);
        }
        Ok(params)
    }

    /// The raw pairs covered by a detached signature, in the order message,
    /// `RelayState`, `SigAlg`.
    fn signed_portion(&self) -> String {
        [
            self.message.as_ref().map(|(param, _)| param),
            self.relay_state.as_ref(),
            self.sig_alg.as_ref(),
        ]
        .into_iter()
        .flatten()
        .map(|param| param.raw)
        .collect::<Vec<_>>()
        .join("&")
    }
}

fn duplicate_param(name: &str) -> SamlError {
    SamlError::InvalidRequest(format!("Repeated {name} parameter in redirect query"))
}

/// Compresses data using DEFLATE (raw, no zlib header).
fn deflate_compress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SamlError::Deflate(format!("Compression error: {e}")))?;
    encoder
        .finish()
        .map_err(|e| SamlError::Deflate(format!("Compression finish error: {e}")))
}

/// Decompresses raw DEFLATE data.
///
/// The stream must end exactly at the end of `data`; truncated streams and
/// trailing bytes are errors. Output beyond `max_size` is rejected.
fn deflate_decompress(data: &[u8], max_size: usize) -> SamlResult<Vec<u8>> {
    const CHUNK: usize = 8 * 1024;

    let mut decompress = Decompress::new(false);
    let mut output = Vec::with_capacity(CHUNK);

    loop {
        if output.len() == output.capacity() {
            output.reserve(CHUNK);
        }

        let in_before = decompress.total_in();
        let out_before = decompress.total_out();
        let offset = usize::try_from(in_before)
            .map_err(|_| SamlError::Deflate("input offset overflow".to_string()))?;

        let status = decompress
            .decompress_vec(&data[offset..], &mut output, FlushDecompress::Finish)
            .map_err(|e| SamlError::Deflate(format!("Decompression error: {e}")))?;

        ensure_within_limit(output.len(), max_size)?;

        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                if decompress.total_in() == in_before && decompress.total_out() == out_before {
                    return Err(SamlError::Deflate(
                        "truncated DEFLATE stream".to_string(),
                    ));
                }
            }
        }
    }

    if usize::try_from(decompress.total_in()).ok() != Some(data.len()) {
        return Err(SamlError::Deflate(
            "trailing data after DEFLATE stream".to_string(),
        ));
    }

    Ok(output)
}
