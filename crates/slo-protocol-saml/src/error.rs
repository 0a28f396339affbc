//! Errors raised while reading, writing, encoding or signing logout
//! messages.

use thiserror::Error;

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// SAML protocol errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// The message parsed but breaks a protocol rule.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// A signature is missing, malformed or does not verify.
    #[error("signature validation failed: {0}")]
    SignatureInvalid(String),

    #[error("signature creation failed: {0}")]
    SignatureCreation(String),

    /// A required element or attribute is absent.
    #[error("missing required element: {0}")]
    MissingElement(String),

    /// Unknown binding URI or a message shape the binding cannot carry.
    #[error("unsupported binding: {0}")]
    UnsupportedBinding(String),

    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    /// Inflating a Redirect payload failed.
    #[error("deflate error: {0}")]
    Deflate(String),

    #[error("empty SAML payload")]
    EmptyPayload,

    /// The decoded message is bigger than the receiver accepts.
    #[error("SAML message exceeds {limit} bytes")]
    MessageTooLarge {
        /// Accepted size in bytes.
        limit: usize,
    },

    /// Key handling failed.
    #[error("crypto error: {0}")]
    Crypto(String),
}

impl SamlError {
    /// HTTP status to answer a peer with when its message caused this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::MessageTooLarge { .. } => 413,
            Self::SignatureInvalid(_) => 401,
            Self::SignatureCreation(_) | Self::Crypto(_) => 500,
            _ => 400,
        }
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for SamlError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64Decode(err.to_string())
    }
}

impl From<slo_crypto::SignatureError> for SamlError {
    fn from(err: slo_crypto::SignatureError) -> Self {
        Self::Crypto(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_errors_map_to_client_statuses() {
        assert_eq!(SamlError::EmptyPayload.http_status(), 400);
        assert_eq!(
            SamlError::SignatureInvalid("bad digest".to_string()).http_status(),
            401
        );

        let err = SamlError::MessageTooLarge { limit: 1024 };
        assert_eq!(err.http_status(), 413);
        assert!(err.to_string().contains("1024"));

        assert_eq!(SamlError::Crypto("no key".to_string()).http_status(), 500);
    }
}
