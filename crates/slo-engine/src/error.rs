//! Single logout error types.
//!
//! Errors are grouped into the classes reported by [`SloError::kind`].
//! Per-request errors raised while notifying a service provider never leave
//! the dispatcher; they are recorded as a failed request instead.

use slo_protocol_saml::SamlError;
use thiserror::Error;

use crate::metadata::MetadataError;
use crate::transport::TransportError;

/// Result type for single logout operations.
pub type SloResult<T> = Result<T, SloError>;

/// Error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No logout endpoint could be determined.
    Resolution,
    /// The logout message could not be built or signed.
    Build,
    /// The message could not be encoded or decoded.
    Encoding,
    /// Delivery to the service provider failed.
    Transport,
    /// An inbound message failed signature or trust checks.
    Security,
    /// The metadata registry failed.
    Metadata,
    /// The flow-scope store or session layer failed.
    Store,
    /// Invalid configuration.
    Config,
}

/// Single logout errors.
#[derive(Debug, Error)]
pub enum SloError {
    /// No logout endpoint for the service.
    #[error("no logout endpoint for service: {0}")]
    Resolution(String),

    /// The issuer of an inbound message is not a registered service.
    #[error("unknown service provider: {0}")]
    UnknownServiceProvider(String),

    /// The logout message could not be built.
    #[error("failed to build logout message: {0}")]
    Build(String),

    /// Encoding or decoding error.
    #[error("encoding error: {0}")]
    Encoding(SamlError),

    /// Transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Signature or trust failure on an inbound message.
    ///
    /// The message is deliberately generic; details are logged only.
    #[error("logout request rejected")]
    Security(String),

    /// Metadata registry error.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// Flow-scope store error.
    #[error("flow store error: {0}")]
    Store(String),

    /// Session termination error.
    #[error("session termination failed: {0}")]
    Session(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SloError {
    /// Returns the error class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Resolution(_) | Self::UnknownServiceProvider(_) => ErrorKind::Resolution,
            Self::Build(_) => ErrorKind::Build,
            Self::Encoding(_) => ErrorKind::Encoding,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Security(_) => ErrorKind::Security,
            Self::Metadata(_) => ErrorKind::Metadata,
            Self::Store(_) | Self::Session(_) => ErrorKind::Store,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Encoding(err) => err.http_status(),
            Self::Resolution(_) | Self::UnknownServiceProvider(_) => 400,
            Self::Security(_) => 403,
            Self::Transport(_) => 502,
            _ => 500,
        }
    }

    /// Checks if this is a security rejection.
    #[must_use]
    pub const fn is_security(&self) -> bool {
        matches!(self, Self::Security(_))
    }
}

impl From<SamlError> for SloError {
    fn from(err: SamlError) -> Self {
        match err {
            SamlError::SignatureInvalid(reason) => Self::Security(reason),
            SamlError::SignatureCreation(reason) | SamlError::Crypto(reason) => Self::Build(reason),
            other => Self::Encoding(other),
        }
    }
}

impl From<serde_json::Error> for SloError {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(err.to_string())
    }
}
