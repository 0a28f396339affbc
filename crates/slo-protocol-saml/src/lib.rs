//! SAML 2.0 Single Logout protocol support.
//!
//! This crate provides the wire-level half of the single logout engine:
//!
//! - **Logout messages** - `LogoutRequest` / `LogoutResponse` with deterministic
//!   XML serialization and bounded parsing
//! - **XML signature** - Enveloped XML-DSig signing and validation
//! - **Bindings** - HTTP-Redirect (DEFLATE), HTTP-POST (Base64) and SOAP 1.1
//!   codecs behind a single [`Binding`] dispatch point
//! - **Errors** - [`SamlError`] with SAML status code mapping
//!
//! # Example
//!
//! ```rust,ignore
//! use slo_protocol_saml::{Binding, LogoutRequest, NameId, SamlMessageType};
//!
//! let request = LogoutRequest::new("https://idp.example.org", NameId::persistent("abc"))
//!     .with_destination("https://sp.example.org/slo");
//! let xml = request.to_xml();
//! let encoded = Binding::Post.encode(&xml, "https://sp.example.org/slo", SamlMessageType::Request, None, None)?;
//! ```
//!
//! # SAML Specifications
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [SAML 2.0 Asynchronous SLO Extension](https://docs.oasis-open.org/security/saml/Post2.0/saml-async-slo/v1.0/saml-async-slo-v1.0.html)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bindings;
pub mod error;
pub mod signature;
pub mod types;

pub use bindings::{
    Binding, DecodedMessage, EncodedMessage, PostForm, SamlMessageType, WireMessage,
    DEFAULT_MAX_MESSAGE_SIZE,
};
pub use error::{SamlError, SamlResult};
pub use signature::{
    SignatureAlgorithm, VerificationCredential, XmlSignature, XmlSignatureValidator, XmlSigner,
};
pub use types::*;
