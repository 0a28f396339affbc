//! URIs used on the wire by logout messages.

use serde::{Deserialize, Serialize};

/// SAML 2.0 assertion namespace.
pub const SAML_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

/// SAML 2.0 protocol namespace.
pub const SAMLP_NS: &str = "urn:oasis:names:tc:SAML:2.0:protocol";

/// SOAP 1.1 envelope namespace.
pub const SOAP11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Namespace of the `<aslo:Asynchronous>` logout extension.
pub const ASYNC_SLO_NS: &str = "urn:oasis:names:tc:SAML:2.0:protocol:ext:async-slo";

/// Name identifier formats a service provider may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameIdFormat {
    /// `unspecified`; resolved from the principal's username.
    #[default]
    Unspecified,
    /// `emailAddress`.
    Email,
    /// `persistent`.
    Persistent,
    /// `transient`; a pairwise opaque identifier.
    Transient,
    /// `entity`.
    Entity,
}

const NAME_ID_FORMATS: [(NameIdFormat, &str); 5] = [
    (
        NameIdFormat::Unspecified,
        "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified",
    ),
    (
        NameIdFormat::Email,
        "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress",
    ),
    (
        NameIdFormat::Persistent,
        "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent",
    ),
    (
        NameIdFormat::Transient,
        "urn:oasis:names:tc:SAML:2.0:nameid-format:transient",
    ),
    (
        NameIdFormat::Entity,
        "urn:oasis:names:tc:SAML:2.0:nameid-format:entity",
    ),
];

impl NameIdFormat {
    /// The format URI written into `<saml:NameID Format="..">`.
    #[must_use]
    pub fn uri(self) -> &'static str {
        NAME_ID_FORMATS
            .iter()
            .find(|(format, _)| *format == self)
            .map_or(NAME_ID_FORMATS[0].1, |(_, uri)| uri)
    }

    /// Looks a format up by URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        NAME_ID_FORMATS
            .iter()
            .find(|(_, known)| *known == uri)
            .map(|(format, _)| *format)
    }
}

/// Top-level status codes.
pub mod status_codes {
    /// The request succeeded.
    pub const SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";
    /// The request could not be performed due to an error on the sender's side.
    pub const REQUESTER: &str = "urn:oasis:names:tc:SAML:2.0:status:Requester";
    /// The request could not be performed due to an error on the responder's side.
    pub const RESPONDER: &str = "urn:oasis:names:tc:SAML:2.0:status:Responder";
}

/// Second-level status codes.
pub mod sub_status_codes {
    /// Not every session participant could be logged out.
    pub const PARTIAL_LOGOUT: &str = "urn:oasis:names:tc:SAML:2.0:status:PartialLogout";
}

/// `Reason` attribute values for logout requests.
pub mod logout_reasons {
    /// The user asked to log out.
    pub const USER: &str = "urn:oasis:names:tc:SAML:2.0:logout:user";
    /// An administrator ended the session.
    pub const ADMIN: &str = "urn:oasis:names:tc:SAML:2.0:logout:admin";
}

/// Signature method URIs.
pub mod signature_algorithms {
    /// `rsa-sha256`.
    pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
    /// `rsa-sha384`.
    pub const RSA_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384";
    /// `rsa-sha512`.
    pub const RSA_SHA512: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512";
}

/// Digest method URIs.
pub mod digest_algorithms {
    /// `sha256`.
    pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
    /// `sha384`.
    pub const SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#sha384";
    /// `sha512`.
    pub const SHA512: &str = "http://www.w3.org/2001/04/xmlenc#sha512";
}

/// Transform URIs of an enveloped signature.
pub mod canonicalization_algorithms {
    /// Exclusive canonicalization, comments dropped.
    pub const EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
    /// Removes the signature from the signed content.
    pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
}
