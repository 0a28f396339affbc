//! `<saml:NameID>`: who a logout message is about.

use serde::{Deserialize, Serialize};

use super::NameIdFormat;

/// The subject of a logout message, as the receiving party knows it.
///
/// The value is scoped to one service provider: the same principal may be
/// `casuser` to one service and an opaque transient handle to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameId {
    /// Identifier text.
    pub value: String,

    /// `Format` attribute, kept as the raw URI so unknown formats survive a
    /// parse and re-serialize.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// `NameQualifier` attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_qualifier: Option<String>,

    /// `SPNameQualifier` attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_name_qualifier: Option<String>,
}

impl NameId {
    /// A name identifier without a format.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            format: None,
            name_qualifier: None,
            sp_name_qualifier: None,
        }
    }

    /// A `persistent` name identifier.
    #[must_use]
    pub fn persistent(value: impl Into<String>) -> Self {
        Self::new(value).with_format(NameIdFormat::Persistent)
    }

    #[must_use]
    pub fn with_format(mut self, format: NameIdFormat) -> Self {
        self.format = Some(format.uri().to_string());
        self
    }

    #[must_use]
    pub fn with_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.name_qualifier = Some(qualifier.into());
        self
    }

    #[must_use]
    pub fn with_sp_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.sp_name_qualifier = Some(qualifier.into());
        self
    }

    /// The format as a known variant; absent or unrecognised URIs read as
    /// `unspecified`.
    #[must_use]
    pub fn parsed_format(&self) -> NameIdFormat {
        self.format
            .as_deref()
            .and_then(NameIdFormat::from_uri)
            .unwrap_or_default()
    }
}

impl std::fmt::Display for NameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}
