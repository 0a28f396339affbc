//! SAML Logout types.
//!
//! Single Logout (SLO) request and response messages with their XML form.
//!
//! Serialization is deterministic: the same unmodified message always
//! produces the same bytes. Timestamps are written with second precision and
//! attributes and elements always appear in the same order. Parsing is bounded
//! by the length limits below and ignores enveloped `<ds:Signature>` content,
//! which is checked separately by the signature validator.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};

use super::{NameId, Status, StatusCode, ASYNC_SLO_NS, SAMLP_NS, SAML_NS};

/// Maximum length of a message `ID` attribute.
pub const MAX_ID_LENGTH: usize = 256;

/// Maximum length of an `Issuer` value.
pub const MAX_ISSUER_LENGTH: usize = 1024;

/// Maximum length of a `NameID` value.
pub const MAX_NAME_ID_LENGTH: usize = 4096;

/// Maximum length of a `SessionIndex` value.
pub const MAX_SESSION_INDEX_LENGTH: usize = 256;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// SAML Logout Request.
///
/// A request to terminate an existing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutRequest {
    /// Unique identifier for this request.
    pub id: String,

    /// Version of the SAML protocol (always "2.0").
    #[serde(default = "default_version")]
    pub version: String,

    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the requester.
    pub issuer: String,

    /// The URL where this request was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// The name identifier of the principal to log out.
    pub name_id: NameId,

    /// Session indexes to terminate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub session_indexes: Vec<String>,

    /// Reason for the logout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Time after which the request is no longer valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// Whether the requester asked for no response (`aslo:Asynchronous`).
    #[serde(default)]
    pub asynchronous: bool,
}

fn default_version() -> String {
    "2.0".to_string()
}

impl LogoutRequest {
    /// Creates a new logout request with a fresh random ID.
    #[must_use]
    pub fn new(issuer: impl Into<String>, name_id: NameId) -> Self {
        Self {
            id: slo_crypto::generate_message_id(),
            version: default_version(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            destination: None,
            name_id,
            session_indexes: Vec::new(),
            reason: None,
            not_on_or_after: None,
            asynchronous: false,
        }
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Adds a session index to terminate.
    #[must_use]
    pub fn with_session_index(mut self, index: impl Into<String>) -> Self {
        self.session_indexes.push(index.into());
        self
    }

    /// Sets the logout reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the issue instant.
    #[must_use]
    pub fn with_issue_instant(mut self, instant: DateTime<Utc>) -> Self {
        self.issue_instant = instant;
        self
    }

    /// Sets the time after which the request is no longer valid.
    #[must_use]
    pub fn with_not_on_or_after(mut self, instant: DateTime<Utc>) -> Self {
        self.not_on_or_after = Some(instant);
        self
    }

    /// Marks the request as asynchronous (no response expected).
    #[must_use]
    pub const fn asynchronous(mut self, asynchronous: bool) -> Self {
        self.asynchronous = asynchronous;
        self
    }

    /// Validates the basic structure of this request.
    pub fn validate(&self) -> SamlResult<()> {
        check_header(&self.id, &self.version, &self.issuer)?;
        if self.name_id.value.trim().is_empty() {
            return Err(SamlError::MissingElement("NameID".to_string()));
        }
        check_length("NameID", &self.name_id.value, MAX_NAME_ID_LENGTH)?;
        for index in &self.session_indexes {
            check_length("SessionIndex", index, MAX_SESSION_INDEX_LENGTH)?;
        }
        Ok(())
    }

    /// Checks if the request has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.not_on_or_after.is_some_and(|not_after| now >= not_after)
    }

    /// Serializes this request to its canonical XML form.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut xml = format!(
            r#"<samlp:LogoutRequest xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="{}" Version="{}" IssueInstant="{}""#,
            escape(self.id.as_str()),
            escape(self.version.as_str()),
            format_instant(self.issue_instant),
        );
        if let Some(destination) = &self.destination {
            xml.push_str(&format!(r#" Destination="{}""#, escape(destination.as_str())));
        }
        if let Some(not_on_or_after) = self.not_on_or_after {
            xml.push_str(&format!(
                r#" NotOnOrAfter="{}""#,
                format_instant(not_on_or_after)
            ));
        }
        if let Some(reason) = &self.reason {
            xml.push_str(&format!(r#" Reason="{}""#, escape(reason.as_str())));
        }
        xml.push('>');

        xml.push_str(&issuer_xml(&self.issuer));
        if self.asynchronous {
            xml.push_str(&format!(
                r#"<samlp:Extensions><aslo:Asynchronous xmlns:aslo="{ASYNC_SLO_NS}"/></samlp:Extensions>"#
            ));
        }
        xml.push_str(&name_id_xml(&self.name_id));
        for index in &self.session_indexes {
            xml.push_str(&format!(
                "<samlp:SessionIndex>{}</samlp:SessionIndex>",
                escape(index.as_str())
            ));
        }
        xml.push_str("</samlp:LogoutRequest>");
        xml
    }

    /// Parses a logout request from XML.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a well-formed `LogoutRequest`,
    /// a required element is missing, or a field exceeds its length limit.
    pub fn from_xml(xml: &str) -> SamlResult<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut header: Option<Header> = None;
        let mut issuer = None;
        let mut name_id: Option<NameId> = None;
        let mut session_indexes = Vec::new();
        let mut asynchronous = false;
        let mut field = Field::None;
        let mut skip_depth = 0usize;

        let mut scope = RootScope::default();

        loop {
            let event = reader.read_event()?;
            scope.observe(&event)?;
            match event {
                Event::Start(e) => {
                    if skip_depth > 0 {
                        skip_depth += 1;
                        continue;
                    }
                    match e.local_name().as_ref() {
                        b"LogoutRequest" if header.is_none() => header = Some(Header::parse(&e)?),
                        _ if header.is_none() => return Err(unexpected_root("LogoutRequest")),
                        b"Signature" => skip_depth = 1,
                        b"Issuer" => field = Field::Issuer,
                        b"NameID" => {
                            name_id = Some(parse_name_id(&e)?);
                            field = Field::NameId;
                        }
                        b"SessionIndex" => field = Field::SessionIndex,
                        _ => {}
                    }
                }
                Event::Empty(e) => {
                    if skip_depth > 0 {
                        continue;
                    }
                    match e.local_name().as_ref() {
                        b"LogoutRequest" if header.is_none() => header = Some(Header::parse(&e)?),
                        _ if header.is_none() => return Err(unexpected_root("LogoutRequest")),
                        b"Asynchronous" => asynchronous = true,
                        b"NameID" => name_id = Some(parse_name_id(&e)?),
                        _ => {}
                    }
                }
                Event::Text(t) => {
                    if skip_depth > 0 {
                        continue;
                    }
                    let text = t.unescape()?.into_owned();
                    match field {
                        Field::Issuer => issuer = Some(text),
                        Field::NameId => {
                            if let Some(name_id) = name_id.as_mut() {
                                name_id.value = text;
                            }
                        }
                        Field::SessionIndex => session_indexes.push(text),
                        _ => {}
                    }
                }
                Event::End(_) => {
                    skip_depth = skip_depth.saturating_sub(1);
                    field = Field::None;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let header = header.ok_or_else(|| unexpected_root("LogoutRequest"))?;
        let request = Self {
            id: header.required("ID")?,
            version: header.required("Version")?,
            issue_instant: header.required_instant("IssueInstant")?,
            issuer: issuer.ok_or_else(|| SamlError::MissingElement("Issuer".to_string()))?,
            destination: header.optional("Destination"),
            name_id: name_id.ok_or_else(|| SamlError::MissingElement("NameID".to_string()))?,
            session_indexes,
            reason: header.optional("Reason"),
            not_on_or_after: header.optional_instant("NotOnOrAfter")?,
            asynchronous,
        };
        request.validate()?;
        Ok(request)
    }
}

/// SAML Logout Response.
///
/// A response to a logout request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutResponse {
    /// Unique identifier for this response.
    pub id: String,

    /// Version of the SAML protocol (always "2.0").
    #[serde(default = "default_version")]
    pub version: String,

    /// Timestamp when this response was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the responder.
    pub issuer: String,

    /// The ID of the request this response is for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// The URL where this response was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// The status of the response.
    pub status: Status,
}

impl LogoutResponse {
    /// Creates a new logout response with the given status.
    #[must_use]
    pub fn new(issuer: impl Into<String>, status: Status) -> Self {
        Self {
            id: slo_crypto::generate_message_id(),
            version: default_version(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            in_response_to: None,
            destination: None,
            status,
        }
    }

    /// Creates a new success logout response.
    #[must_use]
    pub fn success(issuer: impl Into<String>) -> Self {
        Self::new(issuer, Status::success())
    }

    /// Creates a partial logout response.
    #[must_use]
    pub fn partial_logout(issuer: impl Into<String>) -> Self {
        Self::new(issuer, Status::partial_logout())
    }

    /// Sets the request ID this response is for.
    #[must_use]
    pub fn in_response_to(mut self, request_id: impl Into<String>) -> Self {
        self.in_response_to = Some(request_id.into());
        self
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Sets the issue instant.
    #[must_use]
    pub fn with_issue_instant(mut self, instant: DateTime<Utc>) -> Self {
        self.issue_instant = instant;
        self
    }

    /// Returns true if this response indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Validates the basic structure of this response.
    pub fn validate(&self) -> SamlResult<()> {
        check_header(&self.id, &self.version, &self.issuer)?;
        if let Some(in_response_to) = &self.in_response_to {
            check_length("InResponseTo", in_response_to, MAX_ID_LENGTH)?;
        }
        Ok(())
    }

    /// Serializes this response to its canonical XML form.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut xml = format!(
            r#"<samlp:LogoutResponse xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="{}" Version="{}" IssueInstant="{}""#,
            escape(self.id.as_str()),
            escape(self.version.as_str()),
            format_instant(self.issue_instant),
        );
        if let Some(destination) = &self.destination {
            xml.push_str(&format!(r#" Destination="{}""#, escape(destination.as_str())));
        }
        if let Some(in_response_to) = &self.in_response_to {
            xml.push_str(&format!(
                r#" InResponseTo="{}""#,
                escape(in_response_to.as_str())
            ));
        }
        xml.push('>');

        xml.push_str(&issuer_xml(&self.issuer));
        xml.push_str("<samlp:Status>");
        xml.push_str(&status_code_xml(&self.status.status_code));
        if let Some(message) = &self.status.status_message {
            xml.push_str(&format!(
                "<samlp:StatusMessage>{}</samlp:StatusMessage>",
                escape(message.as_str())
            ));
        }
        xml.push_str("</samlp:Status></samlp:LogoutResponse>");
        xml
    }

    /// Parses a logout response from XML.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a well-formed `LogoutResponse`
    /// or a required element is missing.
    pub fn from_xml(xml: &str) -> SamlResult<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut header: Option<Header> = None;
        let mut issuer = None;
        let mut codes: Vec<String> = Vec::new();
        let mut status_message = None;
        let mut field = Field::None;
        let mut skip_depth = 0usize;

        let mut scope = RootScope::default();

        loop {
            let event = reader.read_event()?;
            scope.observe(&event)?;
            match event {
                Event::Start(e) => {
                    if skip_depth > 0 {
                        skip_depth += 1;
                        continue;
                    }
                    match e.local_name().as_ref() {
                        b"LogoutResponse" if header.is_none() => header = Some(Header::parse(&e)?),
                        _ if header.is_none() => return Err(unexpected_root("LogoutResponse")),
                        b"Signature" => skip_depth = 1,
                        b"Issuer" => field = Field::Issuer,
                        b"StatusCode" => codes.push(Header::parse(&e)?.required("Value")?),
                        b"StatusMessage" => field = Field::StatusMessage,
                        _ => {}
                    }
                }
                Event::Empty(e) => {
                    if skip_depth > 0 {
                        continue;
                    }
                    match e.local_name().as_ref() {
                        b"LogoutResponse" if header.is_none() => header = Some(Header::parse(&e)?),
                        _ if header.is_none() => return Err(unexpected_root("LogoutResponse")),
                        b"StatusCode" => codes.push(Header::parse(&e)?.required("Value")?),
                        _ => {}
                    }
                }
                Event::Text(t) => {
                    if skip_depth > 0 {
                        continue;
                    }
                    let text = t.unescape()?.into_owned();
                    match field {
                        Field::Issuer => issuer = Some(text),
                        Field::StatusMessage => status_message = Some(text),
                        _ => {}
                    }
                }
                Event::End(_) => {
                    skip_depth = skip_depth.saturating_sub(1);
                    field = Field::None;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let header = header.ok_or_else(|| unexpected_root("LogoutResponse"))?;
        let mut codes = codes.into_iter();
        let mut status_code = StatusCode::new(
            codes
                .next()
                .ok_or_else(|| SamlError::MissingElement("StatusCode".to_string()))?,
        );
        if let Some(sub) = codes.next() {
            status_code = status_code.with_sub_status(StatusCode::new(sub));
        }

        let response = Self {
            id: header.required("ID")?,
            version: header.required("Version")?,
            issue_instant: header.required_instant("IssueInstant")?,
            issuer: issuer.ok_or_else(|| SamlError::MissingElement("Issuer".to_string()))?,
            in_response_to: header.optional("InResponseTo"),
            destination: header.optional("Destination"),
            status: Status {
                status_code,
                status_message,
            },
        };
        response.validate()?;
        Ok(response)
    }
}

/// A parsed inbound logout message of either kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutMessage {
    /// A `LogoutRequest`.
    Request(LogoutRequest),
    /// A `LogoutResponse`.
    Response(LogoutResponse),
}

impl LogoutMessage {
    /// Parses a logout message, dispatching on the root element name.
    ///
    /// # Errors
    ///
    /// Returns an error if the root element is neither `LogoutRequest` nor
    /// `LogoutResponse`, or if parsing the message fails.
    pub fn from_xml(xml: &str) -> SamlResult<Self> {
        match root_local_name(xml)?.as_str() {
            "LogoutRequest" => LogoutRequest::from_xml(xml).map(Self::Request),
            "LogoutResponse" => LogoutResponse::from_xml(xml).map(Self::Response),
            other => Err(SamlError::InvalidRequest(format!(
                "unexpected root element: {other}"
            ))),
        }
    }

    /// Returns the message ID.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Request(r) => &r.id,
            Self::Response(r) => &r.id,
        }
    }

    /// Returns the issuer entity ID.
    #[must_use]
    pub fn issuer(&self) -> &str {
        match self {
            Self::Request(r) => &r.issuer,
            Self::Response(r) => &r.issuer,
        }
    }
}

/// Returns the local name of the document's root element.
///
/// # Errors
///
/// Returns an error if the document has no root element.
pub fn root_local_name(xml: &str) -> SamlResult<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                return Ok(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Event::Eof => return Err(SamlError::XmlParse("no root element".to_string())),
            _ => {}
        }
    }
}

/// Tracks element nesting so nothing is accepted after the root closes.
#[derive(Debug, Default)]
struct RootScope {
    depth: usize,
    closed: bool,
}

impl RootScope {
    fn observe(&mut self, event: &Event<'_>) -> SamlResult<()> {
        if self.closed {
            return match event {
                Event::Eof | Event::Comment(_) | Event::PI(_) => Ok(()),
                Event::Text(t) if t.iter().all(u8::is_ascii_whitespace) => Ok(()),
                _ => Err(SamlError::InvalidRequest(
                    "unexpected content after the root element".to_string(),
                )),
            };
        }
        match event {
            Event::Start(_) => self.depth += 1,
            Event::Empty(_) if self.depth == 0 => self.closed = true,
            Event::End(_) => {
                self.depth = self.depth.saturating_sub(1);
                self.closed = self.depth == 0;
            }
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    None,
    Issuer,
    NameId,
    SessionIndex,
    StatusMessage,
}

/// Attributes of a start tag, keyed by local name.
struct Header {
    attributes: HashMap<String, String>,
}

impl Header {
    fn parse(element: &BytesStart<'_>) -> SamlResult<Self> {
        let mut attributes = HashMap::new();
        for attr in element.attributes() {
            let attr = attr?;
            if attr.key.as_namespace_binding().is_some() {
                continue;
            }
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.insert(key, value);
        }
        Ok(Self { attributes })
    }

    fn optional(&self, name: &str) -> Option<String> {
        self.attributes.get(name).cloned()
    }

    fn required(&self, name: &str) -> SamlResult<String> {
        self.optional(name)
            .ok_or_else(|| SamlError::MissingElement(format!("{name} attribute")))
    }

    fn optional_instant(&self, name: &str) -> SamlResult<Option<DateTime<Utc>>> {
        self.attributes
            .get(name)
            .map(|value| parse_instant(name, value))
            .transpose()
    }

    fn required_instant(&self, name: &str) -> SamlResult<DateTime<Utc>> {
        self.optional_instant(name)?
            .ok_or_else(|| SamlError::MissingElement(format!("{name} attribute")))
    }
}

fn parse_name_id(element: &BytesStart<'_>) -> SamlResult<NameId> {
    let attrs = Header::parse(element)?;
    Ok(NameId {
        value: String::new(),
        format: attrs.optional("Format"),
        name_qualifier: attrs.optional("NameQualifier"),
        sp_name_qualifier: attrs.optional("SPNameQualifier"),
    })
}

fn parse_instant(name: &str, value: &str) -> SamlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|e| SamlError::InvalidRequest(format!("invalid {name} '{value}': {e}")))
}

fn format_instant(instant: DateTime<Utc>) -> String {
    instant.format(TIMESTAMP_FORMAT).to_string()
}

fn unexpected_root(expected: &str) -> SamlError {
    SamlError::InvalidRequest(format!("expected {expected} root element"))
}

fn check_header(id: &str, version: &str, issuer: &str) -> SamlResult<()> {
    if id.is_empty() {
        return Err(SamlError::MissingElement("ID".to_string()));
    }
    check_length("ID", id, MAX_ID_LENGTH)?;
    if version != "2.0" {
        return Err(SamlError::InvalidRequest(format!(
            "unsupported SAML version: {version}"
        )));
    }
    if issuer.trim().is_empty() {
        return Err(SamlError::MissingElement("Issuer".to_string()));
    }
    check_length("Issuer", issuer, MAX_ISSUER_LENGTH)
}

fn check_length(field: &str, value: &str, max: usize) -> SamlResult<()> {
    if value.len() > max {
        return Err(SamlError::InvalidRequest(format!(
            "{field} exceeds maximum length of {max}"
        )));
    }
    Ok(())
}

fn issuer_xml(issuer: &str) -> String {
    format!("<saml:Issuer>{}</saml:Issuer>", escape(issuer))
}

fn name_id_xml(name_id: &NameId) -> String {
    let mut xml = String::from("<saml:NameID");
    if let Some(format) = &name_id.format {
        xml.push_str(&format!(r#" Format="{}""#, escape(format.as_str())));
    }
    if let Some(qualifier) = &name_id.name_qualifier {
        xml.push_str(&format!(r#" NameQualifier="{}""#, escape(qualifier.as_str())));
    }
    if let Some(qualifier) = &name_id.sp_name_qualifier {
        xml.push_str(&format!(r#" SPNameQualifier="{}""#, escape(qualifier.as_str())));
    }
    xml.push_str(&format!(">{}</saml:NameID>", escape(name_id.value.as_str())));
    xml
}

fn status_code_xml(code: &StatusCode) -> String {
    match &code.status_code {
        Some(sub) => format!(
            r#"<samlp:StatusCode Value="{}">{}</samlp:StatusCode>"#,
            escape(code.value.as_str()),
            status_code_xml(sub)
        ),
        None => format!(
            r#"<samlp:StatusCode Value="{}"/>"#,
            escape(code.value.as_str())
        ),
    }
}
