//! HTTP-POST Binding implementation.
//!
//! Implements the SAML 2.0 HTTP-POST binding for sending SAML messages
//! via HTML form POST, either auto-submitted by the browser or posted
//! directly as a back-channel form body.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};

use super::{ensure_within_limit, Binding, DecodedMessage, SamlMessageType};

/// Form fields of an HTTP-POST bound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostForm {
    /// The form action (destination endpoint).
    pub action: String,
    /// Form fields in submission order.
    pub fields: Vec<(String, String)>,
}

impl PostForm {
    /// Returns the value of a form field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Renders an HTML page that auto-submits the form to its action.
    #[must_use]
    pub fn to_html(&self) -> String {
        let inputs = self
            .fields
            .iter()
            .map(|(name, value)| {
                format!(
                    r#"<input type="hidden" name="{}" value="{}"/>"#,
                    html_escape(name),
                    html_escape(value)
                )
            })
            .collect::<Vec<_>>()
            .join("\n        ");

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>SAML POST Binding</title>
</head>
<body onload="document.forms[0].submit()">
    <noscript>
        <p>JavaScript is disabled. Click the button below to continue.</p>
    </noscript>
    <form method="post" action="{}">
        {}
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>
</body>
</html>"#,
            html_escape(&self.action),
            inputs
        )
    }

    /// Serializes the fields as an `application/x-www-form-urlencoded` body.
    #[must_use]
    pub fn to_urlencoded(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.fields.iter())
            .finish()
    }
}

/// HTTP-POST binding encoder/decoder.
pub struct HttpPostBinding;

impl HttpPostBinding {
    /// Encodes a message for HTTP-POST binding.
    ///
    /// SAML messages are base64-encoded. A plain logout request carries
    /// its XML as-is in the `logoutRequest` field.
    #[must_use]
    pub fn encode(
        xml: &str,
        destination: &str,
        message_type: SamlMessageType,
        relay_state: Option<&str>,
    ) -> PostForm {
        let value = match message_type {
            SamlMessageType::PlainLogoutRequest => xml.to_string(),
            SamlMessageType::Request | SamlMessageType::Response => {
                base64::engine::general_purpose::STANDARD.encode(xml)
            }
        };

        let mut fields = vec![(message_type.form_param().to_string(), value)];
        if let Some(rs) = relay_state {
            fields.push(("RelayState".to_string(), rs.to_string()));
        }

        PostForm {
            action: destination.to_string(),
            fields,
        }
    }

    /// Decodes a message from HTTP-POST form fields.
    pub fn decode(fields: &[(String, String)], max_size: usize) -> SamlResult<DecodedMessage> {
        let (message_type, value) = fields
            .iter()
            .find_map(|(key, value)| SamlMessageType::from_param(key).map(|t| (t, value)))
            .ok_or_else(|| {
                SamlError::InvalidRequest("No SAMLRequest or SAMLResponse parameter".to_string())
            })?;

        let relay_state = fields
            .iter()
            .find(|(key, _)| key == "RelayState")
            .map(|(_, value)| value.clone());

        let xml = match message_type {
            SamlMessageType::PlainLogoutRequest => {
                ensure_within_limit(value.len(), max_size)?;
                value.clone()
            }
            SamlMessageType::Request | SamlMessageType::Response => {
                let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
                let decoded = base64::engine::general_purpose::STANDARD.decode(compact)?;
                ensure_within_limit(decoded.len(), max_size)?;
                String::from_utf8(decoded).map_err(|e| {
                    SamlError::InvalidRequest(format!("Invalid UTF-8 in message: {e}"))
                })?
            }
        };

        if xml.trim().is_empty() {
            return Err(SamlError::EmptyPayload);
        }

        Ok(DecodedMessage {
            binding: Binding::Post,
            xml,
            message_type,
            relay_state,
            signature: None,
            sig_alg: None,
            signed_query: None,
        })
    }
}

/// Escapes HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
