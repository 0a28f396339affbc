//! `<samlp:Status>` of a logout response.

use serde::{Deserialize, Serialize};

use super::{status_codes, sub_status_codes};

/// Outcome reported by a logout response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Top-level code, possibly with a nested second-level code.
    pub status_code: StatusCode,

    /// Human-readable detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl Status {
    fn with_code(status_code: StatusCode, message: Option<String>) -> Self {
        Self {
            status_code,
            status_message: message,
        }
    }

    /// Every session was ended.
    #[must_use]
    pub fn success() -> Self {
        Self::with_code(StatusCode::new(status_codes::SUCCESS), None)
    }

    /// The request was malformed or refused.
    #[must_use]
    pub fn requester_error(message: impl Into<String>) -> Self {
        Self::with_code(
            StatusCode::new(status_codes::REQUESTER),
            Some(message.into()),
        )
    }

    /// The responder failed while handling a valid request.
    #[must_use]
    pub fn responder_error(message: impl Into<String>) -> Self {
        Self::with_code(
            StatusCode::new(status_codes::RESPONDER),
            Some(message.into()),
        )
    }

    /// `Success` with a `PartialLogout` second-level code.
    #[must_use]
    pub fn partial_logout() -> Self {
        Self::with_code(
            StatusCode::new(status_codes::SUCCESS)
                .with_sub_status(StatusCode::new(sub_status_codes::PARTIAL_LOGOUT)),
            Some("Some sessions could not be terminated".to_string()),
        )
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code.is_success()
    }

    /// Checks for a `PartialLogout` second-level code.
    #[must_use]
    pub fn is_partial_logout(&self) -> bool {
        self.status_code.sub_status_value() == Some(sub_status_codes::PARTIAL_LOGOUT)
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}

/// A `<samlp:StatusCode>` element and its optional nested code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCode {
    /// Code URI.
    pub value: String,

    /// Nested second-level code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<Box<StatusCode>>,
}

impl StatusCode {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            status_code: None,
        }
    }

    #[must_use]
    pub fn with_sub_status(mut self, sub: StatusCode) -> Self {
        self.status_code = Some(Box::new(sub));
        self
    }

    /// Only the top-level value counts.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.value == status_codes::SUCCESS
    }

    #[must_use]
    pub fn sub_status_value(&self) -> Option<&str> {
        self.status_code.as_deref().map(|sub| sub.value.as_str())
    }
}
