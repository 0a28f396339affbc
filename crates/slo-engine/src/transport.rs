//! Back-channel HTTP transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use slo_protocol_saml::EncodedMessage;
use thiserror::Error;

/// Body of a back-channel logout call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutHttpBody {
    /// URL-encoded form fields.
    Form(String),
    /// A SOAP envelope.
    Soap(String),
}

impl LogoutHttpBody {
    /// The `Content-Type` header value.
    #[must_use]
    pub const fn content_type(&self) -> &'static str {
        match self {
            Self::Form(_) => "application/x-www-form-urlencoded",
            Self::Soap(_) => "text/xml; charset=utf-8",
        }
    }

    /// The raw body.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Form(body) | Self::Soap(body) => body,
        }
    }

    /// Converts an encoded message into a destination and a body.
    ///
    /// Redirect messages need a browser and have no back-channel form.
    #[must_use]
    pub fn from_encoded(message: &EncodedMessage) -> Option<(String, Self)> {
        match message {
            EncodedMessage::Post(form) => {
                Some((form.action.clone(), Self::Form(form.to_urlencoded())))
            }
            EncodedMessage::Soap { endpoint, body } => {
                Some((endpoint.clone(), Self::Soap(body.clone())))
            }
            EncodedMessage::Redirect { .. } => None,
        }
    }
}

/// Back-channel delivery errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No response within the timeout.
    #[error("logout call timed out")]
    Timeout,

    /// The service could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The service answered with a non-success status.
    #[error("service answered with HTTP {0}")]
    Status(u16),

    /// Any other client failure.
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connection(e.to_string())
        } else {
            Self::Client(e.to_string())
        }
    }
}

/// Sends back-channel logout calls.
#[async_trait]
pub trait LogoutTransport: Send + Sync {
    /// Posts a body and returns the HTTP status code.
    async fn post(
        &self,
        url: &str,
        body: LogoutHttpBody,
        timeout: Duration,
    ) -> Result<u16, TransportError>;
}

/// Transport backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpLogoutTransport {
    client: reqwest::Client,
}

impl HttpLogoutTransport {
    /// Creates a transport with a default per-call timeout.
    ///
    /// # Errors
    ///
    /// Returns `Client` if the HTTP client cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LogoutTransport for HttpLogoutTransport {
    async fn post(
        &self,
        url: &str,
        body: LogoutHttpBody,
        timeout: Duration,
    ) -> Result<u16, TransportError> {
        let mut request = self
            .client
            .post(url)
            .timeout(timeout)
            .header(CONTENT_TYPE, body.content_type());
        if matches!(body, LogoutHttpBody::Soap(_)) {
            request = request.header("SOAPAction", "\"\"");
        }
        let body = match body {
            LogoutHttpBody::Form(body) | LogoutHttpBody::Soap(body) => body,
        };

        let response = request.body(body).send().await?;
        Ok(response.status().as_u16())
    }
}
