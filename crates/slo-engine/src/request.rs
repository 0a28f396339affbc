//! Per-service logout requests and their status.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use slo_protocol_saml::Binding;

use crate::model::AccessedService;

/// Property carrying the chosen binding URI.
pub const PROPERTY_BINDING_URI: &str = "binding_uri";

/// Property carrying the endpoint's response location.
pub const PROPERTY_RESPONSE_LOCATION: &str = "response_location";

/// Delivery model for a logout request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutChannel {
    /// Direct server-to-server call.
    BackChannel,
    /// Browser redirect, one service at a time.
    FrontChannel,
}

/// Resolved logout destination of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleLogoutUrl {
    /// Endpoint URL.
    pub location: String,
    /// Binding used to reach the endpoint.
    pub binding: Binding,
    /// Delivery model.
    pub channel: LogoutChannel,
    /// Binding-specific data needed by the builder and encoder.
    pub properties: BTreeMap<String, String>,
}

impl SingleLogoutUrl {
    /// Creates a resolved URL.
    #[must_use]
    pub fn new(location: impl Into<String>, binding: Binding, channel: LogoutChannel) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(PROPERTY_BINDING_URI.to_string(), binding.uri().to_string());
        Self {
            location: location.into(),
            binding,
            channel,
            properties,
        }
    }

    /// Adds a property.
    #[must_use]
    pub fn with_property(mut self, key: &str, value: impl Into<String>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Returns a property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Status of a logout request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogoutRequestStatus {
    /// Not delivered yet.
    #[default]
    NotAttempted,
    /// Delivered and accepted.
    Success,
    /// Delivery or message construction failed.
    Failure,
}

impl LogoutRequestStatus {
    /// Checks if the status is final.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::NotAttempted)
    }
}

impl fmt::Display for LogoutRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotAttempted => "NOT_ATTEMPTED",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        })
    }
}

/// Logout notification for one (session, service) pair.
///
/// The destination and binding are fixed when the request is resolved.
/// The status moves forward once and never reverts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleLogoutRequest {
    ticket_id: String,
    service: AccessedService,
    logout_url: Option<SingleLogoutUrl>,
    status: LogoutRequestStatus,
}

impl SingleLogoutRequest {
    /// Creates an unresolved request.
    #[must_use]
    pub fn new(ticket_id: impl Into<String>, service: AccessedService) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            service,
            logout_url: None,
            status: LogoutRequestStatus::NotAttempted,
        }
    }

    /// Sets the resolved destination.
    #[must_use]
    pub fn with_logout_url(mut self, url: SingleLogoutUrl) -> Self {
        self.logout_url = Some(url);
        self
    }

    /// The service ticket being invalidated.
    #[must_use]
    pub fn ticket_id(&self) -> &str {
        &self.ticket_id
    }

    /// The service to notify.
    #[must_use]
    pub const fn service(&self) -> &AccessedService {
        &self.service
    }

    /// The resolved destination, if any.
    #[must_use]
    pub const fn logout_url(&self) -> Option<&SingleLogoutUrl> {
        self.logout_url.as_ref()
    }

    /// The binding chosen at resolution.
    #[must_use]
    pub fn binding(&self) -> Option<Binding> {
        self.logout_url.as_ref().map(|url| url.binding)
    }

    /// The delivery model chosen at resolution.
    #[must_use]
    pub fn channel(&self) -> Option<LogoutChannel> {
        self.logout_url.as_ref().map(|url| url.channel)
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> LogoutRequestStatus {
        self.status
    }

    /// Requests without a destination are never dispatched.
    #[must_use]
    pub const fn is_dispatchable(&self) -> bool {
        self.logout_url.is_some()
    }

    /// Records a delivery outcome.
    ///
    /// Only the first terminal outcome of a dispatchable request is kept;
    /// returns whether the status changed.
    pub fn record(&mut self, status: LogoutRequestStatus) -> bool {
        if self.status.is_terminal() || !status.is_terminal() || !self.is_dispatchable() {
            return false;
        }
        self.status = status;
        true
    }
}

/// Outcome counts of a logout pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutSummary {
    /// Requests delivered successfully.
    pub succeeded: usize,
    /// Requests that failed.
    pub failed: usize,
    /// Dispatchable requests not delivered yet.
    pub not_attempted: usize,
    /// Requests without a resolvable endpoint.
    pub dropped: usize,
}

impl LogoutSummary {
    /// Tallies a set of requests.
    #[must_use]
    pub fn from_requests<'a>(requests: impl IntoIterator<Item = &'a SingleLogoutRequest>) -> Self {
        let mut summary = Self::default();
        for request in requests {
            summary.add(request);
        }
        summary
    }

    /// Adds one request to the tally.
    pub fn add(&mut self, request: &SingleLogoutRequest) {
        if !request.is_dispatchable() {
            self.dropped += 1;
            return;
        }
        match request.status() {
            LogoutRequestStatus::Success => self.succeeded += 1,
            LogoutRequestStatus::Failure => self.failed += 1,
            LogoutRequestStatus::NotAttempted => self.not_attempted += 1,
        }
    }

    /// Number of dispatchable requests.
    #[must_use]
    pub const fn dispatched(&self) -> usize {
        self.succeeded + self.failed + self.not_attempted
    }
}
