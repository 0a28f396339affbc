//! SSO session model as seen by the logout engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The authenticated principal of an SSO session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal identifier.
    pub id: String,
    /// Released attributes.
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl Principal {
    /// Creates a principal without attributes.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds an attribute value.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Returns the first value of an attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// Protocol family of an accessed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// A SAML 2.0 service provider.
    Saml2,
    /// A non-federated web application.
    Plain,
}

/// A service the user accessed during the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessedService {
    /// Entity ID for SAML service providers, service URL otherwise.
    pub id: String,
    /// Protocol family.
    pub kind: ServiceKind,
}

impl AccessedService {
    /// A SAML 2.0 service provider.
    #[must_use]
    pub fn saml2(entity_id: impl Into<String>) -> Self {
        Self {
            id: entity_id.into(),
            kind: ServiceKind::Saml2,
        }
    }

    /// A non-federated web application.
    #[must_use]
    pub fn plain(service_url: impl Into<String>) -> Self {
        Self {
            id: service_url.into(),
            kind: ServiceKind::Plain,
        }
    }

    /// Checks if the service participates in SAML federation.
    #[must_use]
    pub const fn is_federated(&self) -> bool {
        matches!(self.kind, ServiceKind::Saml2)
    }
}

/// A service ticket issued under the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTicket {
    /// Ticket identifier.
    pub id: String,
    /// The service the ticket was issued for.
    pub service: AccessedService,
    /// The service already logged out on its own.
    pub logged_out: bool,
}

impl ServiceTicket {
    /// Creates a live ticket.
    #[must_use]
    pub fn new(id: impl Into<String>, service: AccessedService) -> Self {
        Self {
            id: id.into(),
            service,
            logged_out: false,
        }
    }
}

/// A terminated SSO session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsoSession {
    /// Session identifier.
    pub id: String,
    /// The authenticated principal.
    pub principal: Principal,
    /// Service tickets in issue order.
    pub tickets: Vec<ServiceTicket>,
}

impl SsoSession {
    /// Creates a session without tickets.
    #[must_use]
    pub fn new(id: impl Into<String>, principal: Principal) -> Self {
        Self {
            id: id.into(),
            principal,
            tickets: Vec::new(),
        }
    }

    /// Records a ticket.
    #[must_use]
    pub fn with_ticket(mut self, ticket: ServiceTicket) -> Self {
        self.tickets.push(ticket);
        self
    }
}
