//! Service provider metadata.
//!
//! The metadata registry is an external collaborator. The engine only needs a
//! read-only snapshot per service: logout endpoints by binding, name
//! identifier formats, and the per-service logout and signing policy.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use slo_protocol_saml::{Binding, NameIdFormat, VerificationCredential};
use thiserror::Error;

/// How a service wants to be told about a logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogoutType {
    /// Server-to-server call.
    #[default]
    BackChannel,
    /// Browser-mediated redirect.
    FrontChannel,
    /// The service is never notified.
    None,
}

/// A single logout endpoint advertised by a service provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutEndpoint {
    /// Binding of the endpoint.
    pub binding: Binding,
    /// Where logout requests are sent.
    pub location: String,
    /// Where logout responses are sent, if different.
    pub response_location: Option<String>,
}

impl LogoutEndpoint {
    /// Creates an endpoint.
    #[must_use]
    pub fn new(binding: Binding, location: impl Into<String>) -> Self {
        Self {
            binding,
            location: location.into(),
            response_location: None,
        }
    }

    /// Sets the response location.
    #[must_use]
    pub fn with_response_location(mut self, location: impl Into<String>) -> Self {
        self.response_location = Some(location.into());
        self
    }

    /// Returns the location logout responses are sent to.
    #[must_use]
    pub fn response_url(&self) -> &str {
        self.response_location.as_deref().unwrap_or(&self.location)
    }
}

/// Read-only view of a registered service provider.
#[derive(Debug, Clone)]
pub struct ServiceProviderMetadata {
    /// Entity ID (or service URL for non-federated services).
    pub entity_id: String,

    /// Supported name identifier formats, in priority order.
    pub name_id_formats: Vec<NameIdFormat>,

    /// Advertised single logout endpoints.
    pub logout_endpoints: Vec<LogoutEndpoint>,

    /// Registered logout URL for non-federated services.
    pub logout_url: Option<String>,

    /// How the service is notified.
    pub logout_type: LogoutType,

    /// Forces a binding instead of the preference order.
    pub forced_binding: Option<Binding>,

    /// Binding for logout responses sent to this service.
    pub logout_response_binding: Option<Binding>,

    /// Per-service override for signing logout requests.
    pub sign_logout_request: Option<bool>,

    /// Per-service override for signing logout responses.
    pub sign_logout_response: Option<bool>,

    /// Inbound logout requests from this service must be signed.
    pub require_signed_requests: bool,

    /// The service expects a response to its logout requests.
    pub expects_logout_response: bool,

    /// Credentials the service signs with.
    pub signing_credentials: Vec<VerificationCredential>,
}

impl ServiceProviderMetadata {
    /// Creates metadata with defaults for the given entity ID.
    #[must_use]
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            name_id_formats: Vec::new(),
            logout_endpoints: Vec::new(),
            logout_url: None,
            logout_type: LogoutType::default(),
            forced_binding: None,
            logout_response_binding: None,
            sign_logout_request: None,
            sign_logout_response: None,
            require_signed_requests: false,
            expects_logout_response: true,
            signing_credentials: Vec::new(),
        }
    }

    /// Adds a logout endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: LogoutEndpoint) -> Self {
        self.logout_endpoints.push(endpoint);
        self
    }

    /// Adds a supported name identifier format.
    #[must_use]
    pub fn with_name_id_format(mut self, format: NameIdFormat) -> Self {
        self.name_id_formats.push(format);
        self
    }

    /// Adds a signing credential.
    #[must_use]
    pub fn with_signing_credential(mut self, credential: VerificationCredential) -> Self {
        self.signing_credentials.push(credential);
        self
    }

    /// Sets the logout type.
    #[must_use]
    pub const fn with_logout_type(mut self, logout_type: LogoutType) -> Self {
        self.logout_type = logout_type;
        self
    }

    /// Sets the registered logout URL.
    #[must_use]
    pub fn with_logout_url(mut self, url: impl Into<String>) -> Self {
        self.logout_url = Some(url.into());
        self
    }

    /// Returns the first endpoint advertised for a binding.
    #[must_use]
    pub fn endpoint(&self, binding: Binding) -> Option<&LogoutEndpoint> {
        self.logout_endpoints
            .iter()
            .find(|endpoint| endpoint.binding == binding)
    }
}

/// Metadata registry errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The registry could not be reached.
    #[error("metadata unavailable: {0}")]
    Unavailable(String),

    /// The registry returned unusable metadata.
    #[error("invalid metadata for {entity_id}: {reason}")]
    Invalid {
        /// The entity ID.
        entity_id: String,
        /// Why the metadata is unusable.
        reason: String,
    },
}

/// Resolves service provider metadata by entity ID.
///
/// Caching and refresh are the implementation's concern.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Looks up a service provider.
    async fn resolve(
        &self,
        entity_id: &str,
    ) -> Result<Option<Arc<ServiceProviderMetadata>>, MetadataError>;
}

/// In-memory metadata registry.
#[derive(Debug, Default)]
pub struct InMemoryMetadataResolver {
    entries: RwLock<HashMap<String, Arc<ServiceProviderMetadata>>>,
}

impl InMemoryMetadataResolver {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a service provider.
    pub fn register(&self, metadata: ServiceProviderMetadata) {
        self.entries
            .write()
            .insert(metadata.entity_id.clone(), Arc::new(metadata));
    }

    /// Removes a service provider.
    pub fn unregister(&self, entity_id: &str) -> bool {
        self.entries.write().remove(entity_id).is_some()
    }
}

#[async_trait]
impl MetadataResolver for InMemoryMetadataResolver {
    async fn resolve(
        &self,
        entity_id: &str,
    ) -> Result<Option<Arc<ServiceProviderMetadata>>, MetadataError> {
        Ok(self.entries.read().get(entity_id).cloned())
    }
}
