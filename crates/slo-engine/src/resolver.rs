//! Logout URL and binding resolution.
//!
//! Federated services are matched against their advertised endpoints using
//! the binding preference order, unless the service forces a binding.
//! Non-federated services get a single HTTP logout URL. Resolution never
//! fails the logout pass: lookup errors are logged and the request is
//! dropped.

use std::sync::Arc;

use slo_protocol_saml::Binding;

use crate::metadata::{LogoutType, MetadataResolver, ServiceProviderMetadata};
use crate::model::AccessedService;
use crate::request::{LogoutChannel, SingleLogoutUrl, PROPERTY_RESPONSE_LOCATION};

/// Resolves where and how a service is notified.
#[derive(Clone)]
pub struct LogoutUrlResolver {
    metadata: Arc<dyn MetadataResolver>,
    preference: Vec<Binding>,
}

impl std::fmt::Debug for LogoutUrlResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogoutUrlResolver")
            .field("preference", &self.preference)
            .finish_non_exhaustive()
    }
}

impl LogoutUrlResolver {
    /// Creates a resolver with the given binding preference.
    #[must_use]
    pub fn new(metadata: Arc<dyn MetadataResolver>, preference: Vec<Binding>) -> Self {
        Self {
            metadata,
            preference,
        }
    }

    /// Resolves the logout destination of a service.
    pub async fn resolve(&self, service: &AccessedService) -> Option<SingleLogoutUrl> {
        let metadata = self.lookup(service).await;
        self.resolve_with(service, metadata.as_deref())
    }

    /// Fetches the metadata snapshot of a service.
    ///
    /// Registry errors are logged and treated as "not registered".
    pub async fn lookup(&self, service: &AccessedService) -> Option<Arc<ServiceProviderMetadata>> {
        match self.metadata.resolve(&service.id).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(
                    service = %service.id,
                    error = %e,
                    "Failed to resolve service metadata"
                );
                None
            }
        }
    }

    /// Resolves the logout destination from an already fetched snapshot.
    #[must_use]
    pub fn resolve_with(
        &self,
        service: &AccessedService,
        metadata: Option<&ServiceProviderMetadata>,
    ) -> Option<SingleLogoutUrl> {
        if metadata.is_some_and(|m| m.logout_type == LogoutType::None) {
            tracing::debug!(service = %service.id, "Service opted out of single logout");
            return None;
        }

        let resolved = if service.is_federated() {
            let Some(metadata) = metadata else {
                tracing::debug!(service = %service.id, "No metadata for service provider");
                return None;
            };
            self.resolve_federated(metadata)
        } else {
            resolve_plain(service, metadata)
        };

        match &resolved {
            Some(url) => tracing::debug!(
                service = %service.id,
                location = %url.location,
                binding = %url.binding,
                channel = ?url.channel,
                "Resolved logout endpoint"
            ),
            None => tracing::debug!(service = %service.id, "No logout endpoint for service"),
        }
        resolved
    }

    fn resolve_federated(&self, metadata: &ServiceProviderMetadata) -> Option<SingleLogoutUrl> {
        let endpoint = match metadata.forced_binding {
            Some(binding) => metadata.endpoint(binding),
            None => self
                .preference
                .iter()
                .find_map(|binding| metadata.endpoint(*binding)),
        }?;

        let channel = match endpoint.binding {
            Binding::Redirect => LogoutChannel::FrontChannel,
            Binding::Soap => LogoutChannel::BackChannel,
            Binding::Post => match metadata.logout_type {
                LogoutType::FrontChannel => LogoutChannel::FrontChannel,
                LogoutType::BackChannel | LogoutType::None => LogoutChannel::BackChannel,
            },
        };

        let mut url = SingleLogoutUrl::new(&endpoint.location, endpoint.binding, channel);
        if let Some(response_location) = &endpoint.response_location {
            url = url.with_property(PROPERTY_RESPONSE_LOCATION, response_location);
        }
        Some(url)
    }
}

fn resolve_plain(
    service: &AccessedService,
    metadata: Option<&ServiceProviderMetadata>,
) -> Option<SingleLogoutUrl> {
    let location = metadata
        .and_then(|m| m.logout_url.as_deref())
        .unwrap_or(&service.id);

    let parsed = url::Url::parse(location).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }

    let front_channel = metadata.is_some_and(|m| m.logout_type == LogoutType::FrontChannel);
    let (binding, channel) = if front_channel {
        (Binding::Redirect, LogoutChannel::FrontChannel)
    } else {
        (Binding::Post, LogoutChannel::BackChannel)
    };

    Some(SingleLogoutUrl::new(location, binding, channel))
}
