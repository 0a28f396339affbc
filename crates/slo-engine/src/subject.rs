//! Subject (NameID) resolution for outbound logout requests.
//!
//! A service provider lists the name identifier formats it supports in
//! priority order. Each format is tried in turn and the first one that
//! yields a non-blank value wins.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use slo_protocol_saml::{NameId, NameIdFormat};

use crate::model::{AccessedService, Principal};

/// Generates opaque per-service identifiers.
///
/// Values must be stable for a (principal, service) pair and must not
/// reveal the principal id.
pub trait PersistentIdGenerator: Send + Sync {
    /// Generates the identifier, or `None` if it cannot be derived.
    fn generate(&self, principal_id: &str, entity_id: &str) -> Option<String>;
}

/// HMAC-SHA256 over the principal and entity ids, keyed with a salt.
#[derive(Clone)]
pub struct SaltedPersistentIdGenerator {
    salt: Vec<u8>,
}

impl SaltedPersistentIdGenerator {
    /// Creates a generator with the given salt.
    #[must_use]
    pub fn new(salt: impl Into<Vec<u8>>) -> Self {
        Self { salt: salt.into() }
    }
}

impl fmt::Debug for SaltedPersistentIdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaltedPersistentIdGenerator")
            .finish_non_exhaustive()
    }
}

impl PersistentIdGenerator for SaltedPersistentIdGenerator {
    fn generate(&self, principal_id: &str, entity_id: &str) -> Option<String> {
        if principal_id.is_empty() || self.salt.is_empty() {
            return None;
        }
        let data = format!("{entity_id}!{principal_id}");
        Some(STANDARD.encode(slo_crypto::hmac_sha256(&self.salt, data.as_bytes())))
    }
}

/// Resolves the username released to a service.
pub trait UsernameResolver: Send + Sync {
    /// Returns the username, or `None` if it cannot be resolved.
    fn resolve_username(&self, principal: &Principal, service: &AccessedService) -> Option<String>;
}

/// Releases the principal id.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrincipalIdUsernameResolver;

impl UsernameResolver for PrincipalIdUsernameResolver {
    fn resolve_username(&self, principal: &Principal, _service: &AccessedService) -> Option<String> {
        Some(principal.id.clone())
    }
}

/// Releases the first value of a principal attribute.
#[derive(Debug, Clone)]
pub struct AttributeUsernameResolver {
    attribute: String,
}

impl AttributeUsernameResolver {
    /// Creates a resolver reading the given attribute.
    #[must_use]
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
        }
    }
}

impl UsernameResolver for AttributeUsernameResolver {
    fn resolve_username(&self, principal: &Principal, _service: &AccessedService) -> Option<String> {
        principal.attribute(&self.attribute).map(str::to_string)
    }
}

/// Picks the NameID of a logout request.
#[derive(Clone)]
pub struct SubjectResolver {
    persistent_ids: Arc<dyn PersistentIdGenerator>,
    usernames: Arc<dyn UsernameResolver>,
}

impl fmt::Debug for SubjectResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubjectResolver").finish_non_exhaustive()
    }
}

impl SubjectResolver {
    /// Creates a resolver from its two strategies.
    #[must_use]
    pub fn new(
        persistent_ids: Arc<dyn PersistentIdGenerator>,
        usernames: Arc<dyn UsernameResolver>,
    ) -> Self {
        Self {
            persistent_ids,
            usernames,
        }
    }

    /// Resolves the NameID for a service.
    ///
    /// An empty format list is treated as `[unspecified]`.
    #[must_use]
    pub fn resolve(
        &self,
        principal: &Principal,
        service: &AccessedService,
        formats: &[NameIdFormat],
    ) -> Option<NameId> {
        let fallback = [NameIdFormat::Unspecified];
        let formats = if formats.is_empty() { &fallback[..] } else { formats };

        formats.iter().find_map(|format| {
            let value = match format {
                NameIdFormat::Transient => {
                    self.persistent_ids.generate(&principal.id, &service.id)
                }
                _ => self.usernames.resolve_username(principal, service),
            };
            match value {
                Some(value) if !value.trim().is_empty() => {
                    Some(NameId::new(value).with_format(*format))
                }
                _ => {
                    tracing::debug!(
                        service = %service.id,
                        format = format.uri(),
                        "No subject value for name identifier format"
                    );
                    None
                }
            }
        })
    }
}

impl Default for SubjectResolver {
    fn default() -> Self {
        Self::new(
            Arc::new(SaltedPersistentIdGenerator::new(slo_crypto::random_bytes(32))),
            Arc::new(PrincipalIdUsernameResolver),
        )
    }
}
