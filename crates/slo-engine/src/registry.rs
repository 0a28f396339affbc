//! Session logout registry.

use std::collections::HashSet;

use crate::model::SsoSession;
use crate::request::SingleLogoutRequest;

/// Turns a terminated session into pending logout requests.
///
/// One request is produced per live service ticket, in ticket order.
/// A ticket that was already logged out is skipped, as is a repeated
/// ticket id.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionLogoutRegistry {
    disabled: bool,
}

impl SessionLogoutRegistry {
    /// Creates a registry. A disabled registry never yields requests.
    #[must_use]
    pub const fn new(disabled: bool) -> Self {
        Self { disabled }
    }

    /// Produces the pending requests for a session.
    #[must_use]
    pub fn pending_requests(&self, session: &SsoSession) -> Vec<SingleLogoutRequest> {
        if self.disabled {
            tracing::debug!(session = %session.id, "Single logout is disabled");
            return Vec::new();
        }

        let mut seen = HashSet::new();
        session
            .tickets
            .iter()
            .filter(|ticket| !ticket.logged_out)
            .filter(|ticket| seen.insert(ticket.id.as_str()))
            .map(|ticket| SingleLogoutRequest::new(&ticket.id, ticket.service.clone()))
            .collect()
    }
}
