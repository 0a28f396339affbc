//! Front-channel logout cursor.
//!
//! Services that need the browser are notified one at a time. Between two
//! round trips the remaining steps are kept in the flow-scope store under
//! a random key; the same key travels as `RelayState` so the service's
//! response leads back to the cursor.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use slo_protocol_saml::{EncodedMessage, LogoutResponse};

use crate::error::{SloError, SloResult};
use crate::request::{LogoutRequestStatus, LogoutSummary, SingleLogoutRequest};
use crate::store::FlowScopeStore;

const KEY_LENGTH: usize = 32;
const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// One browser round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontChannelStep {
    /// The request being delivered.
    pub request: SingleLogoutRequest,
    /// ID of the logout message, matched against `InResponseTo`.
    pub message_id: String,
    /// The message the browser carries to the service.
    pub encoded: EncodedMessage,
}

/// Externally persisted front-channel progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontChannelCursor {
    /// Every step of the sequence, delivered or not.
    pub remaining: Vec<FrontChannelStep>,
    /// Position of the next step to deliver.
    pub index: usize,
    /// Relay state supplied by the caller when the logout started.
    pub relay_state: Option<String>,
    /// Running tally of the whole logout pass.
    pub summary: LogoutSummary,
}

impl FrontChannelCursor {
    /// Creates a cursor at the first step.
    #[must_use]
    pub fn new(
        steps: Vec<FrontChannelStep>,
        relay_state: Option<String>,
        summary: LogoutSummary,
    ) -> Self {
        Self {
            remaining: steps,
            index: 0,
            relay_state,
            summary,
        }
    }

    /// The step awaiting delivery.
    #[must_use]
    pub fn current(&self) -> Option<&FrontChannelStep> {
        self.remaining.get(self.index)
    }

    /// Checks if every step has been delivered.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.index >= self.remaining.len()
    }

    /// Records the outcome of the current step and moves to the next one.
    fn advance(&mut self, status: LogoutRequestStatus) {
        let Some(step) = self.remaining.get_mut(self.index) else {
            return;
        };
        if step.request.record(status) {
            self.summary.not_attempted = self.summary.not_attempted.saturating_sub(1);
            match status {
                LogoutRequestStatus::Success => self.summary.succeeded += 1,
                LogoutRequestStatus::Failure => self.summary.failed += 1,
                LogoutRequestStatus::NotAttempted => {}
            }
        }
        self.index += 1;
    }
}

/// Where a front-channel logout stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontChannelProgress {
    /// Send the browser to the next service.
    Next(EncodedMessage),
    /// Nothing left to deliver.
    Finished {
        /// Final tally.
        summary: LogoutSummary,
        /// Relay state supplied when the logout started.
        relay_state: Option<String>,
    },
}

/// Persists and advances front-channel cursors.
#[derive(Clone)]
pub struct FrontChannelLogout {
    store: Arc<dyn FlowScopeStore>,
    ttl: Duration,
}

impl std::fmt::Debug for FrontChannelLogout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrontChannelLogout")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl FrontChannelLogout {
    /// Creates a front-channel driver over a store.
    #[must_use]
    pub fn new(store: Arc<dyn FlowScopeStore>) -> Self {
        Self {
            store,
            ttl: DEFAULT_TTL,
        }
    }

    /// Sets how long a cursor outlives its last step.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Generates a fresh cursor key.
    #[must_use]
    pub fn new_key() -> String {
        slo_crypto::random_alphanumeric(KEY_LENGTH)
    }

    /// Stores a cursor for the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns `Store` if serialization or the store fails.
    pub async fn save(&self, key: &str, cursor: &FrontChannelCursor) -> SloResult<()> {
        let value = serde_json::to_string(cursor)?;
        self.store.put(key, value, self.ttl).await
    }

    /// Loads a cursor.
    ///
    /// # Errors
    ///
    /// Returns `Store` if no cursor is stored under the key or it cannot be
    /// read back.
    pub async fn load(&self, key: &str) -> SloResult<FrontChannelCursor> {
        let value = self
            .store
            .get(key)
            .await?
            .ok_or_else(|| SloError::Store(format!("no front-channel logout in progress: {key}")))?;
        Ok(serde_json::from_str(&value)?)
    }

    /// Returns the pending step without advancing.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the cursor cannot be loaded.
    pub async fn next_step(&self, key: &str) -> SloResult<FrontChannelProgress> {
        let cursor = self.load(key).await?;
        self.progress(key, cursor).await
    }

    /// Records the outcome of the pending step and returns what comes next.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the cursor cannot be loaded or saved.
    pub async fn resume(&self, key: &str, succeeded: bool) -> SloResult<FrontChannelProgress> {
        let mut cursor = self.load(key).await?;
        if let Some(step) = cursor.current() {
            tracing::info!(
                service = %step.request.service().id,
                ticket_id = step.request.ticket_id(),
                succeeded,
                "Front-channel logout step completed"
            );
        }
        cursor.advance(if succeeded {
            LogoutRequestStatus::Success
        } else {
            LogoutRequestStatus::Failure
        });
        self.save(key, &cursor).await?;
        self.progress(key, cursor).await
    }

    /// Records a service's logout response for the pending step.
    ///
    /// The step succeeds only if the response answers the outstanding
    /// request and reports success.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the cursor cannot be loaded or saved.
    pub async fn resume_with_response(
        &self,
        key: &str,
        response: &LogoutResponse,
    ) -> SloResult<FrontChannelProgress> {
        let cursor = self.load(key).await?;
        let matches = cursor
            .current()
            .is_some_and(|step| response.in_response_to.as_deref() == Some(step.message_id.as_str()));
        if !matches {
            tracing::warn!(
                response_id = %response.id,
                in_response_to = ?response.in_response_to,
                "Logout response does not answer the pending request"
            );
        }
        self.resume(key, matches && response.is_success()).await
    }

    async fn progress(
        &self,
        key: &str,
        cursor: FrontChannelCursor,
    ) -> SloResult<FrontChannelProgress> {
        if let Some(step) = cursor.current() {
            return Ok(FrontChannelProgress::Next(step.encoded.clone()));
        }
        self.store.remove(key).await?;
        tracing::info!(
            succeeded = cursor.summary.succeeded,
            failed = cursor.summary.failed,
            dropped = cursor.summary.dropped,
            "Front-channel logout finished"
        );
        Ok(FrontChannelProgress::Finished {
            summary: cursor.summary,
            relay_state: cursor.relay_state,
        })
    }
}
