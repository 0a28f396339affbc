//! Outbound single logout.
//!
//! Terminating an SSO session notifies every service the user reached
//! under it. Back-channel services are called directly and concurrently.
//! Services that need the browser are queued behind a front-channel cursor
//! that the web layer walks one redirect at a time.

use std::sync::Arc;

use futures::future::join_all;
use slo_protocol_saml::{EncodedMessage, XmlSigner};

use crate::builder::{MessageBuilder, SingleLogoutMessage};
use crate::config::{SigningPolicy, SloConfig};
use crate::dispatcher::{Delivery, LogoutDispatcher};
use crate::error::{SloError, SloResult};
use crate::front_channel::{FrontChannelCursor, FrontChannelLogout, FrontChannelStep};
use crate::inbound::{InboundLogoutHandler, SessionTerminator};
use crate::metadata::{InMemoryMetadataResolver, MetadataResolver};
use crate::model::SsoSession;
use crate::registry::SessionLogoutRegistry;
use crate::request::{LogoutChannel, LogoutRequestStatus, LogoutSummary, SingleLogoutRequest};
use crate::resolver::LogoutUrlResolver;
use crate::store::{FlowScopeStore, InMemoryFlowScopeStore};
use crate::subject::SubjectResolver;
use crate::transport::{HttpLogoutTransport, LogoutHttpBody, LogoutTransport};

/// Result of terminating a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// Every service has been handled.
    Finished(LogoutSummary),
    /// Some services still need the browser.
    NeedsFrontChannel {
        /// Cursor key, also sent as `RelayState`.
        key: String,
        /// Where to send the browser first.
        first: EncodedMessage,
        /// Tally so far; front-channel requests count as not attempted.
        summary: LogoutSummary,
    },
}

impl LogoutOutcome {
    /// The tally of the logout pass.
    #[must_use]
    pub const fn summary(&self) -> &LogoutSummary {
        match self {
            Self::Finished(summary) | Self::NeedsFrontChannel { summary, .. } => summary,
        }
    }
}

/// The outbound single logout pipeline.
#[derive(Clone)]
pub struct SingleLogoutEngine {
    config: SloConfig,
    registry: SessionLogoutRegistry,
    metadata: Arc<dyn MetadataResolver>,
    resolver: LogoutUrlResolver,
    builder: Arc<MessageBuilder>,
    dispatcher: LogoutDispatcher,
    front_channel: FrontChannelLogout,
}

impl std::fmt::Debug for SingleLogoutEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleLogoutEngine")
            .field("config", &self.config)
            .field("resolver", &self.resolver)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl SingleLogoutEngine {
    /// Starts building an engine from configuration.
    #[must_use]
    pub fn builder(config: SloConfig) -> SingleLogoutEngineBuilder {
        SingleLogoutEngineBuilder::new(config)
    }

    /// The engine configuration.
    #[must_use]
    pub const fn config(&self) -> &SloConfig {
        &self.config
    }

    /// The metadata registry.
    #[must_use]
    pub fn metadata(&self) -> Arc<dyn MetadataResolver> {
        Arc::clone(&self.metadata)
    }

    /// The message builder shared with inbound handling.
    #[must_use]
    pub fn message_builder(&self) -> Arc<MessageBuilder> {
        Arc::clone(&self.builder)
    }

    /// The front-channel cursor driver.
    #[must_use]
    pub const fn front_channel(&self) -> &FrontChannelLogout {
        &self.front_channel
    }

    /// Creates an inbound handler sharing this engine's metadata, builder
    /// and configuration.
    #[must_use]
    pub fn inbound_handler(&self, terminator: Arc<dyn SessionTerminator>) -> InboundLogoutHandler {
        InboundLogoutHandler::new(self.metadata(), self.message_builder(), terminator)
            .with_config(&self.config)
    }

    /// Notifies every service of a terminated session.
    ///
    /// Never fails: per-service errors are logged and counted, and the
    /// session is considered terminated regardless.
    ///
    /// If the front-channel cursor cannot be stored there is nothing for the
    /// browser to resume, so the outcome is `Finished` and the front-channel
    /// requests stay in `not_attempted`.
    pub async fn terminate(&self, session: &SsoSession, relay_state: Option<&str>) -> LogoutOutcome {
        let pending = self.registry.pending_requests(session);
        if pending.is_empty() {
            return LogoutOutcome::Finished(LogoutSummary::default());
        }

        let metadata = join_all(
            pending
                .iter()
                .map(|request| self.resolver.lookup(request.service())),
        )
        .await;

        let mut requests: Vec<SingleLogoutRequest> = pending
            .into_iter()
            .zip(&metadata)
            .map(|(request, metadata)| {
                match self.resolver.resolve_with(request.service(), metadata.as_deref()) {
                    Some(url) => request.with_logout_url(url),
                    None => request,
                }
            })
            .collect();

        let key = FrontChannelLogout::new_key();
        let mut deliveries = Vec::new();
        let mut front = Vec::new();

        for (index, request) in requests.iter_mut().enumerate() {
            let Some(url) = request.logout_url().cloned() else {
                continue;
            };
            let prepared = self
                .builder
                .build_request(request, &session.principal, metadata[index].as_deref())
                .and_then(|message| {
                    let relay_state = match url.channel {
                        LogoutChannel::BackChannel => None,
                        LogoutChannel::FrontChannel => Some(key.as_str()),
                    };
                    let encoded =
                        self.builder
                            .encode(&message, url.binding, &url.location, relay_state)?;
                    Ok((message, encoded))
                });

            let (message, encoded) = match prepared {
                Ok(prepared) => prepared,
                Err(e) => {
                    tracing::warn!(
                        session = %session.id,
                        service = %request.service().id,
                        ticket_id = request.ticket_id(),
                        kind = ?e.kind(),
                        error = %e,
                        "Failed to prepare logout request"
                    );
                    request.record(LogoutRequestStatus::Failure);
                    continue;
                }
            };

            match url.channel {
                LogoutChannel::BackChannel => match back_channel_delivery(index, request, &encoded) {
                    Some(delivery) => deliveries.push(delivery),
                    None => {
                        request.record(LogoutRequestStatus::Failure);
                    }
                },
                LogoutChannel::FrontChannel => front.push((index, message, encoded)),
            }
        }

        for (index, status) in self.dispatcher.dispatch(deliveries).await {
            if let Some(request) = requests.get_mut(index) {
                request.record(status);
            }
        }

        let summary = LogoutSummary::from_requests(&requests);
        tracing::info!(
            session = %session.id,
            total = requests.len(),
            succeeded = summary.succeeded,
            failed = summary.failed,
            dropped = summary.dropped,
            front_channel = front.len(),
            "Back-channel logout completed"
        );

        let steps = front_channel_steps(&requests, front);
        let Some(first) = steps.first().map(|step| step.encoded.clone()) else {
            return LogoutOutcome::Finished(summary);
        };

        let cursor = FrontChannelCursor::new(steps, relay_state.map(str::to_string), summary);
        if let Err(e) = self.front_channel.save(&key, &cursor).await {
            tracing::error!(
                session = %session.id,
                not_attempted = summary.not_attempted,
                error = %e,
                "Failed to store front-channel logout state"
            );
            return LogoutOutcome::Finished(summary);
        }

        LogoutOutcome::NeedsFrontChannel {
            key,
            first,
            summary,
        }
    }
}

fn back_channel_delivery(
    index: usize,
    request: &SingleLogoutRequest,
    encoded: &EncodedMessage,
) -> Option<Delivery> {
    let (url, body) = LogoutHttpBody::from_encoded(encoded)?;
    Some(Delivery {
        index,
        service_id: request.service().id.clone(),
        url,
        body,
    })
}

fn front_channel_steps(
    requests: &[SingleLogoutRequest],
    front: Vec<(usize, SingleLogoutMessage, EncodedMessage)>,
) -> Vec<FrontChannelStep> {
    front
        .into_iter()
        .filter_map(|(index, message, encoded)| {
            requests.get(index).map(|request| FrontChannelStep {
                request: request.clone(),
                message_id: message.id().to_string(),
                encoded,
            })
        })
        .collect()
}

/// Assembles a [`SingleLogoutEngine`].
///
/// Collaborators left unset fall back to the in-process defaults: an empty
/// metadata registry, the reqwest transport, the in-memory flow store and
/// the default subject resolver.
#[must_use]
pub struct SingleLogoutEngineBuilder {
    config: SloConfig,
    metadata: Option<Arc<dyn MetadataResolver>>,
    transport: Option<Arc<dyn LogoutTransport>>,
    store: Option<Arc<dyn FlowScopeStore>>,
    subjects: Option<SubjectResolver>,
    signer: Option<XmlSigner>,
}

impl SingleLogoutEngineBuilder {
    fn new(config: SloConfig) -> Self {
        Self {
            config,
            metadata: None,
            transport: None,
            store: None,
            subjects: None,
            signer: None,
        }
    }

    /// Sets the metadata registry.
    pub fn metadata(mut self, metadata: Arc<dyn MetadataResolver>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Sets the back-channel transport.
    pub fn transport(mut self, transport: Arc<dyn LogoutTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the flow-scope store.
    pub fn flow_store(mut self, store: Arc<dyn FlowScopeStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the subject resolver.
    pub fn subjects(mut self, subjects: SubjectResolver) -> Self {
        self.subjects = Some(subjects);
        self
    }

    /// Sets the signing credential instead of loading it from configuration.
    pub fn signer(mut self, signer: XmlSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Builds the engine.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid, the signing
    /// credential cannot be loaded or the HTTP client cannot be created.
    pub fn build(self) -> SloResult<SingleLogoutEngine> {
        let config = self.config;
        config.validate()?;

        let signer = match self.signer {
            Some(signer) => Some(signer),
            None => config.load_signer()?,
        };
        if signer.is_none() && config.sign_logout_request {
            return Err(SloError::Config(
                "sign_logout_request is set but no signing key is configured".to_string(),
            ));
        }

        let metadata = self
            .metadata
            .unwrap_or_else(|| Arc::new(InMemoryMetadataResolver::new()));
        let transport: Arc<dyn LogoutTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpLogoutTransport::new(config.request_timeout()).map_err(|e| {
                SloError::Config(format!("cannot create the back-channel client: {e}"))
            })?),
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryFlowScopeStore::new()));

        let builder = MessageBuilder::new(
            &config.issuer,
            config.clock_skew(),
            self.subjects.unwrap_or_default(),
            SigningPolicy::from_config(&config, signer),
        );
        let dispatcher = LogoutDispatcher::new(transport, config.request_timeout())
            .with_concurrency(config.max_concurrency)
            .asynchronous(config.asynchronous);

        tracing::debug!(
            issuer = %config.issuer,
            disabled = config.disabled,
            asynchronous = config.asynchronous,
            "Single logout engine configured"
        );

        Ok(SingleLogoutEngine {
            registry: SessionLogoutRegistry::new(config.disabled),
            resolver: LogoutUrlResolver::new(
                Arc::clone(&metadata),
                config.binding_preference.clone(),
            ),
            metadata,
            builder: Arc::new(builder),
            dispatcher,
            front_channel: FrontChannelLogout::new(store).with_ttl(config.front_channel_ttl()),
            config,
        })
    }
}
