//! Inbound single logout requests.
//!
//! A service provider asks the SSO server to end a session. The message is
//! decoded with the binding of the transport it arrived on, checked against
//! the sender's published credentials, and the matching local sessions are
//! terminated. A success response goes back over the same binding unless
//! the request is asynchronous or the service does not expect one.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use slo_protocol_saml::signature::has_enveloped_signature;
use slo_protocol_saml::{
    Binding, DecodedMessage, EncodedMessage, LogoutMessage, LogoutRequest, LogoutResponse, NameId,
    WireMessage, XmlSignatureValidator, DEFAULT_MAX_MESSAGE_SIZE,
};

use crate::builder::{MessageBuilder, SingleLogoutMessage};
use crate::config::SloConfig;
use crate::error::{SloError, SloResult};
use crate::metadata::{MetadataResolver, ServiceProviderMetadata};

/// An inbound message as received over HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// `GET` with a raw query string.
    Redirect {
        /// The raw, still URL-encoded query string.
        query: String,
    },
    /// `POST` with form fields.
    Post {
        /// Decoded form fields.
        fields: Vec<(String, String)>,
    },
    /// `POST` with a SOAP envelope.
    Soap {
        /// The envelope.
        body: String,
    },
}

impl InboundMessage {
    /// The binding implied by the transport.
    #[must_use]
    pub const fn binding(&self) -> Binding {
        match self {
            Self::Redirect { .. } => Binding::Redirect,
            Self::Post { .. } => Binding::Post,
            Self::Soap { .. } => Binding::Soap,
        }
    }

    /// Borrows the message in codec form.
    #[must_use]
    pub fn as_wire(&self) -> WireMessage<'_> {
        match self {
            Self::Redirect { query } => WireMessage::Query(query),
            Self::Post { fields } => WireMessage::Form(fields),
            Self::Soap { body } => WireMessage::Body(body),
        }
    }

    /// Rebuilds what a receiver sees for an encoded message.
    #[must_use]
    pub fn from_encoded(message: &EncodedMessage) -> Self {
        match message.as_wire() {
            WireMessage::Query(query) => Self::Redirect {
                query: query.to_string(),
            },
            WireMessage::Form(fields) => Self::Post {
                fields: fields.to_vec(),
            },
            WireMessage::Body(body) => Self::Soap {
                body: body.to_string(),
            },
        }
    }
}

/// Processing state of an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundState {
    /// Decoded, not yet trusted.
    Received,
    /// Signature and freshness checks passed.
    Validated,
    /// Sessions terminated and a response produced.
    Responded,
    /// Failed validation. Nothing was terminated or sent.
    Rejected,
}

impl fmt::Display for InboundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Received => "RECEIVED",
            Self::Validated => "VALIDATED",
            Self::Responded => "RESPONDED",
            Self::Rejected => "REJECTED",
        })
    }
}

/// Ends local sessions on behalf of an inbound logout request.
#[async_trait]
pub trait SessionTerminator: Send + Sync {
    /// Terminates the sessions of a subject at a service and returns how
    /// many were ended.
    async fn terminate(
        &self,
        issuer: &str,
        name_id: &NameId,
        session_indexes: &[String],
    ) -> SloResult<usize>;
}

/// Result of handling an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Sessions terminated and a response is ready to send.
    Responded {
        /// ID of the inbound request.
        request_id: String,
        /// Number of sessions terminated.
        terminated: usize,
        /// The built response.
        response: Box<SingleLogoutMessage>,
        /// The response encoded for the reply binding.
        encoded: EncodedMessage,
    },
    /// Sessions terminated and no response is expected.
    Terminated {
        /// ID of the inbound request.
        request_id: String,
        /// Number of sessions terminated.
        terminated: usize,
    },
    /// A service answered one of our front-channel requests.
    LogoutResponse {
        /// The response.
        response: LogoutResponse,
        /// Relay state echoed by the service.
        relay_state: Option<String>,
    },
}

impl InboundOutcome {
    /// The state reached.
    #[must_use]
    pub const fn state(&self) -> InboundState {
        match self {
            Self::Responded { .. } => InboundState::Responded,
            Self::Terminated { .. } | Self::LogoutResponse { .. } => InboundState::Validated,
        }
    }
}

/// Handles logout requests sent by service providers.
#[derive(Clone)]
pub struct InboundLogoutHandler {
    metadata: Arc<dyn MetadataResolver>,
    builder: Arc<MessageBuilder>,
    terminator: Arc<dyn SessionTerminator>,
    max_message_size: usize,
    send_logout_response: bool,
    response_binding: Option<Binding>,
    clock_skew: TimeDelta,
}

impl fmt::Debug for InboundLogoutHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundLogoutHandler")
            .field("max_message_size", &self.max_message_size)
            .field("send_logout_response", &self.send_logout_response)
            .field("response_binding", &self.response_binding)
            .finish_non_exhaustive()
    }
}

impl InboundLogoutHandler {
    /// Creates a handler with default limits.
    #[must_use]
    pub fn new(
        metadata: Arc<dyn MetadataResolver>,
        builder: Arc<MessageBuilder>,
        terminator: Arc<dyn SessionTerminator>,
    ) -> Self {
        Self {
            metadata,
            builder,
            terminator,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            send_logout_response: true,
            response_binding: None,
            clock_skew: TimeDelta::zero(),
        }
    }

    /// Applies limits and response policy from configuration.
    #[must_use]
    pub fn with_config(mut self, config: &SloConfig) -> Self {
        self.max_message_size = config.max_message_size;
        self.send_logout_response = config.send_logout_response;
        self.response_binding = config.logout_response_binding;
        self.clock_skew = TimeDelta::from_std(config.clock_skew()).unwrap_or_default();
        self
    }

    /// Sets the clock skew tolerated on `NotOnOrAfter`.
    #[must_use]
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = TimeDelta::from_std(skew).unwrap_or_default();
        self
    }

    /// Processes an inbound message.
    ///
    /// # Errors
    ///
    /// Returns `Encoding` for undecodable messages, `UnknownServiceProvider`
    /// for unregistered issuers, `Security` when validation fails and
    /// `Resolution` when the service cannot receive the response. A
    /// rejected request terminates nothing and produces no response.
    pub async fn handle(&self, message: &InboundMessage) -> SloResult<InboundOutcome> {
        let binding = message.binding();
        let decoded = binding.decode(&message.as_wire(), self.max_message_size)?;

        let request = match LogoutMessage::from_xml(&decoded.xml)? {
            LogoutMessage::Response(response) => {
                tracing::debug!(
                    issuer = %response.issuer,
                    in_response_to = ?response.in_response_to,
                    binding = %binding,
                    "Received logout response"
                );
                return Ok(InboundOutcome::LogoutResponse {
                    response,
                    relay_state: decoded.relay_state,
                });
            }
            LogoutMessage::Request(request) => request,
        };
        request.validate()?;

        tracing::debug!(
            issuer = %request.issuer,
            request_id = %request.id,
            binding = %binding,
            state = %InboundState::Received,
            "Received logout request"
        );

        let metadata = self
            .metadata
            .resolve(&request.issuer)
            .await?
            .ok_or_else(|| SloError::UnknownServiceProvider(request.issuer.clone()))?;

        if let Err(e) = self.validate(&decoded, &request, &metadata) {
            tracing::warn!(
                issuer = %request.issuer,
                request_id = %request.id,
                binding = %binding,
                state = %InboundState::Rejected,
                error = ?e,
                "Rejected logout request"
            );
            return Err(e);
        }

        let answer = !request.asynchronous
            && self.send_logout_response
            && metadata.expects_logout_response;
        let reply = answer
            .then(|| self.reply_endpoint(binding, &metadata))
            .transpose()?;

        let terminated = self
            .terminator
            .terminate(&request.issuer, &request.name_id, &request.session_indexes)
            .await?;

        tracing::info!(
            issuer = %request.issuer,
            request_id = %request.id,
            terminated,
            state = %InboundState::Validated,
            "Terminated sessions for inbound logout request"
        );

        let Some((reply_binding, destination)) = reply else {
            return Ok(InboundOutcome::Terminated {
                request_id: request.id,
                terminated,
            });
        };
        let sign = self
            .builder
            .policy()
            .sign_response(metadata.sign_logout_response);
        let response = self.builder.build_response(&request.id, &destination, sign)?;
        let encoded = self.builder.encode(
            &response,
            reply_binding,
            &destination,
            decoded.relay_state.as_deref(),
        )?;

        tracing::info!(
            issuer = %request.issuer,
            request_id = %request.id,
            binding = %reply_binding,
            location = %destination,
            state = %InboundState::Responded,
            "Logout response ready"
        );

        Ok(InboundOutcome::Responded {
            request_id: request.id,
            terminated,
            response: Box::new(response),
            encoded,
        })
    }

    fn validate(
        &self,
        decoded: &DecodedMessage,
        request: &LogoutRequest,
        metadata: &ServiceProviderMetadata,
    ) -> SloResult<()> {
        let required = self
            .builder
            .policy()
            .requires_signed_requests(metadata.require_signed_requests);
        let detached = decoded.signature.is_some();
        let enveloped = has_enveloped_signature(&decoded.xml);

        if required || detached || enveloped {
            let validator = XmlSignatureValidator::new(metadata.signing_credentials.clone());
            let result = match (
                &decoded.signed_query,
                &decoded.signature,
                &decoded.sig_alg,
            ) {
                (Some(query), Some(signature), Some(sig_alg)) => {
                    validator.validate_redirect_binding(query, signature, sig_alg)
                }
                _ if enveloped => validator.validate(&decoded.xml).map(|_| ()),
                _ => {
                    return Err(SloError::Security(
                        "logout request is not signed".to_string(),
                    ))
                }
            };
            result.map_err(|e| SloError::Security(e.to_string()))?;
        }

        if request.is_expired(Utc::now() - self.clock_skew) {
            return Err(SloError::Security("logout request has expired".to_string()));
        }
        Ok(())
    }

    /// Picks the binding and location of the response.
    ///
    /// SOAP requests are answered in the HTTP response. Otherwise the
    /// service's response binding wins, then the configured one, then the
    /// binding the request came in on. The service must advertise an
    /// endpoint for the chosen binding; there is no fallback to another.
    fn reply_endpoint(
        &self,
        binding: Binding,
        metadata: &ServiceProviderMetadata,
    ) -> SloResult<(Binding, String)> {
        if binding == Binding::Soap {
            let location = metadata
                .endpoint(Binding::Soap)
                .map_or(metadata.entity_id.as_str(), |e| e.response_url());
            return Ok((Binding::Soap, location.to_string()));
        }

        let reply = metadata
            .logout_response_binding
            .or(self.response_binding)
            .filter(|candidate| *candidate != Binding::Soap)
            .unwrap_or(binding);
        metadata
            .endpoint(reply)
            .map(|endpoint| (reply, endpoint.response_url().to_string()))
            .ok_or_else(|| {
                SloError::Resolution(format!(
                    "{} has no {reply} logout response endpoint",
                    metadata.entity_id
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use slo_crypto::RsaSigningKey;
    use slo_protocol_saml::{SamlMessageType, VerificationCredential, XmlSigner};

    use super::*;
    use crate::config::SigningPolicy;
    use crate::metadata::{InMemoryMetadataResolver, LogoutEndpoint};
    use crate::subject::SubjectResolver;

    const SP: &str = "https://sp.example.org";
    const SSO: &str = "https://sso.example.org/slo";

    #[derive(Default)]
    struct RecordingTerminator {
        calls: Mutex<Vec<(String, String, Vec<String>)>>,
    }

    #[async_trait]
    impl SessionTerminator for RecordingTerminator {
        async fn terminate(
            &self,
            issuer: &str,
            name_id: &NameId,
            session_indexes: &[String],
        ) -> SloResult<usize> {
            self.calls.lock().push((
                issuer.to_string(),
                name_id.value.clone(),
                session_indexes.to_vec(),
            ));
            Ok(1)
        }
    }

    struct Fixture {
        handler: InboundLogoutHandler,
        terminator: Arc<RecordingTerminator>,
        sp_signer: XmlSigner,
    }

    fn sp_metadata(sp_signer: &XmlSigner) -> ServiceProviderMetadata {
        ServiceProviderMetadata::new(SP)
            .with_endpoint(LogoutEndpoint::new(Binding::Redirect, format!("{SP}/slo/redirect")))
            .with_endpoint(
                LogoutEndpoint::new(Binding::Post, format!("{SP}/slo/post"))
                    .with_response_location(format!("{SP}/slo/post/response")),
            )
            .with_endpoint(LogoutEndpoint::new(Binding::Soap, format!("{SP}/slo/soap")))
            .with_signing_credential(VerificationCredential::PublicKey(
                sp_signer.public_key_der(),
            ))
    }

    fn fixture(configure: impl FnOnce(&mut ServiceProviderMetadata)) -> Fixture {
        let sp_signer = XmlSigner::new(RsaSigningKey::generate().unwrap(), None);
        let mut metadata = sp_metadata(&sp_signer);
        configure(&mut metadata);

        let registry = Arc::new(InMemoryMetadataResolver::new());
        registry.register(metadata);

        let builder = MessageBuilder::new(
            "https://sso.example.org",
            Duration::from_secs(30),
            SubjectResolver::default(),
            SigningPolicy::default(),
        );
        let terminator = Arc::new(RecordingTerminator::default());
        let handler =
            InboundLogoutHandler::new(registry, Arc::new(builder), terminator.clone())
                .with_clock_skew(Duration::from_secs(30));

        Fixture {
            handler,
            terminator,
            sp_signer,
        }
    }

    fn logout_request() -> LogoutRequest {
        LogoutRequest::new(SP, NameId::persistent("abc"))
            .with_destination(SSO)
            .with_session_index("ST-1")
    }

    fn inbound(
        binding: Binding,
        xml: &str,
        relay_state: Option<&str>,
        signer: Option<&XmlSigner>,
    ) -> InboundMessage {
        let encoded = binding
            .encode(xml, SSO, SamlMessageType::Request, relay_state, signer)
            .unwrap();
        InboundMessage::from_encoded(&encoded)
    }

    #[tokio::test]
    async fn redirect_request_gets_redirect_response() {
        let fx = fixture(|_| {});
        let request = logout_request();
        let message = inbound(Binding::Redirect, &request.to_xml(), Some("rs"), None);

        let outcome = fx.handler.handle(&message).await.unwrap();
        assert_eq!(outcome.state(), InboundState::Responded);
        let InboundOutcome::Responded {
            request_id,
            encoded,
            response,
            ..
        } = outcome
        else {
            panic!("expected a response");
        };
        assert_eq!(request_id, request.id);
        assert_eq!(encoded.binding(), Binding::Redirect);
        assert_eq!(encoded.destination(), format!("{SP}/slo/redirect"));

        let LogoutMessage::Response(response) = response.message else {
            panic!("expected a logout response");
        };
        assert_eq!(response.in_response_to.as_deref(), Some(request.id.as_str()));
        assert!(response.is_success());

        let decoded = Binding::Redirect
            .decode(&encoded.as_wire(), DEFAULT_MAX_MESSAGE_SIZE)
            .unwrap();
        assert_eq!(decoded.relay_state.as_deref(), Some("rs"));

        let calls = fx.terminator.calls.lock();
        assert_eq!(
            calls.as_slice(),
            [(SP.to_string(), "abc".to_string(), vec!["ST-1".to_string()])]
        );
    }

    #[tokio::test]
    async fn post_request_gets_post_response_at_response_location() {
        let fx = fixture(|_| {});
        let message = inbound(Binding::Post, &logout_request().to_xml(), None, None);

        let InboundOutcome::Responded { encoded, .. } = fx.handler.handle(&message).await.unwrap()
        else {
            panic!("expected a response");
        };
        assert_eq!(encoded.binding(), Binding::Post);
        assert_eq!(encoded.destination(), format!("{SP}/slo/post/response"));
    }

    #[tokio::test]
    async fn soap_request_is_answered_in_the_body() {
        let fx = fixture(|_| {});
        let message = inbound(Binding::Soap, &logout_request().to_xml(), None, None);

        let InboundOutcome::Responded { encoded, .. } = fx.handler.handle(&message).await.unwrap()
        else {
            panic!("expected a response");
        };
        assert!(matches!(encoded, EncodedMessage::Soap { .. }));
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_before_anything_happens() {
        let fx = fixture(|m| m.require_signed_requests = true);
        let impostor = XmlSigner::new(RsaSigningKey::generate().unwrap(), None);
        let request = logout_request();
        let signed = impostor.sign(&request.to_xml(), &request.id).unwrap();
        let message = inbound(Binding::Post, &signed, None, None);

        let err = fx.handler.handle(&message).await.unwrap_err();
        assert!(err.is_security());
        assert_eq!(err.to_string(), "logout request rejected");
        assert!(fx.terminator.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn unsigned_request_is_rejected_when_signing_is_required() {
        let fx = fixture(|m| m.require_signed_requests = true);
        let message = inbound(Binding::Post, &logout_request().to_xml(), None, None);

        let err = fx.handler.handle(&message).await.unwrap_err();
        assert!(err.is_security());
        assert!(fx.terminator.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn signed_requests_are_accepted() {
        let fx = fixture(|m| m.require_signed_requests = true);
        let request = logout_request();
        let signed = fx.sp_signer.sign(&request.to_xml(), &request.id).unwrap();

        let post = inbound(Binding::Post, &signed, None, None);
        assert!(fx.handler.handle(&post).await.is_ok());

        let redirect = inbound(Binding::Redirect, &signed, Some("rs"), Some(&fx.sp_signer));
        assert!(fx.handler.handle(&redirect).await.is_ok());
        assert_eq!(fx.terminator.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn tampered_redirect_query_is_rejected() {
        let fx = fixture(|_| {});
        let request = logout_request();
        let signed = fx.sp_signer.sign(&request.to_xml(), &request.id).unwrap();
        let InboundMessage::Redirect { query } =
            inbound(Binding::Redirect, &signed, Some("rs"), Some(&fx.sp_signer))
        else {
            panic!("expected a redirect");
        };

        let tampered = InboundMessage::Redirect {
            query: query.replace("RelayState=rs", "RelayState=evil"),
        };
        let err = fx.handler.handle(&tampered).await.unwrap_err();
        assert!(err.is_security());
        assert!(fx.terminator.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn prepended_message_cannot_reuse_a_redirect_signature() {
        let fx = fixture(|m| m.require_signed_requests = true);
        let request = logout_request();
        let signed = fx.sp_signer.sign(&request.to_xml(), &request.id).unwrap();
        let InboundMessage::Redirect { query } =
            inbound(Binding::Redirect, &signed, None, Some(&fx.sp_signer))
        else {
            panic!("expected a redirect");
        };

        let victim = LogoutRequest::new(SP, NameId::persistent("victim")).with_destination(SSO);
        let InboundMessage::Redirect { query: forged } =
            inbound(Binding::Redirect, &victim.to_xml(), None, None)
        else {
            panic!("expected a redirect");
        };
        let forged = forged.strip_prefix("SAMLRequest=").unwrap();

        let message = InboundMessage::Redirect {
            query: format!("SAML%52equest={forged}&{query}"),
        };
        assert!(matches!(
            fx.handler.handle(&message).await,
            Err(SloError::Encoding(_))
        ));
        assert!(fx.terminator.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn content_after_a_signed_request_is_rejected() {
        let fx = fixture(|m| m.require_signed_requests = true);
        let request = logout_request();
        let signed = fx.sp_signer.sign(&request.to_xml(), &request.id).unwrap();
        let wrapped = format!(
            "{signed}<saml:NameID>victim</saml:NameID><samlp:SessionIndex>ST-victim</samlp:SessionIndex>"
        );

        for binding in [Binding::Post, Binding::Soap] {
            let message = inbound(binding, &wrapped, None, None);
            assert!(fx.handler.handle(&message).await.is_err(), "{binding}");
        }
        assert!(fx.terminator.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn missing_reply_endpoint_is_rejected_before_termination() {
        let fx = fixture(|m| m.logout_endpoints.retain(|e| e.binding != Binding::Redirect));
        let message = inbound(Binding::Redirect, &logout_request().to_xml(), None, None);

        assert!(matches!(
            fx.handler.handle(&message).await,
            Err(SloError::Resolution(_))
        ));
        assert!(fx.terminator.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn asynchronous_request_gets_no_response() {
        let fx = fixture(|_| {});
        let xml = logout_request().asynchronous(true).to_xml();
        let message = inbound(Binding::Redirect, &xml, None, None);

        let outcome = fx.handler.handle(&message).await.unwrap();
        assert!(matches!(outcome, InboundOutcome::Terminated { terminated: 1, .. }));
        assert_eq!(outcome.state(), InboundState::Validated);
    }

    #[tokio::test]
    async fn service_not_expecting_a_response_gets_none() {
        let fx = fixture(|m| m.expects_logout_response = false);
        let message = inbound(Binding::Post, &logout_request().to_xml(), None, None);

        assert!(matches!(
            fx.handler.handle(&message).await.unwrap(),
            InboundOutcome::Terminated { .. }
        ));
    }

    #[tokio::test]
    async fn response_binding_override() {
        let fx = fixture(|m| m.logout_response_binding = Some(Binding::Post));
        let message = inbound(Binding::Redirect, &logout_request().to_xml(), None, None);

        let InboundOutcome::Responded { encoded, .. } = fx.handler.handle(&message).await.unwrap()
        else {
            panic!("expected a response");
        };
        assert_eq!(encoded.binding(), Binding::Post);
    }

    #[tokio::test]
    async fn expired_request_is_rejected() {
        let fx = fixture(|_| {});
        let xml = logout_request()
            .with_not_on_or_after(Utc::now() - TimeDelta::minutes(10))
            .to_xml();
        let message = inbound(Binding::Post, &xml, None, None);

        assert!(fx.handler.handle(&message).await.unwrap_err().is_security());
        assert!(fx.terminator.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn unknown_issuer() {
        let fx = fixture(|_| {});
        let xml = LogoutRequest::new("https://stranger.example.org", NameId::persistent("abc"))
            .to_xml();
        let message = inbound(Binding::Post, &xml, None, None);

        assert!(matches!(
            fx.handler.handle(&message).await,
            Err(SloError::UnknownServiceProvider(_))
        ));
    }

    #[tokio::test]
    async fn logout_responses_are_handed_back() {
        let fx = fixture(|_| {});
        let xml = LogoutResponse::success(SP).in_response_to("_abc").to_xml();
        let encoded = Binding::Redirect
            .encode(&xml, SSO, SamlMessageType::Response, Some("cursor"), None)
            .unwrap();

        let outcome = fx
            .handler
            .handle(&InboundMessage::from_encoded(&encoded))
            .await
            .unwrap();
        let InboundOutcome::LogoutResponse {
            response,
            relay_state,
        } = outcome
        else {
            panic!("expected a logout response");
        };
        assert_eq!(response.in_response_to.as_deref(), Some("_abc"));
        assert_eq!(relay_state.as_deref(), Some("cursor"));
    }

    #[tokio::test]
    async fn undecodable_message_is_an_encoding_error() {
        let fx = fixture(|_| {});
        let message = InboundMessage::Redirect {
            query: "SAMLRequest=%%%".to_string(),
        };
        assert!(matches!(
            fx.handler.handle(&message).await,
            Err(SloError::Encoding(_))
        ));
    }
}
