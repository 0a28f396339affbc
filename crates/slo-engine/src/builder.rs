//! Logout message construction and signing.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use slo_protocol_saml::{
    Binding, EncodedMessage, LogoutMessage, LogoutRequest, LogoutResponse, NameId,
    SamlMessageType,
};

use crate::config::SigningPolicy;
use crate::error::{SloError, SloResult};
use crate::metadata::ServiceProviderMetadata;
use crate::model::Principal;
use crate::request::SingleLogoutRequest;
use crate::subject::SubjectResolver;

/// NameID placeholder sent to non-federated services.
const NOT_USED_NAME_ID: &str = "@NOT_USED@";

/// A built logout message and its serialized form.
///
/// `payload` is the exact XML that gets encoded, including the enveloped
/// signature when `signed` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleLogoutMessage {
    /// The structured message.
    pub message: LogoutMessage,
    /// The serialized XML.
    pub payload: String,
    /// How the message is carried on the wire.
    pub message_type: SamlMessageType,
    /// The payload carries an enveloped signature.
    pub signed: bool,
}

impl SingleLogoutMessage {
    /// The message ID.
    #[must_use]
    pub fn id(&self) -> &str {
        self.message.id()
    }
}

/// Builds logout requests and responses.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    issuer: String,
    clock_skew: TimeDelta,
    subjects: SubjectResolver,
    policy: SigningPolicy,
}

impl MessageBuilder {
    /// Creates a builder.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        clock_skew: Duration,
        subjects: SubjectResolver,
        policy: SigningPolicy,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            clock_skew: TimeDelta::from_std(clock_skew).unwrap_or_default(),
            subjects,
            policy,
        }
    }

    /// The issuer entity ID.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The signing policy.
    #[must_use]
    pub const fn policy(&self) -> &SigningPolicy {
        &self.policy
    }

    fn issue_instant(&self) -> DateTime<Utc> {
        Utc::now() + self.clock_skew
    }

    /// Builds the logout request for one service.
    ///
    /// The issue instant is future-dated by the clock skew and the request
    /// expires one skew later. The service ticket is sent as `SessionIndex`.
    ///
    /// # Errors
    ///
    /// Returns `Resolution` if the request has no destination and `Build`
    /// if no NameID can be resolved or signing is required but fails.
    pub fn build_request(
        &self,
        request: &SingleLogoutRequest,
        principal: &Principal,
        metadata: Option<&ServiceProviderMetadata>,
    ) -> SloResult<SingleLogoutMessage> {
        let service = request.service();
        let url = request
            .logout_url()
            .ok_or_else(|| SloError::Resolution(service.id.clone()))?;

        let name_id = if service.is_federated() {
            let formats = metadata.map_or(&[][..], |m| m.name_id_formats.as_slice());
            self.subjects
                .resolve(principal, service, formats)
                .ok_or_else(|| {
                    SloError::Build(format!(
                        "no supported identifier format for {}",
                        service.id
                    ))
                })?
        } else {
            NameId::new(NOT_USED_NAME_ID)
        };

        let issue_instant = self.issue_instant();
        let logout = LogoutRequest::new(&self.issuer, name_id)
            .with_destination(&url.location)
            .with_session_index(request.ticket_id())
            .with_issue_instant(issue_instant)
            .with_not_on_or_after(issue_instant + self.clock_skew);

        let sign = service.is_federated()
            && self
                .policy
                .sign_request(metadata.and_then(|m| m.sign_logout_request));
        let payload = self.serialize(&logout.to_xml(), &logout.id, sign)?;

        tracing::debug!(
            service = %service.id,
            ticket_id = request.ticket_id(),
            message_id = %logout.id,
            signed = sign,
            "Built logout request"
        );
        tracing::trace!(payload = %payload, "Logout request payload");

        Ok(SingleLogoutMessage {
            message: LogoutMessage::Request(logout),
            payload,
            message_type: if service.is_federated() {
                SamlMessageType::Request
            } else {
                SamlMessageType::PlainLogoutRequest
            },
            signed: sign,
        })
    }

    /// Builds a success response to an inbound logout request.
    ///
    /// # Errors
    ///
    /// Returns `Build` if signing is required but fails.
    pub fn build_response(
        &self,
        in_response_to: &str,
        destination: &str,
        sign: bool,
    ) -> SloResult<SingleLogoutMessage> {
        let response = LogoutResponse::success(&self.issuer)
            .in_response_to(in_response_to)
            .with_destination(destination)
            .with_issue_instant(self.issue_instant());
        let payload = self.serialize(&response.to_xml(), &response.id, sign)?;

        tracing::debug!(
            message_id = %response.id,
            in_response_to,
            signed = sign,
            "Built logout response"
        );

        Ok(SingleLogoutMessage {
            message: LogoutMessage::Response(response),
            payload,
            message_type: SamlMessageType::Response,
            signed: sign,
        })
    }

    fn serialize(&self, xml: &str, id: &str, sign: bool) -> SloResult<String> {
        if !sign {
            return Ok(xml.to_string());
        }
        let signer = self.policy.signer().ok_or_else(|| {
            SloError::Build("signing is required but no signing credential is configured".into())
        })?;
        Ok(signer.sign(xml, id)?)
    }

    /// Encodes a built message for a binding.
    ///
    /// A signed message sent over Redirect gets a detached query signature
    /// in place of the enveloped one.
    ///
    /// # Errors
    ///
    /// Returns `Encoding` if the binding cannot carry the message.
    pub fn encode(
        &self,
        message: &SingleLogoutMessage,
        binding: Binding,
        destination: &str,
        relay_state: Option<&str>,
    ) -> SloResult<EncodedMessage> {
        let signer = if message.signed && binding == Binding::Redirect {
            self.policy.signer()
        } else {
            None
        };
        Ok(binding.encode(
            &message.payload,
            destination,
            message.message_type,
            relay_state,
            signer,
        )?)
    }
}
