//! Front-channel logout driven through the SLO endpoints.

use reqwest::header::LOCATION;
use reqwest::StatusCode;
use slo_engine::{
    AccessedService, LogoutEndpoint, LogoutOutcome, LogoutType, Principal,
    ServiceProviderMetadata, ServiceTicket, SsoSession,
};
use slo_protocol_saml::{
    Binding, EncodedMessage, LogoutRequest, LogoutResponse, SamlMessageType, Status,
    DEFAULT_MAX_MESSAGE_SIZE,
};

use crate::common::TestEnv;

const FIRST: &str = "https://front1.example.org";
const SECOND: &str = "https://front2.example.org";

fn register_front(env: &TestEnv, entity_id: &str, endpoint: &str) {
    env.registry.register(
        ServiceProviderMetadata::new(entity_id)
            .with_endpoint(LogoutEndpoint::new(Binding::Redirect, env.sp.url(endpoint))),
    );
}

/// Decodes the logout request a redirect URL carries.
fn request_in(url: &str) -> anyhow::Result<(LogoutRequest, Option<String>)> {
    let message = EncodedMessage::Redirect {
        url: url.to_string(),
    };
    let decoded = Binding::Redirect.decode(&message.as_wire(), DEFAULT_MAX_MESSAGE_SIZE)?;
    Ok((LogoutRequest::from_xml(&decoded.xml)?, decoded.relay_state))
}

/// Builds the URL a service redirects the browser to with its response.
fn response_url(
    env: &TestEnv,
    issuer: &str,
    status: Status,
    in_response_to: &str,
    relay_state: &str,
) -> anyhow::Result<String> {
    let xml = LogoutResponse::new(issuer, status)
        .in_response_to(in_response_to)
        .with_destination(env.slo_url())
        .to_xml();
    let encoded = Binding::Redirect.encode(
        &xml,
        &env.slo_url(),
        SamlMessageType::Response,
        Some(relay_state),
        None,
    )?;
    let EncodedMessage::Redirect { url } = encoded else {
        anyhow::bail!("expected a redirect");
    };
    Ok(url)
}

fn location(response: &reqwest::Response) -> anyhow::Result<String> {
    Ok(response
        .headers()
        .get(LOCATION)
        .ok_or_else(|| anyhow::anyhow!("missing Location header"))?
        .to_str()?
        .to_string())
}

/// Tests the full browser round trip across two services.
#[tokio::test]
async fn test_front_channel_sequence() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    register_front(&env, FIRST, "front1");
    register_front(&env, SECOND, "front2");

    let session = SsoSession::new("TGT-2-integration", Principal::new("casuser"))
        .with_ticket(ServiceTicket::new("ST-1", AccessedService::saml2(FIRST)))
        .with_ticket(ServiceTicket::new("ST-2", AccessedService::saml2(SECOND)));

    let LogoutOutcome::NeedsFrontChannel { key, first, summary } =
        env.engine.terminate(&session, Some("app-state")).await
    else {
        anyhow::bail!("expected a front-channel logout");
    };
    assert_eq!(summary.not_attempted, 2);
    assert_eq!(first.destination(), env.sp.url("front1"));

    let EncodedMessage::Redirect { url } = first else {
        anyhow::bail!("expected a redirect");
    };
    let (request, relay_state) = request_in(&url)?;
    assert_eq!(relay_state.as_deref(), Some(key.as_str()));
    assert_eq!(request.session_indexes, vec!["ST-1".to_string()]);

    // First service answers; the browser is sent on to the second one.
    let response = env
        .client
        .get(response_url(&env, FIRST, Status::success(), &request.id, &key)?)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    let next = location(&response)?;
    assert!(next.starts_with(&env.sp.url("front2")));
    let (request, _) = request_in(&next)?;
    assert_eq!(request.session_indexes, vec!["ST-2".to_string()]);

    // Second service refuses; the sequence still completes.
    let response = env
        .client
        .get(response_url(
            &env,
            SECOND,
            Status::responder_error("busy"),
            &request.id,
            &key,
        )?)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.text().await?.contains("Logout Complete"));

    // The cursor is gone once finished.
    assert!(env.engine.front_channel().load(&key).await.is_err());
    Ok(())
}

/// Tests that a non-federated front-channel service resumes by key.
#[tokio::test]
async fn test_plain_service_resumes_by_key() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let service_url = env.sp.url("plain-front");
    let mut metadata = ServiceProviderMetadata::new(&service_url);
    metadata.logout_type = LogoutType::FrontChannel;
    env.registry.register(metadata);

    let session = SsoSession::new("TGT-3-integration", Principal::new("casuser"))
        .with_ticket(ServiceTicket::new("ST-9", AccessedService::plain(&service_url)));

    let LogoutOutcome::NeedsFrontChannel { key, first, .. } =
        env.engine.terminate(&session, None).await
    else {
        anyhow::bail!("expected a front-channel logout");
    };
    let EncodedMessage::Redirect { url } = first else {
        anyhow::bail!("expected a redirect");
    };
    assert!(url.contains("logoutRequest="));

    let response = env
        .client
        .get(format!("{}/slo/resume/{key}", env.base_url))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = env
        .client
        .get(format!("{}/slo/resume/{key}", env.base_url))
        .send()
        .await?;
    assert!(!response.status().is_success());
    Ok(())
}
