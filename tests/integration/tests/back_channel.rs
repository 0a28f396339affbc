//! Back-channel logout over real HTTP.

use std::time::{Duration, Instant};

use slo_crypto::RsaSigningKey;
use slo_engine::{
    AccessedService, LogoutEndpoint, LogoutOutcome, LogoutSummary, Principal,
    ServiceProviderMetadata, ServiceTicket, SloConfig, SsoSession,
};
use slo_protocol_saml::signature::has_enveloped_signature;
use slo_protocol_saml::{
    Binding, LogoutRequest, VerificationCredential, WireMessage, XmlSignatureValidator, XmlSigner,
    DEFAULT_MAX_MESSAGE_SIZE,
};

use crate::common::{TestEnv, ISSUER};

fn register(env: &TestEnv, entity_id: &str, binding: Binding, endpoint: &str) {
    env.registry.register(
        ServiceProviderMetadata::new(entity_id)
            .with_endpoint(LogoutEndpoint::new(binding, env.sp.url(endpoint))),
    );
}

fn session(services: &[AccessedService]) -> SsoSession {
    services.iter().enumerate().fold(
        SsoSession::new("TGT-1-integration", Principal::new("casuser")),
        |session, (i, service)| {
            session.with_ticket(ServiceTicket::new(format!("ST-{i}"), service.clone()))
        },
    )
}

/// Tests that every binding reaches its service with the right body.
#[tokio::test]
async fn test_logout_reaches_every_service() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    register(&env, "https://post.example.org", Binding::Post, "post");
    register(&env, "https://soap.example.org", Binding::Soap, "soap");
    let plain = env.sp.url("plain");

    let session = session(&[
        AccessedService::saml2("https://post.example.org"),
        AccessedService::saml2("https://soap.example.org"),
        AccessedService::plain(&plain),
    ]);
    let outcome = env.engine.terminate(&session, None).await;

    assert_eq!(
        outcome,
        LogoutOutcome::Finished(LogoutSummary {
            succeeded: 3,
            failed: 0,
            not_attempted: 0,
            dropped: 0,
        })
    );

    let post = env.sp.received_at("post");
    assert_eq!(post.len(), 1);
    assert_eq!(
        post[0].content_type.as_deref(),
        Some("application/x-www-form-urlencoded")
    );
    let fields = post[0].form();
    let decoded = Binding::Post.decode(&WireMessage::Form(&fields), DEFAULT_MAX_MESSAGE_SIZE)?;
    let request = LogoutRequest::from_xml(&decoded.xml)?;
    assert_eq!(request.issuer, ISSUER);
    assert_eq!(request.name_id.value, "casuser");
    assert_eq!(request.session_indexes, vec!["ST-0".to_string()]);
    assert_eq!(request.destination.as_deref(), Some(env.sp.url("post").as_str()));

    let soap = env.sp.received_at("soap");
    assert_eq!(soap.len(), 1);
    assert!(soap[0]
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("text/xml")));
    assert!(soap[0].soap_action.is_some());
    let decoded = Binding::Soap.decode(&WireMessage::Body(&soap[0].body), DEFAULT_MAX_MESSAGE_SIZE)?;
    let request = LogoutRequest::from_xml(&decoded.xml)?;
    assert_eq!(request.session_indexes, vec!["ST-1".to_string()]);

    let received = env.sp.received_at("plain");
    assert_eq!(received.len(), 1);
    let fields = received[0].form();
    let (name, xml) = &fields[0];
    assert_eq!(name, "logoutRequest");
    let request = LogoutRequest::from_xml(xml)?;
    assert_eq!(request.name_id.value, "@NOT_USED@");
    assert_eq!(request.session_indexes, vec!["ST-2".to_string()]);

    Ok(())
}

/// Tests that a failing and a hanging service do not hold up the others.
#[tokio::test]
async fn test_failures_are_isolated() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    register(&env, "https://ok.example.org", Binding::Post, "ok");
    register(&env, "https://fail.example.org", Binding::Post, "fail");
    register(&env, "https://slow.example.org", Binding::Soap, "slow");

    let session = session(&[
        AccessedService::saml2("https://ok.example.org"),
        AccessedService::saml2("https://fail.example.org"),
        AccessedService::saml2("https://slow.example.org"),
    ]);

    let started = Instant::now();
    let outcome = env.engine.terminate(&session, None).await;
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "hanging service should be cut off by the request timeout"
    );

    let summary = outcome.summary();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 2);
    assert_eq!(env.sp.received_count(), 3);

    Ok(())
}

/// Tests that an unreachable service counts as a failure.
#[tokio::test]
async fn test_unreachable_service_fails() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    env.registry.register(
        ServiceProviderMetadata::new("https://gone.example.org").with_endpoint(
            LogoutEndpoint::new(Binding::Post, "http://127.0.0.1:1/slo"),
        ),
    );
    register(&env, "https://ok.example.org", Binding::Post, "ok");

    let session = session(&[
        AccessedService::saml2("https://gone.example.org"),
        AccessedService::saml2("https://ok.example.org"),
    ]);
    let outcome = env.engine.terminate(&session, None).await;

    assert_eq!(outcome.summary().succeeded, 1);
    assert_eq!(outcome.summary().failed, 1);
    Ok(())
}

/// Tests that signed requests verify against the server's public key.
#[tokio::test]
async fn test_signed_requests_verify() -> anyhow::Result<()> {
    let signer = XmlSigner::new(RsaSigningKey::generate()?, None);
    let public_key = signer.public_key_der();
    let mut config = SloConfig::for_testing(ISSUER);
    config.sign_logout_request = true;
    let env = TestEnv::start(config, Some(signer)).await?;
    register(&env, "https://post.example.org", Binding::Post, "post");

    let session = session(&[AccessedService::saml2("https://post.example.org")]);
    let outcome = env.engine.terminate(&session, None).await;
    assert_eq!(outcome.summary().succeeded, 1);

    let fields = env.sp.received_at("post")[0].form();
    let decoded = Binding::Post.decode(&WireMessage::Form(&fields), DEFAULT_MAX_MESSAGE_SIZE)?;
    assert!(has_enveloped_signature(&decoded.xml));

    let validator = XmlSignatureValidator::new(vec![VerificationCredential::PublicKey(public_key)]);
    validator.validate(&decoded.xml)?;
    Ok(())
}

/// Tests that a session with nothing to notify finishes immediately.
#[tokio::test]
async fn test_unknown_services_are_dropped() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let session = session(&[
        AccessedService::saml2("https://unregistered.example.org"),
        AccessedService::plain("not a url"),
    ]);
    let outcome = env.engine.terminate(&session, None).await;

    assert_eq!(outcome.summary().dropped, 2);
    assert_eq!(env.sp.received_count(), 0);
    Ok(())
}
