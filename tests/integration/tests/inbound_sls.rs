//! Service-provider-initiated logout through the SLS endpoint.

use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::StatusCode;
use slo_crypto::RsaSigningKey;
use slo_engine::{LogoutEndpoint, ServiceProviderMetadata};
use slo_protocol_saml::{
    Binding, EncodedMessage, LogoutRequest, LogoutResponse, NameId, SamlMessageType,
    VerificationCredential, WireMessage, XmlSigner, DEFAULT_MAX_MESSAGE_SIZE,
};

use crate::common::TestEnv;

const SP: &str = "https://initiator.example.org";

fn register_initiator(env: &TestEnv, signer: &XmlSigner, require_signed: bool) {
    let mut metadata = ServiceProviderMetadata::new(SP)
        .with_endpoint(LogoutEndpoint::new(Binding::Redirect, env.sp.url("redirect")))
        .with_endpoint(
            LogoutEndpoint::new(Binding::Post, env.sp.url("post"))
                .with_response_location(env.sp.url("post-response")),
        )
        .with_endpoint(LogoutEndpoint::new(Binding::Soap, env.sp.url("soap")))
        .with_signing_credential(VerificationCredential::PublicKey(signer.public_key_der()));
    metadata.require_signed_requests = require_signed;
    env.registry.register(metadata);
}

fn logout_request(env: &TestEnv) -> LogoutRequest {
    LogoutRequest::new(SP, NameId::persistent("user-42"))
        .with_destination(env.slo_url())
        .with_session_index("ST-77")
}

fn encode(
    env: &TestEnv,
    binding: Binding,
    xml: &str,
    relay_state: Option<&str>,
    signer: Option<&XmlSigner>,
) -> anyhow::Result<EncodedMessage> {
    Ok(binding.encode(
        xml,
        &env.slo_url(),
        SamlMessageType::Request,
        relay_state,
        signer,
    )?)
}

async fn send(env: &TestEnv, message: EncodedMessage) -> anyhow::Result<reqwest::Response> {
    let response = match message {
        EncodedMessage::Redirect { url } => env.client.get(url).send().await?,
        EncodedMessage::Post(form) => {
            env.client
                .post(&form.action)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(form.to_urlencoded())
                .send()
                .await?
        }
        EncodedMessage::Soap { endpoint, body } => {
            env.client
                .post(endpoint)
                .header(CONTENT_TYPE, "text/xml; charset=utf-8")
                .body(body)
                .send()
                .await?
        }
    };
    Ok(response)
}

fn sp_signer() -> anyhow::Result<XmlSigner> {
    Ok(XmlSigner::new(RsaSigningKey::generate()?, None))
}

/// Tests that a redirect request is answered with a redirect response.
#[tokio::test]
async fn test_redirect_request() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let signer = sp_signer()?;
    register_initiator(&env, &signer, false);
    let request = logout_request(&env);

    let message = encode(&env, Binding::Redirect, &request.to_xml(), Some("sp-state"), None)?;
    let response = send(&env, message).await?;

    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response
        .headers()
        .get(LOCATION)
        .ok_or_else(|| anyhow::anyhow!("missing Location header"))?
        .to_str()?
        .to_string();
    assert!(location.starts_with(&env.sp.url("redirect")));

    let reply = EncodedMessage::Redirect { url: location };
    let decoded = Binding::Redirect.decode(&reply.as_wire(), DEFAULT_MAX_MESSAGE_SIZE)?;
    assert_eq!(decoded.relay_state.as_deref(), Some("sp-state"));
    let logout_response = LogoutResponse::from_xml(&decoded.xml)?;
    assert!(logout_response.is_success());
    assert_eq!(
        logout_response.in_response_to.as_deref(),
        Some(request.id.as_str())
    );

    let calls = env.terminator.calls.lock();
    assert_eq!(
        calls.as_slice(),
        [(
            SP.to_string(),
            "user-42".to_string(),
            vec!["ST-77".to_string()]
        )]
    );
    Ok(())
}

/// Tests that a POST request is answered with an auto-submitting form.
#[tokio::test]
async fn test_post_request() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let signer = sp_signer()?;
    register_initiator(&env, &signer, false);

    let message = encode(&env, Binding::Post, &logout_request(&env).to_xml(), None, None)?;
    let response = send(&env, message).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let html = response.text().await?;
    assert!(html.contains(&env.sp.url("post-response")));
    assert!(html.contains("SAMLResponse"));
    assert_eq!(env.terminator.calls.lock().len(), 1);
    Ok(())
}

/// Tests that a SOAP request is answered in the HTTP body.
#[tokio::test]
async fn test_soap_request() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let signer = sp_signer()?;
    register_initiator(&env, &signer, false);

    let message = encode(&env, Binding::Soap, &logout_request(&env).to_xml(), None, None)?;
    let response = send(&env, message).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/xml")));

    let body = response.text().await?;
    let decoded = Binding::Soap.decode(&WireMessage::Body(&body), DEFAULT_MAX_MESSAGE_SIZE)?;
    assert!(LogoutResponse::from_xml(&decoded.xml)?.is_success());
    assert_eq!(env.terminator.calls.lock().len(), 1);
    Ok(())
}

/// Tests that signed requests are accepted when signing is required.
#[tokio::test]
async fn test_signed_request_accepted() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let signer = sp_signer()?;
    register_initiator(&env, &signer, true);
    let request = logout_request(&env);
    let signed = signer.sign(&request.to_xml(), &request.id)?;

    let message = encode(&env, Binding::Post, &signed, None, None)?;
    let response = send(&env, message).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(env.terminator.calls.lock().len(), 1);
    Ok(())
}

/// Tests that a request signed with the wrong key is rejected.
#[tokio::test]
async fn test_bad_signature_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let signer = sp_signer()?;
    register_initiator(&env, &signer, true);

    let impostor = sp_signer()?;
    let request = logout_request(&env);
    let signed = impostor.sign(&request.to_xml(), &request.id)?;
    let message = encode(&env, Binding::Redirect, &signed, None, Some(&impostor))?;
    let response = send(&env, message).await?;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(env.terminator.calls.lock().is_empty());
    Ok(())
}

/// Tests that an unsigned request is rejected when signing is required.
#[tokio::test]
async fn test_unsigned_request_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let signer = sp_signer()?;
    register_initiator(&env, &signer, true);

    let message = encode(&env, Binding::Soap, &logout_request(&env).to_xml(), None, None)?;
    let response = send(&env, message).await?;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(env.terminator.calls.lock().is_empty());
    Ok(())
}

/// Tests that an unregistered issuer is refused.
#[tokio::test]
async fn test_unknown_issuer_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let request = LogoutRequest::new("https://stranger.example.org", NameId::persistent("x"))
        .with_destination(env.slo_url());

    let message = encode(&env, Binding::Redirect, &request.to_xml(), None, None)?;
    let response = send(&env, message).await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(env.terminator.calls.lock().is_empty());
    Ok(())
}
