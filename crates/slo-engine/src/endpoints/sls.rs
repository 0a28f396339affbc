//! Single Logout Service endpoint.
//!
//! The binding of an inbound message is taken from the transport: a `GET`
//! query is HTTP-Redirect, a form `POST` is HTTP-POST and an XML `POST` is
//! SOAP.

use axum::{
    extract::{Path, RawQuery, State},
    http::{
        header::{CONTENT_TYPE, LOCATION},
        HeaderMap, StatusCode,
    },
    response::{Html, IntoResponse, Response},
};
use slo_protocol_saml::EncodedMessage;

use crate::engine::LogoutOutcome;
use crate::error::SloError;
use crate::front_channel::FrontChannelProgress;
use crate::inbound::{InboundMessage, InboundOutcome};

use super::state::SloState;

/// GET handler for the SLS endpoint (HTTP-Redirect binding).
pub async fn sls_redirect(State(state): State<SloState>, RawQuery(query): RawQuery) -> Response {
    let message = InboundMessage::Redirect {
        query: query.unwrap_or_default(),
    };
    match handle_inbound(&state, &message).await {
        Ok(response) => response,
        Err(e) => error_response(&e).into_response(),
    }
}

/// POST handler for the SLS endpoint (HTTP-POST and SOAP bindings).
pub async fn sls_post(State(state): State<SloState>, headers: HeaderMap, body: String) -> Response {
    let message = if is_soap(&headers) {
        InboundMessage::Soap { body }
    } else {
        InboundMessage::Post {
            fields: url::form_urlencoded::parse(body.as_bytes())
                .into_owned()
                .collect(),
        }
    };
    match handle_inbound(&state, &message).await {
        Ok(response) => response,
        Err(e) => error_response(&e).into_response(),
    }
}

/// GET handler that continues a front-channel logout.
pub async fn slo_resume(State(state): State<SloState>, Path(key): Path<String>) -> Response {
    match state.engine.front_channel().resume(&key, true).await {
        Ok(progress) => progress_response(progress),
        Err(e) => error_response(&e).into_response(),
    }
}

async fn handle_inbound(state: &SloState, message: &InboundMessage) -> Result<Response, SloError> {
    match state.inbound.handle(message).await? {
        InboundOutcome::Responded { encoded, .. } => Ok(encoded_response(encoded)),
        InboundOutcome::Terminated { .. } => Ok(Html(logout_complete_page()).into_response()),
        InboundOutcome::LogoutResponse {
            response,
            relay_state,
        } => match relay_state {
            Some(key) => {
                let progress = state
                    .engine
                    .front_channel()
                    .resume_with_response(&key, &response)
                    .await?;
                Ok(progress_response(progress))
            }
            None => Ok(Html(logout_complete_page()).into_response()),
        },
    }
}

fn is_soap(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            let value = value.to_ascii_lowercase();
            value.starts_with("text/xml") || value.starts_with("application/soap+xml")
        })
}

/// Turns an encoded message into the HTTP response that delivers it.
///
/// Redirect messages become a `302`, POST messages an auto-submitting form
/// and SOAP messages an XML body.
pub fn encoded_response(message: EncodedMessage) -> Response {
    match message {
        EncodedMessage::Redirect { url } => (StatusCode::FOUND, [(LOCATION, url)]).into_response(),
        EncodedMessage::Post(form) => Html(form.to_html()).into_response(),
        EncodedMessage::Soap { body, .. } => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/xml; charset=utf-8")],
            body,
        )
            .into_response(),
    }
}

/// Renders the result of a logout pass for the browser.
pub fn logout_outcome_response(outcome: LogoutOutcome) -> Response {
    match outcome {
        LogoutOutcome::NeedsFrontChannel { first, .. } => encoded_response(first),
        LogoutOutcome::Finished(_) => Html(logout_complete_page()).into_response(),
    }
}

fn progress_response(progress: FrontChannelProgress) -> Response {
    match progress {
        FrontChannelProgress::Next(message) => encoded_response(message),
        FrontChannelProgress::Finished { .. } => Html(logout_complete_page()).into_response(),
    }
}

/// Generates a logout complete HTML page.
fn logout_complete_page() -> String {
    r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Logout Complete</title>
    <style>
        body { font-family: sans-serif; text-align: center; padding: 50px; }
    </style>
</head>
<body>
    <h1>Logout Complete</h1>
    <p>You have been successfully logged out.</p>
</body>
</html>"#
        .to_string()
}

/// Creates an error response.
fn error_response(err: &SloError) -> (StatusCode, Html<String>) {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Logout Error</title></head>
<body>
<h1>Logout Error</h1>
<p>{err}</p>
</body>
</html>"#
    );
    (status, Html(html))
}
