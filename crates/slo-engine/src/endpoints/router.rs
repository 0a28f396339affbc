//! SLO router configuration.

use axum::{routing::get, Router};

use super::sls::{slo_resume, sls_post, sls_redirect};
use super::state::SloState;

/// Creates the single logout router.
///
/// # Endpoints
///
/// | Method | Path                | Handler        | Description                              |
/// |--------|---------------------|----------------|------------------------------------------|
/// | GET    | `/slo`              | `sls_redirect` | HTTP-Redirect logout requests/responses  |
/// | POST   | `/slo`              | `sls_post`     | HTTP-POST forms and SOAP envelopes       |
/// | GET    | `/slo/resume/{key}` | `slo_resume`   | Continue a front-channel logout          |
///
/// # Usage
///
/// ```rust,ignore
/// use slo_engine::endpoints::{slo_router, SloState};
///
/// let state = SloState::new(engine, terminator);
/// let app = Router::new().merge(slo_router()).with_state(state);
/// ```
pub fn slo_router() -> Router<SloState> {
    Router::new()
        .route("/slo", get(sls_redirect).post(sls_post))
        .route("/slo/resume/{key}", get(slo_resume))
}
