//! Common test utilities and fixtures.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    routing::post,
    Router,
};
use parking_lot::Mutex;
use reqwest::Client;
use tokio::net::TcpListener;

use slo_engine::endpoints::{slo_router, SloState};
use slo_engine::{
    InMemoryMetadataResolver, SessionTerminator, SingleLogoutEngine, SloConfig, SloResult,
};
use slo_protocol_saml::{NameId, XmlSigner};

/// Entity ID of the SSO server under test.
pub const ISSUER: &str = "https://sso.example.org";

/// A request received by a mock service provider.
#[derive(Debug, Clone)]
pub struct Received {
    /// Path the request was posted to.
    pub path: String,
    /// `Content-Type` header.
    pub content_type: Option<String>,
    /// `SOAPAction` header.
    pub soap_action: Option<String>,
    /// Raw request body.
    pub body: String,
}

impl Received {
    /// Parses a form body.
    pub fn form(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(self.body.as_bytes())
            .into_owned()
            .collect()
    }
}

#[derive(Clone, Default)]
struct ProviderState {
    received: Arc<Mutex<Vec<Received>>>,
}

/// A service provider listening on a loopback port.
///
/// Every `POST /slo/{name}` is recorded. `fail` answers `500`, `slow`
/// never answers within a test timeout and anything else answers `200`.
pub struct MockServiceProvider {
    /// Base URL of the provider.
    pub base_url: String,
    received: Arc<Mutex<Vec<Received>>>,
}

impl MockServiceProvider {
    /// Starts a provider on an ephemeral port.
    pub async fn start() -> anyhow::Result<Self> {
        let state = ProviderState::default();
        let received = Arc::clone(&state.received);
        let app = Router::new()
            .route("/slo/{name}", post(receive))
            .with_state(state);

        let base_url = serve(app).await?;
        Ok(Self { base_url, received })
    }

    /// Absolute URL of a logout endpoint on this provider.
    pub fn url(&self, name: &str) -> String {
        format!("{}/slo/{name}", self.base_url)
    }

    /// Requests received at the named endpoint.
    pub fn received_at(&self, name: &str) -> Vec<Received> {
        let path = format!("/slo/{name}");
        self.received
            .lock()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    /// Total number of requests received.
    pub fn received_count(&self) -> usize {
        self.received.lock().len()
    }
}

async fn receive(
    State(state): State<ProviderState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.received.lock().push(Received {
        path: format!("/slo/{name}"),
        content_type: header(CONTENT_TYPE.as_str()),
        soap_action: header("soapaction"),
        body,
    });

    match name.as_str() {
        "fail" => StatusCode::INTERNAL_SERVER_ERROR,
        "slow" => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            StatusCode::OK
        }
        _ => StatusCode::OK,
    }
}

/// Terminator that records every call.
#[derive(Default)]
pub struct RecordingTerminator {
    /// `(issuer, name_id, session_indexes)` per call.
    pub calls: Mutex<Vec<(String, String, Vec<String>)>>,
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

/// Test environment with one mock service provider and a running SSO
/// server exposing the SLO endpoints.
pub struct TestEnv {
    /// The mock service provider.
    pub sp: MockServiceProvider,
    /// Service provider registry used by the engine.
    pub registry: Arc<InMemoryMetadataResolver>,
    /// The engine behind the SSO server.
    pub engine: Arc<SingleLogoutEngine>,
    /// Records sessions terminated by inbound requests.
    pub terminator: Arc<RecordingTerminator>,
    /// Base URL of the SSO server.
    pub base_url: String,
    /// HTTP client that does not follow redirects.
    pub client: Client,
}

impl TestEnv {
    /// Creates an environment with the test configuration.
    pub async fn new() -> anyhow::Result<Self> {
        Self::start(SloConfig::for_testing(ISSUER), None).await
    }

    /// Creates an environment with the given configuration and signer.
    pub async fn start(config: SloConfig, signer: Option<XmlSigner>) -> anyhow::Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("slo_engine=debug,slo_protocol_saml=debug")
            .try_init();

        let sp = MockServiceProvider::start().await?;
        let registry = Arc::new(InMemoryMetadataResolver::new());

        let mut builder = SingleLogoutEngine::builder(config).metadata(registry.clone());
        if let Some(signer) = signer {
            builder = builder.signer(signer);
        }
        let engine = Arc::new(builder.build()?);

        let terminator = Arc::new(RecordingTerminator::default());
        let state = SloState::new(Arc::clone(&engine), terminator.clone());
        let base_url = serve(slo_router().with_state(state)).await?;

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            sp,
            registry,
            engine,
            terminator,
            base_url,
            client,
        })
    }

    /// URL of the SLS endpoint.
    pub fn slo_url(&self) -> String {
        format!("{}/slo", self.base_url)
    }
}

async fn serve(app: Router) -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let base_url = format!("http://{}", listener.local_addr()?);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });
    Ok(base_url)
}
