//! Single logout configuration.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use slo_protocol_saml::{Binding, SignatureAlgorithm, XmlSigner, DEFAULT_MAX_MESSAGE_SIZE};

use crate::error::{SloError, SloResult};

/// Single logout configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SloConfig {
    /// Entity ID used as `Issuer` on every message this server sends.
    pub issuer: String,

    /// Disables single logout entirely.
    pub disabled: bool,

    /// Fire-and-forget back-channel delivery.
    pub asynchronous: bool,

    /// Back-channel request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum concurrent back-channel calls.
    pub max_concurrency: usize,

    /// Clock skew allowance in seconds.
    pub clock_skew_secs: u64,

    /// Binding preference when resolving service provider endpoints.
    pub binding_preference: Vec<Binding>,

    /// Sign outbound logout requests.
    pub sign_logout_request: bool,

    /// Sign outbound logout responses.
    pub sign_logout_response: bool,

    /// Reject inbound logout requests that are not signed.
    pub require_signed_requests: bool,

    /// Answer inbound logout requests with a `LogoutResponse`.
    pub send_logout_response: bool,

    /// Binding for logout responses to services without their own
    /// preference. Unset answers on the binding the request came in on.
    pub logout_response_binding: Option<Binding>,

    /// Seconds an unfinished front-channel logout is kept.
    pub front_channel_ttl_secs: u64,

    /// Upper bound for decoded inbound messages in bytes.
    pub max_message_size: usize,

    /// Signature algorithm for outbound messages.
    pub signature_algorithm: SignatureAlgorithm,

    /// PEM file holding the signing key.
    pub signing_key_path: Option<PathBuf>,

    /// PEM file holding the signing certificate.
    pub signing_certificate_path: Option<PathBuf>,
}

impl SloConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> SloResult<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let defaults = Self::default();

        let binding_preference = match std::env::var("SLO_BINDING_PREFERENCE") {
            Ok(value) => value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<Binding>()
                        .map_err(|_| SloError::Config(format!("SLO_BINDING_PREFERENCE: {s}")))
                })
                .collect::<SloResult<Vec<_>>>()?,
            Err(_) => defaults.binding_preference,
        };

        let signature_algorithm = match std::env::var("SLO_SIGNATURE_ALGORITHM") {
            Ok(uri) => SignatureAlgorithm::from_uri(&uri)
                .ok_or_else(|| SloError::Config(format!("SLO_SIGNATURE_ALGORITHM: {uri}")))?,
            Err(_) => defaults.signature_algorithm,
        };

        let config = Self {
            issuer: std::env::var("SLO_ISSUER").unwrap_or(defaults.issuer),
            disabled: env_flag("SLO_DISABLED", defaults.disabled),
            asynchronous: env_flag("SLO_ASYNCHRONOUS", defaults.asynchronous),
            request_timeout_secs: env_parse("SLO_REQUEST_TIMEOUT", defaults.request_timeout_secs)?,
            max_concurrency: env_parse("SLO_MAX_CONCURRENCY", defaults.max_concurrency)?,
            clock_skew_secs: env_parse("SLO_CLOCK_SKEW", defaults.clock_skew_secs)?,
            binding_preference,
            sign_logout_request: env_flag("SLO_SIGN_LOGOUT_REQUEST", defaults.sign_logout_request),
            sign_logout_response: env_flag(
                "SLO_SIGN_LOGOUT_RESPONSE",
                defaults.sign_logout_response,
            ),
            require_signed_requests: env_flag(
                "SLO_REQUIRE_SIGNED_REQUESTS",
                defaults.require_signed_requests,
            ),
            send_logout_response: env_flag(
                "SLO_SEND_LOGOUT_RESPONSE",
                defaults.send_logout_response,
            ),
            logout_response_binding: match std::env::var("SLO_LOGOUT_RESPONSE_BINDING") {
                Ok(value) => Some(value.trim().parse::<Binding>().map_err(|_| {
                    SloError::Config(format!("SLO_LOGOUT_RESPONSE_BINDING: {value}"))
                })?),
                Err(_) => defaults.logout_response_binding,
            },
            front_channel_ttl_secs: env_parse(
                "SLO_FRONT_CHANNEL_TTL",
                defaults.front_channel_ttl_secs,
            )?,
            max_message_size: env_parse("SLO_MAX_MESSAGE_SIZE", defaults.max_message_size)?,
            signature_algorithm,
            signing_key_path: std::env::var("SLO_SIGNING_KEY").ok().map(PathBuf::from),
            signing_certificate_path: std::env::var("SLO_SIGNING_CERTIFICATE")
                .ok()
                .map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    /// Creates a configuration for testing.
    #[must_use]
    pub fn for_testing(issuer: &str) -> Self {
        Self {
            issuer: issuer.to_string(),
            request_timeout_secs: 2,
            clock_skew_secs: 30,
            ..Self::default()
        }
    }

    /// Checks the configuration for values the engine cannot work with.
    pub fn validate(&self) -> SloResult<()> {
        if self.issuer.trim().is_empty() {
            return Err(SloError::Config("issuer must not be empty".to_string()));
        }
        if self.max_concurrency == 0 {
            return Err(SloError::Config("max_concurrency must be positive".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(SloError::Config("request timeout must be positive".to_string()));
        }
        if self.front_channel_ttl_secs == 0 {
            return Err(SloError::Config(
                "front-channel TTL must be positive".to_string(),
            ));
        }
        if self.binding_preference.is_empty() {
            return Err(SloError::Config(
                "binding preference must name at least one binding".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the back-channel request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns the clock skew allowance.
    #[must_use]
    pub const fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_secs)
    }

    /// Returns how long an unfinished front-channel logout is kept.
    #[must_use]
    pub const fn front_channel_ttl(&self) -> Duration {
        Duration::from_secs(self.front_channel_ttl_secs)
    }

    /// Loads the signing credential named by the configuration, if any.
    pub fn load_signer(&self) -> SloResult<Option<XmlSigner>> {
        let Some(key_path) = &self.signing_key_path else {
            return Ok(None);
        };

        let key_pem = std::fs::read_to_string(key_path).map_err(|e| {
            SloError::Config(format!("cannot read signing key {}: {e}", key_path.display()))
        })?;
        let certificate_pem = self
            .signing_certificate_path
            .as_ref()
            .map(|path| {
                std::fs::read_to_string(path).map_err(|e| {
                    SloError::Config(format!(
                        "cannot read signing certificate {}: {e}",
                        path.display()
                    ))
                })
            })
            .transpose()?;

        let signer = XmlSigner::from_pem(&key_pem, certificate_pem.as_deref())
            .map_err(|e| SloError::Config(format!("invalid signing credential: {e}")))?;
        Ok(Some(signer.with_algorithm(self.signature_algorithm)))
    }
}

impl Default for SloConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080/sso".to_string(),
            disabled: false,
            asynchronous: false,
            request_timeout_secs: 5,
            max_concurrency: 8,
            clock_skew_secs: 30,
            binding_preference: vec![Binding::Post, Binding::Redirect, Binding::Soap],
            sign_logout_request: false,
            sign_logout_response: false,
            require_signed_requests: false,
            send_logout_response: true,
            logout_response_binding: None,
            front_channel_ttl_secs: 600,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            signature_algorithm: SignatureAlgorithm::default(),
            signing_key_path: None,
            signing_certificate_path: None,
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v.to_lowercase() != "false" && v != "0")
        .unwrap_or(default)
}

fn env_parse<T: FromStr>(name: &str, default: T) -> SloResult<T> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| SloError::Config(format!("{name}: invalid value '{value}'"))),
        Err(_) => Ok(default),
    }
}

/// Signing decisions for outbound and inbound messages.
///
/// Built once from configuration and shared by every logout pass.
#[derive(Debug, Clone, Default)]
pub struct SigningPolicy {
    signer: Option<Arc<XmlSigner>>,
    sign_logout_request: bool,
    sign_logout_response: bool,
    require_signed_requests: bool,
}

impl SigningPolicy {
    /// Creates a policy that signs nothing unless told to.
    #[must_use]
    pub fn new(signer: Option<XmlSigner>) -> Self {
        Self {
            signer: signer.map(Arc::new),
            ..Self::default()
        }
    }

    /// Creates a policy from configuration.
    #[must_use]
    pub fn from_config(config: &SloConfig, signer: Option<XmlSigner>) -> Self {
        Self::new(signer.map(|s| s.with_algorithm(config.signature_algorithm)))
            .with_sign_logout_request(config.sign_logout_request)
            .with_sign_logout_response(config.sign_logout_response)
            .with_require_signed_requests(config.require_signed_requests)
    }

    /// Sets the global flag for signing logout requests.
    #[must_use]
    pub const fn with_sign_logout_request(mut self, sign: bool) -> Self {
        self.sign_logout_request = sign;
        self
    }

    /// Sets the global flag for signing logout responses.
    #[must_use]
    pub const fn with_sign_logout_response(mut self, sign: bool) -> Self {
        self.sign_logout_response = sign;
        self
    }

    /// Sets the global flag for requiring signed inbound requests.
    #[must_use]
    pub const fn with_require_signed_requests(mut self, require: bool) -> Self {
        self.require_signed_requests = require;
        self
    }

    /// Returns the signing credential.
    #[must_use]
    pub fn signer(&self) -> Option<&XmlSigner> {
        self.signer.as_deref()
    }

    /// Whether a logout request should be signed, given a per-service override.
    #[must_use]
    pub fn sign_request(&self, service_override: Option<bool>) -> bool {
        service_override.unwrap_or(self.sign_logout_request)
    }

    /// Whether a logout response should be signed, given a per-service override.
    #[must_use]
    pub fn sign_response(&self, service_override: Option<bool>) -> bool {
        service_override.unwrap_or(self.sign_logout_response)
    }

    /// Whether inbound requests from a service must be signed.
    #[must_use]
    pub const fn requires_signed_requests(&self, service_requires: bool) -> bool {
        self.require_signed_requests || service_requires
    }
}
