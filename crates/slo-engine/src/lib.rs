//! Single logout engine.
//!
//! When an SSO session ends, every service the user reached under it is
//! told to end its own session:
//!
//! - **Registry** - one pending request per live service ticket
//! - **Resolver** - logout endpoint, binding and channel per service
//! - **Builder** - `LogoutRequest`/`LogoutResponse` construction and signing
//! - **Dispatcher** - concurrent back-channel delivery with per-call timeouts
//! - **Front channel** - browser redirect sequence behind a persisted cursor
//! - **Inbound** - logout requests initiated by service providers
//! - **Endpoints** - axum handlers for the SLS URL
//!
//! # Example
//!
//! ```rust,ignore
//! use slo_engine::{SingleLogoutEngine, SloConfig};
//!
//! let engine = SingleLogoutEngine::builder(SloConfig::from_env()?)
//!     .metadata(registry)
//!     .build()?;
//!
//! match engine.terminate(&session, None).await {
//!     LogoutOutcome::Finished(summary) => { /* done */ }
//!     LogoutOutcome::NeedsFrontChannel { first, .. } => { /* redirect the browser */ }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builder;
pub mod config;
pub mod dispatcher;
pub mod endpoints;
pub mod engine;
pub mod error;
pub mod front_channel;
pub mod inbound;
pub mod metadata;
pub mod model;
pub mod registry;
pub mod request;
pub mod resolver;
pub mod store;
pub mod subject;
pub mod transport;

pub use builder::{MessageBuilder, SingleLogoutMessage};
pub use config::{SigningPolicy, SloConfig};
pub use dispatcher::{Delivery, LogoutDispatcher};
pub use engine::{LogoutOutcome, SingleLogoutEngine, SingleLogoutEngineBuilder};
pub use error::{ErrorKind, SloError, SloResult};
pub use front_channel::{
    FrontChannelCursor, FrontChannelLogout, FrontChannelProgress, FrontChannelStep,
};
pub use inbound::{
    InboundLogoutHandler, InboundMessage, InboundOutcome, InboundState, SessionTerminator,
};
pub use metadata::{
    InMemoryMetadataResolver, LogoutEndpoint, LogoutType, MetadataError, MetadataResolver,
    ServiceProviderMetadata,
};
pub use model::{AccessedService, Principal, ServiceKind, ServiceTicket, SsoSession};
pub use registry::SessionLogoutRegistry;
pub use request::{
    LogoutChannel, LogoutRequestStatus, LogoutSummary, SingleLogoutRequest, SingleLogoutUrl,
};
pub use resolver::LogoutUrlResolver;
pub use store::{FlowScopeStore, InMemoryFlowScopeStore};
pub use subject::{
    AttributeUsernameResolver, PersistentIdGenerator, PrincipalIdUsernameResolver,
    SaltedPersistentIdGenerator, SubjectResolver, UsernameResolver,
};
pub use transport::{HttpLogoutTransport, LogoutHttpBody, LogoutTransport, TransportError};
