//! SLO endpoint state.

use std::sync::Arc;

use crate::engine::SingleLogoutEngine;
use crate::inbound::{InboundLogoutHandler, SessionTerminator};

/// State shared by the SLO endpoints.
#[derive(Clone, Debug)]
pub struct SloState {
    /// The outbound engine, used to resume front-channel logouts.
    pub engine: Arc<SingleLogoutEngine>,
    /// The inbound request handler.
    pub inbound: Arc<InboundLogoutHandler>,
}

impl SloState {
    /// Creates the state from an engine and the local session terminator.
    pub fn new(engine: Arc<SingleLogoutEngine>, terminator: Arc<dyn SessionTerminator>) -> Self {
        let inbound = Arc::new(engine.inbound_handler(terminator));
        Self { engine, inbound }
    }
}
