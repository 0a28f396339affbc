//! Single logout HTTP endpoints.
//!
//! - **SLS** - receives logout requests from service providers over any
//!   binding, and logout responses that advance a front-channel logout
//! - **Resume** - advances a front-channel logout after a browser round trip

mod router;
mod sls;
mod state;

pub use router::*;
pub use sls::*;
pub use state::*;
