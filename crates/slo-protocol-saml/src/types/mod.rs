//! SAML 2.0 logout types.
//!
//! Logout request and response messages together with the name identifier,
//! status and constant definitions they are built from.

mod constants;
mod logout;
mod name_id;
mod status;

pub use constants::*;
pub use logout::*;
pub use name_id::*;
pub use status::*;
