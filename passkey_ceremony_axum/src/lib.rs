//! Axum routes for the passkey-ceremony engine.

mod config;
mod error;
mod passkey;
mod router;

pub use config::PASSKEY_ROUTE_PREFIX;
pub use error::IntoResponseError;
pub use passkey::passkey_well_known_router;
pub use router::{passkey_ceremony_router, passkey_ceremony_router_no_trace};

pub use passkey_ceremony::RelyingParty;
