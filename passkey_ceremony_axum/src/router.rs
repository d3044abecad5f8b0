//! Combined router for the ceremony endpoints

use axum::Router;
use passkey_ceremony::RelyingParty;
use std::sync::Arc;
use tower_http::LatencyUnit;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Create a router for the four ceremony endpoints
///
/// Mount it at [`PASSKEY_ROUTE_PREFIX`](crate::PASSKEY_ROUTE_PREFIX). The endpoints will be:
/// - POST {PASSKEY_ROUTE_PREFIX}/registration/options
/// - POST {PASSKEY_ROUTE_PREFIX}/registration/verify
/// - POST {PASSKEY_ROUTE_PREFIX}/authentication/options
/// - POST {PASSKEY_ROUTE_PREFIX}/authentication/verify
pub fn passkey_ceremony_router(rp: Arc<RelyingParty>) -> Router {
    passkey_ceremony_router_no_trace(rp).layer(
        TraceLayer::new_for_http()
            .make_span_with(
                DefaultMakeSpan::new()
                    .level(Level::INFO)
                    .include_headers(true),
            )
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(
                DefaultOnResponse::new()
                    .level(Level::INFO)
                    .latency_unit(LatencyUnit::Millis),
            ),
    )
}

/// Same as `passkey_ceremony_router()` but without the HTTP tracing middleware.
pub fn passkey_ceremony_router_no_trace(rp: Arc<RelyingParty>) -> Router {
    super::passkey::router(rp)
}
