use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header::CONTENT_TYPE},
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use passkey_ceremony::testing::SoftAuthenticator;
use passkey_ceremony::{
    InMemoryChallengeStore, InMemoryCredentialStore, RelyingParty, RelyingPartyConfig,
};
use passkey_ceremony_axum::{passkey_ceremony_router, passkey_well_known_router};

pub const ORIGIN: &str = "http://localhost:3000";
pub const PREFIX: &str = "/passkey";

/// Router plus the authenticator a simulated browser would use
pub struct TestApp {
    pub app: Router,
    pub authenticator: SoftAuthenticator,
}

impl TestApp {
    pub fn new() -> Self {
        let config = RelyingPartyConfig::new(ORIGIN)
            .unwrap()
            .with_additional_origins(vec!["https://app.example.com".to_string()]);
        let ttl = config.challenge_ttl();
        let rp = Arc::new(RelyingParty::new(
            config,
            Arc::new(InMemoryChallengeStore::new(ttl)),
            Arc::new(InMemoryCredentialStore::new()),
        ));
        let app = Router::new()
            .nest(PREFIX, passkey_ceremony_router(rp.clone()))
            .nest("/.well-known", passkey_well_known_router(rp));
        Self {
            app,
            authenticator: SoftAuthenticator::new(ORIGIN),
        }
    }

    pub async fn post_json(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(format!("{PREFIX}{path}"))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_raw(&self, path: &str, body: &str) -> StatusCode {
        let request = Request::builder()
            .method("POST")
            .uri(format!("{PREFIX}{path}"))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await.0
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }
}
