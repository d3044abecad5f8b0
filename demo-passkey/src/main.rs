use axum::routing::{Router, get};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use passkey_ceremony::RelyingParty;
use passkey_ceremony_axum::{
    PASSKEY_ROUTE_PREFIX, passkey_ceremony_router, passkey_well_known_router,
};

async fn index() -> String {
    format!(
        "Passkey ceremony endpoints are served under {}",
        PASSKEY_ROUTE_PREFIX.as_str()
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "{}=debug,passkey_ceremony=debug,tower_http=info",
                    env!("CARGO_CRATE_NAME")
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rp = Arc::new(RelyingParty::from_env().await?);

    // Sweep challenges that were issued but never redeemed
    let challenges = rp.challenge_store().clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            match challenges.purge_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::debug!("Purged {} expired challenges", n),
                Err(e) => tracing::warn!("Failed to purge expired challenges: {}", e),
            }
        }
    });

    let app = Router::new()
        .route("/", get(index))
        .nest(PASSKEY_ROUTE_PREFIX.as_str(), passkey_ceremony_router(rp.clone()))
        .nest("/.well-known", passkey_well_known_router(rp));

    let addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string());
    tracing::info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
