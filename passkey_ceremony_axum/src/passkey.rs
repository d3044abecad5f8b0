use axum::{
    extract::{Json, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::Response,
    routing::{Router, get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use passkey_ceremony::{
    AuthenticationOptions, CeremonyResult, RegistrationOptions, RelyingParty, UserEntity,
    UserHandle,
};

use crate::IntoResponseError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegistrationStartRequest {
    user_handle: UserHandle,
    display_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthenticationStartRequest {
    #[serde(default)]
    user_handle: Option<UserHandle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VerifyRequest {
    ceremony_result: CeremonyResult,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VerifyResponse {
    user_handle: UserHandle,
}

pub fn router(rp: Arc<RelyingParty>) -> Router {
    Router::new()
        .nest("/registration", router_registration())
        .nest("/authentication", router_authentication())
        .with_state(rp)
}

fn router_registration() -> Router<Arc<RelyingParty>> {
    Router::new()
        .route("/options", post(handle_start_registration))
        .route("/verify", post(handle_finish_registration))
}

fn router_authentication() -> Router<Arc<RelyingParty>> {
    Router::new()
        .route("/options", post(handle_start_authentication))
        .route("/verify", post(handle_finish_authentication))
}

/// Creates a router for the WebAuthn well-known endpoint
/// This should be mounted at "/.well-known"
pub fn passkey_well_known_router(rp: Arc<RelyingParty>) -> Router {
    Router::new()
        .route("/webauthn", get(serve_related_origin))
        .with_state(rp)
}

pub(crate) async fn handle_start_registration(
    State(rp): State<Arc<RelyingParty>>,
    Json(request): Json<RegistrationStartRequest>,
) -> Result<Json<RegistrationOptions>, (StatusCode, String)> {
    let user = UserEntity {
        handle: request.user_handle,
        display_name: request.display_name,
    };
    let options = rp.start_registration(user).await.into_response_error()?;
    Ok(Json(options))
}

pub(crate) async fn handle_finish_registration(
    State(rp): State<Arc<RelyingParty>>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, (StatusCode, String)> {
    let CeremonyResult::Registration(response) = request.ceremony_result else {
        return Err((
            StatusCode::BAD_REQUEST,
            "Expected a registration result".to_string(),
        ));
    };
    let user_handle = rp
        .finish_registration(&response)
        .await
        .into_response_error()?;
    Ok(Json(VerifyResponse { user_handle }))
}

pub(crate) async fn handle_start_authentication(
    State(rp): State<Arc<RelyingParty>>,
    Json(request): Json<AuthenticationStartRequest>,
) -> Result<Json<AuthenticationOptions>, (StatusCode, String)> {
    let options = rp
        .start_authentication(request.user_handle.as_ref())
        .await
        .into_response_error()?;
    Ok(Json(options))
}

pub(crate) async fn handle_finish_authentication(
    State(rp): State<Arc<RelyingParty>>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, (StatusCode, String)> {
    let CeremonyResult::Authentication(response) = request.ceremony_result else {
        return Err((
            StatusCode::BAD_REQUEST,
            "Expected an authentication result".to_string(),
        ));
    };
    let user_handle = rp
        .finish_authentication(&response)
        .await
        .into_response_error()?;
    Ok(Json(VerifyResponse { user_handle }))
}

pub(crate) async fn serve_related_origin(
    State(rp): State<Arc<RelyingParty>>,
) -> Result<Response, (StatusCode, String)> {
    let json = rp.config().related_origin_json().into_response_error()?;
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/json")
        .body(json.into())
        .into_response_error()
}
