/// Passkey ceremony flows over HTTP
///
/// Each test plays the browser: it fetches options from the router, hands them
/// to the software authenticator and posts the normalized result back.
use axum::http::StatusCode;
use serde_json::{Value, json};

use passkey_ceremony::{
    Authenticator, AuthenticationOptions, CeremonyResult, RegistrationOptions, base64url_encode,
};

use crate::common::{ORIGIN, TestApp};

async fn register(app: &TestApp, handle: &str, display_name: &str) -> (StatusCode, Value) {
    let (status, options) = app
        .post_json(
            "/registration/options",
            json!({"userHandle": handle, "displayName": display_name}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let options: RegistrationOptions = serde_json::from_value(options).unwrap();
    let result = CeremonyResult::Registration(
        app.authenticator
            .make_credential(&options)
            .await
            .unwrap()
            .unwrap()
            .into_response(),
    );
    app.post_json("/registration/verify", json!({"ceremonyResult": result}))
        .await
}

async fn authentication_result(app: &TestApp, body: Value) -> CeremonyResult {
    let (status, options) = app.post_json("/authentication/options", body).await;
    assert_eq!(status, StatusCode::OK);

    let options: AuthenticationOptions = serde_json::from_value(options).unwrap();
    CeremonyResult::Authentication(
        app.authenticator
            .get_assertion(&options)
            .await
            .unwrap()
            .unwrap()
            .into_response(),
    )
}

#[tokio::test]
async fn test_register_then_login() {
    let app = TestApp::new();

    // Registration
    let (status, body) = register(&app, "alice", "Alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userHandle"], "alice");

    // Login with a user handle
    let result = authentication_result(&app, json!({"userHandle": "alice"})).await;
    let (status, body) = app
        .post_json("/authentication/verify", json!({"ceremonyResult": result}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userHandle"], "alice");

    // Discoverable login without one
    let result = authentication_result(&app, json!({})).await;
    let (status, body) = app
        .post_json("/authentication/verify", json!({"ceremonyResult": result}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userHandle"], "alice");
}

#[tokio::test]
async fn test_registration_options_shape() {
    let app = TestApp::new();
    let (status, options) = app
        .post_json(
            "/registration/options",
            json!({"userHandle": "alice", "displayName": "Alice"}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(options["rp"]["id"], "localhost");
    assert_eq!(options["user"]["id"], base64url_encode(b"alice"));
    assert_eq!(options["user"]["displayName"], "Alice");
    assert_eq!(options["pubKeyCredParams"][0]["alg"], -7);
    assert_eq!(options["pubKeyCredParams"][1]["alg"], -257);
    assert!(options["challenge"].as_str().unwrap().len() >= 43);
}

#[tokio::test]
async fn test_replayed_registration_is_unauthorized() {
    let app = TestApp::new();
    let (_, options) = app
        .post_json(
            "/registration/options",
            json!({"userHandle": "alice", "displayName": "Alice"}),
        )
        .await;
    let options: RegistrationOptions = serde_json::from_value(options).unwrap();
    let result = CeremonyResult::Registration(
        app.authenticator
            .make_credential(&options)
            .await
            .unwrap()
            .unwrap()
            .into_response(),
    );
    let body = json!({"ceremonyResult": result});

    let (status, _) = app.post_json("/registration/verify", body.clone()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, message) = app.post_json("/registration/verify", body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(message, "Challenge not found");
}

#[tokio::test]
async fn test_tampered_origin_is_unauthorized() {
    let app = TestApp::new();
    register(&app, "alice", "Alice").await;

    app.authenticator.set_origin("https://evil.example.com").await;
    let result = authentication_result(&app, json!({"userHandle": "alice"})).await;
    let (status, message) = app
        .post_json("/authentication/verify", json!({"ceremonyResult": result}))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(message, "Origin mismatch: https://evil.example.com");
}

#[tokio::test]
async fn test_related_origin_is_accepted() {
    let app = TestApp::new();
    app.authenticator.set_origin("https://app.example.com").await;

    let (status, body) = register(&app, "alice", "Alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userHandle"], "alice");
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let app = TestApp::new();
    let (status, _) = app
        .post_json("/authentication/options", json!({"userHandle": "nobody"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_wrong_ceremony_on_verify_endpoint() {
    let app = TestApp::new();
    register(&app, "alice", "Alice").await;

    let result = authentication_result(&app, json!({"userHandle": "alice"})).await;
    let (status, _) = app
        .post_json("/registration/verify", json!({"ceremonyResult": result}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_request_bodies() {
    let app = TestApp::new();
    assert!(
        app.post_raw("/registration/verify", "{not json")
            .await
            .is_client_error()
    );
    assert!(
        app.post_raw("/registration/options", r#"{"displayName":"x"}"#)
            .await
            .is_client_error()
    );

    // Well-formed JSON with undecodable base64url
    let (status, _) = app
        .post_json(
            "/authentication/verify",
            json!({"ceremonyResult": {
                "ceremony": "authentication",
                "id": "AQID",
                "rawId": "AQID",
                "type": "public-key",
                "response": {
                    "clientDataJSON": "!!!",
                    "authenticatorData": "",
                    "signature": ""
                }
            }}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_credential_is_conflict() {
    let app = TestApp::new();
    let other = TestApp::new();
    app.authenticator.set_next_credential_id(vec![4; 16]).await;
    other.authenticator.set_next_credential_id(vec![4; 16]).await;

    let (status, _) = register(&app, "alice", "Alice").await;
    assert_eq!(status, StatusCode::OK);

    // A second authenticator offering the same id to the same server
    let (_, options) = app
        .post_json(
            "/registration/options",
            json!({"userHandle": "bob", "displayName": "Bob"}),
        )
        .await;
    let options: RegistrationOptions = serde_json::from_value(options).unwrap();
    let result = CeremonyResult::Registration(
        other
            .authenticator
            .make_credential(&options)
            .await
            .unwrap()
            .unwrap()
            .into_response(),
    );
    let (status, _) = app
        .post_json("/registration/verify", json!({"ceremonyResult": result}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_registration_for_taken_handle_is_conflict() {
    let app = TestApp::new();
    let (status, _) = register(&app, "alice", "Alice").await;
    assert_eq!(status, StatusCode::OK);

    let (status, message) = app
        .post_json(
            "/registration/options",
            json!({"userHandle": "alice", "displayName": "Mallory"}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(message, "User already exists");

    // alice still logs in with her own authenticator
    let result = authentication_result(&app, json!({"userHandle": "alice"})).await;
    let (status, body) = app
        .post_json("/authentication/verify", json!({"ceremonyResult": result}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userHandle"], "alice");
}

#[tokio::test]
async fn test_well_known_webauthn() {
    let app = TestApp::new();
    let (status, body) = app.get("/.well-known/webauthn").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rp_id"], "localhost");
    assert_eq!(body["origins"], json!([ORIGIN, "https://app.example.com"]));
}
