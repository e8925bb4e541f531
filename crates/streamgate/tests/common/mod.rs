#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::time::Duration;
use streamgate::commands::jwt::encode_token;
use streamgate::config::ServerConfig;
use streamgate::server::{AppState, build_router};
use streamgate_core::TrustAnchor;

// Same keys as streamgate-core's unit tests
pub const TRUSTED_PRIVATE_PEM: &str = include_str!("../../../streamgate-core/tests/fixtures/trusted_private.pem");
pub const TRUSTED_PUBLIC_PEM: &str = include_str!("../../../streamgate-core/tests/fixtures/trusted_public.pem");
pub const ROGUE_PRIVATE_PEM: &str = include_str!("../../../streamgate-core/tests/fixtures/rogue_private.pem");

pub const ANCHOR_URL: &str = "https://tenant.auth.example.com";
pub const APP_ID: &str = "myapp";

pub fn config(auth: bool) -> ServerConfig {
    let trust_anchor = auth.then(|| {
        TrustAnchor::new(ANCHOR_URL, APP_ID).with_verification_key(TRUSTED_PUBLIC_PEM)
    });
    ServerConfig {
        auth_enabled: auth,
        trust_anchor,
        ..ServerConfig::default()
    }
}

pub fn state(auth: bool) -> AppState {
    AppState::from_config(&config(auth))
}

pub fn app(auth: bool) -> (Router, AppState) {
    let state = state(auth);
    (build_router(state.clone()), state)
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Payload the test anchor accepts; `overrides` replaces top-level members.
pub fn payload(overrides: Value) -> Value {
    let now = now();
    let mut payload = json!({
        "sub": "user-1",
        "user_id": "user-1",
        "user_name": "jdoe",
        "client_id": "sb-myapp!t1",
        "scope": ["myapp.read"],
        "iss": format!("{ANCHOR_URL}/oauth/token"),
        "aud": ["sb-myapp"],
        "iat": now,
        "exp": now + 600,
        "grant_type": "authorization_code",
    });
    if let (Some(base), Some(overrides)) = (payload.as_object_mut(), overrides.as_object()) {
        for (key, value) in overrides {
            base.insert(key.clone(), value.clone());
        }
    }
    payload
}

pub fn token(overrides: Value) -> String {
    encode_token(&payload(overrides), TRUSTED_PRIVATE_PEM).unwrap()
}

pub fn admin_token() -> String {
    token(json!({ "scope": ["myapp.read", "myapp.admin"] }))
}

pub fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    request("GET", uri, bearer, None)
}

pub fn request(method: &str, uri: &str, bearer: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Next data frame of a streaming body, `None` once the stream has ended
pub async fn next_frame(body: &mut Body) -> Option<String> {
    let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .expect("timed out waiting for a stream frame")?
        .unwrap();
    let data = frame.into_data().ok()?;
    Some(String::from_utf8(data.to_vec()).unwrap())
}

/// JSON payload of an `event:` frame
pub fn frame_data(frame: &str) -> Value {
    let data = frame
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .expect("frame has no data line");
    serde_json::from_str(data).unwrap()
}
