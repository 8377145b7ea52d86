//! HTTP handlers for the proxy endpoints.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/auth` | Sign the TLS attributes, redirect to `redirect_to` with the assertion in the query string |
//! | `GET` | `/auth.json` | Sign the TLS attributes, return the assertion as JSON (or JSONP via `callback`) |
//! | `GET` | `/pubkey.pem` | The proxy's public signing key, PEM |
//! | `GET` | `/pubkey.json` | `{"key": "<PEM>"}` (or JSONP via `callback`) |
//!
//! All endpoints are unauthenticated by design: authenticity comes from the
//! front end's client-certificate handshake, not from anything the proxy
//! itself checks.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::ProxyState;
use super::extract::attributes_from_headers;
use crate::assertion::redirect_url;

// ── Request types ───────────────────────────────────────────────────────────

/// Query parameters accepted by the `/auth` endpoints.
#[derive(Debug, Deserialize)]
pub struct AuthQuery {
    /// Caller-supplied freshness nonce, signed into the assertion.
    pub nonce: Option<String>,
    /// Where `/auth` redirects with the signed assertion appended.
    pub redirect_to: Option<String>,
    /// JSONP callback name for the `.json` variants.
    pub callback: Option<String>,
}

/// Query parameters accepted by `/pubkey.json`.
#[derive(Debug, Deserialize)]
pub struct PubkeyQuery {
    /// JSONP callback name.
    pub callback: Option<String>,
}

// ── Route builder ───────────────────────────────────────────────────────────

/// Build the proxy routes.
pub fn routes(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/auth", get(auth_redirect))
        .route("/auth.json", get(auth_json))
        .route("/pubkey.pem", get(pubkey_pem))
        .route("/pubkey.json", get(pubkey_json))
        .with_state(state)
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// `GET /auth?nonce=N&redirect_to=URL` — sign and redirect.
async fn auth_redirect(
    State(state): State<Arc<ProxyState>>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(nonce) = query.nonce else {
        return error_response(StatusCode::BAD_REQUEST, "nonce is required");
    };
    let Some(redirect_to) = query.redirect_to else {
        return error_response(StatusCode::BAD_REQUEST, "redirect_to is required");
    };

    let mut attrs = attributes_from_headers(&headers);
    attrs.nonce = Some(nonce);
    state.signer.sign(&mut attrs);

    match redirect_url(&redirect_to, &attrs) {
        Ok(url) => {
            info!(dn = attrs.dn.as_deref().unwrap_or("<none>"), "Signed assertion, redirecting");
            (StatusCode::FOUND, [(header::LOCATION, url.to_string())]).into_response()
        }
        Err(_) => error_response(StatusCode::BAD_REQUEST, "redirect_to is not a valid URL"),
    }
}

/// `GET /auth.json?nonce=N[&callback=name]` — sign and return JSON/JSONP.
async fn auth_json(
    State(state): State<Arc<ProxyState>>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(nonce) = query.nonce else {
        return error_response(StatusCode::BAD_REQUEST, "nonce is required");
    };

    let mut attrs = attributes_from_headers(&headers);
    attrs.nonce = Some(nonce);
    state.signer.sign(&mut attrs);

    info!(dn = attrs.dn.as_deref().unwrap_or("<none>"), "Signed assertion");

    match serde_json::to_value(&attrs) {
        Ok(body) => render_json(body, query.callback.as_deref()),
        Err(_) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "serialization failed"),
    }
}

/// `GET /pubkey.pem` — the public signing key as a PEM body.
async fn pubkey_pem(State(state): State<Arc<ProxyState>>) -> Response {
    match state.signer.public_key_pem() {
        Ok(pem) => ([(header::CONTENT_TYPE, "text/plain")], pem).into_response(),
        Err(_) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "key encoding failed"),
    }
}

/// `GET /pubkey.json[?callback=name]` — the public key wrapped in JSON.
async fn pubkey_json(
    State(state): State<Arc<ProxyState>>,
    Query(query): Query<PubkeyQuery>,
) -> Response {
    match state.signer.public_key_pem() {
        Ok(pem) => render_json(json!({ "key": pem }), query.callback.as_deref()),
        Err(_) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "key encoding failed"),
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Render a JSON body, JSONP-wrapped when a callback was requested.
fn render_json(body: serde_json::Value, callback: Option<&str>) -> Response {
    match callback {
        None => Json(body).into_response(),
        Some(name) if is_valid_callback(name) => (
            [(header::CONTENT_TYPE, "application/javascript")],
            format!("{name}({body});"),
        )
            .into_response(),
        Some(_) => error_response(StatusCode::BAD_REQUEST, "invalid callback name"),
    }
}

/// JSONP callback names are restricted to identifier characters so a
/// malicious `callback` cannot inject script into the response.
fn is_valid_callback(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$'))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
