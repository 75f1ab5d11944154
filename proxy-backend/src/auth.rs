use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine as _;

/// The process-wide credential pair every /api route is checked against.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Basic-auth middleware. Applied as a `route_layer` on the API routes;
/// the liveness probe at `/` stays open.
pub async fn basic_auth(
    State(creds): State<Arc<Credentials>>,
    req: Request,
    next: Next,
) -> Response {
    if authorized(&req, &creds) {
        next.run(req).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic")],
            "Invalid credentials",
        )
            .into_response()
    }
}

fn authorized(req: &Request, creds: &Credentials) -> bool {
    let Some(value) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
        return false;
    };
    let Ok(pair) = String::from_utf8(decoded) else {
        return false;
    };
    match pair.split_once(':') {
        Some((user, pass)) => user == creds.username && pass == creds.password,
        None => false,
    }
}
