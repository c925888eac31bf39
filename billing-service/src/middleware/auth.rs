//! Request-boundary authentication.
//!
//! The bearer token is verified exactly once, here; handlers and engines
//! receive the typed [`AuthContext`] through request extensions and never
//! touch raw tokens.

use crate::startup::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use billing_core::auth::verify_token;
use billing_core::error::AppError;
use secrecy::ExposeSecret;

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing bearer token")))?;

    let ctx = verify_token(state.config.auth.jwt_secret.expose_secret(), token)?;

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}
