//! Registration, login, and password management.

use crate::dtos::{
    ChangePasswordRequest, LoginRequest, RegisterRequest, RegisterResponse, TokenResponse,
};
use crate::models::CreateClient;
use crate::services::audit::record_best_effort;
use crate::startup::AppState;
use axum::{Extension, Json, extract::State, http::StatusCode};
use billing_core::auth::{AuthContext, Role, issue_token};
use billing_core::error::AppError;
use billing_core::password::{Password, hash_password, verify_password};
use secrecy::ExposeSecret;
use validator::Validate;

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    payload.validate()?;

    let password_hash = hash_password(&Password::new(payload.password))
        .map_err(AppError::Internal)?;

    let client = state
        .db
        .create_client(&CreateClient {
            name: payload.name,
            email: payload.email,
            phone: payload.phone,
            country_code: payload.country_code,
            password_hash,
        })
        .await?;

    record_best_effort(state.audit.as_ref(), client.client_id, "Compte client créé").await;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            client_id: client.client_id,
            message: "Client créé avec succès.".to_string(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    payload.validate()?;

    let secret = state.config.auth.jwt_secret.expose_secret();
    let password = Password::new(payload.password);

    // The administrator account is configured, not stored with clients.
    if payload.email == state.config.auth.admin_email {
        let stored = &state.config.auth.admin_password_hash;
        if stored.is_empty() || verify_password(&password, stored).is_err() {
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "Invalid credentials"
            )));
        }
        let token = issue_token(
            secret,
            &payload.email,
            Role::Admin,
            None,
            state.config.auth.token_ttl_seconds,
        )?;
        return Ok(Json(TokenResponse {
            access_token: token,
            role: "admin".to_string(),
        }));
    }

    let client = state
        .db
        .get_client_by_email(&payload.email)
        .await?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Invalid credentials")))?;

    verify_password(&password, &client.password_hash)
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid credentials")))?;

    let token = issue_token(
        secret,
        &client.email,
        Role::Client,
        Some(client.client_id),
        state.config.auth.token_ttl_seconds,
    )?;

    Ok(Json(TokenResponse {
        access_token: token,
        role: "client".to_string(),
    }))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    payload.validate()?;

    let client_id = auth
        .client_id
        .ok_or_else(|| AppError::Forbidden(anyhow::anyhow!("Client account required")))?;

    let client = state
        .db
        .get_client(client_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))?;

    verify_password(&Password::new(payload.current_password), &client.password_hash)
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Current password is incorrect")))?;

    let new_hash = hash_password(&Password::new(payload.new_password))
        .map_err(AppError::Internal)?;
    state.db.update_client_password(client_id, &new_hash).await?;

    record_best_effort(state.audit.as_ref(), client_id, "Mot de passe modifié").await;

    Ok(StatusCode::NO_CONTENT)
}
