//! Per-client history handlers.

use crate::startup::AppState;
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use billing_core::auth::AuthContext;
use billing_core::error::AppError;
use uuid::Uuid;

pub async fn list_history(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(client_id): Path<Uuid>,
) -> Result<Json<Vec<crate::models::HistoryEntry>>, AppError> {
    auth.require_client(client_id)?;
    let entries = state.db.list_history(client_id).await?;
    Ok(Json(entries))
}
