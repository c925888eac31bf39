//! Append-only per-client audit trail (historique).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HistoryEntry {
    pub history_id: Uuid,
    pub client_id: Uuid,
    pub action: String,
    pub created_utc: DateTime<Utc>,
}
