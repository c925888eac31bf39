//! Client account model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A registered client account.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Client {
    pub client_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub country_code: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_utc: DateTime<Utc>,
}

/// Input for registering a client. The password arrives pre-hashed; raw
/// passwords never reach the store.
#[derive(Debug, Clone)]
pub struct CreateClient {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub country_code: String,
    pub password_hash: String,
}
