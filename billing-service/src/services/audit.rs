//! Audit sink: append-only per-client action trail.

use crate::services::Database;
use async_trait::async_trait;
use billing_core::error::AppError;
use uuid::Uuid;

/// Records one action line per successful core transition. Called after the
/// transition's own commit; a sink failure must never undo the transition.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, client_id: Uuid, action: &str) -> Result<(), AppError>;
}

/// Writes history rows through the shared pool.
pub struct PgAuditSink {
    db: Database,
}

impl PgAuditSink {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, client_id: Uuid, action: &str) -> Result<(), AppError> {
        self.db.append_history(client_id, action).await?;
        Ok(())
    }
}

/// Best-effort audit write: logs and swallows failures so the caller's
/// transition stands.
pub async fn record_best_effort(sink: &dyn AuditSink, client_id: Uuid, action: &str) {
    if let Err(e) = sink.record(client_id, action).await {
        tracing::warn!(client_id = %client_id, action = %action, error = %e, "Audit write failed");
    }
}
