//! Mock payment gateway for tests and unconfigured environments.

use super::{GatewayError, IntentHandle, PaymentGateway, ProviderReport};
use crate::models::PaymentProviderKind;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Scriptable gateway: every created intent reports the configured status
/// until changed. Calls are recorded for assertions.
pub struct MockGateway {
    kind: PaymentProviderKind,
    status: Mutex<String>,
    counter: AtomicU64,
    pub status_queries: AtomicU64,
    pub created: Mutex<Vec<(i64, String)>>,
}

impl MockGateway {
    pub fn new(kind: PaymentProviderKind) -> Self {
        Self {
            kind,
            status: Mutex::new("pending".to_string()),
            counter: AtomicU64::new(0),
            status_queries: AtomicU64::new(0),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Set the status every subsequent `get_status` reports.
    pub fn set_status(&self, status: &str) {
        *self.status.lock().unwrap() = status.to_string();
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn kind(&self) -> PaymentProviderKind {
        self.kind
    }

    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        _metadata: &serde_json::Value,
    ) -> Result<IntentHandle, GatewayError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.created
            .lock()
            .unwrap()
            .push((amount_minor, currency.to_string()));
        // Unique across instances: several gateways may share one database.
        let provider_id = format!("mock_{}_{}_{}", self.kind.as_str(), n, Uuid::new_v4());
        Ok(IntentHandle {
            client_token: format!("{}_token", provider_id),
            provider_id,
        })
    }

    async fn get_status(&self, provider_ref: &str) -> Result<ProviderReport, GatewayError> {
        self.status_queries.fetch_add(1, Ordering::SeqCst);
        if !provider_ref.starts_with("mock_") {
            return Err(GatewayError::TransactionNotFound(provider_ref.to_string()));
        }
        Ok(ProviderReport {
            status: self.status.lock().unwrap().clone(),
            risk_level: Some("normal".to_string()),
        })
    }

    async fn capture(&self, provider_ref: &str) -> Result<ProviderReport, GatewayError> {
        if !provider_ref.starts_with("mock_") {
            return Err(GatewayError::TransactionNotFound(provider_ref.to_string()));
        }
        self.set_status("succeeded");
        Ok(ProviderReport {
            status: "succeeded".to_string(),
            risk_level: Some("normal".to_string()),
        })
    }
}
