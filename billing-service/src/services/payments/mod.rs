//! Payment gateway abstractions and implementations.
//!
//! The core talks to providers through [`PaymentGateway`]; the card
//! (payment-intent) and wallet (order) integrations live side by side as
//! implementations instead of sharing one ambiguous identifier field.

pub mod card;
pub mod engine;
pub mod mock;
pub mod wallet;

use crate::models::PaymentProviderKind;
use async_trait::async_trait;
use billing_core::error::AppError;
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use thiserror::Error;

pub use card::CardGateway;
pub use engine::{PaymentInitiation, PaymentService};
pub use mock::MockGateway;
pub use wallet::WalletGateway;

/// Error type for gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway not configured: {0}")]
    NotConfigured(String),

    #[error("Provider API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Provider transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::TransactionNotFound(reference) => AppError::NotFound(anyhow::anyhow!(
                "Provider transaction '{}' not found",
                reference
            )),
            other => AppError::ExternalService(other.to_string()),
        }
    }
}

/// Result of intent/order creation on the provider side.
#[derive(Debug, Clone)]
pub struct IntentHandle {
    /// Provider-assigned transaction id.
    pub provider_id: String,
    /// Client-side completion token (client secret or approval order id).
    pub client_token: String,
}

/// The provider's authoritative view of a transaction.
#[derive(Debug, Clone)]
pub struct ProviderReport {
    pub status: String,
    pub risk_level: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn kind(&self) -> PaymentProviderKind;

    /// Create a provider-side intent/order for `amount_minor` minor units
    /// of `currency`.
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        metadata: &serde_json::Value,
    ) -> Result<IntentHandle, GatewayError>;

    /// Query the provider's current status for a transaction.
    async fn get_status(&self, provider_ref: &str) -> Result<ProviderReport, GatewayError>;

    /// Capture an authorized transaction.
    async fn capture(&self, provider_ref: &str) -> Result<ProviderReport, GatewayError>;
}

/// Does a provider status text mean the money moved? Providers disagree on
/// vocabulary; this is the single mapping the reconciliation engine trusts.
pub fn is_settled_status(status: &str) -> bool {
    matches!(
        status.to_ascii_lowercase().as_str(),
        "succeeded" | "completed" | "captured"
    )
}

/// Convert a base-currency amount into settlement-currency units using the
/// fixed divisor, rounded to cents half away from zero.
pub fn convert_to_settlement(amount: Decimal, divisor: Decimal) -> Decimal {
    (amount / divisor).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Express a two-decimal amount in minor units (cents).
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        * Decimal::ONE_HUNDRED)
        .to_i64()
}

/// Render minor units as the decimal string wallet-style APIs expect.
pub fn minor_units_to_string(amount_minor: i64) -> String {
    format!("{}.{:02}", amount_minor / 100, (amount_minor % 100).abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn settled_statuses_cover_both_providers() {
        assert!(is_settled_status("succeeded"));
        assert!(is_settled_status("COMPLETED"));
        assert!(is_settled_status("captured"));
        assert!(!is_settled_status("pending"));
        assert!(!is_settled_status("requires_payment_method"));
        assert!(!is_settled_status("failed"));
    }

    #[test]
    fn settlement_conversion_uses_fixed_divisor() {
        // 500.00 TND at 3.1 TND/USD -> 161.29 USD
        assert_eq!(convert_to_settlement(dec!(500.00), dec!(3.1)), dec!(161.29));
    }

    #[test]
    fn minor_units_round_half_up() {
        assert_eq!(to_minor_units(dec!(161.29)), Some(16129));
        assert_eq!(to_minor_units(dec!(0.005)), Some(1));
        assert_eq!(to_minor_units(dec!(350)), Some(35000));
    }

    #[test]
    fn minor_units_render_as_decimal_string() {
        assert_eq!(minor_units_to_string(16129), "161.29");
        assert_eq!(minor_units_to_string(35000), "350.00");
        assert_eq!(minor_units_to_string(5), "0.05");
    }
}
