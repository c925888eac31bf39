//! Payment transaction model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Which integration carried the payment. Card payments hold a payment
/// intent id; wallet payments hold an order id. Keeping the tag next to the
/// reference avoids conflating the two id spaces in one ambiguous column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProviderKind {
    Card,
    Wallet,
}

impl PaymentProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProviderKind::Card => "card",
            PaymentProviderKind::Wallet => "wallet",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "card" => Some(PaymentProviderKind::Card),
            "wallet" => Some(PaymentProviderKind::Wallet),
            _ => None,
        }
    }
}

/// Provider-assigned transaction reference, tagged by integration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderRef {
    /// Card payment intent id.
    Card(String),
    /// Wallet order id.
    Wallet(String),
}

impl ProviderRef {
    pub fn kind(&self) -> PaymentProviderKind {
        match self {
            ProviderRef::Card(_) => PaymentProviderKind::Card,
            ProviderRef::Wallet(_) => PaymentProviderKind::Wallet,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ProviderRef::Card(id) | ProviderRef::Wallet(id) => id,
        }
    }
}

/// One provider transaction against an invoice. `amount` is the invoice's
/// base-currency amount; `settled_amount_minor` is the converted figure the
/// provider was actually asked to charge, in minor units of
/// `settlement_currency`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub provider: String,
    pub provider_ref: Option<String>,
    pub amount: Decimal,
    pub settled_amount_minor: Option<i64>,
    pub settlement_currency: String,
    /// Provider-defined status text (pending, succeeded, COMPLETED, ...).
    pub status: String,
    pub risk_level: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Payment {
    /// The tagged provider reference, when the provider has assigned one.
    pub fn provider_reference(&self) -> Option<ProviderRef> {
        let reference = self.provider_ref.clone()?;
        match PaymentProviderKind::parse(&self.provider)? {
            PaymentProviderKind::Card => Some(ProviderRef::Card(reference)),
            PaymentProviderKind::Wallet => Some(ProviderRef::Wallet(reference)),
        }
    }
}

/// Input for persisting a payment after the provider call succeeded.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub invoice_id: Uuid,
    pub provider_ref: ProviderRef,
    pub amount: Decimal,
    pub settled_amount_minor: i64,
    pub settlement_currency: String,
    pub metadata: Option<serde_json::Value>,
}
