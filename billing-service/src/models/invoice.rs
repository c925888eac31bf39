//! Invoice (facture) model.

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Unpaid,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "unpaid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "paid" => InvoiceStatus::Paid,
            "overdue" => InvoiceStatus::Overdue,
            _ => InvoiceStatus::Unpaid,
        }
    }
}

/// A billable invoice, generated from an approved quote or ingested from a
/// scanned document.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub client_id: Uuid,
    /// Originating quote; NULL for scanned invoices and kept when the quote
    /// is deleted.
    pub quote_id: Option<Uuid>,
    pub invoice_number: String,
    pub amount: Decimal,
    pub status: String,
    /// Document-store reference of the scanned source, if any.
    pub scanned_ref: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl Invoice {
    pub fn status(&self) -> InvoiceStatus {
        InvoiceStatus::from_string(&self.status)
    }
}

/// Build an invoice number: `F` + zero-padded quote sequence + a random
/// three-digit suffix, e.g. `F0042-317`.
pub fn generate_invoice_number(quote_seq: i64) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1000);
    format!("F{:04}-{:03}", quote_seq, suffix)
}

/// Input for creating an invoice.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub client_id: Uuid,
    pub quote_id: Option<Uuid>,
    pub invoice_number: String,
    pub amount: Decimal,
    pub status: InvoiceStatus,
    pub scanned_ref: Option<String>,
}
