//! Request/response types for the HTTP surface.

use crate::models::{Invoice, LineItem, Payment, ProductDetail, Quote};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// -------------------------------------------------------------------------
// Auth
// -------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,

    #[serde(default = "default_country_code")]
    pub country_code: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

fn default_country_code() -> String {
    "+216".to_string()
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub client_id: Uuid,
    pub message: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub role: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    #[validate(length(min = 8, message = "New password must be at least 8 characters"))]
    pub new_password: String,
}

// -------------------------------------------------------------------------
// Quotes
// -------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitQuoteRequest {
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,

    pub amount: Decimal,

    #[serde(default = "default_site_type")]
    pub site_type: String,

    #[serde(default)]
    pub features: String,

    #[serde(default)]
    pub custom_design: bool,

    #[serde(default)]
    pub seo_integration: bool,

    pub extra_details: Option<String>,
}

fn default_site_type() -> String {
    "vitrine".to_string()
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    #[serde(flatten)]
    pub quote: Quote,
    pub product_detail: Option<ProductDetail>,
}

/// Inline specification document attached to a rejection.
#[derive(Debug, Deserialize, Validate)]
pub struct SpecDocumentDto {
    #[validate(length(min = 1, message = "Filename is required"))]
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectQuoteRequest {
    #[validate(length(min = 1, message = "Counter-offer text is required"))]
    pub counter_offer: String,

    /// Structured amount; when absent the prose is parsed best-effort on
    /// acceptance.
    pub counter_offer_amount: Option<Decimal>,

    #[validate(nested)]
    pub spec_document: Option<SpecDocumentDto>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CounterOfferResponseRequest {
    #[validate(length(min = 1, message = "Action is required"))]
    pub action: String,

    pub modified_counter_offer: Option<String>,
    pub modified_amount: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct CounterOfferResponseBody {
    #[serde(flatten)]
    pub quote: Quote,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice: Option<Invoice>,
}

// -------------------------------------------------------------------------
// Invoices
// -------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub line_items: Vec<LineItem>,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LineItemRequest {
    #[validate(length(min = 1, message = "Designation is required"))]
    pub designation: String,

    pub unit_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReplaceLineItemsRequest {
    #[validate(length(min = 1, message = "At least one line item is required"), nested)]
    pub items: Vec<LineItemRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct IngestInvoiceRequest {
    pub client_id: Uuid,

    #[validate(length(min = 1, message = "Filename is required"))]
    pub filename: String,

    /// Raw document content; the text extractor turns it into parseable
    /// text.
    #[validate(length(min = 1, message = "Content is required"))]
    pub content: String,
}

// -------------------------------------------------------------------------
// Payments
// -------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentIntentRequest {
    /// `card` or `wallet`.
    #[validate(length(min = 1, message = "Provider is required"))]
    pub provider: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentIntentResponse {
    pub payment_id: Uuid,
    pub client_token: String,
    pub status: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReconcileByRefRequest {
    #[validate(length(min = 1, message = "Provider reference is required"))]
    pub provider_ref: String,
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub payment_id: Uuid,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    pub invoice_status: String,
}
