//! Quote (devis) model and its negotiation sub-state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Quote status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Pending,
    Approved,
    Rejected,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Pending => "pending",
            QuoteStatus::Approved => "approved",
            QuoteStatus::Rejected => "rejected",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "approved" => QuoteStatus::Approved,
            "rejected" => QuoteStatus::Rejected,
            _ => QuoteStatus::Pending,
        }
    }
}

/// Counter-offer sub-state, meaningful only while the quote is rejected
/// with a counter-offer attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterOfferStatus {
    None,
    Pending,
    Accepted,
    Rejected,
}

impl CounterOfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterOfferStatus::None => "none",
            CounterOfferStatus::Pending => "pending",
            CounterOfferStatus::Accepted => "accepted",
            CounterOfferStatus::Rejected => "rejected",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "pending" => CounterOfferStatus::Pending,
            "accepted" => CounterOfferStatus::Accepted,
            "rejected" => CounterOfferStatus::Rejected,
            _ => CounterOfferStatus::None,
        }
    }
}

/// Client action on a pending counter-offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterOfferAction {
    Accept,
    Reject,
    Modify,
}

impl CounterOfferAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "accept" => Some(CounterOfferAction::Accept),
            "reject" => Some(CounterOfferAction::Reject),
            "modify" => Some(CounterOfferAction::Modify),
            _ => None,
        }
    }
}

/// A client's service quote request.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Quote {
    pub quote_id: Uuid,
    pub client_id: Uuid,
    /// Monotonic sequence feeding the invoice number.
    pub quote_seq: i64,
    pub description: String,
    /// Base-currency amount.
    pub amount: Decimal,
    pub status: String,
    pub counter_offer: Option<String>,
    /// Structured amount proposed alongside the counter-offer prose.
    pub counter_offer_amount: Option<Decimal>,
    pub counter_offer_status: String,
    pub negotiation_rounds: i32,
    /// Document-store reference of the attached specification, if any.
    pub spec_document: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl Quote {
    pub fn status(&self) -> QuoteStatus {
        QuoteStatus::from_string(&self.status)
    }

    pub fn counter_offer_status(&self) -> CounterOfferStatus {
        CounterOfferStatus::from_string(&self.counter_offer_status)
    }
}

/// Structured product requirements captured with the quote.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductDetail {
    pub product_detail_id: Uuid,
    pub quote_id: Uuid,
    pub site_type: String,
    pub features: String,
    pub custom_design: bool,
    pub seo_integration: bool,
    pub extra_details: Option<String>,
}

/// Site type choices for [`ProductDetail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteType {
    Vitrine,
    Ecommerce,
    Blog,
    Portfolio,
    Autre,
}

impl SiteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteType::Vitrine => "vitrine",
            SiteType::Ecommerce => "ecommerce",
            SiteType::Blog => "blog",
            SiteType::Portfolio => "portfolio",
            SiteType::Autre => "autre",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "vitrine" => Some(SiteType::Vitrine),
            "ecommerce" => Some(SiteType::Ecommerce),
            "blog" => Some(SiteType::Blog),
            "portfolio" => Some(SiteType::Portfolio),
            "autre" => Some(SiteType::Autre),
            _ => None,
        }
    }
}

/// Input for creating a quote with its product detail.
#[derive(Debug, Clone)]
pub struct CreateQuote {
    pub client_id: Uuid,
    pub description: String,
    pub amount: Decimal,
    pub site_type: SiteType,
    pub features: String,
    pub custom_design: bool,
    pub seo_integration: bool,
    pub extra_details: Option<String>,
}
