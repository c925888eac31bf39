//! Domain models for the billing backend.

mod client;
mod history;
mod invoice;
mod line_item;
mod payment;
mod quote;

pub use client::{Client, CreateClient};
pub use history::HistoryEntry;
pub use invoice::{CreateInvoice, Invoice, InvoiceStatus, generate_invoice_number};
pub use line_item::{CreateLineItem, LineItem, line_total};
pub use payment::{CreatePayment, Payment, PaymentProviderKind, ProviderRef};
pub use quote::{
    CounterOfferAction, CounterOfferStatus, CreateQuote, ProductDetail, Quote, QuoteStatus,
    SiteType,
};
