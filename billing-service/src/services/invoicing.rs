//! Invoice engine: line-item maintenance, scanned-invoice ingestion, and
//! the explicit overdue transition.

use crate::models::{
    CreateInvoice, CreateLineItem, Invoice, InvoiceStatus, LineItem, Payment,
};
use crate::services::Database;
use crate::services::audit::{AuditSink, record_best_effort};
use crate::services::metrics::INVOICES_TOTAL;
use crate::services::storage::{DocumentStore, TextExtractor};
use billing_core::auth::AuthContext;
use billing_core::error::AppError;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

static INVOICE_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"F\d{4}-\d{3}").expect("valid invoice number regex"));

static AMOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:[.,]\d{2})?)\s*TND").expect("valid amount regex"));

static STATUS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(Payée|Impayée|En retard)").expect("valid status regex"));

/// Fields recovered from a scanned invoice's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedInvoice {
    pub invoice_number: String,
    pub amount: Decimal,
    pub status: InvoiceStatus,
}

/// Parse extracted text into invoice fields. The number and a positive
/// amount are required; the status defaults to unpaid when the document
/// does not state one.
pub fn parse_scanned_invoice(text: &str) -> Result<ScannedInvoice, AppError> {
    if text.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "No text detected in the scanned document"
        )));
    }

    let invoice_number = INVOICE_NUMBER_RE
        .find(text)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "No invoice number (FNNNN-NNN) detected in the scanned document"
            ))
        })?;

    let amount = AMOUNT_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| Decimal::from_str(&m.as_str().replace(',', ".")).ok())
        .ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "No amount detected in the scanned document"
            ))
        })?;
    if amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Scanned amount must be positive"
        )));
    }

    let status = STATUS_RE
        .find(text)
        .map(|m| match m.as_str().to_lowercase().as_str() {
            "payée" => InvoiceStatus::Paid,
            "en retard" => InvoiceStatus::Overdue,
            _ => InvoiceStatus::Unpaid,
        })
        .unwrap_or(InvoiceStatus::Unpaid);

    Ok(ScannedInvoice {
        invoice_number,
        amount,
        status,
    })
}

pub struct InvoiceEngine {
    db: Database,
    documents: Arc<dyn DocumentStore>,
    extractor: Arc<dyn TextExtractor>,
    audit: Arc<dyn AuditSink>,
}

impl InvoiceEngine {
    pub fn new(
        db: Database,
        documents: Arc<dyn DocumentStore>,
        extractor: Arc<dyn TextExtractor>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            db,
            documents,
            extractor,
            audit,
        }
    }

    #[instrument(skip(self, auth))]
    pub async fn get_invoice(
        &self,
        auth: AuthContext,
        invoice_id: Uuid,
    ) -> Result<(Invoice, Vec<LineItem>, Vec<Payment>), AppError> {
        let invoice = self
            .db
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        auth.require_client(invoice.client_id)?;

        let line_items = self.db.get_line_items(invoice_id).await?;
        let payments = self.db.list_payments_for_invoice(invoice_id).await?;
        Ok((invoice, line_items, payments))
    }

    #[instrument(skip(self, auth))]
    pub async fn list_invoices(&self, auth: AuthContext) -> Result<Vec<Invoice>, AppError> {
        if auth.is_admin() {
            self.db.list_invoices(None).await
        } else {
            let client_id = auth
                .client_id
                .ok_or_else(|| AppError::Forbidden(anyhow::anyhow!("No client context")))?;
            self.db.list_invoices(Some(client_id)).await
        }
    }

    /// Append one line item. The stored total is derived from the inputs;
    /// whatever total the caller may have computed is not accepted.
    #[instrument(skip(self, auth, input))]
    pub async fn add_line_item(
        &self,
        auth: AuthContext,
        invoice_id: Uuid,
        input: CreateLineItem,
    ) -> Result<LineItem, AppError> {
        auth.require_admin()?;
        validate_line_item(&input)?;
        self.require_mutable_invoice(invoice_id).await?;
        self.db.add_line_item(invoice_id, &input).await
    }

    /// Replace the whole line-item set, all-or-nothing. An empty set is
    /// rejected so the invoice cannot end up without items.
    #[instrument(skip(self, auth, items), fields(count = items.len()))]
    pub async fn replace_line_items(
        &self,
        auth: AuthContext,
        invoice_id: Uuid,
        items: Vec<CreateLineItem>,
    ) -> Result<Vec<LineItem>, AppError> {
        auth.require_admin()?;
        if items.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "An invoice needs at least one line item"
            )));
        }
        for item in &items {
            validate_line_item(item)?;
        }
        self.require_mutable_invoice(invoice_id).await?;
        self.db.replace_line_items(invoice_id, &items).await
    }

    /// Ingest a scanned invoice: store the document, extract its text, and
    /// create the invoice with the recovered fields. Nothing is persisted
    /// when parsing fails.
    #[instrument(skip(self, auth, data), fields(client_id = %client_id, filename = %filename))]
    pub async fn ingest_scanned_invoice(
        &self,
        auth: AuthContext,
        client_id: Uuid,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<Invoice, AppError> {
        auth.require_admin()?;

        let client = self
            .db
            .get_client(client_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))?;

        let text = self.extractor.extract(&data).await?;
        let parsed = parse_scanned_invoice(&text)?;

        let reference = self
            .documents
            .save(&format!("factures/{}/{}", Uuid::new_v4(), filename), data)
            .await?;

        let invoice = self
            .db
            .create_invoice(&CreateInvoice {
                client_id: client.client_id,
                quote_id: None,
                invoice_number: parsed.invoice_number.clone(),
                amount: parsed.amount,
                status: parsed.status,
                scanned_ref: Some(reference),
            })
            .await?;

        INVOICES_TOTAL.with_label_values(&["scanned"]).inc();
        record_best_effort(
            self.audit.as_ref(),
            client.client_id,
            &format!("Facture scannée importée - {}", invoice.invoice_number),
        )
        .await;

        info!(invoice_id = %invoice.invoice_id, "Scanned invoice ingested");

        Ok(invoice)
    }

    /// Explicit admin transition unpaid -> overdue. There is no scheduled
    /// sweep; overdue is a deliberate act.
    #[instrument(skip(self, auth))]
    pub async fn mark_overdue(
        &self,
        auth: AuthContext,
        invoice_id: Uuid,
    ) -> Result<Invoice, AppError> {
        auth.require_admin()?;

        let invoice = self
            .db
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        if !self.db.mark_invoice_overdue(invoice_id).await? {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Only unpaid invoices can be marked overdue"
            )));
        }

        record_best_effort(
            self.audit.as_ref(),
            invoice.client_id,
            &format!("Facture {} marquée en retard", invoice.invoice_number),
        )
        .await;

        self.db
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))
    }

    async fn require_mutable_invoice(&self, invoice_id: Uuid) -> Result<Invoice, AppError> {
        let invoice = self
            .db
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        if invoice.status() == InvoiceStatus::Paid {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Line items of a paid invoice cannot be changed"
            )));
        }
        Ok(invoice)
    }
}

fn validate_line_item(input: &CreateLineItem) -> Result<(), AppError> {
    if input.designation.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Designation must not be empty"
        )));
    }
    if input.unit_price < Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Unit price must not be negative"
        )));
    }
    if input.quantity < 0 {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Quantity must not be negative"
        )));
    }
    Ok(())
}
