//! Quote lifecycle engine: submission, admin review, counter-offer
//! negotiation, and invoice synthesis on approval.

use crate::models::{
    CounterOfferAction, CounterOfferStatus, CreateQuote, Invoice, ProductDetail, Quote,
    QuoteStatus, generate_invoice_number,
};
use crate::services::audit::{AuditSink, record_best_effort};
use crate::services::metrics::{INVOICES_TOTAL, QUOTES_TOTAL};
use crate::services::notification::{Notifier, Recipient, notify_best_effort};
use crate::services::storage::DocumentStore;
use crate::services::Database;
use billing_core::auth::AuthContext;
use billing_core::error::AppError;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Currency-suffixed number inside counter-offer prose, e.g.
/// "Nouveau montant: 350 TND". Fallback only; the structured
/// `counter_offer_amount` field is authoritative when present.
static AMOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:[.,]\d{2})?)\s*TND").expect("valid amount regex"));

/// Pull a base-currency amount out of counter-offer text.
pub fn extract_amount(text: &str) -> Option<Decimal> {
    let captures = AMOUNT_RE.captures(text)?;
    let normalized = captures.get(1)?.as_str().replace(',', ".");
    Decimal::from_str(&normalized).ok()
}

/// Outcome of a counter-offer response, for callers and notifications.
#[derive(Debug, Clone)]
pub struct CounterOfferOutcome {
    pub quote: Quote,
    pub action: CounterOfferAction,
    /// Present when acceptance synthesized an invoice.
    pub invoice: Option<Invoice>,
}

pub struct QuoteEngine {
    db: Database,
    documents: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
    max_negotiation_rounds: i32,
}

impl QuoteEngine {
    pub fn new(
        db: Database,
        documents: Arc<dyn DocumentStore>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
        max_negotiation_rounds: i32,
    ) -> Self {
        Self {
            db,
            documents,
            notifier,
            audit,
            max_negotiation_rounds,
        }
    }

    /// Client submission: validates, then creates the quote and its product
    /// detail in one transaction.
    #[instrument(skip(self, auth, input), fields(client_id = ?auth.client_id))]
    pub async fn submit_quote(
        &self,
        auth: AuthContext,
        input: CreateQuote,
    ) -> Result<(Quote, ProductDetail), AppError> {
        let client_id = auth.client_id.ok_or_else(|| {
            AppError::Forbidden(anyhow::anyhow!("Only clients may submit quotes"))
        })?;
        if input.client_id != client_id {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Cannot submit a quote for another client"
            )));
        }

        let description = input.description.trim().to_string();
        if description.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Description must not be empty"
            )));
        }
        if input.amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Amount must be positive"
            )));
        }

        let input = CreateQuote {
            description: description.clone(),
            ..input
        };
        let (quote, detail) = self.db.create_quote_with_detail(&input).await?;

        QUOTES_TOTAL.with_label_values(&["pending"]).inc();
        record_best_effort(
            self.audit.as_ref(),
            client_id,
            &format!("Demande de devis soumise - {}", description),
        )
        .await;

        Ok((quote, detail))
    }

    #[instrument(skip(self, auth))]
    pub async fn get_quote(
        &self,
        auth: AuthContext,
        quote_id: Uuid,
    ) -> Result<(Quote, Option<ProductDetail>), AppError> {
        let quote = self
            .db
            .get_quote(quote_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Quote not found")))?;
        auth.require_client(quote.client_id)?;
        let detail = self.db.get_product_detail(quote_id).await?;
        Ok((quote, detail))
    }

    /// Admin sees everything; a client sees only their own quotes.
    #[instrument(skip(self, auth))]
    pub async fn list_quotes(&self, auth: AuthContext) -> Result<Vec<Quote>, AppError> {
        if auth.is_admin() {
            self.db.list_quotes(None).await
        } else {
            let client_id = auth
                .client_id
                .ok_or_else(|| AppError::Forbidden(anyhow::anyhow!("No client context")))?;
            self.db.list_quotes(Some(client_id)).await
        }
    }

    /// Admin approval. Idempotent on the invoice side: re-approval finds the
    /// existing invoice through the unique quote reference and creates
    /// nothing new.
    #[instrument(skip(self, auth))]
    pub async fn approve_quote(
        &self,
        auth: AuthContext,
        quote_id: Uuid,
    ) -> Result<(Quote, Invoice), AppError> {
        auth.require_admin()?;

        let quote = self
            .db
            .get_quote(quote_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Quote not found")))?;

        let quote = self
            .db
            .set_quote_status(quote.quote_id, QuoteStatus::Approved)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Quote not found")))?;

        QUOTES_TOTAL.with_label_values(&["approved"]).inc();

        let (invoice, created) = self.synthesize_invoice(&quote, "quote").await?;

        record_best_effort(
            self.audit.as_ref(),
            quote.client_id,
            &format!("Devis approuvé - facture {}", invoice.invoice_number),
        )
        .await;
        self.notify_client(
            quote.client_id,
            &format!(
                "Votre devis \"{}\" a été approuvé. Facture {} ({} TND).",
                quote.description, invoice.invoice_number, invoice.amount
            ),
        )
        .await;

        if !created {
            info!(quote_id = %quote.quote_id, "Approval repeated; existing invoice kept");
        }

        Ok((quote, invoice))
    }

    /// Admin rejection with a counter-offer. A missing specification
    /// document is synthesized from the quote and the counter-offer.
    #[instrument(skip(self, auth, counter_offer, spec_document))]
    pub async fn reject_with_counter_offer(
        &self,
        auth: AuthContext,
        quote_id: Uuid,
        counter_offer: &str,
        counter_offer_amount: Option<Decimal>,
        spec_document: Option<(String, Vec<u8>)>,
    ) -> Result<Quote, AppError> {
        auth.require_admin()?;

        let counter_offer = counter_offer.trim();
        if counter_offer.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Counter-offer text must not be empty"
            )));
        }
        if let Some(amount) = counter_offer_amount {
            if amount <= Decimal::ZERO {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Counter-offer amount must be positive"
                )));
            }
        }

        let quote = self
            .db
            .get_quote(quote_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Quote not found")))?;

        let reference = match spec_document {
            Some((filename, bytes)) => {
                self.documents
                    .save(&format!("specs/{}/{}", quote_id, filename), bytes)
                    .await?
            }
            None => {
                let summary = format!(
                    "Cahier des charges - Devis {}\n\nDemande initiale: {}\nMontant initial: {} TND\n\nContre-proposition: {}\n",
                    quote.quote_seq, quote.description, quote.amount, counter_offer
                );
                self.documents
                    .save(
                        &format!("specs/{}/cahier-des-charges.txt", quote_id),
                        summary.into_bytes(),
                    )
                    .await?
            }
        };

        let quote = self
            .db
            .open_counter_offer(quote_id, counter_offer, counter_offer_amount, Some(&reference))
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Quote not found")))?;

        QUOTES_TOTAL.with_label_values(&["rejected"]).inc();
        record_best_effort(
            self.audit.as_ref(),
            quote.client_id,
            &format!("Devis rejeté avec contre-proposition - {}", counter_offer),
        )
        .await;
        self.notify_client(
            quote.client_id,
            &format!(
                "Votre devis \"{}\" a reçu une contre-proposition: {}",
                quote.description, counter_offer
            ),
        )
        .await;

        Ok(quote)
    }

    /// Client response to a pending counter-offer. Only the owning client
    /// may respond; the pending guard is enforced by compare-and-set so
    /// concurrent responses cannot both settle the negotiation.
    #[instrument(skip(self, auth, modified_text))]
    pub async fn respond_to_counter_offer(
        &self,
        auth: AuthContext,
        quote_id: Uuid,
        action: CounterOfferAction,
        modified_text: Option<&str>,
        modified_amount: Option<Decimal>,
    ) -> Result<CounterOfferOutcome, AppError> {
        let quote = self
            .db
            .get_quote(quote_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Quote not found")))?;

        if auth.client_id != Some(quote.client_id) {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Only the owning client may respond to a counter-offer"
            )));
        }
        if quote.status() != QuoteStatus::Rejected
            || quote.counter_offer_status() != CounterOfferStatus::Pending
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "No pending counter-offer on this quote"
            )));
        }

        let outcome = match action {
            CounterOfferAction::Modify => {
                let text = modified_text.map(str::trim).unwrap_or_default();
                if text.is_empty() {
                    return Err(AppError::BadRequest(anyhow::anyhow!(
                        "Modified counter-offer text must not be empty"
                    )));
                }
                if let Some(amount) = modified_amount {
                    if amount <= Decimal::ZERO {
                        return Err(AppError::BadRequest(anyhow::anyhow!(
                            "Modified counter-offer amount must be positive"
                        )));
                    }
                }
                let updated = self
                    .db
                    .modify_counter_offer(quote_id, text, modified_amount, self.max_negotiation_rounds)
                    .await?
                    .ok_or_else(|| {
                        AppError::Conflict(anyhow::anyhow!(
                            "Counter-offer is no longer pending or the negotiation round limit ({}) is reached",
                            self.max_negotiation_rounds
                        ))
                    })?;

                record_best_effort(
                    self.audit.as_ref(),
                    updated.client_id,
                    &format!("Contre-proposition modifiée - {}", text),
                )
                .await;

                CounterOfferOutcome {
                    quote: updated,
                    action,
                    invoice: None,
                }
            }
            CounterOfferAction::Reject => {
                let updated = self
                    .db
                    .settle_counter_offer(quote_id, false, None)
                    .await?
                    .ok_or_else(|| {
                        AppError::Conflict(anyhow::anyhow!("Counter-offer is no longer pending"))
                    })?;

                record_best_effort(
                    self.audit.as_ref(),
                    updated.client_id,
                    "Contre-proposition rejetée",
                )
                .await;

                CounterOfferOutcome {
                    quote: updated,
                    action,
                    invoice: None,
                }
            }
            CounterOfferAction::Accept => {
                // Structured amount wins; prose parsing is the fallback for
                // offers written free-hand. No match keeps the original
                // amount.
                let effective_amount = quote
                    .counter_offer_amount
                    .or_else(|| quote.counter_offer.as_deref().and_then(extract_amount));
                if effective_amount.is_none() {
                    warn!(
                        quote_id = %quote_id,
                        "No amount found in counter-offer; keeping original quote amount"
                    );
                }

                let updated = self
                    .db
                    .settle_counter_offer(quote_id, true, effective_amount)
                    .await?
                    .ok_or_else(|| {
                        AppError::Conflict(anyhow::anyhow!("Counter-offer is no longer pending"))
                    })?;

                let (invoice, _created) = self.synthesize_invoice(&updated, "counter_offer").await?;

                record_best_effort(
                    self.audit.as_ref(),
                    updated.client_id,
                    &format!(
                        "Contre-proposition acceptée - facture {}",
                        invoice.invoice_number
                    ),
                )
                .await;

                CounterOfferOutcome {
                    quote: updated,
                    action,
                    invoice: Some(invoice),
                }
            }
        };

        let action_text = match outcome.action {
            CounterOfferAction::Accept => "acceptée",
            CounterOfferAction::Reject => "rejetée",
            CounterOfferAction::Modify => "modifiée",
        };
        self.notify_client(
            outcome.quote.client_id,
            &format!(
                "Contre-proposition {} pour le devis \"{}\".",
                action_text, outcome.quote.description
            ),
        )
        .await;

        Ok(outcome)
    }

    /// Create the invoice and its single synthesized line item for an
    /// approved quote, guarded by the unique quote reference.
    async fn synthesize_invoice(
        &self,
        quote: &Quote,
        source: &str,
    ) -> Result<(Invoice, bool), AppError> {
        let invoice_number = generate_invoice_number(quote.quote_seq);
        let (invoice, created) = self
            .db
            .create_invoice_for_quote(
                quote.client_id,
                quote.quote_id,
                &invoice_number,
                quote.amount,
                &quote.description,
            )
            .await?;
        if created {
            INVOICES_TOTAL.with_label_values(&[source]).inc();
        }
        Ok((invoice, created))
    }

    async fn notify_client(&self, client_id: Uuid, message: &str) {
        match self.db.get_client(client_id).await {
            Ok(Some(client)) => {
                notify_best_effort(
                    self.notifier.as_ref(),
                    &Recipient::Email(client.email),
                    message,
                )
                .await;
            }
            Ok(None) => warn!(client_id = %client_id, "Client vanished; notification skipped"),
            Err(e) => warn!(client_id = %client_id, error = %e, "Client lookup failed; notification skipped"),
        }
    }
}
