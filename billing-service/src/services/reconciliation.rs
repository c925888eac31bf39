//! Payment reconciliation engine.
//!
//! The only component that transitions an invoice to paid. Reconciliation
//! overwrites the local payment from the provider's report (idempotent) and
//! flips the invoice with a compare-and-set, so concurrent callbacks for
//! the same payment settle the invoice once and fire the paid notification
//! exactly once.

use crate::models::{Invoice, Payment, PaymentProviderKind};
use crate::services::Database;
use crate::services::audit::{AuditSink, record_best_effort};
use crate::services::metrics::RECONCILIATIONS_TOTAL;
use crate::services::notification::{Notifier, Recipient, notify_best_effort};
use crate::services::payments::{PaymentGateway, is_settled_status};
use billing_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// How the caller identifies the payment: our id, or the provider's.
#[derive(Debug, Clone)]
pub enum PaymentLookup {
    Id(Uuid),
    ProviderRef(String),
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone)]
pub struct ReconciliationOutcome {
    pub payment: Payment,
    /// Provider reported a settled status.
    pub settled: bool,
    /// This call performed the unpaid -> paid flip (at most one concurrent
    /// caller observes true).
    pub invoice_paid_now: bool,
}

pub struct ReconciliationEngine {
    db: Database,
    card: Arc<dyn PaymentGateway>,
    wallet: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
}

impl ReconciliationEngine {
    pub fn new(
        db: Database,
        card: Arc<dyn PaymentGateway>,
        wallet: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            db,
            card,
            wallet,
            notifier,
            audit,
        }
    }

    /// Synchronize one payment with the provider's authoritative status.
    /// Safe to retry: a provider error leaves the payment untouched, and a
    /// repeat with an unchanged provider status is a no-op write.
    #[instrument(skip(self))]
    pub async fn reconcile_payment(
        &self,
        lookup: PaymentLookup,
    ) -> Result<ReconciliationOutcome, AppError> {
        let payment = match &lookup {
            PaymentLookup::Id(payment_id) => self.db.get_payment(*payment_id).await?,
            PaymentLookup::ProviderRef(reference) => {
                self.db.get_payment_by_provider_ref(reference).await?
            }
        }
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

        let provider_ref = payment.provider_reference().ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "Payment {} has no provider reference to reconcile against",
                payment.payment_id
            ))
        })?;

        let gateway = match provider_ref.kind() {
            PaymentProviderKind::Card => &self.card,
            PaymentProviderKind::Wallet => &self.wallet,
        };

        // Provider query first; any error here leaves local state as-is.
        let report = gateway.get_status(provider_ref.as_str()).await?;

        let payment = self
            .db
            .update_payment_report(
                payment.payment_id,
                &report.status,
                report.risk_level.as_deref(),
            )
            .await?;

        let settled = is_settled_status(&report.status);
        let mut invoice_paid_now = false;

        if settled {
            invoice_paid_now = self.db.mark_invoice_paid(payment.invoice_id).await?;
            if invoice_paid_now {
                RECONCILIATIONS_TOTAL.with_label_values(&["settled"]).inc();
                self.on_invoice_paid(&payment).await;
            } else {
                RECONCILIATIONS_TOTAL
                    .with_label_values(&["unchanged"])
                    .inc();
            }
        } else {
            RECONCILIATIONS_TOTAL.with_label_values(&["pending"]).inc();
            info!(
                payment_id = %payment.payment_id,
                provider_status = %report.status,
                "Provider status not settled; invoice untouched"
            );
        }

        Ok(ReconciliationOutcome {
            payment,
            settled,
            invoice_paid_now,
        })
    }

    /// Paid side effects, gated on winning the compare-and-set: one history
    /// line and one notification per invoice settlement.
    async fn on_invoice_paid(&self, payment: &Payment) {
        let invoice: Option<Invoice> = match self.db.get_invoice(payment.invoice_id).await {
            Ok(invoice) => invoice,
            Err(e) => {
                warn!(invoice_id = %payment.invoice_id, error = %e, "Invoice lookup failed after paid flip");
                None
            }
        };
        let Some(invoice) = invoice else { return };

        record_best_effort(
            self.audit.as_ref(),
            invoice.client_id,
            &format!("Facture {} payée", invoice.invoice_number),
        )
        .await;

        match self.db.get_client(invoice.client_id).await {
            Ok(Some(client)) => {
                notify_best_effort(
                    self.notifier.as_ref(),
                    &Recipient::Email(client.email),
                    &format!(
                        "Votre paiement de la facture {} ({}) a été confirmé.",
                        invoice.invoice_number, payment.amount
                    ),
                )
                .await;
            }
            Ok(None) => {
                warn!(client_id = %invoice.client_id, "Client vanished; paid notification skipped")
            }
            Err(e) => {
                warn!(client_id = %invoice.client_id, error = %e, "Client lookup failed; paid notification skipped")
            }
        }
    }
}
