//! Payment intent creation against an unpaid invoice.

use super::{IntentHandle, PaymentGateway, convert_to_settlement, to_minor_units};
use crate::config::CurrencyConfig;
use crate::models::{CreatePayment, InvoiceStatus, Payment, PaymentProviderKind, ProviderRef};
use crate::services::Database;
use crate::services::audit::{AuditSink, record_best_effort};
use billing_core::auth::AuthContext;
use billing_core::error::AppError;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// What the caller needs to complete a payment on the client side.
#[derive(Debug, Clone)]
pub struct PaymentInitiation {
    pub payment: Payment,
    pub client_token: String,
}

pub struct PaymentService {
    db: Database,
    card: Arc<dyn PaymentGateway>,
    wallet: Arc<dyn PaymentGateway>,
    audit: Arc<dyn AuditSink>,
    currency: CurrencyConfig,
}

impl PaymentService {
    pub fn new(
        db: Database,
        card: Arc<dyn PaymentGateway>,
        wallet: Arc<dyn PaymentGateway>,
        audit: Arc<dyn AuditSink>,
        currency: CurrencyConfig,
    ) -> Self {
        Self {
            db,
            card,
            wallet,
            audit,
            currency,
        }
    }

    pub fn gateway_for(&self, kind: PaymentProviderKind) -> &Arc<dyn PaymentGateway> {
        match kind {
            PaymentProviderKind::Card => &self.card,
            PaymentProviderKind::Wallet => &self.wallet,
        }
    }

    /// Create a provider-side intent for an unpaid invoice and persist the
    /// matching payment row. The local row is written only after the
    /// provider call succeeds, so a gateway failure leaves no state behind.
    #[instrument(skip(self, auth), fields(invoice_id = %invoice_id, provider = %kind.as_str()))]
    pub async fn create_payment_intent(
        &self,
        auth: AuthContext,
        invoice_id: Uuid,
        kind: PaymentProviderKind,
    ) -> Result<PaymentInitiation, AppError> {
        let invoice = self
            .db
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        auth.require_client(invoice.client_id)?;

        if invoice.status() != InvoiceStatus::Unpaid {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice {} is not payable (status: {})",
                invoice.invoice_number,
                invoice.status
            )));
        }

        // One conversion, at creation. Card charges the base currency
        // directly; wallet settles in the configured settlement currency at
        // the fixed divisor.
        let (amount_minor, settlement_currency) = match kind {
            PaymentProviderKind::Card => (
                to_minor_units(invoice.amount),
                self.currency.base_currency.clone(),
            ),
            PaymentProviderKind::Wallet => (
                to_minor_units(convert_to_settlement(
                    invoice.amount,
                    self.currency.wallet_divisor,
                )),
                self.currency.settlement_currency.clone(),
            ),
        };
        let amount_minor = amount_minor.ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "Invoice amount {} cannot be expressed in minor units",
                invoice.amount
            ))
        })?;

        let metadata = json!({
            "invoice_id": invoice.invoice_id,
            "invoice_number": invoice.invoice_number,
        });

        let IntentHandle {
            provider_id,
            client_token,
        } = self
            .gateway_for(kind)
            .create_intent(amount_minor, &settlement_currency, &metadata)
            .await?;

        let provider_ref = match kind {
            PaymentProviderKind::Card => ProviderRef::Card(provider_id),
            PaymentProviderKind::Wallet => ProviderRef::Wallet(provider_id),
        };

        let payment = self
            .db
            .create_payment(&CreatePayment {
                invoice_id: invoice.invoice_id,
                provider_ref,
                amount: invoice.amount,
                settled_amount_minor: amount_minor,
                settlement_currency,
                metadata: Some(metadata),
            })
            .await?;

        record_best_effort(
            self.audit.as_ref(),
            invoice.client_id,
            &format!("Paiement initié - facture {}", invoice.invoice_number),
        )
        .await;

        info!(
            payment_id = %payment.payment_id,
            amount = %payment.amount,
            settled_amount_minor = amount_minor,
            "Payment intent created"
        );

        Ok(PaymentInitiation {
            payment,
            client_token,
        })
    }
}
