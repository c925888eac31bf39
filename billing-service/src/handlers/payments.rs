//! Payment initiation and reconciliation handlers.

use crate::dtos::{
    CreatePaymentIntentRequest, PaymentIntentResponse, ReconcileByRefRequest, ReconcileResponse,
};
use crate::models::{InvoiceStatus, PaymentProviderKind};
use crate::services::reconciliation::PaymentLookup;
use crate::startup::AppState;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use billing_core::auth::AuthContext;
use billing_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

pub async fn create_payment_intent(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<CreatePaymentIntentRequest>,
) -> Result<(StatusCode, Json<PaymentIntentResponse>), AppError> {
    payload.validate()?;

    let kind = PaymentProviderKind::parse(&payload.provider).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "Provider must be 'card' or 'wallet', got '{}'",
            payload.provider
        ))
    })?;

    let initiation = state
        .payments
        .create_payment_intent(auth, invoice_id, kind)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(PaymentIntentResponse {
            payment_id: initiation.payment.payment_id,
            client_token: initiation.client_token,
            status: initiation.payment.status,
        }),
    ))
}

async fn reconcile(
    state: &AppState,
    auth: AuthContext,
    lookup: PaymentLookup,
) -> Result<Json<ReconcileResponse>, AppError> {
    // Ownership check before touching provider state.
    let payment = match &lookup {
        PaymentLookup::Id(id) => state.db.get_payment(*id).await?,
        PaymentLookup::ProviderRef(reference) => {
            state.db.get_payment_by_provider_ref(reference).await?
        }
    }
    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

    let invoice = state
        .db
        .get_invoice(payment.invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
    auth.require_client(invoice.client_id)?;

    let outcome = state.reconciliation.reconcile_payment(lookup).await?;

    let invoice_status = if outcome.settled {
        InvoiceStatus::Paid.as_str().to_string()
    } else {
        invoice.status
    };

    Ok(Json(ReconcileResponse {
        payment_id: outcome.payment.payment_id,
        status: outcome.payment.status,
        risk_level: outcome.payment.risk_level,
        invoice_status,
    }))
}

pub async fn reconcile_payment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<ReconcileResponse>, AppError> {
    reconcile(&state, auth, PaymentLookup::Id(payment_id)).await
}

pub async fn reconcile_by_provider_ref(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<ReconcileByRefRequest>,
) -> Result<Json<ReconcileResponse>, AppError> {
    payload.validate()?;
    reconcile(&state, auth, PaymentLookup::ProviderRef(payload.provider_ref)).await
}
