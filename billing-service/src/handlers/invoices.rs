//! Invoice and line-item handlers.

use crate::dtos::{IngestInvoiceRequest, InvoiceResponse, LineItemRequest, ReplaceLineItemsRequest};
use crate::models::CreateLineItem;
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

impl From<LineItemRequest> for CreateLineItem {
    fn from(item: LineItemRequest) -> Self {
        CreateLineItem {
            designation: item.designation,
            unit_price: item.unit_price,
            quantity: item.quantity,
        }
    }
}

pub async fn list_invoices(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<crate::models::Invoice>>, AppError> {
    let invoices = state.invoices.list_invoices(auth).await?;
    Ok(Json(invoices))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let (invoice, line_items, payments) = state.invoices.get_invoice(auth, invoice_id).await?;
    Ok(Json(InvoiceResponse {
        invoice,
        line_items,
        payments,
    }))
}

pub async fn add_line_item(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<LineItemRequest>,
) -> Result<(StatusCode, Json<crate::models::LineItem>), AppError> {
    payload.validate()?;
    let line_item = state
        .invoices
        .add_line_item(auth, invoice_id, payload.into())
        .await?;
    Ok((StatusCode::CREATED, Json(line_item)))
}

pub async fn replace_line_items(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<ReplaceLineItemsRequest>,
) -> Result<Json<Vec<crate::models::LineItem>>, AppError> {
    payload.validate()?;
    let items = payload.items.into_iter().map(Into::into).collect();
    let line_items = state
        .invoices
        .replace_line_items(auth, invoice_id, items)
        .await?;
    Ok(Json(line_items))
}

pub async fn ingest_scanned_invoice(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<IngestInvoiceRequest>,
) -> Result<(StatusCode, Json<crate::models::Invoice>), AppError> {
    payload.validate()?;
    let invoice = state
        .invoices
        .ingest_scanned_invoice(
            auth,
            payload.client_id,
            &payload.filename,
            payload.content.into_bytes(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn mark_overdue(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<crate::models::Invoice>, AppError> {
    let invoice = state.invoices.mark_overdue(auth, invoice_id).await?;
    Ok(Json(invoice))
}
