//! Quote lifecycle handlers.

use crate::dtos::{
    CounterOfferResponseBody, CounterOfferResponseRequest, QuoteResponse, RejectQuoteRequest,
    SubmitQuoteRequest,
};
use crate::models::{CounterOfferAction, CreateQuote, SiteType};
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

pub async fn submit_quote(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<SubmitQuoteRequest>,
) -> Result<(StatusCode, Json<QuoteResponse>), AppError> {
    payload.validate()?;

    let client_id = auth
        .client_id
        .ok_or_else(|| AppError::Forbidden(anyhow::anyhow!("Only clients may submit quotes")))?;

    let site_type = SiteType::parse(&payload.site_type).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!("Unknown site type '{}'", payload.site_type))
    })?;

    let (quote, detail) = state
        .quotes
        .submit_quote(
            auth,
            CreateQuote {
                client_id,
                description: payload.description,
                amount: payload.amount,
                site_type,
                features: payload.features,
                custom_design: payload.custom_design,
                seo_integration: payload.seo_integration,
                extra_details: payload.extra_details,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(QuoteResponse {
            quote,
            product_detail: Some(detail),
        }),
    ))
}

pub async fn list_quotes(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<crate::models::Quote>>, AppError> {
    let quotes = state.quotes.list_quotes(auth).await?;
    Ok(Json(quotes))
}

pub async fn get_quote(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(quote_id): Path<Uuid>,
) -> Result<Json<QuoteResponse>, AppError> {
    let (quote, product_detail) = state.quotes.get_quote(auth, quote_id).await?;
    Ok(Json(QuoteResponse {
        quote,
        product_detail,
    }))
}

pub async fn approve_quote(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(quote_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (quote, invoice) = state.quotes.approve_quote(auth, quote_id).await?;
    Ok(Json(serde_json::json!({
        "quote": quote,
        "invoice": invoice,
    })))
}

pub async fn reject_quote(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(quote_id): Path<Uuid>,
    Json(payload): Json<RejectQuoteRequest>,
) -> Result<Json<crate::models::Quote>, AppError> {
    payload.validate()?;

    let spec_document = payload
        .spec_document
        .map(|doc| (doc.filename, doc.content.into_bytes()));

    let quote = state
        .quotes
        .reject_with_counter_offer(
            auth,
            quote_id,
            &payload.counter_offer,
            payload.counter_offer_amount,
            spec_document,
        )
        .await?;

    Ok(Json(quote))
}

pub async fn respond_to_counter_offer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(quote_id): Path<Uuid>,
    Json(payload): Json<CounterOfferResponseRequest>,
) -> Result<Json<CounterOfferResponseBody>, AppError> {
    payload.validate()?;

    let action = CounterOfferAction::parse(&payload.action).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "Action must be one of accept, reject, modify"
        ))
    })?;

    let outcome = state
        .quotes
        .respond_to_counter_offer(
            auth,
            quote_id,
            action,
            payload.modified_counter_offer.as_deref(),
            payload.modified_amount,
        )
        .await?;

    Ok(Json(CounterOfferResponseBody {
        quote: outcome.quote,
        invoice: outcome.invoice,
    }))
}
