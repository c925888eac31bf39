//! Payment intent creation integration tests.

mod common;

use billing_core::auth::AuthContext;
use billing_core::error::AppError;
use billing_service::models::PaymentProviderKind;
use billing_service::services::audit::PgAuditSink;
use billing_service::services::payments::{PaymentGateway, PaymentService};
use common::{FailingGateway, register_client, submit_quote, test_context, test_currency};
use rust_decimal_macros::dec;
use std::sync::Arc;

#[tokio::test]
async fn wallet_intent_converts_once_and_stores_both_amounts() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &client, dec!(500.00)).await;
    let (_, invoice) = ctx
        .quotes
        .approve_quote(AuthContext::admin(), quote.quote_id)
        .await
        .unwrap();

    let initiation = ctx
        .payments
        .create_payment_intent(
            AuthContext::client(client.client_id),
            invoice.invoice_id,
            PaymentProviderKind::Wallet,
        )
        .await
        .unwrap();

    let payment = initiation.payment;
    assert_eq!(payment.status, "pending");
    assert_eq!(payment.provider, "wallet");
    // Base amount persisted verbatim; converted figure kept alongside:
    // 500.00 TND / 3.1 = 161.29 USD.
    assert_eq!(payment.amount, dec!(500.00));
    assert_eq!(payment.settled_amount_minor, Some(16129));
    assert_eq!(payment.settlement_currency, "USD");
    assert!(!initiation.client_token.is_empty());

    // The gateway was asked to charge the converted amount.
    let created = ctx.wallet.created.lock().unwrap().clone();
    assert_eq!(created, vec![(16129, "USD".to_string())]);
}

#[tokio::test]
async fn card_intent_charges_the_base_currency_directly() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &client, dec!(350.00)).await;
    let (_, invoice) = ctx
        .quotes
        .approve_quote(AuthContext::admin(), quote.quote_id)
        .await
        .unwrap();

    let initiation = ctx
        .payments
        .create_payment_intent(
            AuthContext::client(client.client_id),
            invoice.invoice_id,
            PaymentProviderKind::Card,
        )
        .await
        .unwrap();

    assert_eq!(initiation.payment.settlement_currency, "TND");
    assert_eq!(initiation.payment.settled_amount_minor, Some(35000));

    let created = ctx.card.created.lock().unwrap().clone();
    assert_eq!(created, vec![(35000, "TND".to_string())]);
}

#[tokio::test]
async fn intent_on_a_paid_invoice_conflicts_and_persists_nothing() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &client, dec!(200.00)).await;
    let (_, invoice) = ctx
        .quotes
        .approve_quote(AuthContext::admin(), quote.quote_id)
        .await
        .unwrap();

    assert!(ctx.db.mark_invoice_paid(invoice.invoice_id).await.unwrap());

    let result = ctx
        .payments
        .create_payment_intent(
            AuthContext::client(client.client_id),
            invoice.invoice_id,
            PaymentProviderKind::Card,
        )
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert!(ctx
        .db
        .list_payments_for_invoice(invoice.invoice_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn gateway_failure_persists_no_payment_row() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &client, dec!(120.00)).await;
    let (_, invoice) = ctx
        .quotes
        .approve_quote(AuthContext::admin(), quote.quote_id)
        .await
        .unwrap();

    let failing: Arc<dyn PaymentGateway> = Arc::new(FailingGateway::new(PaymentProviderKind::Card));
    let payments = PaymentService::new(
        ctx.db.clone(),
        failing.clone(),
        failing,
        Arc::new(PgAuditSink::new(ctx.db.clone())),
        test_currency(),
    );

    let result = payments
        .create_payment_intent(
            AuthContext::client(client.client_id),
            invoice.invoice_id,
            PaymentProviderKind::Card,
        )
        .await;

    assert!(matches!(result, Err(AppError::ExternalService(_))));
    assert!(ctx
        .db
        .list_payments_for_invoice(invoice.invoice_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn another_client_cannot_pay_someone_elses_invoice() {
    let Some(ctx) = test_context().await else { return };
    let alice = register_client(&ctx).await;
    let bob = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &alice, dec!(90.00)).await;
    let (_, invoice) = ctx
        .quotes
        .approve_quote(AuthContext::admin(), quote.quote_id)
        .await
        .unwrap();

    let result = ctx
        .payments
        .create_payment_intent(
            AuthContext::client(bob.client_id),
            invoice.invoice_id,
            PaymentProviderKind::Card,
        )
        .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}
