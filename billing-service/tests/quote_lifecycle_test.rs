//! Quote submission and admin review integration tests.

mod common;

use billing_core::auth::AuthContext;
use billing_core::error::AppError;
use billing_service::models::{CreateQuote, SiteType};
use common::{register_client, submit_quote, test_context};
use rust_decimal_macros::dec;

#[tokio::test]
async fn submitted_quote_reads_back_pending_with_product_detail() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;

    let quote = submit_quote(&ctx, &client, dec!(500.00)).await;

    let (read, detail) = ctx
        .quotes
        .get_quote(AuthContext::client(client.client_id), quote.quote_id)
        .await
        .unwrap();

    assert_eq!(read.status, "pending");
    assert_eq!(read.description, "Site vitrine");
    assert_eq!(read.amount, dec!(500.00));
    assert_eq!(read.counter_offer_status, "none");

    let detail = detail.expect("Product detail must be created with the quote");
    assert_eq!(detail.site_type, "vitrine");
    assert_eq!(detail.features, "accueil, contact");
    assert!(detail.custom_design);
    assert!(!detail.seo_integration);

    let history = ctx.db.list_history(client.client_id).await.unwrap();
    assert!(
        history
            .iter()
            .any(|entry| entry.action.contains("Demande de devis soumise")),
        "Submission must leave a history entry"
    );
}

#[tokio::test]
async fn empty_description_is_rejected_before_any_write() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;

    let result = ctx
        .quotes
        .submit_quote(
            AuthContext::client(client.client_id),
            CreateQuote {
                client_id: client.client_id,
                description: "   ".to_string(),
                amount: dec!(100),
                site_type: SiteType::Blog,
                features: String::new(),
                custom_design: false,
                seo_integration: false,
                extra_details: None,
            },
        )
        .await;

    assert!(matches!(result, Err(AppError::BadRequest(_))));
    assert!(ctx
        .quotes
        .list_quotes(AuthContext::client(client.client_id))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn non_positive_amount_is_rejected() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;

    let result = ctx
        .quotes
        .submit_quote(
            AuthContext::client(client.client_id),
            CreateQuote {
                client_id: client.client_id,
                description: "Site vitrine".to_string(),
                amount: dec!(0),
                site_type: SiteType::Vitrine,
                features: String::new(),
                custom_design: false,
                seo_integration: false,
                extra_details: None,
            },
        )
        .await;

    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn approval_synthesizes_one_invoice_with_one_line_item() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &client, dec!(500.00)).await;

    let (approved, invoice) = ctx
        .quotes
        .approve_quote(AuthContext::admin(), quote.quote_id)
        .await
        .unwrap();

    assert_eq!(approved.status, "approved");
    assert_eq!(invoice.status, "unpaid");
    assert_eq!(invoice.amount, dec!(500.00));
    assert_eq!(invoice.quote_id, Some(quote.quote_id));
    assert!(invoice.invoice_number.starts_with('F'));

    let line_items = ctx.db.get_line_items(invoice.invoice_id).await.unwrap();
    assert_eq!(line_items.len(), 1);
    assert_eq!(line_items[0].designation, "Site vitrine");
    assert_eq!(line_items[0].unit_price, dec!(500.00));
    assert_eq!(line_items[0].quantity, 1);
    assert_eq!(line_items[0].total, dec!(500.00));
}

#[tokio::test]
async fn repeated_approval_never_creates_a_second_invoice() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &client, dec!(250.00)).await;

    let (_, first) = ctx
        .quotes
        .approve_quote(AuthContext::admin(), quote.quote_id)
        .await
        .unwrap();
    let (_, second) = ctx
        .quotes
        .approve_quote(AuthContext::admin(), quote.quote_id)
        .await
        .unwrap();

    assert_eq!(first.invoice_id, second.invoice_id);
    assert_eq!(first.invoice_number, second.invoice_number);

    let invoices = ctx.db.list_invoices(Some(client.client_id)).await.unwrap();
    assert_eq!(invoices.len(), 1, "Approval must be idempotent on invoices");

    let line_items = ctx.db.get_line_items(first.invoice_id).await.unwrap();
    assert_eq!(line_items.len(), 1);
}

#[tokio::test]
async fn approval_requires_the_admin_role() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &client, dec!(100.00)).await;

    let result = ctx
        .quotes
        .approve_quote(AuthContext::client(client.client_id), quote.quote_id)
        .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn clients_only_see_their_own_quotes() {
    let Some(ctx) = test_context().await else { return };
    let alice = register_client(&ctx).await;
    let bob = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &alice, dec!(100.00)).await;

    let result = ctx
        .quotes
        .get_quote(AuthContext::client(bob.client_id), quote.quote_id)
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let bobs_quotes = ctx
        .quotes
        .list_quotes(AuthContext::client(bob.client_id))
        .await
        .unwrap();
    assert!(bobs_quotes.iter().all(|q| q.client_id == bob.client_id));
}
