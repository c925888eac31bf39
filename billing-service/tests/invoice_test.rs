//! Invoice line-item and scanned-ingestion integration tests.

mod common;

use billing_core::auth::AuthContext;
use billing_core::error::AppError;
use billing_service::models::CreateLineItem;
use common::{register_client, submit_quote, test_context};
use rust_decimal_macros::dec;

#[tokio::test]
async fn line_item_total_is_recomputed_on_every_write() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &client, dec!(500.00)).await;
    let (_, invoice) = ctx
        .quotes
        .approve_quote(AuthContext::admin(), quote.quote_id)
        .await
        .unwrap();

    let line_item = ctx
        .invoices
        .add_line_item(
            AuthContext::admin(),
            invoice.invoice_id,
            CreateLineItem {
                designation: "Hébergement (1 an)".to_string(),
                unit_price: dec!(12.50),
                quantity: 4,
            },
        )
        .await
        .unwrap();

    assert_eq!(line_item.total, dec!(50.00));

    let replaced = ctx
        .invoices
        .replace_line_items(
            AuthContext::admin(),
            invoice.invoice_id,
            vec![
                CreateLineItem {
                    designation: "Développement".to_string(),
                    unit_price: dec!(400.00),
                    quantity: 1,
                },
                CreateLineItem {
                    designation: "Maintenance".to_string(),
                    unit_price: dec!(25.00),
                    quantity: 4,
                },
            ],
        )
        .await
        .unwrap();

    assert_eq!(replaced.len(), 2);
    assert_eq!(replaced[0].total, dec!(400.00));
    assert_eq!(replaced[1].total, dec!(100.00));
    assert_eq!(replaced[0].position, 0);
    assert_eq!(replaced[1].position, 1);

    // Replacement is total: the earlier items are gone.
    let items = ctx.db.get_line_items(invoice.invoice_id).await.unwrap();
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn replacing_with_an_empty_set_is_rejected() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &client, dec!(100.00)).await;
    let (_, invoice) = ctx
        .quotes
        .approve_quote(AuthContext::admin(), quote.quote_id)
        .await
        .unwrap();

    let result = ctx
        .invoices
        .replace_line_items(AuthContext::admin(), invoice.invoice_id, vec![])
        .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    // The synthesized line item survives.
    let items = ctx.db.get_line_items(invoice.invoice_id).await.unwrap();
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn negative_inputs_are_rejected() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &client, dec!(100.00)).await;
    let (_, invoice) = ctx
        .quotes
        .approve_quote(AuthContext::admin(), quote.quote_id)
        .await
        .unwrap();

    let result = ctx
        .invoices
        .add_line_item(
            AuthContext::admin(),
            invoice.invoice_id,
            CreateLineItem {
                designation: "Remise".to_string(),
                unit_price: dec!(-10.00),
                quantity: 1,
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn paid_invoices_refuse_line_item_changes() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &client, dec!(100.00)).await;
    let (_, invoice) = ctx
        .quotes
        .approve_quote(AuthContext::admin(), quote.quote_id)
        .await
        .unwrap();
    assert!(ctx.db.mark_invoice_paid(invoice.invoice_id).await.unwrap());

    let result = ctx
        .invoices
        .add_line_item(
            AuthContext::admin(),
            invoice.invoice_id,
            CreateLineItem {
                designation: "Extra".to_string(),
                unit_price: dec!(10.00),
                quantity: 1,
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn scanned_invoice_is_ingested_with_inferred_fields() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;

    let text = "Ste Bonjour\nFacture: F9731-204\nTotal TTC: 480,00 TND\nStatut: Payée\n";
    let invoice = ctx
        .invoices
        .ingest_scanned_invoice(
            AuthContext::admin(),
            client.client_id,
            "facture-scan.txt",
            text.as_bytes().to_vec(),
        )
        .await
        .unwrap();

    assert_eq!(invoice.invoice_number, "F9731-204");
    assert_eq!(invoice.amount, dec!(480.00));
    assert_eq!(invoice.status, "paid");
    assert!(invoice.quote_id.is_none());
    assert!(invoice.scanned_ref.is_some());
}

#[tokio::test]
async fn unreadable_scan_creates_nothing() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;

    let before = ctx.db.list_invoices(Some(client.client_id)).await.unwrap().len();
    let result = ctx
        .invoices
        .ingest_scanned_invoice(
            AuthContext::admin(),
            client.client_id,
            "blank.txt",
            b"   ".to_vec(),
        )
        .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let after = ctx.db.list_invoices(Some(client.client_id)).await.unwrap().len();
    assert_eq!(before, after);
}

#[tokio::test]
async fn overdue_is_an_explicit_transition_from_unpaid_only() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &client, dec!(100.00)).await;
    let (_, invoice) = ctx
        .quotes
        .approve_quote(AuthContext::admin(), quote.quote_id)
        .await
        .unwrap();

    let overdue = ctx
        .invoices
        .mark_overdue(AuthContext::admin(), invoice.invoice_id)
        .await
        .unwrap();
    assert_eq!(overdue.status, "overdue");

    // Once paid, overdue no longer applies.
    assert!(ctx.db.mark_invoice_paid(invoice.invoice_id).await.unwrap());
    let result = ctx
        .invoices
        .mark_overdue(AuthContext::admin(), invoice.invoice_id)
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
}
