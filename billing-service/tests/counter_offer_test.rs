//! Counter-offer negotiation integration tests.

mod common;

use billing_core::auth::AuthContext;
use billing_core::error::AppError;
use billing_service::models::CounterOfferAction;
use common::{register_client, submit_quote, test_context};
use rust_decimal_macros::dec;

#[tokio::test]
async fn rejection_opens_a_pending_counter_offer_with_spec_document() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &client, dec!(500.00)).await;

    let rejected = ctx
        .quotes
        .reject_with_counter_offer(
            AuthContext::admin(),
            quote.quote_id,
            "Nouveau montant: 350 TND",
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(rejected.status, "rejected");
    assert_eq!(rejected.counter_offer_status, "pending");
    assert_eq!(rejected.counter_offer.as_deref(), Some("Nouveau montant: 350 TND"));
    assert!(
        rejected.spec_document.is_some(),
        "A default specification document must be synthesized"
    );
}

#[tokio::test]
async fn empty_counter_offer_text_is_rejected() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &client, dec!(500.00)).await;

    let result = ctx
        .quotes
        .reject_with_counter_offer(AuthContext::admin(), quote.quote_id, "  ", None, None)
        .await;

    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn accepting_extracts_the_amount_from_the_counter_offer_text() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &client, dec!(500.00)).await;

    ctx.quotes
        .reject_with_counter_offer(
            AuthContext::admin(),
            quote.quote_id,
            "Nouveau montant: 350 TND",
            None,
            None,
        )
        .await
        .unwrap();

    let outcome = ctx
        .quotes
        .respond_to_counter_offer(
            AuthContext::client(client.client_id),
            quote.quote_id,
            CounterOfferAction::Accept,
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.quote.status, "approved");
    assert_eq!(outcome.quote.counter_offer_status, "accepted");
    assert_eq!(outcome.quote.amount, dec!(350.00));

    let invoice = outcome.invoice.expect("Acceptance must synthesize an invoice");
    assert_eq!(invoice.amount, dec!(350.00));
    assert_eq!(invoice.status, "unpaid");

    let line_items = ctx.db.get_line_items(invoice.invoice_id).await.unwrap();
    assert_eq!(line_items.len(), 1);
    assert_eq!(line_items[0].total, dec!(350.00));
}

#[tokio::test]
async fn structured_amount_wins_over_prose_parsing() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &client, dec!(500.00)).await;

    ctx.quotes
        .reject_with_counter_offer(
            AuthContext::admin(),
            quote.quote_id,
            "Nous proposons 999 TND (voir détail joint)",
            Some(dec!(420.00)),
            None,
        )
        .await
        .unwrap();

    let outcome = ctx
        .quotes
        .respond_to_counter_offer(
            AuthContext::client(client.client_id),
            quote.quote_id,
            CounterOfferAction::Accept,
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.quote.amount, dec!(420.00));
    assert_eq!(outcome.invoice.unwrap().amount, dec!(420.00));
}

#[tokio::test]
async fn unparseable_counter_offer_keeps_the_original_amount() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &client, dec!(500.00)).await;

    ctx.quotes
        .reject_with_counter_offer(
            AuthContext::admin(),
            quote.quote_id,
            "Revoyons le périmètre du projet",
            None,
            None,
        )
        .await
        .unwrap();

    let outcome = ctx
        .quotes
        .respond_to_counter_offer(
            AuthContext::client(client.client_id),
            quote.quote_id,
            CounterOfferAction::Accept,
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.quote.amount, dec!(500.00));
}

#[tokio::test]
async fn rejecting_is_terminal_and_creates_no_invoice() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &client, dec!(500.00)).await;

    ctx.quotes
        .reject_with_counter_offer(AuthContext::admin(), quote.quote_id, "350 TND", None, None)
        .await
        .unwrap();

    let outcome = ctx
        .quotes
        .respond_to_counter_offer(
            AuthContext::client(client.client_id),
            quote.quote_id,
            CounterOfferAction::Reject,
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.quote.counter_offer_status, "rejected");
    assert!(outcome.invoice.is_none());
    assert!(ctx
        .db
        .get_invoice_for_quote(quote.quote_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn responding_after_settlement_conflicts_without_state_change() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &client, dec!(500.00)).await;

    ctx.quotes
        .reject_with_counter_offer(AuthContext::admin(), quote.quote_id, "350 TND", None, None)
        .await
        .unwrap();
    ctx.quotes
        .respond_to_counter_offer(
            AuthContext::client(client.client_id),
            quote.quote_id,
            CounterOfferAction::Reject,
            None,
            None,
        )
        .await
        .unwrap();

    // The negotiation is settled; a modify must fail with Conflict and
    // leave the quote untouched.
    let result = ctx
        .quotes
        .respond_to_counter_offer(
            AuthContext::client(client.client_id),
            quote.quote_id,
            CounterOfferAction::Modify,
            Some("400 TND"),
            None,
        )
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let (read, _) = ctx
        .quotes
        .get_quote(AuthContext::client(client.client_id), quote.quote_id)
        .await
        .unwrap();
    assert_eq!(read.counter_offer_status, "rejected");
    assert_eq!(read.counter_offer.as_deref(), Some("350 TND"));
}

#[tokio::test]
async fn only_the_owning_client_may_respond() {
    let Some(ctx) = test_context().await else { return };
    let alice = register_client(&ctx).await;
    let bob = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &alice, dec!(500.00)).await;

    ctx.quotes
        .reject_with_counter_offer(AuthContext::admin(), quote.quote_id, "350 TND", None, None)
        .await
        .unwrap();

    let result = ctx
        .quotes
        .respond_to_counter_offer(
            AuthContext::client(bob.client_id),
            quote.quote_id,
            CounterOfferAction::Accept,
            None,
            None,
        )
        .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn modify_loops_back_until_the_round_limit() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &client, dec!(500.00)).await;

    ctx.quotes
        .reject_with_counter_offer(AuthContext::admin(), quote.quote_id, "350 TND", None, None)
        .await
        .unwrap();

    // The test context allows 5 rounds.
    for round in 1..=5 {
        let outcome = ctx
            .quotes
            .respond_to_counter_offer(
                AuthContext::client(client.client_id),
                quote.quote_id,
                CounterOfferAction::Modify,
                Some(&format!("{} TND", 350 + round)),
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.quote.counter_offer_status, "pending");
        assert_eq!(outcome.quote.negotiation_rounds, round);
    }

    let result = ctx
        .quotes
        .respond_to_counter_offer(
            AuthContext::client(client.client_id),
            quote.quote_id,
            CounterOfferAction::Modify,
            Some("999 TND"),
            None,
        )
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn modify_requires_text() {
    let Some(ctx) = test_context().await else { return };
    let client = register_client(&ctx).await;
    let quote = submit_quote(&ctx, &client, dec!(500.00)).await;

    ctx.quotes
        .reject_with_counter_offer(AuthContext::admin(), quote.quote_id, "350 TND", None, None)
        .await
        .unwrap();

    let result = ctx
        .quotes
        .respond_to_counter_offer(
            AuthContext::client(client.client_id),
            quote.quote_id,
            CounterOfferAction::Modify,
            None,
            None,
        )
        .await;

    assert!(matches!(result, Err(AppError::BadRequest(_))));
}
