//! Common test utilities for billing-service integration tests.
//!
//! These tests exercise the engines against a real PostgreSQL database.
//! They skip (with a note on stderr) when `TEST_DATABASE_URL` is not set,
//! so the suite stays runnable without infrastructure.

use async_trait::async_trait;
use billing_core::auth::AuthContext;
use billing_core::observability::init_test_tracing;
use billing_service::config::CurrencyConfig;
use billing_service::models::{Client, CreateClient, CreateQuote, PaymentProviderKind, Quote, SiteType};
use billing_service::services::Database;
use billing_service::services::audit::{AuditSink, PgAuditSink};
use billing_service::services::invoicing::InvoiceEngine;
use billing_service::services::notification::{MockNotifier, Notifier};
use billing_service::services::payments::{
    GatewayError, IntentHandle, MockGateway, PaymentGateway, PaymentService, ProviderReport,
};
use billing_service::services::quotes::QuoteEngine;
use billing_service::services::reconciliation::ReconciliationEngine;
use billing_service::services::storage::{LocalDocumentStore, PlainTextExtractor};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

pub struct TestContext {
    pub db: Database,
    pub quotes: QuoteEngine,
    pub invoices: InvoiceEngine,
    pub payments: PaymentService,
    pub reconciliation: ReconciliationEngine,
    pub notifier: Arc<MockNotifier>,
    pub card: Arc<MockGateway>,
    pub wallet: Arc<MockGateway>,
}

/// Build engines over the test database, or None when no database is
/// configured.
pub async fn test_context() -> Option<TestContext> {
    init_test_tracing("info,billing_service=debug,sqlx=warn");

    let Ok(database_url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping database-backed test");
        return None;
    };

    let db = Database::new(&database_url, 5, 1)
        .await
        .expect("Failed to connect to test database");
    db.run_migrations().await.expect("Failed to run migrations");

    let docs_dir = std::env::temp_dir().join(format!("billing-test-docs-{}", Uuid::new_v4()));
    let documents = Arc::new(
        LocalDocumentStore::new(&docs_dir)
            .await
            .expect("Failed to create document store"),
    );

    let notifier = Arc::new(MockNotifier::default());
    let card = Arc::new(MockGateway::new(PaymentProviderKind::Card));
    let wallet = Arc::new(MockGateway::new(PaymentProviderKind::Wallet));
    let audit: Arc<dyn AuditSink> = Arc::new(PgAuditSink::new(db.clone()));

    let notifier_dyn: Arc<dyn Notifier> = notifier.clone();
    let card_dyn: Arc<dyn PaymentGateway> = card.clone();
    let wallet_dyn: Arc<dyn PaymentGateway> = wallet.clone();

    let quotes = QuoteEngine::new(
        db.clone(),
        documents.clone(),
        notifier_dyn.clone(),
        audit.clone(),
        5,
    );
    let invoices = InvoiceEngine::new(
        db.clone(),
        documents.clone(),
        Arc::new(PlainTextExtractor),
        audit.clone(),
    );
    let payments = PaymentService::new(
        db.clone(),
        card_dyn.clone(),
        wallet_dyn.clone(),
        audit.clone(),
        test_currency(),
    );
    let reconciliation = ReconciliationEngine::new(
        db.clone(),
        card_dyn,
        wallet_dyn,
        notifier_dyn,
        audit,
    );

    Some(TestContext {
        db,
        quotes,
        invoices,
        payments,
        reconciliation,
        notifier,
        card,
        wallet,
    })
}

pub fn test_currency() -> CurrencyConfig {
    CurrencyConfig {
        base_currency: "TND".to_string(),
        settlement_currency: "USD".to_string(),
        wallet_divisor: dec!(3.1),
    }
}

/// Register a client with a unique email.
pub async fn register_client(ctx: &TestContext) -> Client {
    ctx.db
        .create_client(&CreateClient {
            name: "Client Test".to_string(),
            email: format!("client-{}@example.com", Uuid::new_v4()),
            phone: "20123456".to_string(),
            country_code: "+216".to_string(),
            password_hash: "$argon2id$test-hash".to_string(),
        })
        .await
        .expect("Failed to register test client")
}

/// Submit a quote as the given client.
pub async fn submit_quote(ctx: &TestContext, client: &Client, amount: Decimal) -> Quote {
    let (quote, _detail) = ctx
        .quotes
        .submit_quote(
            AuthContext::client(client.client_id),
            CreateQuote {
                client_id: client.client_id,
                description: "Site vitrine".to_string(),
                amount,
                site_type: SiteType::Vitrine,
                features: "accueil, contact".to_string(),
                custom_design: true,
                seo_integration: false,
                extra_details: None,
            },
        )
        .await
        .expect("Failed to submit test quote");
    quote
}

/// A gateway whose provider calls always fail, for atomicity tests.
pub struct FailingGateway {
    kind: PaymentProviderKind,
}

impl FailingGateway {
    pub fn new(kind: PaymentProviderKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl PaymentGateway for FailingGateway {
    fn kind(&self) -> PaymentProviderKind {
        self.kind
    }

    async fn create_intent(
        &self,
        _amount_minor: i64,
        _currency: &str,
        _metadata: &serde_json::Value,
    ) -> Result<IntentHandle, GatewayError> {
        Err(GatewayError::Api {
            code: "unavailable".to_string(),
            message: "provider is down".to_string(),
        })
    }

    async fn get_status(&self, _provider_ref: &str) -> Result<ProviderReport, GatewayError> {
        Err(GatewayError::Network("provider is down".to_string()))
    }

    async fn capture(&self, _provider_ref: &str) -> Result<ProviderReport, GatewayError> {
        Err(GatewayError::Network("provider is down".to_string()))
    }
}
