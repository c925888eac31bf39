//! Application startup and lifecycle management.

use crate::config::BillingConfig;
use crate::handlers;
use crate::middleware::require_auth;
use crate::services::audit::{AuditSink, PgAuditSink};
use crate::services::invoicing::InvoiceEngine;
use crate::services::notification::{CompositeNotifier, Notifier, SmsNotifier, SmtpNotifier};
use crate::services::payments::{CardGateway, PaymentGateway, PaymentService, WalletGateway};
use crate::services::quotes::QuoteEngine;
use crate::services::reconciliation::ReconciliationEngine;
use crate::services::storage::{DocumentStore, LocalDocumentStore, PlainTextExtractor};
use crate::services::{Database, get_metrics, init_metrics};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use billing_core::error::AppError;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BillingConfig>,
    pub db: Database,
    pub audit: Arc<dyn AuditSink>,
    pub quotes: Arc<QuoteEngine>,
    pub invoices: Arc<InvoiceEngine>,
    pub payments: Arc<PaymentService>,
    pub reconciliation: Arc<ReconciliationEngine>,
}

/// Health check endpoint for liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "billing-service",
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "billing-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Wire collaborators, run migrations, and bind the listener. Every
    /// dependency is constructed here and injected; nothing reaches for
    /// globals at request time.
    pub async fn build(config: BillingConfig) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;
        db.run_migrations().await?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.provider_timeout_secs))
            .build()
            .map_err(|e| {
                AppError::Config(anyhow::anyhow!("Failed to build HTTP client: {}", e))
            })?;

        let card: Arc<dyn PaymentGateway> = Arc::new(CardGateway::new(
            config.card.clone(),
            http_client.clone(),
        ));
        let wallet: Arc<dyn PaymentGateway> = Arc::new(WalletGateway::new(
            config.wallet.clone(),
            http_client.clone(),
        ));

        let notifier: Arc<dyn Notifier> = Arc::new(CompositeNotifier::new(
            Box::new(SmtpNotifier::new(config.smtp.clone()).map_err(|e| {
                AppError::Config(anyhow::anyhow!("SMTP notifier setup failed: {}", e))
            })?),
            Box::new(SmsNotifier::new(config.sms.clone(), http_client.clone())),
        ));

        let documents: Arc<dyn DocumentStore> =
            Arc::new(LocalDocumentStore::new(&config.storage.root).await?);
        let audit: Arc<dyn AuditSink> = Arc::new(PgAuditSink::new(db.clone()));

        let quotes = Arc::new(QuoteEngine::new(
            db.clone(),
            documents.clone(),
            notifier.clone(),
            audit.clone(),
            config.negotiation.max_rounds,
        ));
        let invoices = Arc::new(InvoiceEngine::new(
            db.clone(),
            documents.clone(),
            Arc::new(PlainTextExtractor),
            audit.clone(),
        ));
        let payments = Arc::new(PaymentService::new(
            db.clone(),
            card.clone(),
            wallet.clone(),
            audit.clone(),
            config.currency.clone(),
        ));
        let reconciliation = Arc::new(ReconciliationEngine::new(
            db.clone(),
            card,
            wallet,
            notifier,
            audit.clone(),
        ));

        let port = config.common.port;
        let state = AppState {
            config: Arc::new(config),
            db,
            audit,
            quotes,
            invoices,
            payments,
            reconciliation,
        };

        let router = build_router(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AppError::Config(anyhow::anyhow!("Failed to bind {}: {}", addr, e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| AppError::Config(anyhow::anyhow!("Failed to read local addr: {}", e)))?
            .port();

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        tracing::info!(port = self.port, "billing-service listening");
        axum::serve(self.listener, self.router).await
    }
}

fn build_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/api/auth/password", put(handlers::auth::change_password))
        .route(
            "/api/quotes",
            post(handlers::quotes::submit_quote).get(handlers::quotes::list_quotes),
        )
        .route("/api/quotes/:quote_id", get(handlers::quotes::get_quote))
        .route(
            "/api/quotes/:quote_id/approve",
            post(handlers::quotes::approve_quote),
        )
        .route(
            "/api/quotes/:quote_id/reject",
            post(handlers::quotes::reject_quote),
        )
        .route(
            "/api/quotes/:quote_id/counter-offer-response",
            post(handlers::quotes::respond_to_counter_offer),
        )
        .route("/api/invoices", get(handlers::invoices::list_invoices))
        .route(
            "/api/invoices/scan",
            post(handlers::invoices::ingest_scanned_invoice),
        )
        .route(
            "/api/invoices/:invoice_id",
            get(handlers::invoices::get_invoice),
        )
        .route(
            "/api/invoices/:invoice_id/line-items",
            post(handlers::invoices::add_line_item).put(handlers::invoices::replace_line_items),
        )
        .route(
            "/api/invoices/:invoice_id/overdue",
            post(handlers::invoices::mark_overdue),
        )
        .route(
            "/api/invoices/:invoice_id/payment-intent",
            post(handlers::payments::create_payment_intent),
        )
        .route(
            "/api/payments/:payment_id/reconcile",
            post(handlers::payments::reconcile_payment),
        )
        .route(
            "/api/payments/reconcile",
            post(handlers::payments::reconcile_by_provider_ref),
        )
        .route("/api/history/:client_id", get(handlers::history::list_history))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/api/register", post(handlers::auth::register))
        .route("/api/login", post(handlers::auth::login))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_endpoint))
        .merge(authenticated)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
