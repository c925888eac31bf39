//! Database service for billing-service.
//!
//! All multi-entity writes (quote + product detail, invoice + line item,
//! line-item replacement) run inside a single transaction. Status guards are
//! expressed as status-qualified UPDATEs so concurrent callers race on the
//! row, not on a check-then-act window.

use crate::models::{
    Client, CreateClient, CreateInvoice, CreateLineItem, CreatePayment, CreateQuote, HistoryEntry,
    Invoice, LineItem, Payment, ProductDetail, Quote, QuoteStatus, line_total,
};
use crate::services::metrics::DB_QUERY_DURATION;
use billing_core::error::AppError;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const QUOTE_COLUMNS: &str = "quote_id, client_id, quote_seq, description, amount, status, \
     counter_offer, counter_offer_amount, counter_offer_status, negotiation_rounds, \
     spec_document, created_utc";

const INVOICE_COLUMNS: &str =
    "invoice_id, client_id, quote_id, invoice_number, amount, status, scanned_ref, created_utc";

const PAYMENT_COLUMNS: &str = "payment_id, invoice_id, provider, provider_ref, amount, \
     settled_amount_minor, settlement_currency, status, risk_level, metadata, created_utc, \
     updated_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "billing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Client Operations
    // -------------------------------------------------------------------------

    /// Register a client. A duplicate email maps to Conflict.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create_client(&self, input: &CreateClient) -> Result<Client, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(
            r#"
            INSERT INTO clients (client_id, name, email, phone, country_code, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING client_id, name, email, phone, country_code, password_hash, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.country_code)
        .bind(&input.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("Email '{}' is already registered", input.email))
            }
            _ => AppError::Database(anyhow::anyhow!("Failed to create client: {}", e)),
        })?;

        timer.observe_duration();

        info!(client_id = %client.client_id, "Client registered");

        Ok(client)
    }

    #[instrument(skip(self))]
    pub async fn get_client(&self, client_id: Uuid) -> Result<Option<Client>, AppError> {
        let client = sqlx::query_as::<_, Client>(
            r#"
            SELECT client_id, name, email, phone, country_code, password_hash, created_utc
            FROM clients
            WHERE client_id = $1
            "#,
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get client: {}", e)))?;

        Ok(client)
    }

    #[instrument(skip(self))]
    pub async fn get_client_by_email(&self, email: &str) -> Result<Option<Client>, AppError> {
        let client = sqlx::query_as::<_, Client>(
            r#"
            SELECT client_id, name, email, phone, country_code, password_hash, created_utc
            FROM clients
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get client: {}", e)))?;

        Ok(client)
    }

    #[instrument(skip(self, password_hash))]
    pub async fn update_client_password(
        &self,
        client_id: Uuid,
        password_hash: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE clients SET password_hash = $2 WHERE client_id = $1")
            .bind(client_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to update password: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Quote Operations
    // -------------------------------------------------------------------------

    /// Create a quote and its product detail atomically. A failure on either
    /// insert rolls back the whole transaction, so no quote exists without
    /// its detail.
    #[instrument(skip(self, input), fields(client_id = %input.client_id))]
    pub async fn create_quote_with_detail(
        &self,
        input: &CreateQuote,
    ) -> Result<(Quote, ProductDetail), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_quote_with_detail"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to begin: {}", e)))?;

        let quote = sqlx::query_as::<_, Quote>(&format!(
            r#"
            INSERT INTO quotes (quote_id, client_id, description, amount, status)
            VALUES ($1, $2, $3, $4, 'pending')
            RETURNING {QUOTE_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(input.client_id)
        .bind(&input.description)
        .bind(input.amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to create quote: {}", e)))?;

        let detail = sqlx::query_as::<_, ProductDetail>(
            r#"
            INSERT INTO product_details (
                product_detail_id, quote_id, site_type, features, custom_design,
                seo_integration, extra_details
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING product_detail_id, quote_id, site_type, features, custom_design,
                seo_integration, extra_details
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(quote.quote_id)
        .bind(input.site_type.as_str())
        .bind(&input.features)
        .bind(input.custom_design)
        .bind(input.seo_integration)
        .bind(&input.extra_details)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::Database(anyhow::anyhow!("Failed to create product detail: {}", e))
        })?;

        tx.commit()
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();

        info!(quote_id = %quote.quote_id, "Quote submitted");

        Ok((quote, detail))
    }

    #[instrument(skip(self))]
    pub async fn get_quote(&self, quote_id: Uuid) -> Result<Option<Quote>, AppError> {
        let quote = sqlx::query_as::<_, Quote>(&format!(
            "SELECT {QUOTE_COLUMNS} FROM quotes WHERE quote_id = $1"
        ))
        .bind(quote_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get quote: {}", e)))?;

        Ok(quote)
    }

    #[instrument(skip(self))]
    pub async fn get_product_detail(
        &self,
        quote_id: Uuid,
    ) -> Result<Option<ProductDetail>, AppError> {
        let detail = sqlx::query_as::<_, ProductDetail>(
            r#"
            SELECT product_detail_id, quote_id, site_type, features, custom_design,
                seo_integration, extra_details
            FROM product_details
            WHERE quote_id = $1
            "#,
        )
        .bind(quote_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get product detail: {}", e)))?;

        Ok(detail)
    }

    /// List quotes, optionally scoped to one client, newest first.
    #[instrument(skip(self))]
    pub async fn list_quotes(&self, client_id: Option<Uuid>) -> Result<Vec<Quote>, AppError> {
        let quotes = sqlx::query_as::<_, Quote>(&format!(
            r#"
            SELECT {QUOTE_COLUMNS}
            FROM quotes
            WHERE ($1::uuid IS NULL OR client_id = $1)
            ORDER BY created_utc DESC
            "#,
        ))
        .bind(client_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to list quotes: {}", e)))?;

        Ok(quotes)
    }

    /// Set the quote status (admin review).
    #[instrument(skip(self))]
    pub async fn set_quote_status(
        &self,
        quote_id: Uuid,
        status: QuoteStatus,
    ) -> Result<Option<Quote>, AppError> {
        let quote = sqlx::query_as::<_, Quote>(&format!(
            r#"
            UPDATE quotes
            SET status = $2
            WHERE quote_id = $1
            RETURNING {QUOTE_COLUMNS}
            "#,
        ))
        .bind(quote_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to set quote status: {}", e)))?;

        Ok(quote)
    }

    /// Reject a quote and open a counter-offer round.
    #[instrument(skip(self, counter_offer))]
    pub async fn open_counter_offer(
        &self,
        quote_id: Uuid,
        counter_offer: &str,
        counter_offer_amount: Option<Decimal>,
        spec_document: Option<&str>,
    ) -> Result<Option<Quote>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["open_counter_offer"])
            .start_timer();

        let quote = sqlx::query_as::<_, Quote>(&format!(
            r#"
            UPDATE quotes
            SET status = 'rejected',
                counter_offer = $2,
                counter_offer_amount = $3,
                counter_offer_status = 'pending',
                spec_document = COALESCE($4, spec_document)
            WHERE quote_id = $1
            RETURNING {QUOTE_COLUMNS}
            "#,
        ))
        .bind(quote_id)
        .bind(counter_offer)
        .bind(counter_offer_amount)
        .bind(spec_document)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to open counter-offer: {}", e)))?;

        timer.observe_duration();

        Ok(quote)
    }

    /// Client modification of a pending counter-offer. The guard on
    /// `counter_offer_status` and the round cap are part of the UPDATE, so a
    /// settled negotiation or an exhausted one never advances.
    #[instrument(skip(self, text))]
    pub async fn modify_counter_offer(
        &self,
        quote_id: Uuid,
        text: &str,
        amount: Option<Decimal>,
        max_rounds: i32,
    ) -> Result<Option<Quote>, AppError> {
        let quote = sqlx::query_as::<_, Quote>(&format!(
            r#"
            UPDATE quotes
            SET counter_offer = $2,
                counter_offer_amount = $3,
                negotiation_rounds = negotiation_rounds + 1
            WHERE quote_id = $1
              AND status = 'rejected'
              AND counter_offer_status = 'pending'
              AND negotiation_rounds < $4
            RETURNING {QUOTE_COLUMNS}
            "#,
        ))
        .bind(quote_id)
        .bind(text)
        .bind(amount)
        .bind(max_rounds)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::Database(anyhow::anyhow!("Failed to modify counter-offer: {}", e))
        })?;

        Ok(quote)
    }

    /// Settle a pending counter-offer: accept promotes the quote to approved
    /// with the effective amount, reject closes the negotiation. Returns
    /// None when the counter-offer was not pending (the caller maps this to
    /// Conflict).
    #[instrument(skip(self))]
    pub async fn settle_counter_offer(
        &self,
        quote_id: Uuid,
        accepted: bool,
        effective_amount: Option<Decimal>,
    ) -> Result<Option<Quote>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["settle_counter_offer"])
            .start_timer();

        let quote = if accepted {
            sqlx::query_as::<_, Quote>(&format!(
                r#"
                UPDATE quotes
                SET counter_offer_status = 'accepted',
                    status = 'approved',
                    amount = COALESCE($2, amount)
                WHERE quote_id = $1
                  AND status = 'rejected'
                  AND counter_offer_status = 'pending'
                RETURNING {QUOTE_COLUMNS}
                "#,
            ))
            .bind(quote_id)
            .bind(effective_amount)
            .fetch_optional(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Quote>(&format!(
                r#"
                UPDATE quotes
                SET counter_offer_status = 'rejected'
                WHERE quote_id = $1
                  AND status = 'rejected'
                  AND counter_offer_status = 'pending'
                RETURNING {QUOTE_COLUMNS}
                "#,
            ))
            .bind(quote_id)
            .fetch_optional(&self.pool)
            .await
        }
        .map_err(|e| {
            AppError::Database(anyhow::anyhow!("Failed to settle counter-offer: {}", e))
        })?;

        timer.observe_duration();

        Ok(quote)
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    /// Create an invoice without a quote reference (scanned ingestion).
    #[instrument(skip(self, input), fields(client_id = %input.client_id))]
    pub async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            INSERT INTO invoices (invoice_id, client_id, quote_id, invoice_number, amount, status, scanned_ref)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {INVOICE_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(input.client_id)
        .bind(input.quote_id)
        .bind(&input.invoice_number)
        .bind(input.amount)
        .bind(input.status.as_str())
        .bind(&input.scanned_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Invoice number '{}' already exists",
                    input.invoice_number
                ))
            }
            _ => AppError::Database(anyhow::anyhow!("Failed to create invoice: {}", e)),
        })?;

        timer.observe_duration();

        info!(invoice_id = %invoice.invoice_id, invoice_number = %invoice.invoice_number, "Invoice created");

        Ok(invoice)
    }

    /// Synthesize the invoice for an approved quote, with its single line
    /// item, in one transaction. The unique index on `invoices.quote_id`
    /// makes this safe under concurrent approvals: the second writer's
    /// insert is a no-op and both observe the surviving row. Returns the
    /// invoice and whether this call created it.
    #[instrument(skip(self))]
    pub async fn create_invoice_for_quote(
        &self,
        client_id: Uuid,
        quote_id: Uuid,
        invoice_number: &str,
        amount: Decimal,
        designation: &str,
    ) -> Result<(Invoice, bool), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice_for_quote"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to begin: {}", e)))?;

        let inserted = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            INSERT INTO invoices (invoice_id, client_id, quote_id, invoice_number, amount, status)
            VALUES ($1, $2, $3, $4, $5, 'unpaid')
            ON CONFLICT (quote_id) DO NOTHING
            RETURNING {INVOICE_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(client_id)
        .bind(quote_id)
        .bind(invoice_number)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to create invoice: {}", e)))?;

        let created = inserted.is_some();
        if let Some(ref invoice) = inserted {
            sqlx::query(
                r#"
                INSERT INTO line_items (line_item_id, invoice_id, designation, unit_price, quantity, total, position)
                VALUES ($1, $2, $3, $4, 1, $5, 0)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(invoice.invoice_id)
            .bind(designation)
            .bind(amount)
            .bind(line_total(amount, 1))
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to create line item: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to commit: {}", e)))?;

        let invoice = match inserted {
            Some(invoice) => invoice,
            None => self.get_invoice_for_quote(quote_id).await?.ok_or_else(|| {
                AppError::Database(anyhow::anyhow!(
                    "Invoice for quote {} vanished after conflict",
                    quote_id
                ))
            })?,
        };

        timer.observe_duration();

        if created {
            info!(invoice_id = %invoice.invoice_id, quote_id = %quote_id, "Invoice synthesized for quote");
        }

        Ok((invoice, created))
    }

    #[instrument(skip(self))]
    pub async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_id = $1"
        ))
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        Ok(invoice)
    }

    #[instrument(skip(self))]
    pub async fn get_invoice_for_quote(&self, quote_id: Uuid) -> Result<Option<Invoice>, AppError> {
        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE quote_id = $1"
        ))
        .bind(quote_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        Ok(invoice)
    }

    /// List invoices, optionally scoped to one client, newest first.
    #[instrument(skip(self))]
    pub async fn list_invoices(&self, client_id: Option<Uuid>) -> Result<Vec<Invoice>, AppError> {
        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE ($1::uuid IS NULL OR client_id = $1)
            ORDER BY created_utc DESC
            "#,
        ))
        .bind(client_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        Ok(invoices)
    }

    /// Flip an invoice to paid. Compare-and-set: only one concurrent caller
    /// observes `rows_affected == 1`, which gates the paid side effects.
    #[instrument(skip(self))]
    pub async fn mark_invoice_paid(&self, invoice_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_invoice_paid"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = 'paid'
            WHERE invoice_id = $1 AND status <> 'paid'
            "#,
        )
        .bind(invoice_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to mark invoice paid: {}", e)))?;

        timer.observe_duration();

        let flipped = result.rows_affected() > 0;
        if flipped {
            info!(invoice_id = %invoice_id, "Invoice marked paid");
        }

        Ok(flipped)
    }

    /// Explicit unpaid -> overdue transition.
    #[instrument(skip(self))]
    pub async fn mark_invoice_overdue(&self, invoice_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = 'overdue'
            WHERE invoice_id = $1 AND status = 'unpaid'
            "#,
        )
        .bind(invoice_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::Database(anyhow::anyhow!("Failed to mark invoice overdue: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Line Item Operations
    // -------------------------------------------------------------------------

    /// Append a line item. `total` is recomputed here; callers cannot
    /// supply one.
    #[instrument(skip(self, input), fields(invoice_id = %invoice_id))]
    pub async fn add_line_item(
        &self,
        invoice_id: Uuid,
        input: &CreateLineItem,
    ) -> Result<LineItem, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_line_item"])
            .start_timer();

        let line_item = sqlx::query_as::<_, LineItem>(
            r#"
            INSERT INTO line_items (line_item_id, invoice_id, designation, unit_price, quantity, total, position)
            VALUES ($1, $2, $3, $4, $5, $6,
                COALESCE((SELECT MAX(position) + 1 FROM line_items WHERE invoice_id = $2), 0))
            RETURNING line_item_id, invoice_id, designation, unit_price, quantity, total, position, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(invoice_id)
        .bind(&input.designation)
        .bind(input.unit_price)
        .bind(input.quantity)
        .bind(line_total(input.unit_price, input.quantity))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to add line item: {}", e)))?;

        timer.observe_duration();

        info!(line_item_id = %line_item.line_item_id, "Line item added");

        Ok(line_item)
    }

    #[instrument(skip(self))]
    pub async fn get_line_items(&self, invoice_id: Uuid) -> Result<Vec<LineItem>, AppError> {
        let line_items = sqlx::query_as::<_, LineItem>(
            r#"
            SELECT line_item_id, invoice_id, designation, unit_price, quantity, total, position, created_utc
            FROM line_items
            WHERE invoice_id = $1
            ORDER BY position, created_utc
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get line items: {}", e)))?;

        Ok(line_items)
    }

    /// Replace all line items of an invoice: delete-all plus insert-new in
    /// one transaction, so a mid-replacement failure cannot leave the
    /// invoice with zero items.
    #[instrument(skip(self, items), fields(invoice_id = %invoice_id, count = items.len()))]
    pub async fn replace_line_items(
        &self,
        invoice_id: Uuid,
        items: &[CreateLineItem],
    ) -> Result<Vec<LineItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["replace_line_items"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to begin: {}", e)))?;

        sqlx::query("DELETE FROM line_items WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to clear line items: {}", e)))?;

        let mut replaced = Vec::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            let line_item = sqlx::query_as::<_, LineItem>(
                r#"
                INSERT INTO line_items (line_item_id, invoice_id, designation, unit_price, quantity, total, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING line_item_id, invoice_id, designation, unit_price, quantity, total, position, created_utc
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(invoice_id)
            .bind(&item.designation)
            .bind(item.unit_price)
            .bind(item.quantity)
            .bind(line_total(item.unit_price, item.quantity))
            .bind(position as i32)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to insert line item: {}", e)))?;
            replaced.push(line_item);
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();

        info!(invoice_id = %invoice_id, count = replaced.len(), "Line items replaced");

        Ok(replaced)
    }

    // -------------------------------------------------------------------------
    // Payment Operations
    // -------------------------------------------------------------------------

    /// Persist a payment record after the provider accepted the intent.
    #[instrument(skip(self, input), fields(invoice_id = %input.invoice_id))]
    pub async fn create_payment(&self, input: &CreatePayment) -> Result<Payment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments (
                payment_id, invoice_id, provider, provider_ref, amount,
                settled_amount_minor, settlement_currency, status, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8)
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(input.invoice_id)
        .bind(input.provider_ref.kind().as_str())
        .bind(input.provider_ref.as_str())
        .bind(input.amount)
        .bind(input.settled_amount_minor)
        .bind(&input.settlement_currency)
        .bind(&input.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Provider reference '{}' already recorded",
                    input.provider_ref.as_str()
                ))
            }
            _ => AppError::Database(anyhow::anyhow!("Failed to create payment: {}", e)),
        })?;

        timer.observe_duration();

        info!(payment_id = %payment.payment_id, provider = %payment.provider, "Payment created");

        Ok(payment)
    }

    #[instrument(skip(self))]
    pub async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE payment_id = $1"
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get payment: {}", e)))?;

        Ok(payment)
    }

    #[instrument(skip(self))]
    pub async fn get_payment_by_provider_ref(
        &self,
        provider_ref: &str,
    ) -> Result<Option<Payment>, AppError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE provider_ref = $1"
        ))
        .bind(provider_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to get payment: {}", e)))?;

        Ok(payment)
    }

    #[instrument(skip(self))]
    pub async fn list_payments_for_invoice(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<Payment>, AppError> {
        let payments = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE invoice_id = $1
            ORDER BY created_utc
            "#,
        ))
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to list payments: {}", e)))?;

        Ok(payments)
    }

    /// Overwrite a payment's status and risk level from the provider's
    /// report. Idempotent: writing the same values again changes nothing
    /// observable.
    #[instrument(skip(self))]
    pub async fn update_payment_report(
        &self,
        payment_id: Uuid,
        status: &str,
        risk_level: Option<&str>,
    ) -> Result<Payment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_payment_report"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE payments
            SET status = $2,
                risk_level = COALESCE($3, risk_level),
                updated_utc = NOW()
            WHERE payment_id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(payment_id)
        .bind(status)
        .bind(risk_level)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to update payment: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

        timer.observe_duration();

        Ok(payment)
    }

    // -------------------------------------------------------------------------
    // History Operations
    // -------------------------------------------------------------------------

    /// Append an audit entry. Entries are never updated or deleted.
    #[instrument(skip(self, action))]
    pub async fn append_history(
        &self,
        client_id: Uuid,
        action: &str,
    ) -> Result<HistoryEntry, AppError> {
        let entry = sqlx::query_as::<_, HistoryEntry>(
            r#"
            INSERT INTO history (history_id, client_id, action)
            VALUES ($1, $2, $3)
            RETURNING history_id, client_id, action, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(client_id)
        .bind(action)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to append history: {}", e)))?;

        Ok(entry)
    }

    #[instrument(skip(self))]
    pub async fn list_history(&self, client_id: Uuid) -> Result<Vec<HistoryEntry>, AppError> {
        let entries = sqlx::query_as::<_, HistoryEntry>(
            r#"
            SELECT history_id, client_id, action, created_utc
            FROM history
            WHERE client_id = $1
            ORDER BY created_utc DESC
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to list history: {}", e)))?;

        Ok(entries)
    }
}
