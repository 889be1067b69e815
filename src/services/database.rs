//! Database service for payment-recon.

use crate::error::AppError;
use crate::models::{
    BookingCandidate, BookingStatus, MatchDecision, MatchFailure, NewPaymentEvent, PaymentEvent,
    PaymentMatch, ReviewQueueEntry,
};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::NaiveDate;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "payment-recon"))]
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
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

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
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // Payment Event Ledger
    // =========================================================================

    /// Append a payment event to the ledger.
    ///
    /// Returns the stored event and whether this call created it. A
    /// redelivered `(provider, provider_event_id)` loses the insert race to
    /// the unique constraint and gets the existing row back.
    #[instrument(skip(self, event), fields(provider = %event.provider.as_str(), provider_event_id = %event.provider_event_id))]
    pub async fn insert_payment_event(
        &self,
        event: &NewPaymentEvent,
    ) -> Result<(PaymentEvent, bool), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_payment_event"])
            .start_timer();

        let event_id = Uuid::new_v4();

        let inserted = sqlx::query_as::<_, PaymentEvent>(
            r#"
            INSERT INTO integra.payment_events (event_id, provider, provider_event_id, method, amount_cents, currency, occurred_utc, memo, raw_data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (provider, provider_event_id) DO NOTHING
            RETURNING event_id, provider, provider_event_id, method, amount_cents, currency, occurred_utc, memo, raw_data, created_utc
            "#,
        )
        .bind(event_id)
        .bind(event.provider.as_str())
        .bind(&event.provider_event_id)
        .bind(event.method.as_str())
        .bind(event.amount_cents)
        .bind(&event.currency)
        .bind(event.occurred_utc)
        .bind(&event.memo)
        .bind(&event.raw_data)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert payment event: {}", e)))?;

        let result = match inserted {
            Some(row) => {
                info!(event_id = %row.event_id, "Payment event appended to ledger");
                (row, true)
            }
            None => {
                let existing = self
                    .get_payment_event_by_provider(event.provider.as_str(), &event.provider_event_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::DatabaseError(anyhow::anyhow!(
                            "Duplicate payment event vanished during idempotent re-fetch"
                        ))
                    })?;
                (existing, false)
            }
        };

        timer.observe_duration();
        Ok(result)
    }

    #[instrument(skip(self), fields(event_id = %event_id))]
    pub async fn get_payment_event(
        &self,
        event_id: Uuid,
    ) -> Result<Option<PaymentEvent>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_payment_event"])
            .start_timer();

        let event = sqlx::query_as::<_, PaymentEvent>(
            r#"
            SELECT event_id, provider, provider_event_id, method, amount_cents, currency, occurred_utc, memo, raw_data, created_utc
            FROM integra.payment_events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get payment event: {}", e)))?;

        timer.observe_duration();

        Ok(event)
    }

    #[instrument(skip(self))]
    pub async fn get_payment_event_by_provider(
        &self,
        provider: &str,
        provider_event_id: &str,
    ) -> Result<Option<PaymentEvent>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_payment_event_by_provider"])
            .start_timer();

        let event = sqlx::query_as::<_, PaymentEvent>(
            r#"
            SELECT event_id, provider, provider_event_id, method, amount_cents, currency, occurred_utc, memo, raw_data, created_utc
            FROM integra.payment_events
            WHERE provider = $1 AND provider_event_id = $2
            "#,
        )
        .bind(provider)
        .bind(provider_event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get payment event: {}", e)))?;

        timer.observe_duration();

        Ok(event)
    }

    // =========================================================================
    // Candidate Search
    // =========================================================================

    /// Open bookings inside the matching window, joined with customer
    /// contact fields.
    #[instrument(skip(self))]
    pub async fn find_candidate_bookings(
        &self,
        window_start: NaiveDate,
        window_end: NaiveDate,
        limit: i64,
    ) -> Result<Vec<BookingCandidate>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_candidate_bookings"])
            .start_timer();

        let open_statuses = [
            BookingStatus::New.as_str(),
            BookingStatus::DepositPending.as_str(),
            BookingStatus::Confirmed.as_str(),
        ];

        let candidates = sqlx::query_as::<_, BookingCandidate>(
            r#"
            SELECT b.booking_id, b.customer_id, b.event_date, b.status, b.deposit_due_cents,
                   b.total_due_cents, b.paid_cents, b.last_reminder_utc, b.created_utc,
                   c.full_name AS customer_name, c.phone AS customer_phone, c.email AS customer_email
            FROM integra.bookings b
            JOIN integra.customers c ON c.customer_id = b.customer_id
            WHERE b.status = ANY($1)
              AND b.total_due_cents - b.paid_cents > 0
              AND b.event_date BETWEEN $2 AND $3
            ORDER BY b.event_date, b.booking_id
            LIMIT $4
            "#,
        )
        .bind(&open_statuses[..])
        .bind(window_start)
        .bind(window_end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to find candidate bookings: {}", e)))?;

        timer.observe_duration();

        Ok(candidates)
    }

    // =========================================================================
    // Payment Match Operations
    // =========================================================================

    /// The current non-ignored match for a payment event, if any.
    #[instrument(skip(self), fields(payment_event_id = %payment_event_id))]
    pub async fn get_active_match(
        &self,
        payment_event_id: Uuid,
    ) -> Result<Option<PaymentMatch>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_active_match"])
            .start_timer();

        let m = sqlx::query_as::<_, PaymentMatch>(
            r#"
            SELECT match_id, payment_event_id, booking_id, score, confidence, match_method, status, reviewed_by, notes, created_utc, updated_utc
            FROM integra.payment_matches
            WHERE payment_event_id = $1 AND status <> 'ignored'
            "#,
        )
        .bind(payment_event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get active match: {}", e)))?;

        timer.observe_duration();

        Ok(m)
    }

    /// Insert a match row. The partial unique index on
    /// `(payment_event_id) WHERE status <> 'ignored'` turns a concurrent
    /// double-commit into a `Conflict` the caller resolves by re-fetching.
    #[instrument(skip(self), fields(payment_event_id = %payment_event_id, booking_id = %booking_id))]
    pub async fn insert_match(
        &self,
        payment_event_id: Uuid,
        booking_id: Uuid,
        score: i32,
        confidence: f64,
        match_method: &str,
        status: &str,
        reviewed_by: Option<&str>,
        notes: Option<&str>,
    ) -> Result<PaymentMatch, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_match"])
            .start_timer();

        let match_id = Uuid::new_v4();

        let m = sqlx::query_as::<_, PaymentMatch>(
            r#"
            INSERT INTO integra.payment_matches (match_id, payment_event_id, booking_id, score, confidence, match_method, status, reviewed_by, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING match_id, payment_event_id, booking_id, score, confidence, match_method, status, reviewed_by, notes, created_utc, updated_utc
            "#,
        )
        .bind(match_id)
        .bind(payment_event_id)
        .bind(booking_id)
        .bind(score)
        .bind(confidence)
        .bind(match_method)
        .bind(status)
        .bind(reviewed_by)
        .bind(notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(
                anyhow::anyhow!("A non-ignored match already exists for this payment event"),
            ),
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to insert match: {}", e)),
        })?;

        timer.observe_duration();
        info!(match_id = %m.match_id, status = %m.status, "Payment match recorded");

        Ok(m)
    }

    /// Mark the current active match for a payment event as ignored.
    #[instrument(skip(self), fields(payment_event_id = %payment_event_id))]
    pub async fn ignore_active_match(
        &self,
        payment_event_id: Uuid,
        reviewed_by: &str,
        notes: Option<&str>,
    ) -> Result<Option<PaymentMatch>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["ignore_active_match"])
            .start_timer();

        let m = sqlx::query_as::<_, PaymentMatch>(
            r#"
            UPDATE integra.payment_matches
            SET status = 'ignored',
                reviewed_by = $2,
                notes = COALESCE($3, notes),
                updated_utc = NOW()
            WHERE payment_event_id = $1 AND status <> 'ignored'
            RETURNING match_id, payment_event_id, booking_id, score, confidence, match_method, status, reviewed_by, notes, created_utc, updated_utc
            "#,
        )
        .bind(payment_event_id)
        .bind(reviewed_by)
        .bind(notes)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to ignore match: {}", e)))?;

        timer.observe_duration();

        Ok(m)
    }

    // =========================================================================
    // Match Decision Operations
    // =========================================================================

    /// Upsert the current decision for a payment event.
    #[instrument(skip(self), fields(payment_event_id = %payment_event_id, outcome = %outcome))]
    pub async fn upsert_decision(
        &self,
        payment_event_id: Uuid,
        outcome: &str,
        booking_id: Option<Uuid>,
        score: i32,
        confidence: f64,
    ) -> Result<MatchDecision, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_decision"])
            .start_timer();

        let decision = sqlx::query_as::<_, MatchDecision>(
            r#"
            INSERT INTO integra.match_decisions (payment_event_id, outcome, booking_id, score, confidence, decided_utc)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (payment_event_id) DO UPDATE
            SET outcome = EXCLUDED.outcome,
                booking_id = EXCLUDED.booking_id,
                score = EXCLUDED.score,
                confidence = EXCLUDED.confidence,
                decided_utc = NOW()
            RETURNING payment_event_id, outcome, booking_id, score, confidence, decided_utc
            "#,
        )
        .bind(payment_event_id)
        .bind(outcome)
        .bind(booking_id)
        .bind(score)
        .bind(confidence)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to upsert decision: {}", e)))?;

        timer.observe_duration();

        Ok(decision)
    }

    #[instrument(skip(self), fields(payment_event_id = %payment_event_id))]
    pub async fn get_decision(
        &self,
        payment_event_id: Uuid,
    ) -> Result<Option<MatchDecision>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_decision"])
            .start_timer();

        let decision = sqlx::query_as::<_, MatchDecision>(
            r#"
            SELECT payment_event_id, outcome, booking_id, score, confidence, decided_utc
            FROM integra.match_decisions
            WHERE payment_event_id = $1
            "#,
        )
        .bind(payment_event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get decision: {}", e)))?;

        timer.observe_duration();

        Ok(decision)
    }

    /// Decisions awaiting operator attention, newest first.
    #[instrument(skip(self))]
    pub async fn list_review_queue(&self, limit: i64) -> Result<Vec<ReviewQueueEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_review_queue"])
            .start_timer();

        let entries = sqlx::query_as::<_, ReviewQueueEntry>(
            r#"
            SELECT d.payment_event_id, d.outcome, d.booking_id, d.score, d.confidence, d.decided_utc,
                   e.provider, e.method, e.amount_cents, e.currency, e.occurred_utc, e.memo
            FROM integra.match_decisions d
            JOIN integra.payment_events e ON e.event_id = d.payment_event_id
            WHERE d.outcome IN ('pending_review', 'unmatched')
              AND NOT EXISTS (
                  SELECT 1 FROM integra.payment_matches pm
                  WHERE pm.payment_event_id = d.payment_event_id
                    AND pm.status <> 'ignored'
              )
            ORDER BY d.decided_utc DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list review queue: {}", e)))?;

        timer.observe_duration();

        Ok(entries)
    }

    // =========================================================================
    // Operator Failure Queue
    // =========================================================================

    #[instrument(skip(self, error), fields(payment_event_id = %payment_event_id))]
    pub async fn insert_match_failure(
        &self,
        payment_event_id: Uuid,
        error: &str,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_match_failure"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO integra.match_failures (failure_id, payment_event_id, error)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(payment_event_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to record match failure: {}", e)))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_match_failures(&self, limit: i64) -> Result<Vec<MatchFailure>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_match_failures"])
            .start_timer();

        let failures = sqlx::query_as::<_, MatchFailure>(
            r#"
            SELECT failure_id, payment_event_id, error, created_utc
            FROM integra.match_failures
            ORDER BY created_utc DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list match failures: {}", e)))?;

        timer.observe_duration();

        Ok(failures)
    }

    // =========================================================================
    // Notification Dispatch Ledger
    // =========================================================================

    /// Claim a dispatch key. Returns false when an earlier delivery of the
    /// task already claimed it, which makes retries no-ops.
    #[instrument(skip(self), fields(dispatch_key = %dispatch_key))]
    pub async fn try_claim_dispatch(
        &self,
        dispatch_key: &str,
        payment_event_id: Uuid,
        channel: &str,
        recipient: &str,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["try_claim_dispatch"])
            .start_timer();

        let result = sqlx::query(
            r#"
            INSERT INTO integra.notification_log (dispatch_key, payment_event_id, channel, recipient, status)
            VALUES ($1, $2, $3, $4, 'queued')
            ON CONFLICT (dispatch_key) DO NOTHING
            "#,
        )
        .bind(dispatch_key)
        .bind(payment_event_id)
        .bind(channel)
        .bind(recipient)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to claim dispatch: {}", e)))?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, error), fields(dispatch_key = %dispatch_key, status = %status))]
    pub async fn update_dispatch_status(
        &self,
        dispatch_key: &str,
        channel: &str,
        status: &str,
        error: Option<&str>,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_dispatch_status"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE integra.notification_log
            SET channel = $2, status = $3, error = $4, updated_utc = NOW()
            WHERE dispatch_key = $1
            "#,
        )
        .bind(dispatch_key)
        .bind(channel)
        .bind(status)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update dispatch status: {}", e)))?;

        timer.observe_duration();

        Ok(())
    }
}
