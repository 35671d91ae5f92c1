use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use tripool_core::payment::{ParticipantPayment, PaymentStatus};
use tripool_core::repository::{LedgerError, ParticipantLedger};

pub struct PgParticipantLedger {
    pool: PgPool,
}

impl PgParticipantLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Diagnose a status update that matched no rows: either there is no
    /// record for the pair, or the latest record is not in the source
    /// state for this transition.
    async fn transition_error(
        &self,
        trip_id: Uuid,
        participant_id: Uuid,
        to: PaymentStatus,
    ) -> LedgerError {
        let latest = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, trip_id, participant_id, status, hold_ref, amount, currency, created_at
            FROM participant_payments
            WHERE trip_id = $1 AND participant_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(trip_id)
        .bind(participant_id)
        .fetch_optional(&self.pool)
        .await;

        match latest {
            Ok(None) => LedgerError::NotFound,
            Ok(Some(row)) => match row.parse_status() {
                Ok(from) => LedgerError::InvalidTransition { from, to },
                Err(err) => err,
            },
            Err(err) => LedgerError::Unavailable(err.to_string()),
        }
    }

    async fn update_status(
        &self,
        trip_id: Uuid,
        participant_id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
        hold_ref: Option<&str>,
    ) -> Result<(), LedgerError> {
        let updated = sqlx::query(
            r#"
            UPDATE participant_payments
            SET status = $4, hold_ref = COALESCE($5, hold_ref)
            WHERE trip_id = $1 AND participant_id = $2 AND status = $3
            "#,
        )
        .bind(trip_id)
        .bind(participant_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(hold_ref)
        .execute(&self.pool)
        .await
        .map_err(|err| LedgerError::Unavailable(err.to_string()))?;

        if updated.rows_affected() == 1 {
            return Ok(());
        }
        Err(self.transition_error(trip_id, participant_id, to).await)
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    trip_id: Uuid,
    participant_id: Uuid,
    status: String,
    hold_ref: Option<String>,
    amount: i64,
    currency: String,
    created_at: DateTime<Utc>,
}

impl PaymentRow {
    fn parse_status(&self) -> Result<PaymentStatus, LedgerError> {
        self.status
            .parse::<PaymentStatus>()
            .map_err(|err| LedgerError::Unavailable(err.to_string()))
    }

    fn into_payment(self) -> Result<ParticipantPayment, LedgerError> {
        let status = self.parse_status()?;
        Ok(ParticipantPayment {
            id: self.id,
            trip_id: self.trip_id,
            participant_id: self.participant_id,
            status,
            hold_ref: self.hold_ref,
            amount: self.amount,
            currency: self.currency,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl ParticipantLedger for PgParticipantLedger {
    async fn create_pending(&self, record: &ParticipantPayment) -> Result<(), LedgerError> {
        // A partial unique index on (trip_id, participant_id) over active
        // statuses enforces the single-active-record invariant in the
        // database itself.
        let result = sqlx::query(
            r#"
            INSERT INTO participant_payments
                (id, trip_id, participant_id, status, hold_ref, amount, currency, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(record.trip_id)
        .bind(record.participant_id)
        .bind(record.status.as_str())
        .bind(&record.hold_ref)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(record.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(LedgerError::AlreadyExists)
            }
            Err(err) => Err(LedgerError::Unavailable(err.to_string())),
        }
    }

    async fn mark_authorized(
        &self,
        trip_id: Uuid,
        participant_id: Uuid,
        hold_ref: &str,
    ) -> Result<(), LedgerError> {
        self.update_status(
            trip_id,
            participant_id,
            PaymentStatus::Pending,
            PaymentStatus::Authorized,
            Some(hold_ref),
        )
        .await
    }

    async fn mark_failed(&self, trip_id: Uuid, participant_id: Uuid) -> Result<(), LedgerError> {
        self.update_status(
            trip_id,
            participant_id,
            PaymentStatus::Pending,
            PaymentStatus::Failed,
            None,
        )
        .await
    }

    async fn mark_voided(&self, trip_id: Uuid, participant_id: Uuid) -> Result<(), LedgerError> {
        self.update_status(
            trip_id,
            participant_id,
            PaymentStatus::Authorized,
            PaymentStatus::Voided,
            None,
        )
        .await
    }

    async fn mark_captured(&self, trip_id: Uuid, participant_id: Uuid) -> Result<(), LedgerError> {
        self.update_status(
            trip_id,
            participant_id,
            PaymentStatus::Authorized,
            PaymentStatus::Captured,
            None,
        )
        .await
    }

    async fn list_by_trip(&self, trip_id: Uuid) -> Result<Vec<ParticipantPayment>, LedgerError> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, trip_id, participant_id, status, hold_ref, amount, currency, created_at
            FROM participant_payments
            WHERE trip_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| LedgerError::Unavailable(err.to_string()))?;

        rows.into_iter().map(PaymentRow::into_payment).collect()
    }

    async fn find_active(
        &self,
        trip_id: Uuid,
        participant_id: Uuid,
    ) -> Result<Option<ParticipantPayment>, LedgerError> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, trip_id, participant_id, status, hold_ref, amount, currency, created_at
            FROM participant_payments
            WHERE trip_id = $1 AND participant_id = $2 AND status IN ('pending', 'authorized')
            "#,
        )
        .bind(trip_id)
        .bind(participant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| LedgerError::Unavailable(err.to_string()))?;

        row.map(PaymentRow::into_payment).transpose()
    }
}
