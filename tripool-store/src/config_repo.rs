use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use tripool_core::gateway::VirtualCard;
use tripool_core::payment::PaymentConfiguration;
use tripool_core::repository::{ConfigStoreError, ConfigurationStore};

pub struct PgConfigurationStore {
    pool: PgPool,
}

impl PgConfigurationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ConfigRow {
    trip_id: Uuid,
    total_cost: i64,
    currency: String,
    min_participants: i32,
    per_seat_amount: i64,
    virtual_card_ref: Option<String>,
    card_last_four: Option<String>,
    card_brand: Option<String>,
    card_exp_month: Option<i32>,
    card_exp_year: Option<i32>,
    created_at: DateTime<Utc>,
}

impl ConfigRow {
    fn into_config(self) -> PaymentConfiguration {
        let virtual_card = match (
            self.virtual_card_ref,
            self.card_last_four,
            self.card_brand,
            self.card_exp_month,
            self.card_exp_year,
        ) {
            (Some(card_ref), Some(last_four), Some(brand), Some(exp_month), Some(exp_year)) => {
                Some(VirtualCard {
                    card_ref,
                    last_four,
                    brand,
                    exp_month,
                    exp_year,
                })
            }
            _ => None,
        };

        PaymentConfiguration {
            trip_id: self.trip_id,
            total_cost: self.total_cost,
            currency: self.currency,
            min_participants: self.min_participants,
            per_seat_amount: self.per_seat_amount,
            virtual_card,
            created_at: self.created_at,
        }
    }
}

fn store_err(err: sqlx::Error) -> ConfigStoreError {
    ConfigStoreError::Unavailable(err.to_string())
}

#[async_trait]
impl ConfigurationStore for PgConfigurationStore {
    async fn create(&self, config: &PaymentConfiguration) -> Result<(), ConfigStoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_configurations
                (trip_id, total_cost, currency, min_participants, per_seat_amount, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(config.trip_id)
        .bind(config.total_cost)
        .bind(&config.currency)
        .bind(config.min_participants)
        .bind(config.per_seat_amount)
        .bind(config.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(ConfigStoreError::AlreadyExists)
            }
            Err(err) => Err(store_err(err)),
        }
    }

    async fn get(&self, trip_id: Uuid) -> Result<Option<PaymentConfiguration>, ConfigStoreError> {
        let row = sqlx::query_as::<_, ConfigRow>(
            r#"
            SELECT trip_id, total_cost, currency, min_participants, per_seat_amount,
                   virtual_card_ref, card_last_four, card_brand, card_exp_month, card_exp_year,
                   created_at
            FROM payment_configurations
            WHERE trip_id = $1
            "#,
        )
        .bind(trip_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(row.map(ConfigRow::into_config))
    }

    async fn attach_virtual_card(
        &self,
        trip_id: Uuid,
        card: &VirtualCard,
    ) -> Result<(), ConfigStoreError> {
        // Guarded update: only attaches while no card is present, so a
        // second attach can never overwrite the first.
        let updated = sqlx::query(
            r#"
            UPDATE payment_configurations
            SET virtual_card_ref = $2, card_last_four = $3, card_brand = $4,
                card_exp_month = $5, card_exp_year = $6
            WHERE trip_id = $1 AND virtual_card_ref IS NULL
            "#,
        )
        .bind(trip_id)
        .bind(&card.card_ref)
        .bind(&card.last_four)
        .bind(&card.brand)
        .bind(card.exp_month)
        .bind(card.exp_year)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if updated.rows_affected() == 1 {
            return Ok(());
        }

        match self.get(trip_id).await? {
            None => Err(ConfigStoreError::NotFound),
            Some(config) => match config.virtual_card {
                Some(existing) => Err(ConfigStoreError::AlreadyAttached { existing }),
                None => Err(ConfigStoreError::Unavailable(
                    "card attach affected no rows".to_string(),
                )),
            },
        }
    }
}
