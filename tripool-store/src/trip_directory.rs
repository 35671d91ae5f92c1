use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use tripool_core::registry::{DirectoryError, TripDirectory};

/// Host lookup against the trip table owned by the surrounding trip
/// service. Read-only from this side.
pub struct PgTripDirectory {
    pool: PgPool,
}

impl PgTripDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TripDirectory for PgTripDirectory {
    async fn host_of(&self, trip_id: Uuid) -> Result<Option<Uuid>, DirectoryError> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT host_id FROM trips WHERE id = $1")
            .bind(trip_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;

        Ok(row.map(|(host_id,)| host_id))
    }
}
