use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("trip directory unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of the trip registry, which is owned by the surrounding
/// application. Used to resolve the designated host for authorization
/// checks on remove and card issuance.
#[async_trait]
pub trait TripDirectory: Send + Sync {
    /// Host of the trip, or `None` if the trip is unknown.
    async fn host_of(&self, trip_id: Uuid) -> Result<Option<Uuid>, DirectoryError>;
}
