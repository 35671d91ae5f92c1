use async_trait::async_trait;
use uuid::Uuid;

use crate::gateway::VirtualCard;
use crate::payment::{ParticipantPayment, PaymentConfiguration, PaymentStatus};

#[derive(Debug, thiserror::Error)]
pub enum ConfigStoreError {
    #[error("payment configuration already exists for this trip")]
    AlreadyExists,
    #[error("payment configuration not found")]
    NotFound,
    #[error("virtual card already attached")]
    AlreadyAttached { existing: VirtualCard },
    #[error("configuration store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("participant already has an active payment record")]
    AlreadyExists,
    #[error("no payment record for this participant")]
    NotFound,
    #[error("invalid payment transition from {from} to {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    #[error("participant ledger unavailable: {0}")]
    Unavailable(String),
}

/// One configuration per trip. Created once; the only mutation is the
/// one-way attachment of the issued virtual card.
#[async_trait]
pub trait ConfigurationStore: Send + Sync {
    /// Persist a new configuration. `AlreadyExists` if the trip already has
    /// one; callers treat that as success and fetch the existing row.
    async fn create(&self, config: &PaymentConfiguration) -> Result<(), ConfigStoreError>;

    async fn get(&self, trip_id: Uuid) -> Result<Option<PaymentConfiguration>, ConfigStoreError>;

    /// Attach the issued card. A second attach returns `AlreadyAttached`
    /// with the existing card, never a silent overwrite.
    async fn attach_virtual_card(
        &self,
        trip_id: Uuid,
        card: &VirtualCard,
    ) -> Result<(), ConfigStoreError>;
}

/// One payment record per attempt. Terminal rows are retained for audit;
/// at most one non-terminal row may exist per (trip, participant) pair.
#[async_trait]
pub trait ParticipantLedger: Send + Sync {
    /// Insert a fresh `pending` row. `AlreadyExists` if the participant
    /// already holds an active (pending or authorized) record.
    async fn create_pending(&self, record: &ParticipantPayment) -> Result<(), LedgerError>;

    /// `pending -> authorized`, recording the gateway hold reference.
    async fn mark_authorized(
        &self,
        trip_id: Uuid,
        participant_id: Uuid,
        hold_ref: &str,
    ) -> Result<(), LedgerError>;

    /// `pending -> failed`.
    async fn mark_failed(&self, trip_id: Uuid, participant_id: Uuid) -> Result<(), LedgerError>;

    /// `authorized -> voided`.
    async fn mark_voided(&self, trip_id: Uuid, participant_id: Uuid) -> Result<(), LedgerError>;

    /// `authorized -> captured`.
    async fn mark_captured(&self, trip_id: Uuid, participant_id: Uuid) -> Result<(), LedgerError>;

    /// Every record for the trip, oldest first. A fresh read each call.
    async fn list_by_trip(&self, trip_id: Uuid) -> Result<Vec<ParticipantPayment>, LedgerError>;

    /// The participant's single non-terminal record, if any.
    async fn find_active(
        &self,
        trip_id: Uuid,
        participant_id: Uuid,
    ) -> Result<Option<ParticipantPayment>, LedgerError>;
}
