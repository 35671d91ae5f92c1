//! In-memory implementations of the persistence traits, used by the test
//! suites. Semantics match the Postgres repositories, including the
//! single-active-record invariant and transition checking.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use tripool_core::gateway::VirtualCard;
use tripool_core::payment::{ParticipantPayment, PaymentConfiguration, PaymentStatus};
use tripool_core::registry::{DirectoryError, TripDirectory};
use tripool_core::repository::{
    ConfigStoreError, ConfigurationStore, LedgerError, ParticipantLedger,
};

#[derive(Default)]
pub struct MemoryConfigurationStore {
    configs: RwLock<HashMap<Uuid, PaymentConfiguration>>,
}

impl MemoryConfigurationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigurationStore for MemoryConfigurationStore {
    async fn create(&self, config: &PaymentConfiguration) -> Result<(), ConfigStoreError> {
        let mut configs = self.configs.write().await;
        if configs.contains_key(&config.trip_id) {
            return Err(ConfigStoreError::AlreadyExists);
        }
        configs.insert(config.trip_id, config.clone());
        Ok(())
    }

    async fn get(&self, trip_id: Uuid) -> Result<Option<PaymentConfiguration>, ConfigStoreError> {
        Ok(self.configs.read().await.get(&trip_id).cloned())
    }

    async fn attach_virtual_card(
        &self,
        trip_id: Uuid,
        card: &VirtualCard,
    ) -> Result<(), ConfigStoreError> {
        let mut configs = self.configs.write().await;
        let config = configs.get_mut(&trip_id).ok_or(ConfigStoreError::NotFound)?;
        if let Some(existing) = &config.virtual_card {
            return Err(ConfigStoreError::AlreadyAttached {
                existing: existing.clone(),
            });
        }
        config.virtual_card = Some(card.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryParticipantLedger {
    rows: RwLock<Vec<ParticipantPayment>>,
}

impl MemoryParticipantLedger {
    pub fn new() -> Self {
        Self::default()
    }

    async fn transition(
        &self,
        trip_id: Uuid,
        participant_id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
        hold_ref: Option<&str>,
    ) -> Result<(), LedgerError> {
        let mut rows = self.rows.write().await;
        let mut latest: Option<PaymentStatus> = None;
        for row in rows.iter_mut() {
            if row.trip_id != trip_id || row.participant_id != participant_id {
                continue;
            }
            if row.status == from {
                row.status = to;
                if let Some(hold_ref) = hold_ref {
                    row.hold_ref = Some(hold_ref.to_string());
                }
                return Ok(());
            }
            latest = Some(row.status);
        }
        match latest {
            Some(status) => Err(LedgerError::InvalidTransition { from: status, to }),
            None => Err(LedgerError::NotFound),
        }
    }
}

#[async_trait]
impl ParticipantLedger for MemoryParticipantLedger {
    async fn create_pending(&self, record: &ParticipantPayment) -> Result<(), LedgerError> {
        let mut rows = self.rows.write().await;
        let active = rows.iter().any(|r| {
            r.trip_id == record.trip_id
                && r.participant_id == record.participant_id
                && r.status.is_active()
        });
        if active {
            return Err(LedgerError::AlreadyExists);
        }
        rows.push(record.clone());
        Ok(())
    }

    async fn mark_authorized(
        &self,
        trip_id: Uuid,
        participant_id: Uuid,
        hold_ref: &str,
    ) -> Result<(), LedgerError> {
        self.transition(
            trip_id,
            participant_id,
            PaymentStatus::Pending,
            PaymentStatus::Authorized,
            Some(hold_ref),
        )
        .await
    }

    async fn mark_failed(&self, trip_id: Uuid, participant_id: Uuid) -> Result<(), LedgerError> {
        self.transition(
            trip_id,
            participant_id,
            PaymentStatus::Pending,
            PaymentStatus::Failed,
            None,
        )
        .await
    }

    async fn mark_voided(&self, trip_id: Uuid, participant_id: Uuid) -> Result<(), LedgerError> {
        self.transition(
            trip_id,
            participant_id,
            PaymentStatus::Authorized,
            PaymentStatus::Voided,
            None,
        )
        .await
    }

    async fn mark_captured(&self, trip_id: Uuid, participant_id: Uuid) -> Result<(), LedgerError> {
        self.transition(
            trip_id,
            participant_id,
            PaymentStatus::Authorized,
            PaymentStatus::Captured,
            None,
        )
        .await
    }

    async fn list_by_trip(&self, trip_id: Uuid) -> Result<Vec<ParticipantPayment>, LedgerError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| r.trip_id == trip_id)
            .cloned()
            .collect())
    }

    async fn find_active(
        &self,
        trip_id: Uuid,
        participant_id: Uuid,
    ) -> Result<Option<ParticipantPayment>, LedgerError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .find(|r| {
                r.trip_id == trip_id && r.participant_id == participant_id && r.status.is_active()
            })
            .cloned())
    }
}

#[derive(Default)]
pub struct MemoryTripDirectory {
    hosts: RwLock<HashMap<Uuid, Uuid>>,
}

impl MemoryTripDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, trip_id: Uuid, host_id: Uuid) {
        self.hosts.write().await.insert(trip_id, host_id);
    }
}

#[async_trait]
impl TripDirectory for MemoryTripDirectory {
    async fn host_of(&self, trip_id: Uuid) -> Result<Option<Uuid>, DirectoryError> {
        Ok(self.hosts.read().await.get(&trip_id).copied())
    }
}
