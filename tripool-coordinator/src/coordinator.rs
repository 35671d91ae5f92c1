use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use tripool_core::gateway::{GatewayError, PaymentGateway, VirtualCard};
use tripool_core::payment::{
    ParticipantPayment, PaymentConfiguration, PaymentStatus, ThresholdView,
};
use tripool_core::registry::TripDirectory;
use tripool_core::repository::{ConfigStoreError, ConfigurationStore, ParticipantLedger};

use crate::error::CoordinatorError;
use crate::retry::{call_with_retry, RetryPolicy};

#[derive(Debug, Clone, Serialize)]
pub struct SetupOutcome {
    pub config: PaymentConfiguration,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinOutcome {
    pub hold_ref: String,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub threshold: ThresholdView,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemovalOutcome {
    pub threshold: ThresholdView,
}

#[derive(Debug, Clone, Serialize)]
pub struct CardOutcome {
    pub card: VirtualCard,
    pub funded_amount: i64,
    pub already_exists: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureFailure {
    pub participant_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureOutcome {
    pub captured: Vec<Uuid>,
    pub failed: Vec<CaptureFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub status: PaymentStatus,
    pub threshold: ThresholdView,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub configuration: PaymentConfiguration,
    pub participants: Vec<ParticipantPayment>,
    pub threshold: ThresholdView,
}

/// Serializes all payment mutations for a trip and decides when the
/// funding threshold is met.
///
/// Every mutating operation holds the trip's write lock for its full
/// duration, including the gateway round-trip: the `pending` row must be
/// visible before the external call so a concurrent join cannot miss it,
/// and a remove must not interleave with a join on the same trip. Status
/// reads take the shared side of the lock, so they run concurrently with
/// each other but always observe a settled ledger. Operations on
/// different trips never contend.
pub struct ThresholdCoordinator {
    configs: Arc<dyn ConfigurationStore>,
    ledger: Arc<dyn ParticipantLedger>,
    gateway: Arc<dyn PaymentGateway>,
    trips: Arc<dyn TripDirectory>,
    locks: DashMap<Uuid, Arc<RwLock<()>>>,
    gateway_deadline: Duration,
    retry: RetryPolicy,
}

impl ThresholdCoordinator {
    pub fn new(
        configs: Arc<dyn ConfigurationStore>,
        ledger: Arc<dyn ParticipantLedger>,
        gateway: Arc<dyn PaymentGateway>,
        trips: Arc<dyn TripDirectory>,
    ) -> Self {
        Self {
            configs,
            ledger,
            gateway,
            trips,
            locks: DashMap::new(),
            gateway_deadline: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_gateway_deadline(mut self, deadline: Duration) -> Self {
        self.gateway_deadline = deadline;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn trip_lock(&self, trip_id: Uuid) -> Arc<RwLock<()>> {
        self.locks
            .entry(trip_id)
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .value()
            .clone()
    }

    async fn require_host(&self, trip_id: Uuid, actor_id: Uuid) -> Result<(), CoordinatorError> {
        let host = self
            .trips
            .host_of(trip_id)
            .await?
            .ok_or(CoordinatorError::TripUnknown)?;
        if host != actor_id {
            return Err(CoordinatorError::NotHost);
        }
        Ok(())
    }

    async fn threshold_view(
        &self,
        config: &PaymentConfiguration,
    ) -> Result<ThresholdView, CoordinatorError> {
        let rows = self.ledger.list_by_trip(config.trip_id).await?;
        Ok(ThresholdView::compute(config.min_participants, &rows))
    }

    /// Create the trip's payment configuration. Host only. Idempotent
    /// from the caller's perspective: if one already exists, it is
    /// returned unchanged with `created: false`.
    pub async fn setup(
        &self,
        trip_id: Uuid,
        actor_id: Uuid,
        total_cost: i64,
        currency: &str,
        min_participants: i32,
    ) -> Result<SetupOutcome, CoordinatorError> {
        self.require_host(trip_id, actor_id).await?;
        let config = PaymentConfiguration::new(trip_id, total_cost, currency, min_participants)?;

        let lock = self.trip_lock(trip_id);
        let _guard = lock.write().await;

        match self.configs.create(&config).await {
            Ok(()) => {
                tracing::info!(
                    %trip_id,
                    total_cost,
                    min_participants,
                    per_seat = config.per_seat_amount,
                    "payment configuration created"
                );
                Ok(SetupOutcome {
                    config,
                    created: true,
                })
            }
            Err(ConfigStoreError::AlreadyExists) => {
                let existing = self.configs.get(trip_id).await?.ok_or_else(|| {
                    CoordinatorError::Unavailable("configuration vanished during setup".into())
                })?;
                Ok(SetupOutcome {
                    config: existing,
                    created: false,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Join the trip by preauthorizing the per-seat amount.
    ///
    /// The `pending` row is committed before the gateway call so the
    /// participant's slot is occupied for the whole round-trip. A timeout
    /// leaves the row `pending` for `reconcile_pending`; every other
    /// gateway failure resolves it to `failed`.
    pub async fn join_with_payment(
        &self,
        trip_id: Uuid,
        participant_id: Uuid,
        payment_method: Option<&str>,
    ) -> Result<JoinOutcome, CoordinatorError> {
        let lock = self.trip_lock(trip_id);
        let _guard = lock.write().await;

        let config = self
            .configs
            .get(trip_id)
            .await?
            .ok_or(CoordinatorError::ConfigurationMissing)?;

        if let Some(active) = self.ledger.find_active(trip_id, participant_id).await? {
            return Err(match active.status {
                PaymentStatus::Pending => CoordinatorError::AlreadyPending,
                _ => CoordinatorError::AlreadyAuthorized,
            });
        }

        let record = ParticipantPayment::new_pending(
            trip_id,
            participant_id,
            config.per_seat_amount,
            &config.currency,
        );
        self.ledger.create_pending(&record).await?;

        let key = record.idempotency_key();
        let placed = call_with_retry(&self.retry, self.gateway_deadline, "place_hold", || {
            self.gateway
                .place_hold(record.amount, &record.currency, payment_method, &key)
        })
        .await;

        match placed {
            Ok(auth) => {
                self.ledger
                    .mark_authorized(trip_id, participant_id, &auth.hold_ref)
                    .await?;
                let threshold = self.threshold_view(&config).await?;
                tracing::info!(
                    %trip_id,
                    %participant_id,
                    hold_ref = %auth.hold_ref,
                    current = threshold.current_participants,
                    required = threshold.min_participants,
                    met = threshold.threshold_met,
                    "participant authorized"
                );
                Ok(JoinOutcome {
                    hold_ref: auth.hold_ref,
                    client_secret: auth.client_secret,
                    amount: record.amount,
                    currency: record.currency,
                    threshold,
                })
            }
            Err(GatewayError::Timeout) => {
                tracing::warn!(
                    %trip_id,
                    %participant_id,
                    "hold placement timed out; record left pending for reconciliation"
                );
                Err(CoordinatorError::GatewayTimeout)
            }
            Err(GatewayError::Declined { reason }) => {
                self.ledger.mark_failed(trip_id, participant_id).await?;
                tracing::info!(%trip_id, %participant_id, %reason, "hold declined");
                Err(CoordinatorError::PaymentFailed { reason })
            }
            Err(GatewayError::Transient(msg)) => {
                self.ledger.mark_failed(trip_id, participant_id).await?;
                tracing::warn!(%trip_id, %participant_id, error = %msg, "hold placement failed after retries");
                Err(CoordinatorError::PaymentFailed { reason: msg })
            }
        }
    }

    /// Void a participant's authorized hold. Host only. Allowed even after
    /// a virtual card was issued; the card is retained but the threshold
    /// flag will report the trip as under-funded.
    pub async fn remove_participant(
        &self,
        trip_id: Uuid,
        participant_id: Uuid,
        actor_id: Uuid,
    ) -> Result<RemovalOutcome, CoordinatorError> {
        self.require_host(trip_id, actor_id).await?;

        let lock = self.trip_lock(trip_id);
        let _guard = lock.write().await;

        let config = self
            .configs
            .get(trip_id)
            .await?
            .ok_or(CoordinatorError::ConfigurationMissing)?;

        let rows = self.ledger.list_by_trip(trip_id).await?;
        let authorized = rows
            .iter()
            .find(|r| r.participant_id == participant_id && r.status == PaymentStatus::Authorized);

        let record = match authorized {
            Some(record) => record,
            None => {
                let last = rows
                    .iter()
                    .filter(|r| r.participant_id == participant_id)
                    .last();
                return Err(match last.map(|r| r.status) {
                    Some(PaymentStatus::Voided) | Some(PaymentStatus::Captured) => {
                        CoordinatorError::AlreadyFinal
                    }
                    _ => CoordinatorError::NothingToRemove,
                });
            }
        };

        let hold_ref = record.hold_ref.clone().ok_or_else(|| {
            tracing::error!(%trip_id, %participant_id, "authorized record has no hold reference");
            CoordinatorError::Unavailable("authorized record missing hold reference".into())
        })?;

        let voided = call_with_retry(&self.retry, self.gateway_deadline, "void_hold", || {
            self.gateway.void_hold(&hold_ref)
        })
        .await;

        match voided {
            Ok(()) => {}
            Err(GatewayError::Timeout) => {
                tracing::warn!(%trip_id, %participant_id, "void timed out; record left authorized");
                return Err(CoordinatorError::GatewayTimeout);
            }
            Err(err) => {
                tracing::error!(%trip_id, %participant_id, error = %err, "void rejected by gateway");
                return Err(CoordinatorError::Unavailable(format!(
                    "void failed: {err}"
                )));
            }
        }

        self.ledger.mark_voided(trip_id, participant_id).await?;
        let threshold = self.threshold_view(&config).await?;
        tracing::info!(
            %trip_id,
            %participant_id,
            current = threshold.current_participants,
            required = threshold.min_participants,
            met = threshold.threshold_met,
            "participant removed, hold voided"
        );
        Ok(RemovalOutcome { threshold })
    }

    /// Issue the virtual card once the threshold is met. Host only.
    /// Idempotent: repeated calls return the already-issued card and never
    /// mint a second one. The card is funded at the configured total cost,
    /// not the sum of holds.
    pub async fn issue_virtual_card(
        &self,
        trip_id: Uuid,
        actor_id: Uuid,
    ) -> Result<CardOutcome, CoordinatorError> {
        self.require_host(trip_id, actor_id).await?;

        let lock = self.trip_lock(trip_id);
        let _guard = lock.write().await;

        let config = self
            .configs
            .get(trip_id)
            .await?
            .ok_or(CoordinatorError::ConfigurationMissing)?;

        if let Some(card) = &config.virtual_card {
            return Ok(CardOutcome {
                card: card.clone(),
                funded_amount: config.total_cost,
                already_exists: true,
            });
        }

        let threshold = self.threshold_view(&config).await?;
        if !threshold.threshold_met {
            return Err(CoordinatorError::ThresholdNotMet {
                current: threshold.current_participants,
                required: threshold.min_participants,
            });
        }

        let issued = call_with_retry(
            &self.retry,
            self.gateway_deadline,
            "issue_virtual_card",
            || {
                self.gateway
                    .issue_virtual_card(config.total_cost, &config.currency)
            },
        )
        .await;

        let card = match issued {
            Ok(card) => card,
            Err(GatewayError::Timeout) => {
                tracing::error!(%trip_id, "card issuance timed out; outcome ambiguous");
                return Err(CoordinatorError::GatewayTimeout);
            }
            Err(err) => {
                tracing::error!(%trip_id, error = %err, "card issuance failed");
                return Err(CoordinatorError::Unavailable(format!(
                    "card issuance failed: {err}"
                )));
            }
        };

        match self.configs.attach_virtual_card(trip_id, &card).await {
            Ok(()) => {
                tracing::info!(%trip_id, card_ref = %card.card_ref, funded = config.total_cost, "virtual card issued");
                Ok(CardOutcome {
                    card,
                    funded_amount: config.total_cost,
                    already_exists: false,
                })
            }
            Err(ConfigStoreError::AlreadyAttached { existing }) => Ok(CardOutcome {
                card: existing,
                funded_amount: config.total_cost,
                already_exists: true,
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Capture every authorized hold after the trip is booked. Host only.
    /// Each hold is captured independently; failures stay `authorized` and
    /// can be retried by calling again.
    pub async fn capture_payments(
        &self,
        trip_id: Uuid,
        actor_id: Uuid,
    ) -> Result<CaptureOutcome, CoordinatorError> {
        self.require_host(trip_id, actor_id).await?;

        let lock = self.trip_lock(trip_id);
        let _guard = lock.write().await;

        self.configs
            .get(trip_id)
            .await?
            .ok_or(CoordinatorError::ConfigurationMissing)?;

        let rows = self.ledger.list_by_trip(trip_id).await?;
        let mut captured = Vec::new();
        let mut failed = Vec::new();

        for row in rows
            .iter()
            .filter(|r| r.status == PaymentStatus::Authorized)
        {
            let hold_ref = match row.hold_ref.as_deref() {
                Some(hold_ref) => hold_ref,
                None => {
                    tracing::error!(%trip_id, participant_id = %row.participant_id, "authorized record has no hold reference");
                    failed.push(CaptureFailure {
                        participant_id: row.participant_id,
                        error: "missing hold reference".into(),
                    });
                    continue;
                }
            };

            let result = call_with_retry(&self.retry, self.gateway_deadline, "capture_hold", || {
                self.gateway.capture_hold(hold_ref)
            })
            .await;

            match result {
                Ok(()) => {
                    self.ledger
                        .mark_captured(trip_id, row.participant_id)
                        .await?;
                    captured.push(row.participant_id);
                }
                Err(err) => {
                    tracing::warn!(%trip_id, participant_id = %row.participant_id, error = %err, "capture failed");
                    failed.push(CaptureFailure {
                        participant_id: row.participant_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            %trip_id,
            captured = captured.len(),
            failed = failed.len(),
            "capture pass complete"
        );
        Ok(CaptureOutcome { captured, failed })
    }

    /// Resolve a row stranded in `pending` by an ambiguous gateway
    /// timeout. Replays hold placement under the original idempotency key,
    /// so the gateway returns the already-placed hold or a fresh decision.
    pub async fn reconcile_pending(
        &self,
        trip_id: Uuid,
        participant_id: Uuid,
    ) -> Result<ReconcileOutcome, CoordinatorError> {
        let lock = self.trip_lock(trip_id);
        let _guard = lock.write().await;

        let config = self
            .configs
            .get(trip_id)
            .await?
            .ok_or(CoordinatorError::ConfigurationMissing)?;

        let record = match self.ledger.find_active(trip_id, participant_id).await? {
            None => return Err(CoordinatorError::NothingToReconcile),
            Some(record) if record.status == PaymentStatus::Authorized => {
                // Already resolved; nothing to replay.
                let threshold = self.threshold_view(&config).await?;
                return Ok(ReconcileOutcome {
                    status: PaymentStatus::Authorized,
                    threshold,
                });
            }
            Some(record) => record,
        };

        let key = record.idempotency_key();
        let placed = call_with_retry(&self.retry, self.gateway_deadline, "place_hold", || {
            self.gateway
                .place_hold(record.amount, &record.currency, None, &key)
        })
        .await;

        let status = match placed {
            Ok(auth) => {
                self.ledger
                    .mark_authorized(trip_id, participant_id, &auth.hold_ref)
                    .await?;
                PaymentStatus::Authorized
            }
            Err(GatewayError::Declined { reason }) => {
                self.ledger.mark_failed(trip_id, participant_id).await?;
                tracing::info!(%trip_id, %participant_id, %reason, "reconciled pending hold to failed");
                PaymentStatus::Failed
            }
            Err(GatewayError::Timeout) => {
                tracing::warn!(%trip_id, %participant_id, "reconcile timed out; record stays pending");
                return Err(CoordinatorError::GatewayTimeout);
            }
            Err(GatewayError::Transient(msg)) => {
                // Gateway unreachable; the row stays pending and the caller
                // may reconcile again.
                return Err(CoordinatorError::Unavailable(msg));
            }
        };

        let threshold = self.threshold_view(&config).await?;
        tracing::info!(
            %trip_id,
            %participant_id,
            status = %status,
            met = threshold.threshold_met,
            "pending record reconciled"
        );
        Ok(ReconcileOutcome { status, threshold })
    }

    /// Current configuration, full participant list, and a freshly
    /// computed threshold view. Reads take the shared lock: concurrent
    /// with other reads, serialized against mutations.
    pub async fn get_status(&self, trip_id: Uuid) -> Result<StatusReport, CoordinatorError> {
        let lock = self.trip_lock(trip_id);
        let _guard = lock.read().await;

        let configuration = self
            .configs
            .get(trip_id)
            .await?
            .ok_or(CoordinatorError::ConfigurationMissing)?;

        let participants = self.ledger.list_by_trip(trip_id).await?;
        let threshold = ThresholdView::compute(configuration.min_participants, &participants);

        Ok(StatusReport {
            configuration,
            participants,
            threshold,
        })
    }
}
