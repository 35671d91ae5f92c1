use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gateway::VirtualCard;
use crate::money;
use crate::{CoreError, CoreResult};

/// Lifecycle of a single participant payment attempt.
///
/// `pending -> {authorized, failed}`, `authorized -> {voided, captured}`.
/// `failed`, `voided` and `captured` are terminal for the record; a retry
/// after failure or removal creates a fresh record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Authorized,
    Captured,
    Voided,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::Captured => "captured",
            PaymentStatus::Voided => "voided",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Captured | PaymentStatus::Voided | PaymentStatus::Failed
        )
    }

    /// Rows in these states occupy the participant's single active slot.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Rows counted by the threshold: money is committed.
    pub fn counts_toward_threshold(&self) -> bool {
        matches!(self, PaymentStatus::Authorized | PaymentStatus::Captured)
    }

    /// Valid edges of the state machine. No transition skips a state.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Authorized)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
                | (PaymentStatus::Authorized, PaymentStatus::Voided)
                | (PaymentStatus::Authorized, PaymentStatus::Captured)
        )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "authorized" => Ok(PaymentStatus::Authorized),
            "captured" => Ok(PaymentStatus::Captured),
            "voided" => Ok(PaymentStatus::Voided),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(CoreError::ValidationError(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

/// Per-trip payment configuration, created once by the host.
///
/// Mutated only to attach the virtual card, which is a one-way transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfiguration {
    pub trip_id: Uuid,
    pub total_cost: i64,
    pub currency: String,
    pub min_participants: i32,
    pub per_seat_amount: i64,
    pub virtual_card: Option<VirtualCard>,
    pub created_at: DateTime<Utc>,
}

impl PaymentConfiguration {
    pub fn new(
        trip_id: Uuid,
        total_cost: i64,
        currency: &str,
        min_participants: i32,
    ) -> CoreResult<Self> {
        if total_cost <= 0 {
            return Err(CoreError::ValidationError(
                "total_cost must be positive".to_string(),
            ));
        }
        if min_participants < 2 {
            return Err(CoreError::ValidationError(
                "min_participants must be at least 2".to_string(),
            ));
        }
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CoreError::ValidationError(format!(
                "currency must be a 3-letter tag, got {currency:?}"
            )));
        }

        Ok(Self {
            trip_id,
            total_cost,
            currency: currency.to_ascii_lowercase(),
            min_participants,
            per_seat_amount: money::per_seat_amount(total_cost, min_participants),
            virtual_card: None,
            created_at: Utc::now(),
        })
    }
}

/// One payment attempt for a (trip, participant) pair.
///
/// Amount and currency are copied from the configuration at creation time
/// and never change afterwards; a later configuration change does not
/// retroactively alter existing rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantPayment {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub participant_id: Uuid,
    pub status: PaymentStatus,
    pub hold_ref: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl ParticipantPayment {
    pub fn new_pending(trip_id: Uuid, participant_id: Uuid, amount: i64, currency: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip_id,
            participant_id,
            status: PaymentStatus::Pending,
            hold_ref: None,
            amount,
            currency: currency.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Key the gateway uses to deduplicate hold placement. Derived from the
    /// row id so that replaying the call for a stranded `pending` row hits
    /// the same gateway-side operation.
    pub fn idempotency_key(&self) -> String {
        format!("hold_{}", self.id.simple())
    }
}

/// Funding state of a trip, derived from the ledger. Never persisted or
/// cached; always recomputed from a fresh read.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThresholdView {
    pub current_participants: u32,
    pub min_participants: u32,
    pub threshold_met: bool,
}

impl ThresholdView {
    pub fn compute(min_participants: i32, rows: &[ParticipantPayment]) -> Self {
        let current = rows
            .iter()
            .filter(|r| r.status.counts_toward_threshold())
            .count() as u32;
        let min = min_participants.max(0) as u32;
        Self {
            current_participants: current,
            min_participants: min,
            threshold_met: current >= min,
        }
    }
}
