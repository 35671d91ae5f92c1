use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Confirmation data for a placed hold. `client_secret` is handed to the
/// participant's client so it can confirm the payment method with the
/// gateway directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldAuthorization {
    pub hold_ref: String,
    pub client_secret: Option<String>,
}

/// A spendable virtual card issued against the trip's full cost.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VirtualCard {
    pub card_ref: String,
    pub last_four: String,
    pub brand: String,
    pub exp_month: i32,
    pub exp_year: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Permanent decline; surfaced to the participant as-is.
    #[error("payment declined: {reason}")]
    Declined { reason: String },
    /// The call did not resolve in time. The outcome is ambiguous: the
    /// gateway may have performed the operation.
    #[error("gateway call timed out")]
    Timeout,
    /// Network failure or gateway 5xx; safe to retry with backoff.
    #[error("transient gateway error: {0}")]
    Transient(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

/// The four primitive operations this service depends on. The gateway is a
/// remote system with its own failure modes; callers must treat every
/// method as blocking external I/O.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Place a preauthorization hold. `idempotency_key` deduplicates
    /// replays of the same ledger row, so a retry after an ambiguous
    /// timeout returns the original outcome instead of a second hold.
    async fn place_hold(
        &self,
        amount: i64,
        currency: &str,
        payment_method: Option<&str>,
        idempotency_key: &str,
    ) -> Result<HoldAuthorization, GatewayError>;

    /// Release a hold without charging it.
    async fn void_hold(&self, hold_ref: &str) -> Result<(), GatewayError>;

    /// Charge a previously authorized hold.
    async fn capture_hold(&self, hold_ref: &str) -> Result<(), GatewayError>;

    /// Issue a virtual card funded up to `funded_amount`.
    async fn issue_virtual_card(
        &self,
        funded_amount: i64,
        currency: &str,
    ) -> Result<VirtualCard, GatewayError>;
}
