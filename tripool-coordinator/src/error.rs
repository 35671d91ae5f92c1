use tripool_core::payment::PaymentStatus;
use tripool_core::registry::DirectoryError;
use tripool_core::repository::{ConfigStoreError, LedgerError};
use tripool_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("payment configuration already exists for this trip")]
    AlreadyExists,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("payment configuration not found for this trip")]
    ConfigurationMissing,

    #[error("trip not found")]
    TripUnknown,

    #[error("only the trip host may perform this action")]
    NotHost,

    #[error("participant already has a pending payment")]
    AlreadyPending,

    #[error("participant has already authorized a payment")]
    AlreadyAuthorized,

    #[error("participant has no payment to remove")]
    NothingToRemove,

    #[error("participant payment is already finalized")]
    AlreadyFinal,

    #[error("participant has no pending payment to reconcile")]
    NothingToReconcile,

    #[error("funding threshold not met: {current} of {required} participants")]
    ThresholdNotMet { current: u32, required: u32 },

    #[error("payment failed: {reason}")]
    PaymentFailed { reason: String },

    /// The gateway call did not resolve; the ledger row is left as-is
    /// until reconciled. Never auto-resolved to `failed`.
    #[error("payment gateway timed out; outcome pending reconciliation")]
    GatewayTimeout,

    /// A transition the state machine forbids. Should not occur under the
    /// per-trip critical section; logged loudly where it surfaces.
    #[error("invalid payment transition from {from} to {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl From<ConfigStoreError> for CoordinatorError {
    fn from(err: ConfigStoreError) -> Self {
        match err {
            ConfigStoreError::AlreadyExists => CoordinatorError::AlreadyExists,
            ConfigStoreError::NotFound => CoordinatorError::ConfigurationMissing,
            ConfigStoreError::AlreadyAttached { .. } => CoordinatorError::AlreadyExists,
            ConfigStoreError::Unavailable(msg) => CoordinatorError::Unavailable(msg),
        }
    }
}

impl From<LedgerError> for CoordinatorError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AlreadyExists => CoordinatorError::AlreadyPending,
            LedgerError::NotFound => CoordinatorError::NothingToRemove,
            LedgerError::InvalidTransition { from, to } => {
                tracing::error!(%from, %to, "ledger rejected a transition under the trip lock");
                CoordinatorError::InvalidTransition { from, to }
            }
            LedgerError::Unavailable(msg) => CoordinatorError::Unavailable(msg),
        }
    }
}

impl From<DirectoryError> for CoordinatorError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Unavailable(msg) => CoordinatorError::Unavailable(msg),
        }
    }
}

impl From<CoreError> for CoordinatorError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(msg) => CoordinatorError::InvalidArgument(msg),
            CoreError::InternalError(msg) => CoordinatorError::Unavailable(msg),
        }
    }
}
