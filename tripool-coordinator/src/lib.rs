pub mod coordinator;
pub mod error;
pub mod mock;
pub mod retry;

pub use coordinator::{
    CaptureOutcome, CardOutcome, JoinOutcome, ReconcileOutcome, RemovalOutcome, SetupOutcome,
    StatusReport, ThresholdCoordinator,
};
pub use error::CoordinatorError;
pub use mock::MockGateway;

#[cfg(test)]
mod tests;
