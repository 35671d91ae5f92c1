use std::sync::Arc;

use tripool_coordinator::ThresholdCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<ThresholdCoordinator>,
}
