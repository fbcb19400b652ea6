use crate::session::RecordingCoordinator;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The process-wide recording coordinator
    pub coordinator: RecordingCoordinator,
}

impl AppState {
    pub fn new(coordinator: RecordingCoordinator) -> Self {
        Self { coordinator }
    }
}
