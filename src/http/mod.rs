//! HTTP command surface
//!
//! This module exposes the recording coordinator over JSON:
//! - POST /recording/start - Start recording a source
//! - POST /recording/stop - Stop the current recording
//! - GET /recording/status - Query the recording state
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{CommandResponse, StartRecordingRequest};
pub use routes::create_router;
pub use state::AppState;
