//! Recording session management
//!
//! This module provides the `RecordingCoordinator`, which owns:
//! - The idle/starting/recording/stopping lifecycle
//! - The single active recording and its delivered-chunk count
//! - Requests to the capture worker
//! - Status snapshots for the command surface

mod config;
mod coordinator;
mod stats;

pub use config::SessionConfig;
pub use coordinator::{RecordingCoordinator, RecordingTarget};
pub use stats::{RecordingSession, RecordingState, RecordingStatus};
