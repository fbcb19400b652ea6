//! Capture pipeline
//!
//! The `CaptureController` turns source blocks into encoded chunks on a
//! collector session. It lives inside the `CaptureWorker` task and is only
//! reachable through typed requests.

mod controller;
mod worker;

pub use controller::{CaptureConfig, CaptureController, CaptureState, CaptureSummary, WorkerEvent};
pub use worker::{CaptureWorker, WorkerRequest};
