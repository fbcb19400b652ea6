use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::controller::{CaptureConfig, CaptureController, CaptureSummary, WorkerEvent};
use crate::audio::AudioSource;
use crate::error::CaptureError;
use crate::transport::RecordingMetadata;

/// Requests accepted by the capture worker
pub enum WorkerRequest {
    Start {
        recording_id: Uuid,
        source: Box<dyn AudioSource>,
        metadata: RecordingMetadata,
        reply: oneshot::Sender<Result<String, CaptureError>>,
    },
    Stop {
        reply: oneshot::Sender<CaptureSummary>,
    },
}

/// Handle to the capture worker task.
///
/// The worker owns the capture controller; the only way in is a request, the
/// only way out is a reply or a `WorkerEvent`.
#[derive(Clone)]
pub struct CaptureWorker {
    requests: mpsc::Sender<WorkerRequest>,
}

impl CaptureWorker {
    /// Spawn the worker task
    pub fn spawn(
        config: CaptureConfig,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>, JoinHandle<()>) {
        let (request_tx, request_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let controller = CaptureController::new(config, event_tx.clone());
        let handle = tokio::spawn(run(controller, request_rx, event_tx));

        (
            Self {
                requests: request_tx,
            },
            event_rx,
            handle,
        )
    }

    /// Start a capture; resolves with the collector session id
    pub async fn start(
        &self,
        recording_id: Uuid,
        source: Box<dyn AudioSource>,
        metadata: RecordingMetadata,
    ) -> Result<String, CaptureError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(WorkerRequest::Start {
                recording_id,
                source,
                metadata,
                reply,
            })
            .await
            .map_err(|_| CaptureError::WorkerUnavailable)?;

        response.await.map_err(|_| CaptureError::WorkerUnavailable)?
    }

    /// Stop the current capture (no-op when idle)
    pub async fn stop(&self) -> Result<CaptureSummary, CaptureError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(WorkerRequest::Stop { reply })
            .await
            .map_err(|_| CaptureError::WorkerUnavailable)?;

        response.await.map_err(|_| CaptureError::WorkerUnavailable)
    }
}

/// Worker loop.
///
/// Blocks are handled inline between requests, so a stop request always sees
/// the previous chunk's encode+send settled before the final drain.
async fn run(
    mut controller: CaptureController,
    mut requests: mpsc::Receiver<WorkerRequest>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    info!("Capture worker started");

    loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(WorkerRequest::Start { recording_id, source, metadata, reply }) => {
                    let result = controller.start(recording_id, source, metadata).await;
                    if reply.send(result).is_err() {
                        // Requester went away; do not leave an orphaned capture running
                        warn!("Start requester dropped, stopping recording {}", recording_id);
                        controller.stop().await;
                    }
                }
                Some(WorkerRequest::Stop { reply }) => {
                    let summary = controller.stop().await;
                    let _ = reply.send(summary);
                }
                None => {
                    debug!("All worker handles dropped");
                    controller.stop().await;
                    break;
                }
            },
            block = controller.next_block(), if controller.is_capturing() => match block {
                Some(block) => controller.handle_block(block).await,
                None => {
                    let recording_id = controller.recording_id();
                    warn!("Audio source ended, finishing recording");
                    let summary = controller.stop().await;
                    if let Some(recording_id) = recording_id {
                        let _ = events.send(WorkerEvent::CaptureEnded { recording_id, summary });
                    }
                }
            },
        }
    }

    info!("Capture worker stopped");
}
