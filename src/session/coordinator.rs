use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::SessionConfig;
use super::stats::{RecordingSession, RecordingState, RecordingStatus};
use crate::audio::{AudioSource, AudioSourceFactory, SourceKind};
use crate::capture::{CaptureSummary, CaptureWorker, WorkerEvent};
use crate::error::{CaptureError, RecordingError, SourceError};
use crate::transport::RecordingMetadata;

/// What to record and how to describe it to the collector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingTarget {
    pub source: SourceKind,

    #[serde(default)]
    pub tab_url: Option<String>,

    #[serde(default)]
    pub tab_title: Option<String>,

    #[serde(default)]
    pub tab_favicon: Option<String>,
}

impl RecordingTarget {
    pub fn new(source: SourceKind) -> Self {
        Self {
            source,
            tab_url: None,
            tab_title: None,
            tab_favicon: None,
        }
    }

    pub fn metadata(&self) -> RecordingMetadata {
        RecordingMetadata::new(
            self.tab_url.clone(),
            self.tab_title.clone(),
            self.tab_favicon.clone(),
        )
    }
}

/// Owns the one-recording-at-a-time lifecycle.
///
/// ```text
/// idle → starting → recording → stopping → idle
/// ```
///
/// Cheap to clone; every clone talks to the same capture worker. Start and
/// stop run on their own task, so a caller that gives up mid-way (an HTTP
/// client disconnecting, say) never leaves the state stuck in a transition.
#[derive(Clone)]
pub struct RecordingCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    config: SessionConfig,
    worker: CaptureWorker,
    session: RwLock<RecordingSession>,
}

impl RecordingCoordinator {
    /// Create a coordinator and spawn its capture worker
    pub fn new(config: SessionConfig) -> Self {
        let (worker, events, _worker_task) = CaptureWorker::spawn(config.capture_config());

        let inner = Arc::new(Inner {
            config,
            worker,
            session: RwLock::new(RecordingSession::default()),
        });

        tokio::spawn(pump_events(Arc::downgrade(&inner), events));

        Self { inner }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Start recording from the source named by `target`.
    ///
    /// Resolves with the collector-assigned session id.
    pub async fn start(&self, target: RecordingTarget) -> Result<String, RecordingError> {
        let metadata = target.metadata();
        let source = AudioSourceFactory::create(target.source, self.inner.config.audio.clone());
        self.begin(source, metadata).await
    }

    /// Start recording from an already constructed source
    pub async fn start_with_source(
        &self,
        source: Box<dyn AudioSource>,
        metadata: RecordingMetadata,
    ) -> Result<String, RecordingError> {
        self.begin(Ok(source), metadata).await
    }

    /// Stop the current recording.
    ///
    /// Stopping while idle is a no-op and returns an empty summary.
    pub async fn stop(&self) -> Result<CaptureSummary, RecordingError> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.stop().await })
            .await
            .map_err(|_| RecordingError::Capture(CaptureError::WorkerUnavailable))?
    }

    pub async fn status(&self) -> RecordingStatus {
        let session = self.inner.session.read().await;
        RecordingStatus::from_session(&session, Utc::now())
    }

    pub async fn state(&self) -> RecordingState {
        self.inner.session.read().await.state
    }

    pub async fn is_recording(&self) -> bool {
        self.state().await == RecordingState::Recording
    }

    async fn begin(
        &self,
        source: Result<Box<dyn AudioSource>, SourceError>,
        metadata: RecordingMetadata,
    ) -> Result<String, RecordingError> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.start(source, metadata).await })
            .await
            .map_err(|_| RecordingError::Capture(CaptureError::WorkerUnavailable))?
    }
}

impl Inner {
    async fn start(
        &self,
        source: Result<Box<dyn AudioSource>, SourceError>,
        metadata: RecordingMetadata,
    ) -> Result<String, RecordingError> {
        let recording_id = Uuid::new_v4();

        {
            let mut session = self.session.write().await;
            if session.state != RecordingState::Idle {
                warn!("Start requested while {}", session.state);
                return Err(RecordingError::AlreadyRecording);
            }

            *session = RecordingSession {
                state: RecordingState::Starting,
                recording_id: Some(recording_id),
                ..RecordingSession::default()
            };
        }

        info!("Starting recording {}", recording_id);

        let result = match source {
            Ok(source) => self.worker.start(recording_id, source, metadata).await,
            Err(e) => Err(CaptureError::from(e)),
        };

        let mut session = self.session.write().await;
        match result {
            Ok(session_id) => {
                if session.ended_early {
                    info!("Recording {} ended before start completed", recording_id);
                    *session = RecordingSession::default();
                    return Ok(session_id);
                }

                session.state = RecordingState::Recording;
                session.session_id = Some(session_id.clone());
                session.started_at = Some(Utc::now());
                info!("Recording {} started (session {})", recording_id, session_id);
                Ok(session_id)
            }
            Err(e) => {
                error!("Failed to start recording {}: {}", recording_id, e);
                *session = RecordingSession::default();
                Err(e.into())
            }
        }
    }

    async fn stop(&self) -> Result<CaptureSummary, RecordingError> {
        {
            let mut session = self.session.write().await;
            match session.state {
                RecordingState::Idle => {
                    debug!("Stop requested while idle");
                    return Ok(CaptureSummary::default());
                }
                RecordingState::Starting | RecordingState::Stopping => {
                    warn!("Stop requested while {}", session.state);
                    return Err(RecordingError::Busy(session.state));
                }
                RecordingState::Recording => session.state = RecordingState::Stopping,
            }
        }

        let result = self.worker.stop().await;

        // Back to idle whether or not the worker shut down cleanly
        let mut session = self.session.write().await;
        let chunk_count = session.chunk_count;
        let recording_id = session.recording_id;
        *session = RecordingSession::default();
        drop(session);

        match result {
            Ok(summary) => {
                info!(
                    "Recording {:?} stopped after {} chunks",
                    recording_id, chunk_count
                );
                Ok(summary)
            }
            Err(e) => {
                error!("Capture worker failed during stop: {}", e);
                Err(e.into())
            }
        }
    }

    async fn apply_event(&self, event: WorkerEvent) {
        let mut session = self.session.write().await;

        match event {
            WorkerEvent::ChunkDelivered {
                recording_id,
                chunk_number,
            } => {
                if session.recording_id != Some(recording_id) {
                    debug!("Ignoring chunk #{} from a finished recording", chunk_number);
                    return;
                }
                session.chunk_count += 1;
                debug!(
                    "Chunk #{} delivered ({} total)",
                    chunk_number, session.chunk_count
                );
            }
            WorkerEvent::CaptureEnded {
                recording_id,
                summary,
            } => {
                if session.recording_id != Some(recording_id) {
                    return;
                }
                match session.state {
                    RecordingState::Starting => session.ended_early = true,
                    RecordingState::Recording => {
                        info!(
                            "Recording {} ended with its source ({} chunks sent, {} dropped)",
                            recording_id, summary.chunks_sent, summary.chunks_dropped
                        );
                        *session = RecordingSession::default();
                    }
                    // A stop in flight resets the session itself
                    RecordingState::Stopping | RecordingState::Idle => {}
                }
            }
        }
    }
}

async fn pump_events(inner: Weak<Inner>, mut events: mpsc::UnboundedReceiver<WorkerEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.apply_event(event).await;
    }
    debug!("Worker event stream closed");
}
