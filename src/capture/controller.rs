use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio::{
    encode_wav, AudioSource, ChunkConfig, EncodedChunk, SampleAccumulator, SampleBlock,
};
use crate::error::CaptureError;
use crate::transport::{RecordingMetadata, SendOutcome, TransportConfig, TransportSession};

/// Capture controller state
///
/// ```text
/// idle → acquiring → capturing → flushing → idle
/// ```
/// Errors while acquiring release everything and return to idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Idle,
    Acquiring,
    Capturing,
    Flushing,
}

/// Configuration for the capture pipeline
#[derive(Debug, Clone, Default)]
pub struct CaptureConfig {
    pub transport: TransportConfig,
    pub chunk: ChunkConfig,
}

/// Notifications from the capture side to the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// A chunk was handed to the transport
    ChunkDelivered { recording_id: Uuid, chunk_number: u32 },
    /// The source ended on its own; the capture has been torn down
    CaptureEnded {
        recording_id: Uuid,
        summary: CaptureSummary,
    },
}

/// Totals for one capture
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureSummary {
    pub session_id: Option<String>,
    pub chunks_sent: u32,
    pub chunks_dropped: u32,
    pub frames_captured: u64,
}

/// Everything acquired for one recording
struct ActiveCapture {
    recording_id: Uuid,
    source: Box<dyn AudioSource>,
    blocks: mpsc::Receiver<SampleBlock>,
    transport: TransportSession,
    accumulator: SampleAccumulator,
    sample_rate: u32,
    threshold_frames: usize,
    next_sequence: u32,
    chunks_sent: u32,
    chunks_dropped: u32,
    frames_captured: u64,
}

/// Drives one recording: source → accumulator → encoder → transport
pub struct CaptureController {
    config: CaptureConfig,
    state: CaptureState,
    active: Option<ActiveCapture>,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl CaptureController {
    pub fn new(config: CaptureConfig, events: mpsc::UnboundedSender<WorkerEvent>) -> Self {
        Self {
            config,
            state: CaptureState::Idle,
            active: None,
            events,
        }
    }

    /// Acquire the source, open the collector session, start capturing.
    ///
    /// Returns the collector-assigned session id. On any failure every
    /// partially acquired resource is released before the error is returned.
    pub async fn start(
        &mut self,
        recording_id: Uuid,
        mut source: Box<dyn AudioSource>,
        metadata: RecordingMetadata,
    ) -> Result<String, CaptureError> {
        if self.state != CaptureState::Idle {
            return Err(CaptureError::AlreadyCapturing);
        }

        self.state = CaptureState::Acquiring;
        info!("Acquiring {} source for recording {}", source.name(), recording_id);

        let blocks = match source.start().await {
            Ok(blocks) => blocks,
            Err(e) => {
                error!("Failed to acquire audio source: {}", e);
                release_source(source.as_mut()).await;
                self.state = CaptureState::Idle;
                return Err(e.into());
            }
        };

        let sample_rate = source.sample_rate();
        if sample_rate == 0 {
            drop(blocks);
            release_source(source.as_mut()).await;
            self.state = CaptureState::Idle;
            return Err(CaptureError::Acquisition(
                "source reported a zero sample rate".to_string(),
            ));
        }

        let connect = TransportSession::connect(self.config.transport.clone(), Some(metadata));
        let transport = match connect.await {
            Ok(transport) => transport,
            Err(e) => {
                error!("Failed to open collector session: {}", e);
                // Unsubscribe before releasing the source
                drop(blocks);
                release_source(source.as_mut()).await;
                self.state = CaptureState::Idle;
                return Err(e.into());
            }
        };

        let session_id = transport.session_id().to_string();
        let threshold_frames = self.config.chunk.threshold_frames(sample_rate);

        self.active = Some(ActiveCapture {
            recording_id,
            source,
            blocks,
            transport,
            accumulator: SampleAccumulator::new(),
            sample_rate,
            threshold_frames,
            next_sequence: 1,
            chunks_sent: 0,
            chunks_dropped: 0,
            frames_captured: 0,
        });
        self.state = CaptureState::Capturing;

        info!(
            "Capturing recording {} (session {}, {}Hz, {} frames per chunk)",
            recording_id, session_id, sample_rate, threshold_frames
        );

        Ok(session_id)
    }

    /// Wait for the next block from the source.
    ///
    /// `None` means the source ended (or nothing is being captured).
    pub async fn next_block(&mut self) -> Option<SampleBlock> {
        match self.active.as_mut() {
            Some(active) => active.blocks.recv().await,
            None => None,
        }
    }

    /// Buffer one block; encode and send a chunk once a chunk's worth has accumulated
    pub async fn handle_block(&mut self, block: SampleBlock) {
        if self.state != CaptureState::Capturing {
            debug!("Ignoring block while {:?}", self.state);
            return;
        }
        let Some(active) = self.active.as_mut() else {
            return;
        };

        active.frames_captured += block.frames() as u64;
        active.accumulator.push(block);

        if active.accumulator.is_full(active.threshold_frames) {
            active.flush_chunk(&self.events).await;
        }
    }

    /// Stop capturing: unsubscribe, send the remainder as a final chunk,
    /// close the collector session, release the source.
    ///
    /// A no-op when idle.
    pub async fn stop(&mut self) -> CaptureSummary {
        let Some(mut active) = self.active.take() else {
            self.state = CaptureState::Idle;
            return CaptureSummary::default();
        };

        self.state = CaptureState::Flushing;
        info!("Stopping recording {}", active.recording_id);

        if let Err(e) = active.source.stop().await {
            warn!("Failed to stop {} source cleanly: {}", active.source.name(), e);
        }

        // Blocks already queued by the producer are captured audio too
        active.blocks.close();
        while let Ok(block) = active.blocks.try_recv() {
            active.frames_captured += block.frames() as u64;
            active.accumulator.push(block);
            if active.accumulator.is_full(active.threshold_frames) {
                active.flush_chunk(&self.events).await;
            }
        }

        if !active.accumulator.is_empty() {
            debug!(
                "Sending final chunk with {} remaining frames",
                active.accumulator.frames()
            );
            active.flush_chunk(&self.events).await;
        }

        active.transport.close(true).await;

        let summary = active.summary();
        self.state = CaptureState::Idle;

        info!(
            "Recording {} stopped: {} chunks sent, {} dropped, {:.1}s captured",
            active.recording_id,
            summary.chunks_sent,
            summary.chunks_dropped,
            summary.frames_captured as f64 / active.sample_rate as f64
        );

        summary
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.state == CaptureState::Capturing
    }

    pub fn recording_id(&self) -> Option<Uuid> {
        self.active.as_ref().map(|active| active.recording_id)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.transport.session_id())
    }
}

impl ActiveCapture {
    /// Drain, encode and send whatever has accumulated.
    ///
    /// The buffer is never retained: a failed encode or send drops the audio.
    async fn flush_chunk(&mut self, events: &mpsc::UnboundedSender<WorkerEvent>) {
        let blocks = self.accumulator.drain();
        if blocks.is_empty() {
            return;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let frames: usize = blocks.iter().map(SampleBlock::frames).sum();

        let bytes = match encode_wav(&blocks, self.sample_rate) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to encode chunk #{}: {}", sequence, e);
                self.chunks_dropped += 1;
                return;
            }
        };

        let chunk = EncodedChunk {
            sequence,
            bytes,
            frames,
        };

        match self.transport.send_chunk(&chunk).await {
            SendOutcome::Sent { .. } => {
                self.chunks_sent += 1;
                debug!("Chunk #{} sent ({} bytes)", sequence, chunk.len());
                let event = WorkerEvent::ChunkDelivered {
                    recording_id: self.recording_id,
                    chunk_number: sequence,
                };
                if events.send(event).is_err() {
                    debug!("Coordinator no longer listening for chunk events");
                }
            }
            SendOutcome::Dropped { reason } => {
                self.chunks_dropped += 1;
                warn!("Chunk #{} dropped: {}", sequence, reason);
            }
        }
    }

    fn summary(&self) -> CaptureSummary {
        CaptureSummary {
            session_id: Some(self.transport.session_id().to_string()),
            chunks_sent: self.chunks_sent,
            chunks_dropped: self.chunks_dropped,
            frames_captured: self.frames_captured,
        }
    }
}

async fn release_source(source: &mut dyn AudioSource) {
    if let Err(e) = source.stop().await {
        warn!("Failed to release {} source: {}", source.name(), e);
    }
}
