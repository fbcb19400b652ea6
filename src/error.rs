use thiserror::Error;

use crate::session::RecordingState;
use crate::transport::TransportPhase;

/// Errors raised while bringing a capture up.
///
/// Both variants are fatal to `start` and always leave the capture worker idle
/// with every partially acquired resource released.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Collector unreachable, closed early, or no session id within the handshake timeout
    #[error("connection error: {0}")]
    Connection(String),

    /// Audio source could not be opened or subscribed to
    #[error("capture acquisition error: {0}")]
    Acquisition(String),

    #[error("capture already active")]
    AlreadyCapturing,

    /// The capture worker task has gone away
    #[error("capture worker unavailable")]
    WorkerUnavailable,
}

/// Errors from the collector connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("handshake timed out after {0} ms")]
    HandshakeTimeout(u64),

    /// Malformed or unexpected message from the collector
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("metadata already sent for this session")]
    MetadataAlreadySent,

    #[error("transport not ready (phase: {0:?})")]
    NotReady(TransportPhase),
}

impl From<TransportError> for CaptureError {
    fn from(err: TransportError) -> Self {
        CaptureError::Connection(err.to_string())
    }
}

/// Errors from the WAV container encoder.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("no sample blocks to encode")]
    Empty,

    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("{0} channels not supported (at most 2)")]
    UnsupportedChannels(usize),

    #[error("block {index} has {found} channels, expected {expected}")]
    ChannelMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("WAV write failed: {0}")]
    Wav(#[from] hound::Error),
}

/// Errors from audio sources.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source already capturing")]
    AlreadyCapturing,

    #[error("source cannot be restarted")]
    Exhausted,

    #[error("invalid sample block: {0}")]
    InvalidBlock(String),

    #[error("failed to open {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("failed to decode audio: {0}")]
    Decode(String),

    #[error("invalid source configuration: {0}")]
    Config(String),
}

impl From<SourceError> for CaptureError {
    fn from(err: SourceError) -> Self {
        CaptureError::Acquisition(err.to_string())
    }
}

/// Errors surfaced to the command source by the recording coordinator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordingError {
    #[error("a recording is already in progress")]
    AlreadyRecording,

    /// Start or stop arrived while another transition was still running
    #[error("recording is busy ({0})")]
    Busy(RecordingState),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}
