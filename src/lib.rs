pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod transport;

pub use audio::{
    encode_wav, AudioSource, AudioSourceConfig, AudioSourceFactory, ChannelSource, ChunkConfig,
    EncodedChunk, FileSource, SampleAccumulator, SampleBlock, SourceKind, ToneSource,
};
pub use capture::{CaptureConfig, CaptureController, CaptureSummary, CaptureWorker, WorkerEvent};
pub use config::Config;
pub use error::{CaptureError, EncodeError, RecordingError, SourceError, TransportError};
pub use http::{create_router, AppState};
pub use session::{
    RecordingCoordinator, RecordingState, RecordingStatus, RecordingTarget, SessionConfig,
};
pub use transport::{RecordingMetadata, SendOutcome, TransportConfig, TransportSession};
