//! Collector connection
//!
//! JSON messages over a WebSocket:
//! - client → server: `metadata` (once, after the handshake), `audio_chunk`
//! - server → client: `session_started` (required first), `chunk_received`, `error`

pub mod messages;
pub mod session;

pub use messages::{BrowserInfo, ClientMessage, RecordingMetadata, ServerMessage};
pub use session::{SendOutcome, TransportConfig, TransportPhase, TransportSession};
