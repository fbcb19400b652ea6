use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::messages::{ClientMessage, RecordingMetadata, ServerMessage};
use crate::audio::EncodedChunk;
use crate::error::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Connection phase
///
/// ```text
/// disconnected → connecting → awaiting-session → ready → closing → disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportPhase {
    Disconnected,
    Connecting,
    AwaitingSession,
    Ready,
    Closing,
}

/// Collector connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// WebSocket URL of the collector
    pub url: String,
    /// Maximum time to open the connection and receive a session id
    pub handshake_timeout_ms: u64,
    /// Maximum time to wait for the peer during a graceful close
    pub close_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8001/ws/audio/".to_string(),
            handshake_timeout_ms: 5000,
            close_timeout_ms: 2000,
        }
    }
}

/// Result of handing a chunk to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { bytes: usize },
    /// The chunk is gone for good; drops are never retried
    Dropped { reason: TransportError },
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent { .. })
    }
}

/// A single logical connection to the collector.
///
/// `connect` only returns once the collector has assigned a session id, so a
/// live `TransportSession` has always completed the handshake.
pub struct TransportSession {
    config: TransportConfig,
    session_id: String,
    sink: Option<WsSink>,
    phase: Arc<watch::Sender<TransportPhase>>,
    reader: Option<JoinHandle<()>>,
    acknowledged: Arc<AtomicU32>,
    metadata_sent: bool,
}

impl TransportSession {
    /// Connect, wait for `session_started`, then flush any queued metadata.
    ///
    /// Connection failures, an early close, a collector error and a missing
    /// session id within `handshake_timeout_ms` all fail the connect. No
    /// retries happen here.
    pub async fn connect(
        config: TransportConfig,
        metadata: Option<RecordingMetadata>,
    ) -> Result<Self, TransportError> {
        let (phase_tx, _) = watch::channel(TransportPhase::Connecting);
        let phase = Arc::new(phase_tx);
        let timeout_ms = config.handshake_timeout_ms;

        info!("Connecting to collector at {}", config.url);

        let handshake = open_and_handshake(&config.url, &phase);
        let (sink, stream, session_id) =
            match tokio::time::timeout(Duration::from_millis(timeout_ms), handshake).await {
                Ok(Ok(parts)) => parts,
                Ok(Err(e)) => {
                    phase.send_replace(TransportPhase::Disconnected);
                    warn!("Collector handshake failed: {}", e);
                    return Err(e);
                }
                Err(_) => {
                    phase.send_replace(TransportPhase::Disconnected);
                    warn!("No session id from collector within {} ms", timeout_ms);
                    return Err(TransportError::HandshakeTimeout(timeout_ms));
                }
            };

        phase.send_replace(TransportPhase::Ready);
        info!("Collector session started: {}", session_id);

        let acknowledged = Arc::new(AtomicU32::new(0));
        let reader = tokio::spawn(read_loop(
            stream,
            Arc::clone(&phase),
            Arc::clone(&acknowledged),
            session_id.clone(),
        ));

        let mut session = Self {
            config,
            session_id,
            sink: Some(sink),
            phase,
            reader: Some(reader),
            acknowledged,
            metadata_sent: false,
        };

        if let Some(metadata) = metadata {
            if let Err(e) = session.send_metadata(metadata).await {
                warn!("Failed to send metadata: {}", e);
            }
        }

        Ok(session)
    }

    /// Send the recording metadata; allowed once per session
    pub async fn send_metadata(&mut self, metadata: RecordingMetadata) -> Result<(), TransportError> {
        if self.metadata_sent {
            return Err(TransportError::MetadataAlreadySent);
        }
        self.ensure_ready()?;

        self.send_message(&ClientMessage::Metadata { metadata }).await?;
        self.metadata_sent = true;

        info!("Metadata sent for session {}", self.session_id);

        Ok(())
    }

    /// Send one encoded chunk.
    ///
    /// Never fails: outside `ready`, or when the write fails, the chunk is
    /// dropped and the outcome says so.
    pub async fn send_chunk(&mut self, chunk: &EncodedChunk) -> SendOutcome {
        if let Err(reason) = self.ensure_ready() {
            warn!("Dropping chunk #{}: {}", chunk.sequence, reason);
            return SendOutcome::Dropped { reason };
        }

        let message = ClientMessage::AudioChunk {
            chunk_number: chunk.sequence,
            audio_data: base64::engine::general_purpose::STANDARD.encode(&chunk.bytes),
        };

        match self.send_message(&message).await {
            Ok(bytes) => {
                debug!(
                    "Sent chunk #{} ({} WAV bytes, {} frames)",
                    chunk.sequence,
                    chunk.len(),
                    chunk.frames
                );
                SendOutcome::Sent { bytes }
            }
            Err(reason) => {
                warn!("Failed to send chunk #{}: {}", chunk.sequence, reason);
                self.phase.send_replace(TransportPhase::Disconnected);
                SendOutcome::Dropped { reason }
            }
        }
    }

    /// Close the connection; always ends `disconnected`.
    ///
    /// A graceful close sends a normal-closure frame and waits (bounded by
    /// `close_timeout_ms`) for the collector to finish the closing handshake.
    pub async fn close(&mut self, graceful: bool) {
        let phase = self.phase();
        self.phase.send_replace(TransportPhase::Closing);

        if let Some(mut sink) = self.sink.take() {
            if graceful && phase == TransportPhase::Ready {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "Recording completed".into(),
                };
                if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                    debug!("Close frame not delivered: {}", e);
                }
            }
        }

        if let Some(mut reader) = self.reader.take() {
            if graceful && phase == TransportPhase::Ready {
                let wait = Duration::from_millis(self.config.close_timeout_ms);
                if tokio::time::timeout(wait, &mut reader).await.is_err() {
                    warn!(
                        "Collector did not finish closing session {} within {} ms",
                        self.session_id, self.config.close_timeout_ms
                    );
                }
            }
            reader.abort();
        }

        self.phase.send_replace(TransportPhase::Disconnected);

        info!(
            "Collector session {} closed ({} chunks acknowledged)",
            self.session_id,
            self.acknowledged_chunks()
        );
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> TransportPhase {
        *self.phase.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.phase() == TransportPhase::Ready
    }

    /// Watch phase changes (e.g. the collector dropping the connection)
    pub fn subscribe_phase(&self) -> watch::Receiver<TransportPhase> {
        self.phase.subscribe()
    }

    /// Chunks the collector has acknowledged so far (advisory)
    pub fn acknowledged_chunks(&self) -> u32 {
        self.acknowledged.load(Ordering::SeqCst)
    }

    pub fn metadata_sent(&self) -> bool {
        self.metadata_sent
    }

    fn ensure_ready(&self) -> Result<(), TransportError> {
        match self.phase() {
            TransportPhase::Ready if self.sink.is_some() => Ok(()),
            phase => Err(TransportError::NotReady(phase)),
        }
    }

    async fn send_message(&mut self, message: &ClientMessage) -> Result<usize, TransportError> {
        let phase = self.phase();
        let sink = self
            .sink
            .as_mut()
            .ok_or(TransportError::NotReady(phase))?;

        let json = serde_json::to_string(message)
            .map_err(|e| TransportError::Protocol(format!("failed to encode message: {}", e)))?;
        let bytes = json.len();

        sink.send(Message::Text(json))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;

        Ok(bytes)
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Open the socket and wait for the collector to assign a session id
async fn open_and_handshake(
    url: &str,
    phase: &watch::Sender<TransportPhase>,
) -> Result<(WsSink, WsSource, String), TransportError> {
    let (ws, _response) = connect_async(url)
        .await
        .map_err(|e| TransportError::Connection(e.to_string()))?;

    phase.send_replace(TransportPhase::AwaitingSession);
    debug!("Connected to {}, awaiting session id", url);

    let (sink, mut stream) = ws.split();

    while let Some(message) = stream.next().await {
        let message = message.map_err(|e| TransportError::Connection(e.to_string()))?;

        match message {
            Message::Text(text) => {
                return match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(ServerMessage::SessionStarted { session_id }) => {
                        Ok((sink, stream, session_id))
                    }
                    Ok(ServerMessage::Error { message }) => Err(TransportError::Connection(
                        format!("collector rejected session: {}", message),
                    )),
                    Ok(other) => Err(TransportError::Protocol(format!(
                        "unexpected message before session start: {:?}",
                        other
                    ))),
                    Err(e) => Err(TransportError::Protocol(format!(
                        "malformed message before session start: {}",
                        e
                    ))),
                };
            }
            Message::Close(frame) => {
                return Err(TransportError::Connection(format!(
                    "collector closed the connection before session start: {:?}",
                    frame
                )));
            }
            _ => {}
        }
    }

    Err(TransportError::Connection(
        "connection ended before session start".to_string(),
    ))
}

/// Inbound collector events after the handshake
async fn read_loop(
    mut stream: WsSource,
    phase: Arc<watch::Sender<TransportPhase>>,
    acknowledged: Arc<AtomicU32>,
    session_id: String,
) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => handle_server_message(&text, &acknowledged),
            Ok(Message::Close(frame)) => {
                debug!("Collector closing session {}: {:?}", session_id, frame);
            }
            Ok(_) => {}
            Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => break,
            Err(e) => {
                warn!("Collector connection error on session {}: {}", session_id, e);
                break;
            }
        }
    }

    phase.send_replace(TransportPhase::Disconnected);
    debug!("Collector reader for session {} finished", session_id);
}

fn handle_server_message(text: &str, acknowledged: &AtomicU32) {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(ServerMessage::ChunkReceived { chunk_number, .. }) => {
            acknowledged.fetch_add(1, Ordering::SeqCst);
            debug!("Chunk #{} confirmed by collector", chunk_number);
        }
        Ok(ServerMessage::Error { message }) => {
            warn!("Collector error: {}", message);
        }
        Ok(ServerMessage::SessionStarted { session_id }) => {
            warn!("Ignoring repeated session_started ({})", session_id);
        }
        Err(e) => {
            warn!("Ignoring malformed collector message: {}", e);
        }
    }
}
