// Mock collector for integration tests
//
// Plays the server side of the collector protocol on a loopback port and
// records every client message it receives.

#![allow(dead_code)]

use anyhow::Result;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tab_audio_streamer::transport::{ClientMessage, ServerMessage};
use tab_audio_streamer::TransportConfig;
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// How the mock answers a new connection
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Assign a session id and acknowledge every chunk
    Normal,
    /// Accept the socket but never send anything
    Silent,
    /// Reply with an error message instead of a session id
    Reject(String),
    /// Assign a session id, then hang up
    DropAfterHandshake,
}

pub struct MockCollector {
    url: String,
    messages: Arc<Mutex<Vec<ClientMessage>>>,
    closed: watch::Receiver<u32>,
    task: JoinHandle<()>,
}

impl MockCollector {
    pub async fn start(behavior: Behavior) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let messages = Arc::new(Mutex::new(Vec::new()));
        let (closed_tx, closed_rx) = watch::channel(0u32);
        let closed_tx = Arc::new(closed_tx);
        let connections = Arc::new(AtomicU32::new(0));

        let task = {
            let messages = Arc::clone(&messages);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let behavior = behavior.clone();
                    let messages = Arc::clone(&messages);
                    let closed_tx = Arc::clone(&closed_tx);
                    let n = connections.fetch_add(1, Ordering::SeqCst) + 1;
                    tokio::spawn(async move {
                        let _ = serve_connection(stream, behavior, messages, n).await;
                        closed_tx.send_modify(|count| *count += 1);
                    });
                }
            })
        };

        Ok(Self {
            url: format!("ws://{}/ws/audio/", addr),
            messages,
            closed: closed_rx,
            task,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            url: self.url.clone(),
            handshake_timeout_ms: 500,
            close_timeout_ms: 500,
        }
    }

    pub async fn messages(&self) -> Vec<ClientMessage> {
        self.messages.lock().await.clone()
    }

    /// Decoded WAV payloads of every received chunk, with their numbers
    pub async fn chunks(&self) -> Vec<(u32, Vec<u8>)> {
        self.messages()
            .await
            .into_iter()
            .filter_map(|message| match message {
                ClientMessage::AudioChunk {
                    chunk_number,
                    audio_data,
                } => base64::engine::general_purpose::STANDARD
                    .decode(audio_data)
                    .ok()
                    .map(|bytes| (chunk_number, bytes)),
                ClientMessage::Metadata { .. } => None,
            })
            .collect()
    }

    pub async fn metadata_count(&self) -> usize {
        self.messages()
            .await
            .iter()
            .filter(|message| matches!(message, ClientMessage::Metadata { .. }))
            .count()
    }

    /// Wait until `count` connections have ended
    pub async fn wait_closed(&self, count: u32) -> Result<()> {
        let mut closed = self.closed.clone();
        tokio::time::timeout(Duration::from_secs(5), closed.wait_for(|n| *n >= count)).await??;
        Ok(())
    }
}

impl Drop for MockCollector {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    behavior: Behavior,
    messages: Arc<Mutex<Vec<ClientMessage>>>,
    connection: u32,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();

    match &behavior {
        Behavior::Normal | Behavior::DropAfterHandshake => {
            let started = ServerMessage::SessionStarted {
                session_id: format!("session-{}", connection),
            };
            sink.send(Message::Text(serde_json::to_string(&started)?)).await?;
        }
        Behavior::Reject(message) => {
            let error = ServerMessage::Error {
                message: message.clone(),
            };
            sink.send(Message::Text(serde_json::to_string(&error)?)).await?;
        }
        Behavior::Silent => {}
    }

    if matches!(behavior, Behavior::DropAfterHandshake) {
        sink.close().await?;
        return Ok(());
    }

    while let Some(message) = source.next().await {
        match message? {
            Message::Text(text) => {
                let message: ClientMessage = serde_json::from_str(&text)?;
                if let ClientMessage::AudioChunk { chunk_number, .. } = &message {
                    if matches!(behavior, Behavior::Normal) {
                        let ack = ServerMessage::ChunkReceived {
                            chunk_number: *chunk_number,
                            size: Some(text.len() as u64),
                        };
                        sink.send(Message::Text(serde_json::to_string(&ack)?)).await?;
                    }
                }
                messages.lock().await.push(message);
            }
            // tungstenite answers the close frame; keep reading until the stream ends
            Message::Close(_) => {}
            _ => {}
        }
    }

    Ok(())
}
