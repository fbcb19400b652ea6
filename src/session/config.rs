use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::{AudioSourceConfig, ChunkConfig};
use crate::capture::CaptureConfig;
use crate::transport::TransportConfig;

/// Configuration for recording sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Collector connection
    pub collector: TransportConfig,

    /// Duration of audio per chunk
    /// Default: 1 second
    pub chunk_duration: Duration,

    /// Settings handed to audio sources
    pub audio: AudioSourceConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            collector: TransportConfig::default(),
            chunk_duration: Duration::from_secs(1),
            audio: AudioSourceConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            transport: self.collector.clone(),
            chunk: ChunkConfig::new(self.chunk_duration),
        }
    }
}
