use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::info;

use crate::error::SourceError;

/// One processing tick of synchronized multi-channel audio.
///
/// Samples are planar f32 in [-1.0, 1.0]; every channel holds the same number
/// of frames. Blocks are immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    channels: Vec<Vec<f32>>,
}

impl SampleBlock {
    /// Build a block from planar channel data
    pub fn new(channels: Vec<Vec<f32>>) -> Result<Self, SourceError> {
        let Some(first) = channels.first() else {
            return Err(SourceError::InvalidBlock("block has no channels".to_string()));
        };

        let frames = first.len();
        if let Some((index, channel)) = channels
            .iter()
            .enumerate()
            .find(|(_, channel)| channel.len() != frames)
        {
            return Err(SourceError::InvalidBlock(format!(
                "channel {} has {} frames, expected {}",
                index,
                channel.len(),
                frames
            )));
        }

        Ok(Self { channels })
    }

    /// Build a stereo block
    pub fn stereo(left: Vec<f32>, right: Vec<f32>) -> Result<Self, SourceError> {
        Self::new(vec![left, right])
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }
}

/// Configuration shared by all audio sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSourceConfig {
    /// Sample rate for synthetic sources (file sources keep their native rate)
    pub sample_rate: u32,
    /// Channel count delivered to the pipeline (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Frames per sample block
    pub block_size: usize,
    /// Capacity of the block channel between producer and consumer
    pub buffer_blocks: usize,
    /// Pace block production at playback speed
    pub realtime: bool,
}

impl Default for AudioSourceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000, // Typical browser AudioContext rate
            channels: 2,        // Stereo
            block_size: 4096,   // Matches a 4096-frame processing quantum
            buffer_blocks: 64,
            realtime: true,
        }
    }
}

impl AudioSourceConfig {
    /// Wall-clock duration of one full block
    pub fn block_duration(&self, sample_rate: u32) -> std::time::Duration {
        let frames = self.block_size.max(1) as f64;
        std::time::Duration::from_secs_f64(frames / sample_rate.max(1) as f64)
    }
}

/// Audio capture source trait
///
/// Implementations:
/// - File: decode an audio file and replay it as blocks
/// - Tone: synthetic sine wave (demo / smoke tests)
/// - Channel: externally fed blocks (test harnesses, embedding)
#[async_trait::async_trait]
pub trait AudioSource: Send + Sync {
    /// Start producing blocks
    ///
    /// Returns the receiving end of a bounded channel. The producer only
    /// enqueues; dropping the receiver unsubscribes.
    async fn start(&mut self) -> Result<mpsc::Receiver<SampleBlock>, SourceError>;

    /// Stop producing blocks and release the underlying handle
    async fn stop(&mut self) -> Result<(), SourceError>;

    /// Check if source is currently producing
    fn is_capturing(&self) -> bool;

    /// Sample rate of produced blocks (valid after `start`)
    fn sample_rate(&self) -> u32;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Source selector, as carried in start requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// Decode and replay an audio file
    File { path: PathBuf },
    /// Synthetic sine tone
    Tone { frequency_hz: f32 },
}

impl std::str::FromStr for SourceKind {
    type Err = SourceError;

    /// Parse `file:PATH` or `tone:HZ`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("file", path)) if !path.is_empty() => Ok(SourceKind::File {
                path: PathBuf::from(path),
            }),
            Some(("tone", hz)) => hz
                .parse::<f32>()
                .ok()
                .filter(|hz| hz.is_finite() && *hz > 0.0)
                .map(|frequency_hz| SourceKind::Tone { frequency_hz })
                .ok_or_else(|| SourceError::Config(format!("invalid tone frequency: {}", hz))),
            _ => Err(SourceError::Config(format!(
                "unknown source '{}' (expected file:PATH or tone:HZ)",
                s
            ))),
        }
    }
}

/// Audio source factory
pub struct AudioSourceFactory;

impl AudioSourceFactory {
    /// Create an audio source; acquisition happens later in `start`
    pub fn create(
        kind: SourceKind,
        config: AudioSourceConfig,
    ) -> Result<Box<dyn AudioSource>, SourceError> {
        if config.block_size == 0 || config.buffer_blocks == 0 || config.channels == 0 {
            return Err(SourceError::Config(
                "block_size, buffer_blocks and channels must be positive".to_string(),
            ));
        }
        if config.channels as usize > super::wav::MAX_CHANNELS {
            return Err(SourceError::Config(format!(
                "{} channels requested, chunks carry at most {}",
                config.channels,
                super::wav::MAX_CHANNELS
            )));
        }

        info!("Creating audio source: {:?}", kind);

        match kind {
            SourceKind::File { path } => Ok(Box::new(super::file::FileSource::new(path, config))),
            SourceKind::Tone { frequency_hz } => {
                Ok(Box::new(super::tone::ToneSource::new(frequency_hz, config)))
            }
        }
    }
}

/// Source fed by an external producer through a sender handle
pub struct ChannelSource {
    sample_rate: u32,
    receiver: Option<mpsc::Receiver<SampleBlock>>,
    capturing: bool,
}

impl ChannelSource {
    /// Create the source and the sender that feeds it
    pub fn new(sample_rate: u32, capacity: usize) -> (Self, mpsc::Sender<SampleBlock>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                sample_rate,
                receiver: Some(rx),
                capturing: false,
            },
            tx,
        )
    }
}

#[async_trait::async_trait]
impl AudioSource for ChannelSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<SampleBlock>, SourceError> {
        if self.capturing {
            return Err(SourceError::AlreadyCapturing);
        }
        let rx = self.receiver.take().ok_or(SourceError::Exhausted)?;
        self.capturing = true;
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), SourceError> {
        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn name(&self) -> &str {
        "channel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_rejects_uneven_channels() {
        let result = SampleBlock::stereo(vec![0.0; 4], vec![0.0; 3]);
        assert!(result.is_err());
    }

    #[test]
    fn test_block_rejects_no_channels() {
        assert!(SampleBlock::new(Vec::new()).is_err());
    }

    #[test]
    fn test_source_kind_parsing() {
        let file: SourceKind = "file:/tmp/a.wav".parse().unwrap();
        assert_eq!(file, SourceKind::File { path: PathBuf::from("/tmp/a.wav") });

        let tone: SourceKind = "tone:440".parse().unwrap();
        assert_eq!(tone, SourceKind::Tone { frequency_hz: 440.0 });

        assert!("tone:abc".parse::<SourceKind>().is_err());
        assert!("tone:-5".parse::<SourceKind>().is_err());
        assert!("mic".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_factory_rejects_more_than_two_channels() {
        let config = AudioSourceConfig {
            channels: 3,
            ..AudioSourceConfig::default()
        };
        let tone = SourceKind::Tone {
            frequency_hz: 440.0,
        };
        let result = AudioSourceFactory::create(tone.clone(), config);
        assert!(matches!(result, Err(SourceError::Config(_))));

        let mono = AudioSourceConfig {
            channels: 1,
            ..AudioSourceConfig::default()
        };
        assert!(AudioSourceFactory::create(tone, mono).is_ok());
    }

    #[tokio::test]
    async fn test_channel_source_start_once() {
        let (mut source, _tx) = ChannelSource::new(48000, 4);
        assert!(source.start().await.is_ok());
        assert!(source.is_capturing());
        assert!(source.start().await.is_err());
        source.stop().await.unwrap();
        assert!(!source.is_capturing());
    }
}
