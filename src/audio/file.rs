use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{AudioSource, AudioSourceConfig, SampleBlock};
use crate::error::SourceError;

/// Fully decoded audio, planar f32
pub struct DecodedAudio {
    pub sample_rate: u32,
    /// One vector per channel
    pub channels: Vec<Vec<f32>>,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate.max(1) as f64
    }

    /// Match the pipeline's channel count: duplicate mono, drop extra channels
    pub fn conform_channels(mut self, target: usize) -> Self {
        if self.channels.len() == 1 && target > 1 {
            let mono = self.channels.remove(0);
            self.channels = vec![mono; target];
        } else {
            self.channels.truncate(target);
        }
        self
    }

    /// Split into blocks of at most `block_size` frames
    pub fn into_blocks(self, block_size: usize) -> Result<Vec<SampleBlock>, SourceError> {
        let frames = self.frames();
        (0..frames)
            .step_by(block_size.max(1))
            .map(|start| {
                let end = (start + block_size).min(frames);
                let channels = self
                    .channels
                    .iter()
                    .map(|channel| channel.get(start..end).map(<[f32]>::to_vec))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| {
                        SourceError::Decode("decoded channels have unequal lengths".to_string())
                    })?;
                SampleBlock::new(channels)
            })
            .collect()
    }

    /// Append one decoded packet of planar samples.
    ///
    /// The first packet fixes the channel layout; a later packet with a
    /// different channel count is a decode error.
    fn append_planar(&mut self, samples: &[f32], channel_count: usize) -> Result<(), SourceError> {
        if self.channels.is_empty() {
            self.channels = vec![Vec::new(); channel_count];
        } else if self.channels.len() != channel_count {
            return Err(SourceError::Decode(format!(
                "channel count changed from {} to {} mid-stream",
                self.channels.len(),
                channel_count
            )));
        }

        let frames = samples.len() / channel_count.max(1);
        for (index, channel) in self.channels.iter_mut().enumerate() {
            channel.extend_from_slice(&samples[index * frames..(index + 1) * frames]);
        }
        Ok(())
    }
}

/// Decode an audio file (any format symphonia supports) into planar f32
pub fn decode_file(path: impl AsRef<Path>) -> Result<DecodedAudio, SourceError> {
    let path = path.as_ref();
    info!("Opening audio file: {}", path.display());

    let file = File::open(path).map_err(|e| SourceError::Open {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| SourceError::Decode(format!("unsupported format: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SourceError::Decode("no audio track found".to_string()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SourceError::Decode(format!("unsupported codec: {}", e)))?;

    let mut audio = DecodedAudio {
        sample_rate: 0,
        channels: Vec::new(),
    };

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(SourceError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(SourceError::Decode(e.to_string())),
        };

        let spec = *decoded.spec();
        let channel_count = spec.channels.count();
        if sample_rate == 0 {
            sample_rate = spec.rate;
        }

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_planar_ref(decoded);
        audio.append_planar(buffer.samples(), channel_count)?;
    }

    if audio.channels.is_empty() || sample_rate == 0 {
        return Err(SourceError::Decode(format!(
            "no audio decoded from {}",
            path.display()
        )));
    }

    audio.sample_rate = sample_rate;

    info!(
        "Audio file loaded: {:.1}s, {}Hz, {} channels",
        audio.duration_seconds(),
        audio.sample_rate,
        audio.channels.len()
    );

    Ok(audio)
}

/// Replays an audio file as a stream of sample blocks
///
/// The channel closes once the file has been fully replayed, which the
/// capture side treats as the end of the source.
pub struct FileSource {
    path: PathBuf,
    config: AudioSourceConfig,
    sample_rate: u32,
    producer: Option<JoinHandle<()>>,
    capturing: bool,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, config: AudioSourceConfig) -> Self {
        Self {
            path: path.into(),
            config,
            sample_rate: 0,
            producer: None,
            capturing: false,
        }
    }
}

#[async_trait::async_trait]
impl AudioSource for FileSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<SampleBlock>, SourceError> {
        if self.capturing {
            return Err(SourceError::AlreadyCapturing);
        }

        let path = self.path.clone();
        let audio = tokio::task::spawn_blocking(move || decode_file(path))
            .await
            .map_err(|e| SourceError::Decode(format!("decoder task failed: {}", e)))??;

        self.sample_rate = audio.sample_rate;
        let block_duration = self.config.block_duration(audio.sample_rate);
        let blocks = audio
            .conform_channels(self.config.channels as usize)
            .into_blocks(self.config.block_size)?;
        let realtime = self.config.realtime;

        let (tx, rx) = mpsc::channel(self.config.buffer_blocks);
        let name = self.path.display().to_string();

        self.producer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(block_duration);
            let total = blocks.len();

            for block in blocks {
                if realtime {
                    ticker.tick().await;
                }
                if tx.send(block).await.is_err() {
                    debug!("File source {} unsubscribed", name);
                    return;
                }
            }

            info!("File source {} finished ({} blocks)", name, total);
        }));
        self.capturing = true;

        info!("File source started: {}", self.path.display());

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), SourceError> {
        if !self.capturing {
            return Ok(());
        }

        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
        self.capturing = false;

        info!("File source stopped: {}", self.path.display());

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn name(&self) -> &str {
        "file"
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conform_mono_to_stereo() {
        let audio = DecodedAudio {
            sample_rate: 8000,
            channels: vec![vec![0.1, 0.2, 0.3]],
        };
        let stereo = audio.conform_channels(2);
        assert_eq!(stereo.channels.len(), 2);
        assert_eq!(stereo.channels[0], stereo.channels[1]);
    }

    #[test]
    fn test_conform_drops_extra_channels() {
        let audio = DecodedAudio {
            sample_rate: 8000,
            channels: vec![vec![0.1], vec![0.2], vec![0.3], vec![0.4]],
        };
        let stereo = audio.conform_channels(2);
        assert_eq!(stereo.channels, vec![vec![0.1], vec![0.2]]);
    }

    #[test]
    fn test_into_blocks_keeps_remainder() {
        let audio = DecodedAudio {
            sample_rate: 8000,
            channels: vec![vec![0.0; 10], vec![0.0; 10]],
        };
        let blocks = audio.into_blocks(4).unwrap();
        let sizes: Vec<usize> = blocks.iter().map(SampleBlock::frames).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_into_blocks_rejects_uneven_channels() {
        let audio = DecodedAudio {
            sample_rate: 8000,
            channels: vec![vec![0.0; 10], vec![0.0; 6]],
        };
        assert!(matches!(audio.into_blocks(4), Err(SourceError::Decode(_))));
    }

    #[test]
    fn test_append_planar_keeps_layout() {
        let mut audio = DecodedAudio {
            sample_rate: 8000,
            channels: Vec::new(),
        };
        // Planar: left samples, then right samples
        audio.append_planar(&[0.1, 0.2, -0.1, -0.2], 2).unwrap();
        audio.append_planar(&[0.3, -0.3], 2).unwrap();
        assert_eq!(audio.channels, vec![vec![0.1, 0.2, 0.3], vec![-0.1, -0.2, -0.3]]);

        let changed = audio.append_planar(&[0.4], 1);
        assert!(matches!(changed, Err(SourceError::Decode(_))));
        // Nothing from the rejected packet was kept
        assert_eq!(audio.frames(), 3);
    }
}
