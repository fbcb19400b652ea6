use std::f32::consts::TAU;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioSource, AudioSourceConfig, SampleBlock};
use crate::error::SourceError;

const AMPLITUDE: f32 = 0.5;

/// Synthetic sine tone, identical on every channel
pub struct ToneSource {
    frequency_hz: f32,
    config: AudioSourceConfig,
    producer: Option<JoinHandle<()>>,
    capturing: bool,
}

impl ToneSource {
    pub fn new(frequency_hz: f32, config: AudioSourceConfig) -> Self {
        Self {
            frequency_hz,
            config,
            producer: None,
            capturing: false,
        }
    }
}

/// Render one block of the tone starting at `start_frame`
pub fn render_tone_block(
    frequency_hz: f32,
    sample_rate: u32,
    channels: usize,
    start_frame: u64,
    frames: usize,
) -> Result<SampleBlock, SourceError> {
    let step = frequency_hz / sample_rate.max(1) as f32;
    let samples: Vec<f32> = (0..frames as u64)
        .map(|n| {
            // Phase kept in [0, 1) to avoid precision loss on long runs
            let phase = ((start_frame + n) as f64 * step as f64).fract() as f32;
            (phase * TAU).sin() * AMPLITUDE
        })
        .collect();

    SampleBlock::new(vec![samples; channels.max(1)])
}

#[async_trait::async_trait]
impl AudioSource for ToneSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<SampleBlock>, SourceError> {
        if self.capturing {
            return Err(SourceError::AlreadyCapturing);
        }
        if !(self.frequency_hz.is_finite() && self.frequency_hz > 0.0) {
            return Err(SourceError::Config(format!(
                "invalid tone frequency: {}",
                self.frequency_hz
            )));
        }

        let (tx, rx) = mpsc::channel(self.config.buffer_blocks.max(1));
        let frequency_hz = self.frequency_hz;
        let sample_rate = self.config.sample_rate;
        let channels = self.config.channels as usize;
        let block_size = self.config.block_size.max(1);
        let realtime = self.config.realtime;
        let block_duration = self.config.block_duration(sample_rate);

        self.producer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(block_duration);
            let mut position: u64 = 0;

            loop {
                if realtime {
                    ticker.tick().await;
                }
                let block = match render_tone_block(
                    frequency_hz,
                    sample_rate,
                    channels,
                    position,
                    block_size,
                ) {
                    Ok(block) => block,
                    Err(e) => {
                        debug!("Tone source stopped: {}", e);
                        return;
                    }
                };
                position += block_size as u64;

                if tx.send(block).await.is_err() {
                    debug!("Tone source unsubscribed");
                    return;
                }
            }
        }));
        self.capturing = true;

        info!(
            "Tone source started: {:.1}Hz at {}Hz, {} channels",
            self.frequency_hz, sample_rate, channels
        );

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

        info!("Tone source stopped");

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn name(&self) -> &str {
        "tone"
    }
}

impl Drop for ToneSource {
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
    fn test_tone_block_shape() {
        let block = render_tone_block(440.0, 48000, 2, 0, 4096).unwrap();
        assert_eq!(block.frames(), 4096);
        assert_eq!(block.channel_count(), 2);
        assert_eq!(block.channel(0), block.channel(1));
        assert!(block.channels()[0].iter().all(|s| s.abs() <= AMPLITUDE));
    }

    #[test]
    fn test_tone_blocks_are_continuous() {
        let whole = render_tone_block(1000.0, 8000, 1, 0, 16).unwrap();
        let first = render_tone_block(1000.0, 8000, 1, 0, 8).unwrap();
        let second = render_tone_block(1000.0, 8000, 1, 8, 8).unwrap();

        let joined: Vec<f32> = first.channels()[0]
            .iter()
            .chain(second.channels()[0].iter())
            .copied()
            .collect();
        assert_eq!(joined, whole.channels()[0]);
    }
}
