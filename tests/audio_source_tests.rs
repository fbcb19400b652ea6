// Integration tests for audio sources
//
// These tests verify that file and tone sources produce correctly shaped
// blocks and release their producers on stop.

use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use tab_audio_streamer::audio::decode_file;
use tab_audio_streamer::{AudioSource, AudioSourceConfig, AudioSourceFactory, SourceKind};
use tempfile::TempDir;

fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: usize) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for n in 0..frames {
        for _ in 0..channels {
            writer.write_sample(((n % 100) as i16) * 100)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

fn fast_config(block_size: usize) -> AudioSourceConfig {
    AudioSourceConfig {
        block_size,
        realtime: false,
        ..AudioSourceConfig::default()
    }
}

#[test]
fn test_decode_wav_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("tab.wav");
    write_wav(&path, 44100, 2, 44100)?;

    let audio = decode_file(&path)?;
    assert_eq!(audio.sample_rate, 44100);
    assert_eq!(audio.channels.len(), 2);
    assert_eq!(audio.frames(), 44100);
    assert!((audio.duration_seconds() - 1.0).abs() < 1e-6);

    Ok(())
}

#[tokio::test]
async fn test_file_source_replays_all_frames() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("tab.wav");
    write_wav(&path, 48000, 2, 10_000)?;

    let mut source = AudioSourceFactory::create(
        SourceKind::File { path: path.clone() },
        fast_config(4096),
    )?;
    let mut blocks = source.start().await?;
    assert!(source.is_capturing());
    assert_eq!(source.sample_rate(), 48000);

    let mut sizes = Vec::new();
    while let Some(block) = blocks.recv().await {
        assert_eq!(block.channel_count(), 2);
        sizes.push(block.frames());
    }
    // Channel closes at end of file
    assert_eq!(sizes, vec![4096, 4096, 1808]);

    source.stop().await?;
    assert!(!source.is_capturing());

    Ok(())
}

#[tokio::test]
async fn test_mono_file_is_duplicated_to_stereo() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("mono.wav");
    write_wav(&path, 16000, 1, 1000)?;

    let mut source = AudioSourceFactory::create(SourceKind::File { path }, fast_config(1000))?;
    let mut blocks = source.start().await?;

    let block = blocks.recv().await.expect("one block");
    assert_eq!(block.channel_count(), 2);
    assert_eq!(block.channel(0), block.channel(1));
    assert_eq!(source.sample_rate(), 16000);

    source.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_file_source_rejects_garbage() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("noise.wav");
    std::fs::write(&path, b"definitely not audio")?;

    let mut source = AudioSourceFactory::create(SourceKind::File { path }, fast_config(1024))?;
    assert!(source.start().await.is_err());
    assert!(!source.is_capturing());

    Ok(())
}

#[tokio::test]
async fn test_tone_source_streams_until_stopped() -> Result<()> {
    let mut source = AudioSourceFactory::create(
        SourceKind::Tone {
            frequency_hz: 440.0,
        },
        fast_config(512),
    )?;

    let mut blocks = source.start().await?;
    assert_eq!(source.sample_rate(), 48000);
    assert!(source.start().await.is_err());

    for _ in 0..10 {
        let block = blocks.recv().await.expect("tone block");
        assert_eq!(block.frames(), 512);
        assert_eq!(block.channel_count(), 2);
        assert!(block.channel(0).unwrap().iter().all(|s| s.abs() <= 0.5));
    }

    source.stop().await?;

    // The producer is gone; whatever was buffered drains, then the channel closes
    let drained = tokio::time::timeout(Duration::from_secs(2), async {
        while blocks.recv().await.is_some() {}
    })
    .await;
    assert!(drained.is_ok());

    Ok(())
}

#[test]
fn test_invalid_source_config() {
    let config = AudioSourceConfig {
        block_size: 0,
        ..AudioSourceConfig::default()
    };
    let result = AudioSourceFactory::create(
        SourceKind::Tone {
            frequency_hz: 440.0,
        },
        config,
    );
    assert!(result.is_err());
}
