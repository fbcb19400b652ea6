//! WAV container encoding for chunks.
//!
//! Produces a standard 44-byte RIFF header followed by interleaved 16-bit
//! little-endian PCM:
//!
//! ```text
//! [0-3]    "RIFF"
//! [4-7]    total size - 8 (36 + data size)
//! [8-11]   "WAVE"
//! [12-15]  "fmt "
//! [16-19]  16 (PCM format chunk size)
//! [20-21]  1 (PCM format code)
//! [22-23]  channels
//! [24-27]  sample rate
//! [28-31]  byte rate = sample rate * block align
//! [32-33]  block align = channels * 2
//! [34-35]  16 (bits per sample)
//! [36-39]  "data"
//! [40-43]  data size
//! ```

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use super::backend::SampleBlock;
use crate::error::EncodeError;

/// Size of the WAV header written for chunks
pub const WAV_HEADER_SIZE: usize = 44;

/// Most channels a chunk may carry; more would need an extensible header
pub const MAX_CHANNELS: usize = 2;

const BITS_PER_SAMPLE: u16 = 16;

/// Convert a float sample to 16-bit PCM.
///
/// Clamps to [-1.0, 1.0], then scales negatives by 32768 and positives by
/// 32767, truncating toward zero.
pub fn sample_to_pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Encode blocks (in arrival order) into a WAV container
pub fn encode_wav(blocks: &[SampleBlock], sample_rate: u32) -> Result<Vec<u8>, EncodeError> {
    let first = blocks.first().ok_or(EncodeError::Empty)?;
    if sample_rate == 0 {
        return Err(EncodeError::InvalidSampleRate(sample_rate));
    }

    let channels = first.channel_count();
    if channels > MAX_CHANNELS {
        return Err(EncodeError::UnsupportedChannels(channels));
    }
    for (index, block) in blocks.iter().enumerate() {
        if block.channel_count() != channels {
            return Err(EncodeError::ChannelMismatch {
                index,
                expected: channels,
                found: block.channel_count(),
            });
        }
    }

    let spec = WavSpec {
        channels: channels as u16,
        sample_rate,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };

    let total_frames: usize = blocks.iter().map(SampleBlock::frames).sum();
    let data_len = total_frames * channels * (BITS_PER_SAMPLE as usize / 8);
    let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_SIZE + data_len));

    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for block in blocks {
            for frame in 0..block.frames() {
                for channel in block.channels() {
                    writer.write_sample(sample_to_pcm16(channel[frame]))?;
                }
            }
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}
