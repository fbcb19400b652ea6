use std::mem;
use std::time::Duration;

use super::backend::SampleBlock;

/// Chunk configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Duration of each chunk (default: 1 second)
    pub chunk_duration: Duration,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_duration: Duration::from_secs(1),
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_duration: Duration) -> Self {
        Self { chunk_duration }
    }

    /// Frames that make a chunk full at the given sample rate (never zero)
    pub fn threshold_frames(&self, sample_rate: u32) -> usize {
        let frames = sample_rate as u128 * self.chunk_duration.as_millis() / 1000;
        (frames as usize).max(1)
    }
}

/// One encoded chunk, ready for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    /// 1-based sequence number within the session
    pub sequence: u32,
    /// Complete WAV container bytes
    pub bytes: Vec<u8>,
    /// Frames of audio in this chunk
    pub frames: usize,
}

impl EncodedChunk {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Pending blocks of the currently open chunk.
///
/// Chunk boundaries are decided by accumulated frames, not by block count,
/// since block size follows the audio engine's processing quantum.
#[derive(Debug, Default)]
pub struct SampleAccumulator {
    blocks: Vec<SampleBlock>,
    frames: usize,
}

impl SampleAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, block: SampleBlock) {
        self.frames += block.frames();
        self.blocks.push(block);
    }

    pub fn is_full(&self, threshold_frames: usize) -> bool {
        self.frames >= threshold_frames
    }

    /// Take every pending block in push order and reset the count
    pub fn drain(&mut self) -> Vec<SampleBlock> {
        self.frames = 0;
        mem::take(&mut self.blocks)
    }

    /// Accumulated frames since the last drain
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
