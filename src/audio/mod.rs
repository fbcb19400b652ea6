pub mod backend;
pub mod chunk;
pub mod file;
pub mod tone;
pub mod wav;

pub use backend::{
    AudioSource, AudioSourceConfig, AudioSourceFactory, ChannelSource, SampleBlock, SourceKind,
};
pub use chunk::{ChunkConfig, EncodedChunk, SampleAccumulator};
pub use file::{decode_file, DecodedAudio, FileSource};
pub use tone::ToneSource;
pub use wav::{encode_wav, sample_to_pcm16, MAX_CHANNELS, WAV_HEADER_SIZE};
