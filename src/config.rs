use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::audio::{AudioSourceConfig, MAX_CHANNELS};
use crate::session::SessionConfig;
use crate::transport::TransportConfig;

/// Prefix for environment overrides, e.g. `TAB_AUDIO__COLLECTOR__URL`
pub const ENV_PREFIX: &str = "TAB_AUDIO";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub collector: TransportConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub chunk_duration_ms: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub block_size: usize,
    pub buffer_blocks: usize,
    pub realtime: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let source = AudioSourceConfig::default();
        Self {
            chunk_duration_ms: 1000,
            sample_rate: source.sample_rate,
            channels: source.channels,
            block_size: source.block_size,
            buffer_blocks: source.buffer_blocks,
            realtime: source.realtime,
        }
    }
}

impl Config {
    /// Load configuration from an optional file, then `TAB_AUDIO__*` variables
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        let cfg: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.audio.chunk_duration_ms == 0 {
            anyhow::bail!("audio.chunk_duration_ms must be positive");
        }
        if self.audio.channels == 0 || self.audio.channels as usize > MAX_CHANNELS {
            anyhow::bail!(
                "audio.channels must be between 1 and {}, got {}",
                MAX_CHANNELS,
                self.audio.channels
            );
        }
        if self.collector.url.is_empty() {
            anyhow::bail!("collector.url must be set");
        }
        Ok(())
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.service.http.bind, self.service.http.port)
    }

    pub fn source_config(&self) -> AudioSourceConfig {
        AudioSourceConfig {
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
            block_size: self.audio.block_size,
            buffer_blocks: self.audio.buffer_blocks,
            realtime: self.audio.realtime,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            collector: self.collector.clone(),
            chunk_duration: Duration::from_millis(self.audio.chunk_duration_ms),
            audio: self.source_config(),
        }
    }
}
