use serde::{Deserialize, Serialize};

/// Client environment reported with the recording metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserInfo {
    pub user_agent: String,
    pub platform: String,
    pub language: String,
    pub vendor: String,
}

impl BrowserInfo {
    /// Describe the running process
    pub fn detect() -> Self {
        let language = std::env::var("LANG")
            .ok()
            .and_then(|lang| {
                let tag = lang.split('.').next().unwrap_or_default().replace('_', "-");
                (!tag.is_empty() && tag != "C" && tag != "POSIX").then_some(tag)
            })
            .unwrap_or_else(|| "en-US".to_string());

        Self {
            user_agent: format!(
                "{}/{} ({}; {})",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS,
                std::env::consts::ARCH
            ),
            platform: std::env::consts::OS.to_string(),
            language,
            vendor: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

/// Recording metadata, sent once right after the handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub tab_url: Option<String>,
    pub tab_title: Option<String>,
    pub tab_favicon: Option<String>,
    pub user_agent: String,
    pub browser_info: BrowserInfo,
}

impl RecordingMetadata {
    /// Metadata for a source, with the client environment filled in
    pub fn new(
        tab_url: Option<String>,
        tab_title: Option<String>,
        tab_favicon: Option<String>,
    ) -> Self {
        let browser_info = BrowserInfo::detect();
        Self {
            tab_url,
            tab_title,
            tab_favicon,
            user_agent: browser_info.user_agent.clone(),
            browser_info,
        }
    }
}

/// Messages sent to the collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Metadata {
        metadata: RecordingMetadata,
    },
    AudioChunk {
        chunk_number: u32,
        /// Base64-encoded WAV bytes
        audio_data: String,
    },
}

/// Messages received from the collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    SessionStarted {
        session_id: String,
    },
    ChunkReceived {
        chunk_number: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<u64>,
    },
    Error {
        message: String,
    },
}
