use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Coordinator state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    #[default]
    Idle,
    Starting,
    Recording,
    Stopping,
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordingState::Idle => "idle",
            RecordingState::Starting => "starting",
            RecordingState::Recording => "recording",
            RecordingState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// The single process-wide recording
#[derive(Debug, Clone, Default)]
pub struct RecordingSession {
    pub state: RecordingState,

    /// Local identifier, used to match worker events to this recording
    pub recording_id: Option<Uuid>,

    /// Collector-assigned session id
    pub session_id: Option<String>,

    pub started_at: Option<DateTime<Utc>>,

    /// Chunks handed to the transport
    pub chunk_count: u32,

    /// The source ended before the start transition finished
    pub ended_early: bool,
}

/// Answer to a status query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatus {
    /// Whether a recording is active (including while it is being stopped)
    pub is_recording: bool,

    pub state: RecordingState,

    pub session_id: Option<String>,

    pub recording_id: Option<Uuid>,

    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since the recording started
    pub elapsed_secs: Option<f64>,

    /// Number of chunks delivered to the collector connection so far
    pub chunks_count: u32,
}

impl RecordingStatus {
    pub fn from_session(session: &RecordingSession, now: DateTime<Utc>) -> Self {
        let elapsed_secs = session
            .started_at
            .map(|started| now.signed_duration_since(started).num_milliseconds() as f64 / 1000.0);

        Self {
            is_recording: matches!(
                session.state,
                RecordingState::Recording | RecordingState::Stopping
            ),
            state: session.state,
            session_id: session.session_id.clone(),
            recording_id: session.recording_id,
            started_at: session.started_at,
            elapsed_secs,
            chunks_count: session.chunk_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_status() {
        let status = RecordingStatus::from_session(&RecordingSession::default(), Utc::now());
        assert!(!status.is_recording);
        assert_eq!(status.state, RecordingState::Idle);
        assert!(status.session_id.is_none());
        assert!(status.elapsed_secs.is_none());
        assert_eq!(status.chunks_count, 0);
    }

    #[test]
    fn test_elapsed_time() {
        let started = Utc::now();
        let session = RecordingSession {
            state: RecordingState::Recording,
            recording_id: Some(Uuid::new_v4()),
            session_id: Some("abc".to_string()),
            started_at: Some(started),
            chunk_count: 3,
            ended_early: false,
        };

        let status =
            RecordingStatus::from_session(&session, started + chrono::Duration::milliseconds(2500));
        assert!(status.is_recording);
        assert_eq!(status.elapsed_secs, Some(2.5));
        assert_eq!(status.chunks_count, 3);
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = RecordingStatus::from_session(&RecordingSession::default(), Utc::now());
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["isRecording"], false);
        assert_eq!(json["chunksCount"], 0);
        assert_eq!(json["state"], "idle");
        assert!(json.get("sessionId").is_some());
    }
}
