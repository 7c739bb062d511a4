use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::SessionState;

/// Statistics about a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    pub state: SessionState,

    /// When the session was last started
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since `started_at`
    pub duration_secs: f64,

    /// Microphone frames handed to the connection
    pub frames_sent: usize,

    /// Response chunks scheduled for playback
    pub chunks_scheduled: usize,

    /// Response chunks dropped as undecodable or unplayable
    pub chunks_dropped: usize,

    /// Interruption signals received
    pub interruptions: usize,

    /// Sources currently scheduled or playing
    pub active_sources: usize,

    /// Last error reported to the caller, if any
    pub last_error: Option<String>,
}
