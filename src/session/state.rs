use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Lifecycle of a voice session.
///
/// `Idle -> Connecting -> Active -> Closing -> Closed`, with `Errored`
/// reachable from `Connecting` and `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Closing,
    Closed,
    Errored,
}

impl SessionState {
    /// Whether the session holds (or is acquiring) devices and a connection
    pub fn is_live(self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Active)
    }

    /// Whether `start()` may be called from this state
    pub fn can_start(self) -> bool {
        matches!(
            self,
            SessionState::Idle | SessionState::Closed | SessionState::Errored
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "Idle",
            SessionState::Connecting => "Connecting",
            SessionState::Active => "Active",
            SessionState::Closing => "Closing",
            SessionState::Closed => "Closed",
            SessionState::Errored => "Errored",
        };
        f.write_str(name)
    }
}

/// One observed state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub session_id: String,
    pub state: SessionState,
    /// Human-readable reason (error text, close reason)
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn new(session_id: impl Into<String>, state: SessionState) -> Self {
        Self {
            session_id: session_id.into(),
            state,
            detail: None,
            at: Utc::now(),
        }
    }
}

/// Called on every state transition, in order
pub type StatusCallback = Arc<dyn Fn(&StatusUpdate) + Send + Sync>;
