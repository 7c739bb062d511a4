//! Voice session management
//!
//! This module provides the `VoiceSession` state machine that manages:
//! - Microphone capture and outbound frame streaming
//! - Decoding and gapless playback of response audio
//! - Interruption handling
//! - Status reporting and resource release on every exit path

mod config;
mod session;
mod state;
mod stats;

pub use config::SessionConfig;
pub use session::VoiceSession;
pub use state::{SessionState, StatusCallback, StatusUpdate};
pub use stats::SessionStats;
