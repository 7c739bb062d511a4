use serde::{Deserialize, Serialize};

use crate::audio::{CaptureConfig, OutputConfig};

/// Configuration for a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "voice-<uuid>")
    pub session_id: String,

    /// Microphone sample rate (the live endpoint expects 16kHz)
    pub input_sample_rate: u32,

    /// Samples per outbound frame
    pub frame_size: usize,

    /// Sample rate of response audio (24kHz)
    pub output_sample_rate: u32,

    /// Number of channels in response audio (1 = mono)
    pub output_channels: u16,
}

impl SessionConfig {
    pub fn capture(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.input_sample_rate,
            frame_size: self.frame_size,
        }
    }

    pub fn output(&self) -> OutputConfig {
        OutputConfig {
            sample_rate: self.output_sample_rate,
            channels: self.output_channels,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("voice-{}", uuid::Uuid::new_v4()),
            input_sample_rate: 16000, // Live endpoint input rate
            frame_size: 4096,
            output_sample_rate: 24000, // Live endpoint output rate
            output_channels: 1,        // Mono
        }
    }
}
