//! Error types for the voice core

use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Malformed payload received from the live endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid base64: {0}")]
    Base64(String),

    #[error("PCM payload has odd byte length {0}")]
    OddPcmLength(usize),

    #[error("invalid channel count {0}")]
    ChannelCount(usize),

    #[error("invalid sample rate {0}")]
    SampleRate(u32),
}

impl From<base64::DecodeError> for DecodeError {
    fn from(err: base64::DecodeError) -> Self {
        DecodeError::Base64(err.to_string())
    }
}

/// Errors surfaced by the session controller and its components
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Remote endpoint closed the session: {0}")]
    RemoteClose(String),

    #[error("A session is already {0}")]
    SessionActive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "cpal-device")]
impl From<cpal::DevicesError> for VoiceError {
    fn from(err: cpal::DevicesError) -> Self {
        VoiceError::DeviceUnavailable(err.to_string())
    }
}

#[cfg(feature = "cpal-device")]
impl From<cpal::BuildStreamError> for VoiceError {
    fn from(err: cpal::BuildStreamError) -> Self {
        VoiceError::DeviceUnavailable(err.to_string())
    }
}

#[cfg(feature = "cpal-device")]
impl From<cpal::PlayStreamError> for VoiceError {
    fn from(err: cpal::PlayStreamError) -> Self {
        VoiceError::DeviceUnavailable(err.to_string())
    }
}
