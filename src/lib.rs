pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod live;
pub mod session;

pub use audio::{
    AudioBuffer, AudioDeviceFactory, CaptureConfig, CapturePipeline, InputDevice, InputSource,
    OutputDevice, OutputSink, PlaybackScheduler,
};
pub use config::Config;
pub use error::{DecodeError, VoiceError, VoiceResult};
pub use http::{create_router, AppState};
pub use live::{LiveConfig, LiveConnection, LiveConnector, RealtimeInput, ServerEvent, WebSocketConnector};
pub use session::{SessionConfig, SessionState, SessionStats, StatusCallback, StatusUpdate, VoiceSession};
