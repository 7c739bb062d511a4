pub mod capture;
pub mod codec;
pub mod device;
pub mod file;
pub mod null;
pub mod playback;

#[cfg(feature = "cpal-device")]
pub mod cpal_device;

pub use capture::{CaptureConfig, CapturePipeline, FrameAssembler, FrameSink};
pub use device::{
    AudioBuffer, AudioDeviceFactory, EndedNotifier, InputConfig, InputDevice, InputSource,
    OutputConfig, OutputDevice, OutputSink, SourceId,
};
pub use file::{AudioFile, WavFileInput};
pub use null::NullOutput;
pub use playback::{PlaybackScheduler, ScheduledSource};
