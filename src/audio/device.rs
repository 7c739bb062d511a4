use tokio::sync::mpsc;

use crate::error::{VoiceError, VoiceResult};

/// Capacity of the queue between a device callback and the capture task
pub const INPUT_QUEUE_CAPACITY: usize = 64;

/// Decoded audio ready for playback (normalized f32, one Vec per channel)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(vec![samples], sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Number of sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Average all channels into one mono sequence
    pub fn downmix(&self) -> Vec<f32> {
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0].clone(),
            n => (0..self.frames())
                .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / n as f32)
                .collect(),
        }
    }
}

/// Requested capture format
#[derive(Debug, Clone)]
pub struct InputConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels (1 = mono)
    pub channels: u16,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
        }
    }
}

/// Requested playback format
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels (1 = mono)
    pub channels: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24000,
            channels: 1,
        }
    }
}

/// Identifier of one scheduled playback source
pub type SourceId = u64;

/// Handed to an output device with each source; fired once when that
/// source finishes playing on its own.
#[derive(Debug, Clone)]
pub struct EndedNotifier {
    id: SourceId,
    tx: mpsc::UnboundedSender<SourceId>,
}

impl EndedNotifier {
    pub fn new(id: SourceId, tx: mpsc::UnboundedSender<SourceId>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn notify(self) {
        // Receiver is gone once the scheduler has been dropped
        let _ = self.tx.send(self.id);
    }
}

/// Microphone-like capture device.
///
/// Implementations deliver blocks of normalized f32 samples of any length.
/// The delivering side must never block: use `try_send` on a bounded queue.
#[async_trait::async_trait]
pub trait InputDevice: Send {
    /// Acquire exclusive use of the device (permission, open)
    async fn open(&mut self, config: &InputConfig) -> VoiceResult<()>;

    /// Start delivering sample blocks
    fn start(&mut self) -> VoiceResult<mpsc::Receiver<Vec<f32>>>;

    /// Release the device. Calling it when not open is a no-op.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Device name for logging
    fn name(&self) -> &str;
}

/// Speaker-like playback device with its own clock.
#[async_trait::async_trait]
pub trait OutputDevice: Send {
    async fn open(&mut self, config: &OutputConfig) -> VoiceResult<()>;

    /// Current device clock in seconds
    fn current_time(&self) -> f64;

    /// Start `buffer` at device time `when`
    fn start_source(
        &mut self,
        buffer: AudioBuffer,
        when: f64,
        ended: EndedNotifier,
    ) -> VoiceResult<()>;

    /// Stop a source immediately; unknown ids are ignored
    fn stop_source(&mut self, id: SourceId);

    /// Release the device. Calling it when not open is a no-op.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    fn name(&self) -> &str;
}

/// Where captured audio comes from
#[derive(Debug, Clone)]
pub enum InputSource {
    /// Default system microphone (requires the `cpal-device` feature)
    Microphone,
    /// WAV file replayed in real time
    File(String),
}

/// Where response audio goes
#[derive(Debug, Clone, Copy)]
pub enum OutputSink {
    /// Default system speaker (requires the `cpal-device` feature)
    Speaker,
    /// Discard audio while keeping a real-time clock
    Null,
}

/// Audio device factory
pub struct AudioDeviceFactory;

impl AudioDeviceFactory {
    pub fn input(source: InputSource) -> VoiceResult<Box<dyn InputDevice>> {
        match source {
            InputSource::Microphone => {
                #[cfg(feature = "cpal-device")]
                {
                    Ok(Box::new(super::cpal_device::CpalInput::new()))
                }

                #[cfg(not(feature = "cpal-device"))]
                {
                    Err(VoiceError::DeviceUnavailable(
                        "microphone capture requires the cpal-device feature".to_string(),
                    ))
                }
            }

            InputSource::File(path) => Ok(Box::new(super::file::WavFileInput::new(path))),
        }
    }

    pub fn output(sink: OutputSink) -> VoiceResult<Box<dyn OutputDevice>> {
        match sink {
            OutputSink::Speaker => {
                #[cfg(feature = "cpal-device")]
                {
                    Ok(Box::new(super::cpal_device::CpalOutput::new()))
                }

                #[cfg(not(feature = "cpal-device"))]
                {
                    Err(VoiceError::DeviceUnavailable(
                        "speaker playback requires the cpal-device feature".to_string(),
                    ))
                }
            }

            OutputSink::Null => Ok(Box::new(super::null::NullOutput::new())),
        }
    }
}
