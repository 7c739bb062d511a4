use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::codec::int16_pcm_to_float;
use super::device::{AudioBuffer, InputConfig, InputDevice, INPUT_QUEUE_CAPACITY};
use crate::error::{VoiceError, VoiceResult};

/// Samples per block delivered by the file input
const FILE_BLOCK_SIZE: usize = 1024;

/// A WAV file loaded into memory as normalized samples
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;
        let spec = reader.spec();

        let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 16) => {
                let pcm = reader
                    .into_samples::<i16>()
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to read audio samples")?;
                int16_pcm_to_float(&pcm)
            }
            (SampleFormat::Float, 32) => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            (format, bits) => {
                anyhow::bail!("Unsupported WAV format: {:?} {}-bit", format, bits)
            }
        };

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels.max(1) as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Mono samples at the file's own rate
    pub fn to_mono(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        if channels == 1 {
            return self.samples.clone();
        }

        let per_channel = (0..channels)
            .map(|c| {
                self.samples
                    .iter()
                    .skip(c)
                    .step_by(channels)
                    .copied()
                    .collect::<Vec<f32>>()
            })
            .collect();

        AudioBuffer::new(per_channel, self.sample_rate).downmix()
    }
}

/// Input device that replays a WAV file in real time, as if spoken into a
/// microphone. The file must already be at the requested sample rate.
pub struct WavFileInput {
    path: String,
    samples: Option<Vec<f32>>,
    sample_rate: u32,
    task: Option<JoinHandle<()>>,
}

impl WavFileInput {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            samples: None,
            sample_rate: 0,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl InputDevice for WavFileInput {
    async fn open(&mut self, config: &InputConfig) -> VoiceResult<()> {
        if self.samples.is_some() {
            return Ok(());
        }

        let file = AudioFile::open(&self.path)
            .map_err(|e| VoiceError::DeviceUnavailable(format!("{:#}", e)))?;

        if file.sample_rate != config.sample_rate {
            return Err(VoiceError::DeviceUnavailable(format!(
                "{} is {}Hz, expected {}Hz",
                file.path, file.sample_rate, config.sample_rate
            )));
        }

        self.samples = Some(file.to_mono());
        self.sample_rate = file.sample_rate;

        Ok(())
    }

    fn start(&mut self) -> VoiceResult<mpsc::Receiver<Vec<f32>>> {
        let samples = self
            .samples
            .clone()
            .ok_or_else(|| VoiceError::DeviceUnavailable("file input is not open".to_string()))?;

        if self.task.is_some() {
            return Err(VoiceError::DeviceUnavailable(
                "file input already started".to_string(),
            ));
        }

        let (tx, rx) = mpsc::channel(INPUT_QUEUE_CAPACITY);
        let block_period = Duration::from_secs_f64(FILE_BLOCK_SIZE as f64 / self.sample_rate as f64);

        info!("Replaying {} ({} samples)", self.path, samples.len());

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(block_period);
            for block in samples.chunks(FILE_BLOCK_SIZE) {
                ticker.tick().await;
                match tx.try_send(block.to_vec()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!("Input queue full, dropping {} samples", block.len());
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
            debug!("File input exhausted");
        }));

        Ok(rx)
    }

    fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if self.samples.take().is_some() {
            info!("File input closed: {}", self.path);
        }
    }

    fn is_open(&self) -> bool {
        self.samples.is_some()
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}
