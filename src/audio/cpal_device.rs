// cpal microphone and speaker devices
//
// cpal streams are not Send, so each device parks its stream on a dedicated
// thread and talks to it over a command channel. The stream is built in
// `open()` so permission and format failures surface there.

use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::device::{
    AudioBuffer, EndedNotifier, InputConfig, InputDevice, OutputConfig, OutputDevice, SourceId,
    INPUT_QUEUE_CAPACITY,
};
use crate::error::{VoiceError, VoiceResult};

enum StreamCommand {
    Play,
    Stop,
}

/// Thread that owns one cpal stream until told to stop
struct StreamThread {
    commands: std_mpsc::Sender<StreamCommand>,
    thread: Option<JoinHandle<()>>,
}

impl StreamThread {
    /// Spawn the thread and wait, without blocking the runtime, until
    /// `build` has produced a stream
    async fn spawn<F>(name: &str, build: F) -> VoiceResult<Self>
    where
        F: FnOnce() -> VoiceResult<Stream> + Send + 'static,
    {
        let (ready_tx, ready_rx) = oneshot::channel::<VoiceResult<()>>();
        let (commands, command_rx) = std_mpsc::channel();

        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                while let Ok(command) = command_rx.recv() {
                    match command {
                        StreamCommand::Play => {
                            if let Err(e) = stream.play() {
                                error!("Failed to start audio stream: {}", e);
                            }
                        }
                        StreamCommand::Stop => break,
                    }
                }

                drop(stream);
            })?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(Self {
                commands,
                thread: Some(thread),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(VoiceError::DeviceUnavailable(
                "audio thread exited before the stream was built".to_string(),
            )),
        }
    }

    fn play(&self) -> VoiceResult<()> {
        self.commands
            .send(StreamCommand::Play)
            .map_err(|_| VoiceError::DeviceUnavailable("audio thread is gone".to_string()))
    }
}

impl Drop for StreamThread {
    /// Tells the thread to drop its stream and exit. The thread is detached
    /// rather than joined so the caller's task never waits on the device.
    fn drop(&mut self) {
        let _ = self.commands.send(StreamCommand::Stop);
        if let Some(thread) = self.thread.take() {
            if thread.is_finished() {
                if thread.join().is_err() {
                    warn!("Audio thread panicked");
                }
            } else {
                debug!("Audio thread {:?} shutting down", thread.thread().name());
            }
        }
    }
}

fn stream_config(sample_rate: u32, channels: u16) -> StreamConfig {
    StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

// ============================================================================
// Microphone
// ============================================================================

pub struct CpalInput {
    stream: Option<StreamThread>,
    pending_rx: Option<mpsc::Receiver<Vec<f32>>>,
}

impl CpalInput {
    pub fn new() -> Self {
        Self {
            stream: None,
            pending_rx: None,
        }
    }
}

impl Default for CpalInput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl InputDevice for CpalInput {
    async fn open(&mut self, config: &InputConfig) -> VoiceResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel(INPUT_QUEUE_CAPACITY);
        let stream_config = stream_config(config.sample_rate, config.channels);
        let channels = config.channels.max(1) as usize;

        info!(
            "Opening microphone ({}Hz, {} channels)",
            config.sample_rate, config.channels
        );

        let stream = StreamThread::spawn("echo-hub-mic", move || {
            let device = cpal::default_host()
                .default_input_device()
                .ok_or_else(|| VoiceError::DeviceUnavailable("no input device".to_string()))?;

            info!(
                "Using input device: {}",
                device.name().unwrap_or_else(|_| "Unknown".to_string())
            );

            let stream = device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let block: Vec<f32> = if channels == 1 {
                        data.to_vec()
                    } else {
                        data.chunks_exact(channels)
                            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                            .collect()
                    };
                    if tx.try_send(block).is_err() {
                        warn!("Microphone queue full or closed, dropping block");
                    }
                },
                move |err| {
                    error!("Microphone stream error: {}", err);
                },
                None,
            )?;

            Ok(stream)
        })
        .await?;

        self.stream = Some(stream);
        self.pending_rx = Some(rx);

        Ok(())
    }

    fn start(&mut self) -> VoiceResult<mpsc::Receiver<Vec<f32>>> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| VoiceError::DeviceUnavailable("microphone is not open".to_string()))?;
        let rx = self.pending_rx.take().ok_or_else(|| {
            VoiceError::DeviceUnavailable("microphone already started".to_string())
        })?;

        stream.play()?;
        info!("Microphone capture started");

        Ok(rx)
    }

    fn close(&mut self) {
        self.pending_rx = None;
        if self.stream.take().is_some() {
            info!("Microphone released");
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

// ============================================================================
// Speaker
// ============================================================================

struct PlayingSource {
    samples: Vec<f32>,
    start_frame: u64,
    ended: EndedNotifier,
}

/// Shared between the output callback and the device handle
struct OutputClock {
    sample_rate: u32,
    rendered_frames: u64,
    sources: Vec<PlayingSource>,
}

impl OutputClock {
    fn render(&mut self, data: &mut [f32], channels: usize) {
        let frames = data.len() / channels;

        for (i, frame) in data.chunks_exact_mut(channels).enumerate() {
            let t = self.rendered_frames + i as u64;
            let mut mixed = 0.0f32;
            for source in &self.sources {
                if t >= source.start_frame {
                    if let Some(sample) = source.samples.get((t - source.start_frame) as usize) {
                        mixed += sample;
                    }
                }
            }
            frame.fill(mixed.clamp(-1.0, 1.0));
        }

        self.rendered_frames += frames as u64;

        let now = self.rendered_frames;
        let (finished, playing): (Vec<_>, Vec<_>) = self
            .sources
            .drain(..)
            .partition(|s| s.start_frame + s.samples.len() as u64 <= now);
        self.sources = playing;

        for source in finished {
            source.ended.notify();
        }
    }
}

pub struct CpalOutput {
    stream: Option<StreamThread>,
    clock: Option<Arc<Mutex<OutputClock>>>,
}

impl CpalOutput {
    pub fn new() -> Self {
        Self {
            stream: None,
            clock: None,
        }
    }
}

impl Default for CpalOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl OutputDevice for CpalOutput {
    async fn open(&mut self, config: &OutputConfig) -> VoiceResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let clock = Arc::new(Mutex::new(OutputClock {
            sample_rate: config.sample_rate,
            rendered_frames: 0,
            sources: Vec::new(),
        }));
        let callback_clock = Arc::clone(&clock);
        let stream_config = stream_config(config.sample_rate, config.channels);
        let channels = config.channels.max(1) as usize;

        info!(
            "Opening speaker ({}Hz, {} channels)",
            config.sample_rate, config.channels
        );

        let stream = StreamThread::spawn("echo-hub-speaker", move || {
            let device = cpal::default_host()
                .default_output_device()
                .ok_or_else(|| VoiceError::DeviceUnavailable("no output device".to_string()))?;

            info!(
                "Using output device: {}",
                device.name().unwrap_or_else(|_| "Unknown".to_string())
            );

            let stream = device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| match callback_clock.lock() {
                    Ok(mut clock) => clock.render(data, channels),
                    Err(_) => data.fill(0.0),
                },
                move |err| {
                    error!("Speaker stream error: {}", err);
                },
                None,
            )?;

            Ok(stream)
        })
        .await?;

        stream.play()?;

        self.stream = Some(stream);
        self.clock = Some(clock);

        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.clock
            .as_ref()
            .and_then(|clock| clock.lock().ok())
            .map(|clock| clock.rendered_frames as f64 / clock.sample_rate as f64)
            .unwrap_or(0.0)
    }

    fn start_source(
        &mut self,
        buffer: AudioBuffer,
        when: f64,
        ended: EndedNotifier,
    ) -> VoiceResult<()> {
        let clock = self
            .clock
            .as_ref()
            .ok_or_else(|| VoiceError::DeviceUnavailable("speaker is not open".to_string()))?;
        let mut clock = clock
            .lock()
            .map_err(|_| VoiceError::DeviceUnavailable("speaker clock poisoned".to_string()))?;

        if buffer.sample_rate() != clock.sample_rate {
            return Err(VoiceError::DeviceUnavailable(format!(
                "buffer is {}Hz, speaker runs at {}Hz",
                buffer.sample_rate(),
                clock.sample_rate
            )));
        }

        let start_frame = (when.max(0.0) * clock.sample_rate as f64).round() as u64;
        debug!("Speaker source {} starts at frame {}", ended.id(), start_frame);

        clock.sources.push(PlayingSource {
            samples: buffer.downmix(),
            start_frame,
            ended,
        });

        Ok(())
    }

    fn stop_source(&mut self, id: SourceId) {
        if let Some(clock) = &self.clock {
            if let Ok(mut clock) = clock.lock() {
                clock.sources.retain(|s| s.ended.id() != id);
            }
        }
    }

    fn close(&mut self) {
        self.clock = None;
        if self.stream.take().is_some() {
            info!("Speaker released");
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn name(&self) -> &str {
        "cpal speaker"
    }
}
