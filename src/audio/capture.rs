use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::codec::encode_float_frame;
use super::device::{InputConfig, InputDevice};
use crate::error::{VoiceError, VoiceResult};
use crate::live::RealtimeInput;

/// Where encoded frames go (the live connection's outbound queue)
pub type FrameSink = mpsc::Sender<RealtimeInput>;

/// Capture format and framing
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Microphone sample rate in Hz (default: 16000)
    pub sample_rate: u32,
    /// Samples per outbound frame (default: 4096)
    pub frame_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            frame_size: 4096,
        }
    }
}

/// Cuts an arbitrary stream of sample blocks into fixed-size frames
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size),
        }
    }

    /// Add a block; returns every frame it completes, in order
    pub fn push(&mut self, block: &[f32]) -> Vec<Vec<f32>> {
        let mut frames = Vec::new();
        let mut rest = block;

        while !rest.is_empty() {
            let take = (self.frame_size - self.pending.len()).min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.frame_size {
                frames.push(std::mem::replace(
                    &mut self.pending,
                    Vec::with_capacity(self.frame_size),
                ));
            }
        }

        frames
    }

    /// Samples waiting for a full frame
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Microphone → fixed frames → base64 PCM → sink.
///
/// Frames are encoded and sent on one task, so they reach the sink in capture
/// order. The device side only ever does a non-blocking queue hand-off.
pub struct CapturePipeline {
    input: Box<dyn InputDevice>,
    config: CaptureConfig,
    task: Option<JoinHandle<()>>,
    frames_sent: Arc<AtomicUsize>,
}

impl CapturePipeline {
    pub fn new(input: Box<dyn InputDevice>, config: CaptureConfig) -> Self {
        Self {
            input,
            config,
            task: None,
            frames_sent: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Acquire the microphone
    pub async fn acquire(&mut self) -> VoiceResult<()> {
        let input_config = InputConfig {
            sample_rate: self.config.sample_rate,
            channels: 1,
        };

        self.input.open(&input_config).await.map_err(|e| match e {
            VoiceError::DeviceUnavailable(_) => e,
            other => VoiceError::DeviceUnavailable(other.to_string()),
        })?;

        info!("Microphone acquired: {}", self.input.name());
        Ok(())
    }

    /// Begin producing frames into `sink`. The frame count starts over.
    pub fn start(&mut self, sink: FrameSink) -> VoiceResult<()> {
        if self.task.is_some() {
            warn!("Capture already running");
            return Ok(());
        }
        self.reset_stats();

        let mut blocks = self.input.start().map_err(|e| match e {
            VoiceError::DeviceUnavailable(_) => e,
            other => VoiceError::DeviceUnavailable(other.to_string()),
        })?;

        let frames_sent = Arc::clone(&self.frames_sent);
        let sample_rate = self.config.sample_rate;
        let mut assembler = FrameAssembler::new(self.config.frame_size);

        info!(
            "Capture started ({}Hz, {} samples per frame)",
            sample_rate, self.config.frame_size
        );

        self.task = Some(tokio::spawn(async move {
            while let Some(block) = blocks.recv().await {
                for frame in assembler.push(&block) {
                    let message = RealtimeInput::pcm(encode_float_frame(&frame), sample_rate);

                    if sink.send(message).await.is_err() {
                        debug!("Outbound channel closed, capture task exiting");
                        return;
                    }

                    let seq = frames_sent.fetch_add(1, Ordering::SeqCst);
                    debug!("Sent capture frame {}", seq);
                }
            }

            debug!("Input stream ended, capture task exiting");
        }));

        Ok(())
    }

    /// Halt frame production and release the microphone; idempotent
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if self.input.is_open() {
            self.input.close();
            info!(
                "Capture stopped after {} frames",
                self.frames_sent.load(Ordering::SeqCst)
            );
        }
    }

    /// Zero the frame counter
    pub fn reset_stats(&self) {
        self.frames_sent.store(0, Ordering::SeqCst);
    }

    pub fn frames_sent(&self) -> usize {
        self.frames_sent.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn is_acquired(&self) -> bool {
        self.input.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembler_emits_fixed_frames() {
        let mut assembler = FrameAssembler::new(4);

        assert!(assembler.push(&[1.0, 2.0, 3.0]).is_empty());
        let frames = assembler.push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);

        assert_eq!(
            frames,
            vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]
        );
        assert_eq!(assembler.pending(), 1);
    }

    #[test]
    fn test_assembler_exact_block() {
        let mut assembler = FrameAssembler::new(4096);
        let frames = assembler.push(&vec![0.5; 4096]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 4096);
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn test_capture_config_default() {
        let config = CaptureConfig::default();
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.frame_size, 4096);
    }
}
