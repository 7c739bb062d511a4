// Output device that discards audio but keeps a real-time clock
//
// Used for headless runs and tests. Each source "plays" by sleeping until its
// scheduled end on the tokio clock, then fires its ended notification.

use std::collections::HashMap;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::device::{AudioBuffer, EndedNotifier, OutputConfig, OutputDevice, SourceId};
use crate::error::{VoiceError, VoiceResult};

pub struct NullOutput {
    opened_at: Option<Instant>,
    sources: HashMap<SourceId, JoinHandle<()>>,
}

impl NullOutput {
    pub fn new() -> Self {
        Self {
            opened_at: None,
            sources: HashMap::new(),
        }
    }
}

impl Default for NullOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl OutputDevice for NullOutput {
    async fn open(&mut self, config: &OutputConfig) -> VoiceResult<()> {
        if self.opened_at.is_none() {
            info!(
                "Null output opened ({}Hz, {} channels)",
                config.sample_rate, config.channels
            );
            self.opened_at = Some(Instant::now());
        }
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.opened_at
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn start_source(
        &mut self,
        buffer: AudioBuffer,
        when: f64,
        ended: EndedNotifier,
    ) -> VoiceResult<()> {
        let opened_at = self
            .opened_at
            .ok_or_else(|| VoiceError::DeviceUnavailable("null output is not open".to_string()))?;

        self.sources.retain(|_, task| !task.is_finished());

        let id = ended.id();
        let end = opened_at + Duration::from_secs_f64((when + buffer.duration()).max(0.0));
        debug!("Null output source {} ends at {:.3}s", id, when + buffer.duration());

        let task = tokio::spawn(async move {
            tokio::time::sleep_until(end).await;
            ended.notify();
        });
        self.sources.insert(id, task);

        Ok(())
    }

    fn stop_source(&mut self, id: SourceId) {
        if let Some(task) = self.sources.remove(&id) {
            task.abort();
        }
    }

    fn close(&mut self) {
        if self.opened_at.take().is_none() {
            return;
        }
        for (_, task) in self.sources.drain() {
            task.abort();
        }
        info!("Null output closed");
    }

    fn is_open(&self) -> bool {
        self.opened_at.is_some()
    }

    fn name(&self) -> &str {
        "null output"
    }
}
