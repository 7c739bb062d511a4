//! Gapless playback of inbound audio chunks.
//!
//! The scheduler owns a cursor on the output device clock. Each chunk starts
//! at `max(cursor, now)` and pushes the cursor forward by its duration, so
//! chunks scheduled back to back play with no gap and no overlap as long as
//! decoding keeps ahead of the buffered audio.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::device::{AudioBuffer, EndedNotifier, OutputConfig, OutputDevice, SourceId};
use crate::error::VoiceResult;

/// A source that has been handed to the output device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSource {
    pub id: SourceId,
    /// Device time at which the source starts, in seconds
    pub start: f64,
    /// Source length in seconds
    pub duration: f64,
}

pub struct PlaybackScheduler {
    output: Box<dyn OutputDevice>,
    cursor: f64,
    active: HashMap<SourceId, ScheduledSource>,
    next_id: SourceId,
    ended_tx: mpsc::UnboundedSender<SourceId>,
    ended_rx: mpsc::UnboundedReceiver<SourceId>,
}

impl PlaybackScheduler {
    pub fn new(output: Box<dyn OutputDevice>) -> Self {
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        Self {
            output,
            cursor: 0.0,
            active: HashMap::new(),
            next_id: 0,
            ended_tx,
            ended_rx,
        }
    }

    /// Acquire the output device
    pub async fn open(&mut self, config: &OutputConfig) -> VoiceResult<()> {
        self.output.open(config).await?;
        info!("Playback ready on {}", self.output.name());
        Ok(())
    }

    /// Schedule `buffer` right after everything already scheduled
    pub fn schedule(&mut self, buffer: AudioBuffer) -> VoiceResult<ScheduledSource> {
        let now = self.output.current_time();
        self.cursor = self.cursor.max(now);

        let id = self.next_id;
        self.next_id += 1;

        let source = ScheduledSource {
            id,
            start: self.cursor,
            duration: buffer.duration(),
        };

        self.output.start_source(
            buffer,
            source.start,
            EndedNotifier::new(id, self.ended_tx.clone()),
        )?;

        self.cursor += source.duration;
        self.active.insert(id, source);

        debug!(
            "Scheduled source {} at {:.3}s for {:.3}s (cursor {:.3}s)",
            id, source.start, source.duration, self.cursor
        );

        Ok(source)
    }

    /// Stop everything that is playing or queued and reset the cursor.
    ///
    /// The cursor goes back to 0; the next `schedule` re-anchors it to the
    /// device clock.
    pub fn interrupt(&mut self) {
        let stopped = self.active.len();
        for id in self.active.drain().map(|(id, _)| id) {
            self.output.stop_source(id);
        }
        self.cursor = 0.0;

        // Stale end notifications from before the flush
        while self.ended_rx.try_recv().is_ok() {}

        info!("Playback interrupted ({} sources stopped)", stopped);
    }

    /// Forget a source that finished on its own
    pub fn source_ended(&mut self, id: SourceId) {
        if self.active.remove(&id).is_some() {
            debug!("Source {} finished", id);
        }
    }

    /// Wait for the next natural end of a source
    pub async fn next_ended(&mut self) -> Option<SourceId> {
        self.ended_rx.recv().await
    }

    /// Apply every end notification already delivered
    pub fn reap_ended(&mut self) {
        while let Ok(id) = self.ended_rx.try_recv() {
            self.source_ended(id);
        }
    }

    /// Flush playback and release the output device; idempotent.
    ///
    /// The cursor always returns to 0: a reopened device starts a new clock.
    pub fn close(&mut self) {
        if !self.active.is_empty() {
            self.interrupt();
        }
        self.cursor = 0.0;
        while self.ended_rx.try_recv().is_ok() {}

        if self.output.is_open() {
            self.output.close();
        }
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn current_time(&self) -> f64 {
        self.output.current_time()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, id: SourceId) -> bool {
        self.active.contains_key(&id)
    }

    pub fn is_open(&self) -> bool {
        self.output.is_open()
    }
}
