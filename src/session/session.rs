use std::future::Future;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::state::{SessionState, StatusCallback, StatusUpdate};
use super::stats::SessionStats;
use crate::audio::codec::decode_base64_audio;
use crate::audio::{CapturePipeline, InputDevice, OutputDevice, PlaybackScheduler, ScheduledSource};
use crate::error::{VoiceError, VoiceResult};
use crate::live::{Blob, LiveConnection, LiveConnector, ServerEvent};

/// A live voice exchange: microphone frames out, response audio in.
///
/// All inbound events, source-end notifications and stop requests are
/// handled on the task that drives `run()`, so scheduling and interruption
/// never race each other.
pub struct VoiceSession {
    /// Session configuration
    config: SessionConfig,

    state: SessionState,

    /// Observer of every state transition
    status: StatusCallback,

    connector: Box<dyn LiveConnector>,

    capture: CapturePipeline,

    playback: PlaybackScheduler,

    /// Present between a successful connect and release
    connection: Option<LiveConnection>,

    started_at: Option<DateTime<Utc>>,

    chunks_scheduled: usize,

    chunks_dropped: usize,

    interruptions: usize,

    last_error: Option<String>,
}

impl VoiceSession {
    /// Create a session over explicit devices and a connector
    pub fn new(
        config: SessionConfig,
        connector: Box<dyn LiveConnector>,
        input: Box<dyn InputDevice>,
        output: Box<dyn OutputDevice>,
        status: StatusCallback,
    ) -> Self {
        info!("Creating voice session: {}", config.session_id);

        let capture = CapturePipeline::new(input, config.capture());
        let playback = PlaybackScheduler::new(output);

        Self {
            config,
            state: SessionState::Idle,
            status,
            connector,
            capture,
            playback,
            connection: None,
            started_at: None,
            chunks_scheduled: 0,
            chunks_dropped: 0,
            interruptions: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    /// Acquire the devices and open the remote connection.
    ///
    /// Device and connection setup run concurrently; a device failure drops
    /// the in-flight connection attempt and returns the session to `Idle`.
    /// Starting while another start is in progress or the session is live is
    /// rejected.
    pub async fn start(&mut self) -> VoiceResult<()> {
        if !self.state.can_start() {
            warn!("Session {} already {}", self.config.session_id, self.state);
            return Err(VoiceError::SessionActive(self.state.to_string()));
        }

        if self.state != SessionState::Idle {
            self.transition(SessionState::Idle, None);
        }

        info!("Starting voice session: {}", self.config.session_id);

        self.started_at = Some(Utc::now());
        self.chunks_scheduled = 0;
        self.chunks_dropped = 0;
        self.interruptions = 0;
        self.last_error = None;
        self.capture.reset_stats();
        self.transition(SessionState::Connecting, None);

        let output_config = self.config.output();
        let capture = &mut self.capture;
        let playback = &mut self.playback;
        let connector = &mut self.connector;

        let devices = async {
            capture.acquire().await?;
            playback
                .open(&output_config)
                .await
                .map_err(|e| match e {
                    VoiceError::DeviceUnavailable(_) => e,
                    other => VoiceError::DeviceUnavailable(other.to_string()),
                })
        };

        let acquired = tokio::try_join!(devices, connector.connect());

        match acquired {
            Ok(((), connection)) => {
                info!("Live connection open, waiting for acknowledgment");
                self.connection = Some(connection);
                Ok(())
            }
            Err(e @ VoiceError::DeviceUnavailable(_)) => {
                error!("Failed to acquire audio devices: {}", e);
                self.release();
                self.last_error = Some(e.to_string());
                self.transition(SessionState::Idle, Some(e.to_string()));
                Err(e)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// React to one event from the live endpoint
    pub fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Open => self.on_open(),

            ServerEvent::Audio(blob) => {
                if self.state != SessionState::Active {
                    debug!("Ignoring audio while {}", self.state);
                    return;
                }
                if let Err(e) = self.play_chunk(&blob) {
                    self.chunks_dropped += 1;
                    warn!("Dropping response chunk: {}", e);
                }
            }

            ServerEvent::Interrupted => {
                if self.state == SessionState::Active {
                    self.interruptions += 1;
                    self.playback.interrupt();
                }
            }

            ServerEvent::TurnComplete => debug!("Model turn complete"),

            ServerEvent::Transcript(text) => info!("Model: {}", text),

            ServerEvent::GoAway(time_left) => {
                warn!(
                    "Live endpoint will close soon (time left: {})",
                    time_left.as_deref().unwrap_or("unknown")
                );
            }

            ServerEvent::Error(message) => {
                if self.state.is_live() {
                    self.fail(&VoiceError::Connection(message));
                }
            }

            ServerEvent::Closed(reason) => {
                if self.state.is_live() {
                    info!("Remote close: {}", reason);
                    self.shutdown(Some(VoiceError::RemoteClose(reason).to_string()));
                }
            }
        }
    }

    /// Forget a playback source that finished on its own
    pub fn source_ended(&mut self, id: crate::audio::SourceId) {
        self.playback.source_ended(id);
    }

    /// Release everything and close. Safe from any state; repeated calls
    /// are no-ops.
    pub fn stop(&mut self) {
        match self.state {
            SessionState::Connecting | SessionState::Active => self.shutdown(None),
            SessionState::Errored => self.release(),
            SessionState::Idle | SessionState::Closing | SessionState::Closed => {
                debug!("Stop ignored while {}", self.state);
            }
        }
    }

    /// Drive the session until it is closed or errored, or `shutdown`
    /// resolves (which stops it).
    pub async fn run<F>(&mut self, shutdown: F) -> SessionStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        while self.state.is_live() {
            let Some(connection) = self.connection.as_mut() else {
                break;
            };

            tokio::select! {
                event = connection.inbound.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => self.handle_event(ServerEvent::Closed(
                        "connection task ended".to_string(),
                    )),
                },
                Some(id) = self.playback.next_ended() => self.playback.source_ended(id),
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    self.stop();
                }
            }
        }

        self.stats()
    }

    pub fn stats(&self) -> SessionStats {
        let duration_secs = self
            .started_at
            .map(|t| Utc::now().signed_duration_since(t).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        SessionStats {
            session_id: self.config.session_id.clone(),
            state: self.state,
            started_at: self.started_at,
            duration_secs,
            frames_sent: self.capture.frames_sent(),
            chunks_scheduled: self.chunks_scheduled,
            chunks_dropped: self.chunks_dropped,
            interruptions: self.interruptions,
            active_sources: self.playback.active_count(),
            last_error: self.last_error.clone(),
        }
    }

    /// Current playback cursor, for diagnostics
    pub fn playback_cursor(&self) -> f64 {
        self.playback.cursor()
    }

    /// Whether any device or the connection is still held
    pub fn holds_resources(&self) -> bool {
        self.connection.is_some() || self.capture.is_acquired() || self.playback.is_open()
    }

    fn on_open(&mut self) {
        if self.state != SessionState::Connecting {
            debug!("Ignoring open acknowledgment while {}", self.state);
            return;
        }

        let Some(sink) = self.connection.as_ref().map(|c| c.outbound.clone()) else {
            return;
        };

        self.transition(SessionState::Active, None);

        if let Err(e) = self.capture.start(sink) {
            self.fail(&e);
        }
    }

    fn play_chunk(&mut self, blob: &Blob) -> VoiceResult<ScheduledSource> {
        let sample_rate = blob.pcm_rate().unwrap_or(self.config.output_sample_rate);
        let buffer = decode_base64_audio(
            &blob.data,
            sample_rate,
            self.config.output_channels as usize,
        )?;

        self.playback.reap_ended();
        let source = self.playback.schedule(buffer)?;
        self.chunks_scheduled += 1;

        Ok(source)
    }

    /// `Connecting | Active -> Closing -> Closed`
    fn shutdown(&mut self, reason: Option<String>) {
        info!("Stopping voice session: {}", self.config.session_id);
        self.transition(SessionState::Closing, reason);
        self.release();
        self.transition(SessionState::Closed, None);
        info!("Voice session stopped: {}", self.config.session_id);
    }

    /// `Connecting | Active -> Errored`, releasing everything first
    fn fail(&mut self, err: &VoiceError) {
        error!("Voice session {} failed: {}", self.config.session_id, err);
        self.release();
        self.last_error = Some(err.to_string());
        self.transition(SessionState::Errored, Some(err.to_string()));
    }

    /// Release connection, capture and playback. Each resource is released
    /// at most once however many paths call this.
    fn release(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        self.capture.stop();
        self.playback.close();
    }

    fn transition(&mut self, next: SessionState, detail: Option<String>) {
        info!(
            "Session {}: {} -> {}",
            self.config.session_id, self.state, next
        );
        self.state = next;

        let mut update = StatusUpdate::new(self.config.session_id.clone(), next);
        update.detail = detail;
        (self.status)(&update);
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        if self.holds_resources() {
            warn!(
                "Voice session {} dropped while holding devices, releasing",
                self.config.session_id
            );
            self.release();
        }
    }
}
