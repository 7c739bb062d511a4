//! In-memory devices and connector for driving a voice session in tests
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use echo_hub::audio::{AudioBuffer, EndedNotifier, InputConfig, OutputConfig, SourceId};
use echo_hub::live::{LiveConnection, RealtimeInput, ServerEvent};
use echo_hub::{
    InputDevice, LiveConnector, OutputDevice, SessionConfig, SessionState, StatusCallback,
    StatusUpdate, VoiceError, VoiceResult, VoiceSession,
};
use tokio::sync::mpsc;

#[derive(Default)]
pub struct InputState {
    pub open: bool,
    pub fail_open: Option<String>,
    pub opens: usize,
    pub closes: usize,
    pub blocks: Option<mpsc::Sender<Vec<f32>>>,
}

/// Microphone whose blocks are pushed by the test
#[derive(Clone, Default)]
pub struct FakeInput(pub Arc<Mutex<InputState>>);

impl FakeInput {
    pub fn failing(reason: &str) -> Self {
        let input = Self::default();
        input.0.lock().unwrap().fail_open = Some(reason.to_string());
        input
    }

    /// Deliver one block as the device callback would
    pub fn push(&self, block: Vec<f32>) {
        let state = self.0.lock().unwrap();
        let tx = state.blocks.as_ref().expect("input not started");
        tx.try_send(block).expect("input queue full");
    }

    pub fn closes(&self) -> usize {
        self.0.lock().unwrap().closes
    }
}

#[async_trait::async_trait]
impl InputDevice for FakeInput {
    async fn open(&mut self, _config: &InputConfig) -> VoiceResult<()> {
        let mut state = self.0.lock().unwrap();
        if let Some(reason) = &state.fail_open {
            return Err(VoiceError::DeviceUnavailable(reason.clone()));
        }
        state.open = true;
        state.opens += 1;
        Ok(())
    }

    fn start(&mut self) -> VoiceResult<mpsc::Receiver<Vec<f32>>> {
        let (tx, rx) = mpsc::channel(64);
        self.0.lock().unwrap().blocks = Some(tx);
        Ok(rx)
    }

    fn close(&mut self) {
        let mut state = self.0.lock().unwrap();
        if state.open {
            state.open = false;
            state.closes += 1;
            state.blocks = None;
        }
    }

    fn is_open(&self) -> bool {
        self.0.lock().unwrap().open
    }

    fn name(&self) -> &str {
        "fake-input"
    }
}

#[derive(Default)]
pub struct OutputState {
    pub open: bool,
    pub now: f64,
    pub closes: usize,
    /// (id, start time, duration)
    pub started: Vec<(SourceId, f64, f64)>,
    pub stopped: Vec<SourceId>,
    pub notifiers: Vec<EndedNotifier>,
}

/// Speaker with a clock the test moves by hand
#[derive(Clone, Default)]
pub struct FakeOutput(pub Arc<Mutex<OutputState>>);

impl FakeOutput {
    pub fn set_time(&self, now: f64) {
        self.0.lock().unwrap().now = now;
    }

    pub fn started(&self) -> Vec<(SourceId, f64, f64)> {
        self.0.lock().unwrap().started.clone()
    }

    pub fn stopped(&self) -> Vec<SourceId> {
        self.0.lock().unwrap().stopped.clone()
    }

    pub fn closes(&self) -> usize {
        self.0.lock().unwrap().closes
    }

    /// Finish every started source as if it played out
    pub fn finish_all(&self) {
        let notifiers = std::mem::take(&mut self.0.lock().unwrap().notifiers);
        for notifier in notifiers {
            notifier.notify();
        }
    }
}

#[async_trait::async_trait]
impl OutputDevice for FakeOutput {
    async fn open(&mut self, _config: &OutputConfig) -> VoiceResult<()> {
        self.0.lock().unwrap().open = true;
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.0.lock().unwrap().now
    }

    fn start_source(
        &mut self,
        buffer: AudioBuffer,
        when: f64,
        ended: EndedNotifier,
    ) -> VoiceResult<()> {
        let mut state = self.0.lock().unwrap();
        state.started.push((ended.id(), when, buffer.duration()));
        state.notifiers.push(ended);
        Ok(())
    }

    fn stop_source(&mut self, id: SourceId) {
        self.0.lock().unwrap().stopped.push(id);
    }

    fn close(&mut self) {
        let mut state = self.0.lock().unwrap();
        if state.open {
            state.open = false;
            state.closes += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.0.lock().unwrap().open
    }

    fn name(&self) -> &str {
        "fake-output"
    }
}

/// The far side of a fake live connection
pub struct RemoteEnd {
    /// Frames the session sent
    pub outbound: mpsc::Receiver<RealtimeInput>,
    /// Events to deliver to the session
    pub inbound: mpsc::Sender<ServerEvent>,
}

/// Connector backed by in-memory channels
#[derive(Clone, Default)]
pub struct FakeConnector {
    pub fail: Option<String>,
    remote: Arc<Mutex<Option<RemoteEnd>>>,
}

impl FakeConnector {
    pub fn failing(reason: &str) -> Self {
        Self {
            fail: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// Take the remote end of the latest connection
    pub fn remote(&self) -> RemoteEnd {
        self.remote
            .lock()
            .unwrap()
            .take()
            .expect("no connection was opened")
    }
}

#[async_trait::async_trait]
impl LiveConnector for FakeConnector {
    async fn connect(&mut self) -> VoiceResult<LiveConnection> {
        if let Some(reason) = &self.fail {
            return Err(VoiceError::Connection(reason.clone()));
        }

        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);
        *self.remote.lock().unwrap() = Some(RemoteEnd {
            outbound: out_rx,
            inbound: in_tx,
        });

        Ok(LiveConnection::new(out_tx, in_rx))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Every status update the session published, in order
#[derive(Clone, Default)]
pub struct StatusLog(pub Arc<Mutex<Vec<StatusUpdate>>>);

impl StatusLog {
    pub fn callback(&self) -> StatusCallback {
        let log = Arc::clone(&self.0);
        Arc::new(move |update: &StatusUpdate| log.lock().unwrap().push(update.clone()))
    }

    pub fn states(&self) -> Vec<SessionState> {
        self.0.lock().unwrap().iter().map(|u| u.state).collect()
    }

    pub fn last(&self) -> Option<StatusUpdate> {
        self.0.lock().unwrap().last().cloned()
    }
}

pub struct Harness {
    pub session: VoiceSession,
    pub input: FakeInput,
    pub output: FakeOutput,
    pub connector: FakeConnector,
    pub log: StatusLog,
}

pub fn harness_with(input: FakeInput, connector: FakeConnector) -> Harness {
    let output = FakeOutput::default();
    let log = StatusLog::default();
    let config = SessionConfig {
        session_id: "test-session".to_string(),
        ..SessionConfig::default()
    };

    let session = VoiceSession::new(
        config,
        Box::new(connector.clone()),
        Box::new(input.clone()),
        Box::new(output.clone()),
        log.callback(),
    );

    Harness {
        session,
        input,
        output,
        connector,
        log,
    }
}

pub fn harness() -> Harness {
    harness_with(FakeInput::default(), FakeConnector::default())
}

/// Start the session and acknowledge it, leaving it `Active`
pub async fn active_harness() -> (Harness, RemoteEnd) {
    let mut h = harness();
    h.session.start().await.expect("start failed");
    h.session.handle_event(ServerEvent::Open);
    assert_eq!(h.session.state(), SessionState::Active);
    let remote = h.connector.remote();
    (h, remote)
}
