use anyhow::Context;
use futures::{SinkExt, StreamExt};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::messages::{ClientMessage, RealtimeInput, ServerEvent, ServerMessage, Setup};
use crate::error::{VoiceError, VoiceResult};

/// Channel capacity in each direction of a live connection
const LIVE_CHANNEL_CAPACITY: usize = 256;

/// How long the transport gets to send its close frame before it is aborted
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Endpoint and session parameters for the live websocket
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Websocket URL without the API key
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// Prebuilt voice name (None = server default)
    pub voice: Option<String>,
    pub system_instruction: Option<String>,
}

/// An open bidirectional session with the live endpoint.
///
/// Outbound frames go into `outbound`; lifecycle and content events come out
/// of `inbound`. Dropping the connection closes the transport.
pub struct LiveConnection {
    pub outbound: mpsc::Sender<RealtimeInput>,
    pub inbound: mpsc::Receiver<ServerEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl LiveConnection {
    pub fn new(
        outbound: mpsc::Sender<RealtimeInput>,
        inbound: mpsc::Receiver<ServerEvent>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            shutdown: None,
            task: None,
        }
    }

    /// Attach the task that owns the transport. `shutdown` asks it to close
    /// cleanly.
    pub fn with_transport(mut self, task: JoinHandle<()>, shutdown: oneshot::Sender<()>) -> Self {
        self.task = Some(task);
        self.shutdown = Some(shutdown);
        self
    }

    /// Ask the transport to close and stop listening; idempotent.
    ///
    /// The transport gets `CLOSE_GRACE` to finish its closing handshake and is
    /// aborted after that.
    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                            warn!("Live transport did not close in time, aborting");
                            task.abort();
                        }
                    });
                }
                Err(_) => task.abort(),
            }
            info!("Live connection closed");
        }

        self.inbound.close();
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens live connections. The session controller only talks to this trait.
#[async_trait::async_trait]
pub trait LiveConnector: Send {
    /// Open a connection and send the session setup. The open
    /// acknowledgment arrives later as `ServerEvent::Open`.
    async fn connect(&mut self) -> VoiceResult<LiveConnection>;

    fn name(&self) -> &str;
}

/// Live endpoint over a TLS websocket
pub struct WebSocketConnector {
    config: LiveConfig,
}

impl WebSocketConnector {
    pub fn new(config: LiveConfig) -> Self {
        Self { config }
    }

    fn url(&self) -> String {
        format!("{}?key={}", self.config.endpoint, self.config.api_key)
    }

    fn setup_message(&self) -> anyhow::Result<String> {
        let setup = Setup::audio(
            &self.config.model,
            self.config.voice.as_deref(),
            self.config.system_instruction.as_deref(),
        );
        serde_json::to_string(&ClientMessage::Setup(setup)).context("Failed to serialize setup")
    }

    async fn open(&self) -> anyhow::Result<LiveConnection> {
        info!(
            "Connecting to live endpoint {} (model {})",
            self.config.endpoint, self.config.model
        );

        let (ws, _response) = tokio_tungstenite::connect_async(self.url())
            .await
            .context("Failed to open websocket")?;
        let (mut ws_sink, mut ws_stream) = ws.split();

        ws_sink
            .send(Message::Text(self.setup_message()?.into()))
            .await
            .context("Failed to send session setup")?;

        info!("Connected, waiting for setup acknowledgment");

        let (out_tx, mut out_rx) = mpsc::channel::<RealtimeInput>(LIVE_CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<ServerEvent>(LIVE_CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        debug!("Closing websocket");
                        if let Err(e) = ws_sink.send(Message::Close(None)).await {
                            debug!("Failed to send close frame: {}", e);
                        }
                        break;
                    }

                    outgoing = out_rx.recv() => {
                        let Some(input) = outgoing else {
                            debug!("Outbound channel closed, closing websocket");
                            let _ = ws_sink.send(Message::Close(None)).await;
                            break;
                        };

                        let json = match serde_json::to_string(&ClientMessage::from(input)) {
                            Ok(json) => json,
                            Err(e) => {
                                error!("Failed to serialize realtime input: {}", e);
                                continue;
                            }
                        };

                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            error!("Failed to send websocket message: {}", e);
                            let _ = in_tx.send(ServerEvent::Error(e.to_string())).await;
                            break;
                        }
                    }

                    incoming = ws_stream.next() => {
                        let message = match incoming {
                            Some(Ok(message)) => message,
                            Some(Err(e)) => {
                                error!("Websocket error: {}", e);
                                let _ = in_tx.send(ServerEvent::Error(e.to_string())).await;
                                break;
                            }
                            None => {
                                let _ = in_tx
                                    .send(ServerEvent::Closed("stream ended".to_string()))
                                    .await;
                                break;
                            }
                        };

                        let parsed = match message {
                            Message::Text(text) => serde_json::from_str::<ServerMessage>(text.as_str()),
                            Message::Binary(data) => serde_json::from_slice::<ServerMessage>(&data),
                            Message::Close(frame) => {
                                let reason = frame
                                    .map(|f| format!("{} {}", f.code, f.reason.as_str()))
                                    .unwrap_or_else(|| "no close frame".to_string());
                                info!("Live endpoint closed the session: {}", reason);
                                let _ = in_tx.send(ServerEvent::Closed(reason)).await;
                                break;
                            }
                            _ => continue,
                        };

                        match parsed {
                            Ok(server_message) => {
                                for event in server_message.into_events() {
                                    if in_tx.send(event).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            Err(e) => warn!("Failed to parse server message: {}", e),
                        }
                    }
                }
            }
        });

        Ok(LiveConnection::new(out_tx, in_rx).with_transport(task, shutdown_tx))
    }
}

#[async_trait::async_trait]
impl LiveConnector for WebSocketConnector {
    async fn connect(&mut self) -> VoiceResult<LiveConnection> {
        self.open()
            .await
            .map_err(|e| VoiceError::Connection(format!("{:#}", e)))
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LiveConfig {
        LiveConfig {
            endpoint: "wss://example.invalid/live".to_string(),
            api_key: "secret".to_string(),
            model: "gemini-live".to_string(),
            voice: Some("Zephyr".to_string()),
            system_instruction: None,
        }
    }

    #[test]
    fn test_url_carries_key() {
        let connector = WebSocketConnector::new(config());
        assert_eq!(connector.url(), "wss://example.invalid/live?key=secret");
    }

    #[test]
    fn test_setup_message_is_first_frame_payload() {
        let connector = WebSocketConnector::new(config());
        let json: serde_json::Value =
            serde_json::from_str(&connector.setup_message().unwrap()).unwrap();
        assert_eq!(json["setup"]["model"], "models/gemini-live");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (out_tx, _out_rx) = mpsc::channel(1);
        let (_in_tx, in_rx) = mpsc::channel(1);
        let (shutdown_tx, _shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(std::future::pending::<()>());

        let mut connection = LiveConnection::new(out_tx, in_rx).with_transport(task, shutdown_tx);
        connection.close();
        connection.close();
    }

    #[tokio::test]
    async fn test_close_lets_transport_finish() {
        let (out_tx, _out_rx) = mpsc::channel(1);
        let (_in_tx, in_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (closed_tx, closed_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            if shutdown_rx.await.is_ok() {
                let _ = closed_tx.send("close frame");
            }
        });

        let mut connection = LiveConnection::new(out_tx, in_rx).with_transport(task, shutdown_tx);
        connection.close();

        assert_eq!(closed_rx.await.unwrap(), "close frame");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_transport_is_aborted() {
        let (out_tx, _out_rx) = mpsc::channel(1);
        let (_in_tx, in_rx) = mpsc::channel(1);
        let (shutdown_tx, _shutdown_rx) = oneshot::channel::<()>();
        let (alive_tx, alive_rx) = oneshot::channel::<()>();

        // Ignores the shutdown request; dropping `alive_tx` marks the abort
        let task = tokio::spawn(async move {
            let _alive = alive_tx;
            std::future::pending::<()>().await;
        });

        let mut connection = LiveConnection::new(out_tx, in_rx).with_transport(task, shutdown_tx);
        connection.close();

        assert!(alive_rx.await.is_err());
    }
}
