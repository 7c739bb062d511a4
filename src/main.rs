use anyhow::{Context, Result};
use clap::Parser;
use echo_hub::{
    create_router, AppState, AudioDeviceFactory, Config, InputSource, OutputSink, SessionState,
    StatusCallback, StatusUpdate, VoiceSession, WebSocketConnector,
};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "echo-hub")]
#[command(about = "Live voice conversation with a streaming speech model")]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/echo-hub")]
    config: String,

    /// Replay a WAV file instead of the microphone
    #[arg(short, long)]
    input_file: Option<String>,

    /// Discard response audio instead of playing it
    #[arg(long)]
    no_playback: bool,

    /// Do not serve the HTTP status API
    #[arg(long)]
    no_http: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("TLS crypto provider already installed");
    }

    let cfg = Config::load(&args.config)?;
    info!("Echo Hub v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let api_key = cfg.api_key()?;
    let session_config = cfg.session_config();
    let session_id = session_config.session_id.clone();

    let input = match args.input_file {
        Some(path) => {
            info!("Using input file: {}", path);
            AudioDeviceFactory::input(InputSource::File(path))?
        }
        None => AudioDeviceFactory::input(InputSource::Microphone)?,
    };
    let output = if args.no_playback {
        AudioDeviceFactory::output(OutputSink::Null)?
    } else {
        AudioDeviceFactory::output(OutputSink::Speaker)?
    };

    let (status_tx, status_rx) =
        watch::channel(StatusUpdate::new(session_id.clone(), SessionState::Idle));
    let status: StatusCallback = Arc::new(move |update: &StatusUpdate| {
        status_tx.send_replace(update.clone());
    });

    let stop = Arc::new(Notify::new());

    if !args.no_http {
        let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind HTTP server to {}", addr))?;
        let app = create_router(AppState::new(status_rx, Arc::clone(&stop)));

        info!("HTTP status API listening on {}", addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("HTTP server error: {}", e);
            }
        });
    }

    let connector = WebSocketConnector::new(cfg.live_config(api_key));
    let mut session = VoiceSession::new(session_config, Box::new(connector), input, output, status);

    session
        .start()
        .await
        .with_context(|| format!("Failed to start session {}", session_id))?;

    let stats = session
        .run(async {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
                _ = stop.notified() => info!("Stop requested"),
            }
        })
        .await;

    info!(
        "Session {} ended {} after {:.1}s: {} frames sent, {} chunks played, {} dropped, {} interruptions",
        stats.session_id,
        stats.state,
        stats.duration_secs,
        stats.frames_sent,
        stats.chunks_scheduled,
        stats.chunks_dropped,
        stats.interruptions
    );
    if let Some(err) = &stats.last_error {
        error!("Last error: {}", err);
    }

    session.stop();
    Ok(())
}
