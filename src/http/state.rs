use crate::session::StatusUpdate;
use std::sync::Arc;
use tokio::sync::{watch, Notify};

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Latest status of the running voice session
    pub status: watch::Receiver<StatusUpdate>,

    /// Signalled when a client asks the session to stop
    pub stop: Arc<Notify>,
}

impl AppState {
    pub fn new(status: watch::Receiver<StatusUpdate>, stop: Arc<Notify>) -> Self {
        Self { status, stop }
    }
}
