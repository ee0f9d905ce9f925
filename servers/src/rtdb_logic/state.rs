use lib_rtdb::RtdbServer;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    // Engine shared by every connection
    pub server: Arc<RtdbServer>,
    // Fired once when the process shuts down
    pub shutdown: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(server: Arc<RtdbServer>, shutdown: broadcast::Sender<()>) -> Self {
        Self { server, shutdown }
    }
}
