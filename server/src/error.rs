//! Error types for the relay server.

use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding or accepting on the TCP listener failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The WebSocket handshake or a frame read failed
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// The session loop has stopped and no longer accepts events
    #[error("session loop is no longer running")]
    SessionClosed,
}
