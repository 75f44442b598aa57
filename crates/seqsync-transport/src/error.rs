//! Hub and transport error types

use crate::session::SessionId;
use seqsync_protocol::ProtocolError;
use thiserror::Error;

/// Errors returned by [`SyncHub`](crate::SyncHub) operations
#[derive(Error, Debug)]
pub enum HubError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),
}

/// Read or write failure on a session channel
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "websocket")]
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Hub error: {0}")]
    Hub(#[from] HubError),
}
