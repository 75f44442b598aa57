//! seqsync hub and transport layer
//!
//! - Hub: owns the shared replica and the session registry
//! - TCP: newline-delimited JSON sessions
//! - WebSocket: browser-compatible sessions

pub mod error;
pub mod hub;
pub mod session;
#[cfg(feature = "tcp")]
pub mod tcp;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use error::{HubError, TransportError};
pub use hub::{BroadcastReport, HubConfig, HubStats, SyncHub};
pub use session::{Outbox, SessionHandle, SessionId};
#[cfg(feature = "tcp")]
pub use tcp::TcpServer;
#[cfg(feature = "websocket")]
pub use websocket::WebSocketServer;
