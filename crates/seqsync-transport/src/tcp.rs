//! TCP transport for seqsync
//!
//! Newline-delimited JSON: one operation per inbound line, one full document
//! per outbound line.

use std::net::SocketAddr;
use std::sync::Arc;

use seqsync_protocol::LineParser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::hub::SyncHub;
use crate::session::{Outbox, SessionHandle};

/// TCP Server for seqsync
pub struct TcpServer {
    hub: Arc<SyncHub>,
    addr: SocketAddr,
}

impl TcpServer {
    pub fn new(hub: Arc<SyncHub>, addr: SocketAddr) -> Self {
        Self { hub, addr }
    }

    /// Bind and start the TCP server
    pub async fn run(&self) -> Result<(), TransportError> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "seqsync TCP server listening");
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<(), TransportError> {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let hub = self.hub.clone();

                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, peer_addr, hub).await {
                            error!(peer = %peer_addr, error = %e, "Connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        peer_addr: SocketAddr,
        hub: Arc<SyncHub>,
    ) -> Result<(), TransportError> {
        let (handle, outbox) = hub.connect(format!("tcp:{}", peer_addr)).await?;

        let result = Self::session_loop(stream, handle, outbox, &hub).await;
        hub.disconnect(handle);
        result
    }

    async fn session_loop(
        mut stream: TcpStream,
        handle: SessionHandle,
        mut outbox: Outbox,
        hub: &SyncHub,
    ) -> Result<(), TransportError> {
        let mut parser = LineParser::new();
        let mut buf = vec![0u8; 4096];

        loop {
            tokio::select! {
                result = stream.read(&mut buf) => {
                    let n = result?;
                    if n == 0 {
                        info!(session = %handle.id(), "Client disconnected");
                        return Ok(());
                    }

                    if let Err(e) = parser.feed(&buf[..n]) {
                        warn!(session = %handle.id(), error = %e, "Discarding oversized frame");
                    }

                    while let Some(line) = parser.next_line() {
                        // Failures are logged by the hub; the session stays open
                        let _ = hub.receive(handle, &line).await;
                    }
                }

                push = outbox.recv() => {
                    match push {
                        Some(push) => {
                            debug!(session = %handle.id(), version = push.version, "Sending document");
                            stream.write_all(push.payload()).await?;
                            stream.write_all(b"\n").await?;
                        }
                        None => {
                            info!(session = %handle.id(), "Session evicted by hub");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
