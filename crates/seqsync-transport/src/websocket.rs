//! WebSocket transport for seqsync

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info};

use crate::error::TransportError;
use crate::hub::SyncHub;
use crate::session::{Outbox, SessionHandle};

/// WebSocket server; one text frame per operation in, one per document out
pub struct WebSocketServer {
    hub: Arc<SyncHub>,
    addr: SocketAddr,
}

impl WebSocketServer {
    pub fn new(hub: Arc<SyncHub>, addr: SocketAddr) -> Self {
        Self { hub, addr }
    }

    /// Bind and start the WebSocket server
    pub async fn run(&self) -> Result<(), TransportError> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "seqsync WebSocket server listening");
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
                            error!(peer = %peer_addr, error = %e, "WebSocket connection error");
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
        let ws_stream = accept_async(stream).await?;
        let (handle, outbox) = hub.connect(format!("ws:{}", peer_addr)).await?;

        let result = Self::session_loop(ws_stream, handle, outbox, &hub).await;
        hub.disconnect(handle);
        result
    }

    async fn session_loop(
        ws_stream: WebSocketStream<TcpStream>,
        handle: SessionHandle,
        mut outbox: Outbox,
        hub: &SyncHub,
    ) -> Result<(), TransportError> {
        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            // Failures are logged by the hub; the session stays open
                            let _ = hub.receive(handle, text.as_bytes()).await;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            let _ = hub.receive(handle, &data).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!(session = %handle.id(), "WebSocket client disconnected");
                            return Ok(());
                        }
                        Some(Ok(_)) => {
                            // Ignore other message types
                        }
                        Some(Err(e)) => {
                            return Err(e.into());
                        }
                    }
                }

                push = outbox.recv() => {
                    match push {
                        Some(push) => {
                            debug!(session = %handle.id(), version = push.version, "Sending document");
                            write.send(Message::Text(push.as_str().to_string())).await?;
                        }
                        None => {
                            info!(session = %handle.id(), "Session evicted by hub");
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
