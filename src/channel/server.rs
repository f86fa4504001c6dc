//! Local WebSocket listener for the execution channel.
//!
//! Each accepted connection gets a writer task that drains the peer's
//! outbound queue into text frames, and a reader loop that logs whatever
//! the peer sends until it closes.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};

use super::ExecutionChannel;

/// Listener bound to the channel port.
pub struct ChannelServer {
    listener: TcpListener,
    channel: Arc<ExecutionChannel>,
}

impl ChannelServer {
    /// Bind the listener. Port 0 picks a free port (see `local_addr`).
    pub async fn bind(addr: SocketAddr, channel: Arc<ExecutionChannel>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind execution channel on {addr}"))?;
        Ok(Self { listener, channel })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    /// Accept connections until the task is dropped.
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(addr = %addr, "Execution channel listening");
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    tokio::spawn(handle_connection(stream, addr, Arc::clone(&self.channel)));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Run the accept loop in the background.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[instrument(skip(stream, channel))]
async fn handle_connection(stream: TcpStream, addr: SocketAddr, channel: Arc<ExecutionChannel>) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(error = %e, "WebSocket handshake failed");
            return;
        }
    };
    let (mut sink, mut source) = ws.split();

    let (peer, mut outbound) = channel.on_connect(addr).await;

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            if let Err(e) = sink.send(Message::Text(message.encode())).await {
                debug!(error = %e, "Write to peer failed");
                return;
            }
        }
        // Queue closed: this peer was superseded or has disconnected
        let _ = sink.close().await;
    });

    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                channel.on_message(peer, text);
            }
            Ok(Message::Binary(bytes)) => {
                channel.on_message(peer, String::from_utf8_lossy(&bytes).into_owned());
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "Read from peer failed");
                break;
            }
        }
    }

    channel.on_disconnect(peer).await;
    let _ = writer.await;
}
