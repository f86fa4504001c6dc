//! Execution channel: the single-peer link to the external execution target.
//!
//! The channel keeps at most one peer. A new connection replaces the stored
//! peer and the superseded one is closed. Sends go to whichever peer is
//! current; with no peer, sends fail with `NotConnected` and nothing is
//! written.

pub mod opcode;
pub mod server;

pub use opcode::{DecodeError, InboundMessage, Opcode, TaggedMessage};
pub use server::ChannelServer;

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};

/// Identity of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Observable channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connected { peer: PeerId, addr: SocketAddr },
}

/// The stored peer: its identity and the queue its writer drains.
struct Peer {
    id: PeerId,
    addr: SocketAddr,
    outbound: mpsc::UnboundedSender<TaggedMessage>,
}

/// Tracks the active peer and delivers tagged messages to it.
pub struct ExecutionChannel {
    welcome: String,
    active: Mutex<Option<Peer>>,
    next_id: AtomicU64,
}

impl ExecutionChannel {
    /// Create an idle channel that greets each new peer with `welcome`.
    pub fn new(welcome: impl Into<String>) -> Self {
        Self {
            welcome: welcome.into(),
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new connection as the active peer.
    ///
    /// The welcome message is queued for the new peer only. Any previous
    /// peer is dropped, which closes its outbound queue and with it the
    /// connection. Returns the queue the connection's writer must drain.
    pub async fn on_connect(
        &self,
        addr: SocketAddr,
    ) -> (PeerId, mpsc::UnboundedReceiver<TaggedMessage>) {
        let id = PeerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (outbound, rx) = mpsc::unbounded_channel();

        // The receiver is alive, so this cannot fail
        let _ = outbound.send(TaggedMessage::Msg(self.welcome.clone()));

        let previous = self
            .active
            .lock()
            .await
            .replace(Peer { id, addr, outbound });

        if let Some(previous) = previous {
            info!(peer = %previous.id, addr = %previous.addr, "Closing superseded peer");
        }
        info!(peer = %id, addr = %addr, "Execution target connected");

        (id, rx)
    }

    /// Forget `peer` if it is still the active one.
    pub async fn on_disconnect(&self, peer: PeerId) {
        let mut active = self.active.lock().await;
        if active.as_ref().is_some_and(|p| p.id == peer) {
            *active = None;
            info!(peer = %peer, "Execution target disconnected");
        } else {
            debug!(peer = %peer, "Superseded peer disconnected");
        }
    }

    /// Inbound text is classified and logged, never acted upon.
    pub fn on_message(&self, peer: PeerId, text: String) -> InboundMessage {
        let inbound = InboundMessage::classify(text);
        info!(peer = %peer, message = %inbound, "Received message from execution target");
        inbound
    }

    /// Queue `message` for the active peer.
    pub async fn send(&self, message: TaggedMessage) -> Result<()> {
        let mut active = self.active.lock().await;
        let Some(peer) = active.as_ref() else {
            return Err(RelayError::NotConnected);
        };

        if peer.outbound.send(message).is_err() {
            // Writer already gone; the disconnect callback has not run yet
            warn!(peer = %peer.id, "Dropping stale peer");
            *active = None;
            return Err(RelayError::NotConnected);
        }
        Ok(())
    }

    /// Send script text for execution.
    pub async fn send_exec(&self, script: &str) -> Result<()> {
        self.send(TaggedMessage::Exec(script.to_string())).await?;
        info!(len = script.len(), "Script sent for execution");
        Ok(())
    }

    pub async fn state(&self) -> ChannelState {
        self.active
            .lock()
            .await
            .as_ref()
            .map_or(ChannelState::Idle, |p| ChannelState::Connected {
                peer: p.id,
                addr: p.addr,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn send_while_idle_is_not_connected() {
        let channel = ExecutionChannel::new("hi");
        assert_eq!(channel.state().await, ChannelState::Idle);

        let err = channel.send_exec("print(1)").await.unwrap_err();
        assert!(matches!(err, RelayError::NotConnected));
    }

    #[tokio::test]
    async fn connect_sends_welcome_then_exec() {
        let channel = ExecutionChannel::new("Welcome");
        let (id, mut rx) = channel.on_connect(addr(1000)).await;

        assert_eq!(
            channel.state().await,
            ChannelState::Connected {
                peer: id,
                addr: addr(1000)
            }
        );
        assert_eq!(rx.recv().await, Some(TaggedMessage::Msg("Welcome".into())));

        tokio_test::assert_ok!(channel.send_exec("print(1)").await);
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.encode(), "Nprint(1)");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn new_peer_replaces_and_closes_old() {
        let channel = ExecutionChannel::new("Welcome");
        let (first, mut first_rx) = channel.on_connect(addr(1000)).await;
        let (second, mut second_rx) = channel.on_connect(addr(1001)).await;
        assert_ne!(first, second);

        // Old peer got only its own welcome, then its queue closed
        assert_eq!(first_rx.recv().await, Some(TaggedMessage::Msg("Welcome".into())));
        assert_eq!(first_rx.recv().await, None);

        channel.send_exec("x()").await.unwrap();
        assert_eq!(second_rx.recv().await, Some(TaggedMessage::Msg("Welcome".into())));
        assert_eq!(second_rx.recv().await, Some(TaggedMessage::Exec("x()".into())));
    }

    #[tokio::test]
    async fn disconnect_before_send_is_not_connected() {
        let channel = ExecutionChannel::new("Welcome");
        let (id, _rx) = channel.on_connect(addr(1000)).await;
        channel.on_disconnect(id).await;

        assert_eq!(channel.state().await, ChannelState::Idle);
        assert!(matches!(
            channel.send_exec("print(1)").await,
            Err(RelayError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn superseded_disconnect_keeps_current_peer() {
        let channel = ExecutionChannel::new("Welcome");
        let (first, _first_rx) = channel.on_connect(addr(1000)).await;
        let (second, _second_rx) = channel.on_connect(addr(1001)).await;

        channel.on_disconnect(first).await;

        assert_eq!(
            channel.state().await,
            ChannelState::Connected {
                peer: second,
                addr: addr(1001)
            }
        );
        tokio_test::assert_ok!(channel.send_exec("still here").await);
    }

    #[tokio::test]
    async fn stale_peer_is_dropped_on_send() {
        let channel = ExecutionChannel::new("Welcome");
        let (_id, rx) = channel.on_connect(addr(1000)).await;
        drop(rx);

        assert!(matches!(
            channel.send(TaggedMessage::Nop).await,
            Err(RelayError::NotConnected)
        ));
        assert_eq!(channel.state().await, ChannelState::Idle);
    }

    #[tokio::test]
    async fn inbound_is_classified() {
        let channel = ExecutionChannel::new("Welcome");
        let (id, _rx) = channel.on_connect(addr(1000)).await;

        assert_eq!(
            channel.on_message(id, "Hello world!".into()),
            InboundMessage::Untagged("Hello world!".into())
        );
        assert_eq!(
            channel.on_message(id, "O30".into()),
            InboundMessage::Tagged(TaggedMessage::SetFps(30))
        );
    }
}
