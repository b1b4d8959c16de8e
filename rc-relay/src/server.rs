//! Relay server: accept loop and per-peer tasks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use rc_core::error::RcResult;

use crate::registry::PeerRegistry;

/// A bound relay, not yet accepting.
pub struct Relay {
    listener: TcpListener,
    registry: Arc<PeerRegistry>,
    echo_to_sender: bool,
}

impl Relay {
    /// Bind to `address` (`host:port`; port 0 picks a free one).
    pub async fn bind(address: &str) -> RcResult<Self> {
        let listener = TcpListener::bind(address).await?;
        info!("relay listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            registry: Arc::new(PeerRegistry::new()),
            echo_to_sender: true,
        })
    }

    /// Whether a sender receives its own frames back. Defaults to true.
    pub fn with_echo_to_sender(mut self, echo: bool) -> Self {
        self.echo_to_sender = echo;
        self
    }

    pub fn local_addr(&self) -> RcResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Arc<PeerRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accept peers until the task is dropped.
    pub async fn run(self) {
        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("accept failed: {e}");
                    continue;
                }
            };
            tokio::spawn(handle_peer(
                stream,
                peer_addr,
                Arc::clone(&self.registry),
                self.echo_to_sender,
            ));
        }
    }

    /// Run the accept loop on a background task.
    pub fn spawn(self) -> RcResult<RelayHandle> {
        let local_addr = self.local_addr()?;
        let registry = self.registry();
        let task = tokio::spawn(self.run());
        Ok(RelayHandle {
            local_addr,
            registry,
            task: Some(task),
        })
    }
}

/// Handle to a relay running in the background. Dropping it stops accepting.
pub struct RelayHandle {
    local_addr: SocketAddr,
    registry: Arc<PeerRegistry>,
    task: Option<JoinHandle<()>>,
}

impl RelayHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `ws://` URL clients connect to.
    pub fn url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    pub fn peer_count(&self) -> usize {
        self.registry.len()
    }

    /// Close every peer connection from the relay side.
    pub fn disconnect_all(&self) -> usize {
        self.registry.disconnect_all()
    }

    /// Wait up to `limit` for every connection task to finish its close.
    pub async fn wait_closed(&self, limit: Duration) -> bool {
        self.registry.wait_closed(limit).await
    }

    /// Stop accepting and close every peer.
    pub fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.registry.disconnect_all();
    }
}

impl Drop for RelayHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn handle_peer(
    stream: TcpStream,
    peer_addr: SocketAddr,
    registry: Arc<PeerRegistry>,
    echo_to_sender: bool,
) {
    let _open = registry.track();
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("websocket handshake with {peer_addr} failed: {e}");
            return;
        }
    };
    let (mut write, mut read) = ws.split();
    let (outbound, mut queue) = mpsc::unbounded_channel::<String>();
    let id = registry.add(outbound);
    info!("peer {id} connected from {peer_addr}");

    let writer = tokio::spawn(async move {
        while let Some(text) = queue.recv().await {
            if let Err(e) = write.send(Message::Text(text.into())).await {
                debug!("write to peer {id} failed: {e}");
                return;
            }
        }
        // Removed from the registry: close from our side.
        let _ = write.send(Message::Close(None)).await;
    });

    // Keep reading after a close frame so tungstenite can flush its reply.
    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => {
                registry.broadcast(id, text.as_str(), echo_to_sender);
            }
            Ok(Message::Binary(data)) => {
                registry.broadcast(id, &String::from_utf8_lossy(&data), echo_to_sender);
            }
            Ok(Message::Close(_)) => debug!("peer {id} requested close"),
            Ok(_) => {}
            Err(e) => {
                debug!("peer {id} read error: {e}");
                break;
            }
        }
    }

    registry.remove(id);
    writer.abort();
    info!("peer {id} disconnected");
}
