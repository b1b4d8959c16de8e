//! In-memory transport for tests.
//!
//! `MemoryConnector` stands in for a relay: each accepted connection hands a
//! `MemoryPeer` to the test, which can push inbound frames, read what the
//! client sent, and break or close the channel on demand.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use rc_core::error::{RcError, RcResult};

use crate::transport::{Connector, FrameSink, FrameSource, TransportEvent, TransportPair};

/// How the next connect attempt behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Accept,
    Refuse(String),
    /// Never completes; only the connect timeout ends it.
    Hang,
}

/// Scripted connector. Attempts past the end of the script are accepted.
pub struct MemoryConnector {
    script: Mutex<VecDeque<ConnectOutcome>>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
    attempts: AtomicUsize,
}

impl MemoryConnector {
    pub fn new() -> (Arc<Self>, PeerQueue) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            peers,
            attempts: AtomicUsize::new(0),
        });
        (connector, PeerQueue { rx })
    }

    /// Queue the outcome of a future attempt.
    pub fn script(&self, outcome: ConnectOutcome) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
    }

    /// Number of connect attempts so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, address: &str) -> RcResult<TransportPair> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(ConnectOutcome::Accept);

        match outcome {
            ConnectOutcome::Refuse(reason) => Err(RcError::Connect(reason)),
            ConnectOutcome::Hang => std::future::pending::<RcResult<TransportPair>>().await,
            ConnectOutcome::Accept => {
                let (sent_tx, sent_rx) = mpsc::unbounded_channel();
                let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
                let flags = Arc::new(PeerFlags::default());

                let peer = MemoryPeer {
                    address: address.to_string(),
                    sent: sent_rx,
                    inbound: inbound_tx.clone(),
                    flags: Arc::clone(&flags),
                };
                // The test may not care about peers at all.
                let _ = self.peers.send(peer);

                Ok(TransportPair {
                    sink: Box::new(MemorySink {
                        sent: sent_tx,
                        inbound: inbound_tx,
                        flags,
                    }),
                    source: Box::new(MemorySource { inbound: inbound_rx }),
                })
            }
        }
    }
}

/// Accepted connections, in order.
pub struct PeerQueue {
    rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl PeerQueue {
    /// Wait for the next accepted connection.
    pub async fn next(&mut self) -> MemoryPeer {
        self.rx.recv().await.expect("memory connector dropped")
    }

    pub fn try_next(&mut self) -> Option<MemoryPeer> {
        self.rx.try_recv().ok()
    }
}

#[derive(Default)]
struct PeerFlags {
    fail_sends: AtomicBool,
    stall_writes: AtomicBool,
    ignore_close: AtomicBool,
    close_requested: AtomicBool,
}

/// The relay side of one in-memory connection.
pub struct MemoryPeer {
    pub address: String,
    sent: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
    flags: Arc<PeerFlags>,
}

impl MemoryPeer {
    /// Deliver one frame to the client.
    pub fn push_frame(&self, text: impl Into<String>) {
        let _ = self.inbound.send(TransportEvent::Frame(text.into()));
    }

    /// Close the channel from the relay side.
    pub fn close(&self) {
        let _ = self.inbound.send(TransportEvent::Closed);
    }

    /// Break the channel as a network error would.
    pub fn break_connection(&self, reason: impl Into<String>) {
        let _ = self.inbound.send(TransportEvent::Error(reason.into()));
    }

    /// Make every later client send fail.
    pub fn fail_sends(&self) {
        self.flags.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Never complete later client writes, as a relay that stopped reading
    /// would. Covers frames and the close request.
    pub fn stall_writes(&self) {
        self.flags.stall_writes.store(true, Ordering::SeqCst);
    }

    /// Do not confirm the client's close request.
    pub fn ignore_close(&self) {
        self.flags.ignore_close.store(true, Ordering::SeqCst);
    }

    pub fn close_requested(&self) -> bool {
        self.flags.close_requested.load(Ordering::SeqCst)
    }

    /// Next frame the client sent; `None` once the client dropped its half.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.sent.recv().await
    }

    pub fn try_sent(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }
}

struct MemorySink {
    sent: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
    flags: Arc<PeerFlags>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_text(&mut self, text: &str) -> RcResult<()> {
        if self.flags.stall_writes.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        if self.flags.fail_sends.load(Ordering::SeqCst) {
            return Err(RcError::SendFailed("peer rejected frame".into()));
        }
        self.sent
            .send(text.to_string())
            .map_err(|_| RcError::SendFailed("peer gone".into()))
    }

    async fn close(&mut self) -> RcResult<()> {
        if self.flags.stall_writes.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        self.flags.close_requested.store(true, Ordering::SeqCst);
        if !self.flags.ignore_close.load(Ordering::SeqCst) {
            let _ = self.inbound.send(TransportEvent::Closed);
        }
        Ok(())
    }
}

struct MemorySource {
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_event(&mut self) -> TransportEvent {
        self.inbound.recv().await.unwrap_or(TransportEvent::Closed)
    }
}
