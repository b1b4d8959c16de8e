//! Connection manager.
//!
//! Owns one logical connection to a relay and normalizes its asynchronous
//! lifecycle into the `ConnectionState` machine. A single driver task owns
//! the socket halves, the state, the retry timer and the attempt counter;
//! the public handle only posts commands to it. Commands and transport
//! events are handled one at a time, so a `send` issued while a transition
//! is in flight is processed after that transition completes.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

use rc_core::config::{AppConfig, ReconnectConfig};
use rc_core::constants;
use rc_core::error::{RcError, RcResult};

use crate::events::{ConnectionEvent, ConnectionState, EventDispatcher, FailureKind};
use crate::frame::OutboundMessage;
use crate::transport::{Connector, FrameSink, FrameSource, TransportEvent, TransportPair};
use crate::websocket::WebSocketConnector;

/// Reconnect backoff policy.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap for the exponential backoff.
    pub max_delay: Duration,
    /// Fraction (0.0 to 1.0) of each delay that may be added as jitter.
    pub jitter_factor: f64,
    /// Maximum number of consecutive retries (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(constants::DEFAULT_RECONNECT_BASE_MS),
            max_delay: Duration::from_millis(constants::DEFAULT_RECONNECT_MAX_MS),
            jitter_factor: constants::DEFAULT_RECONNECT_JITTER,
            max_attempts: 0,
        }
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter_factor: config.jitter_factor,
            max_attempts: config.max_attempts,
        }
    }

    /// Calculate the delay before retry `attempt` (0-based) using exponential
    /// backoff with jitter.
    ///
    /// Sequence: 1s, 2s, 4s, 8s, 16s, capped at max_delay (30s by default).
    /// Jitter only ever lengthens a delay, by at most `jitter_factor` of it,
    /// and is applied before the cap.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay_with_sample(attempt, rand::random::<f64>())
    }

    /// Same as [`delay_for`](Self::delay_for) with an explicit jitter sample
    /// in `[0, 1)`.
    ///
    /// With `jitter_factor <= 1` the result never decreases as `attempt`
    /// grows, whatever the samples: `2^(n+1) >= 2^n * (1 + jitter)`.
    pub fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();
        let jitter = self.jitter_factor.clamp(0.0, 1.0) * sample.clamp(0.0, 1.0);

        let exponential = base * 2.0_f64.powi(attempt.min(63) as i32);
        let delay = (exponential * (1.0 + jitter)).min(max);

        Duration::from_secs_f64(delay.max(0.0))
    }

    /// Whether another retry is allowed after `attempts` consecutive ones.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        self.max_attempts == 0 || attempts < self.max_attempts
    }
}

/// Tunables for one connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub reconnect: ReconnectPolicy,
    /// Bounded wait for the transport handshake.
    pub connect_timeout: Duration,
    /// Bounded wait for the peer to confirm a graceful close. Also bounds
    /// the write of the close frame itself.
    pub close_timeout: Duration,
    /// Bounded wait for the transport to accept one outbound frame.
    pub send_timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_millis(constants::DEFAULT_CONNECT_TIMEOUT_MS),
            close_timeout: Duration::from_millis(constants::DEFAULT_CLOSE_TIMEOUT_MS),
            send_timeout: Duration::from_millis(constants::DEFAULT_SEND_TIMEOUT_MS),
        }
    }
}

impl ConnectionOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            reconnect: ReconnectPolicy::from_config(&config.reconnect),
            connect_timeout: Duration::from_millis(config.server.connect_timeout_ms),
            close_timeout: Duration::from_millis(config.server.close_timeout_ms),
            send_timeout: Duration::from_millis(config.server.send_timeout_ms),
        }
    }

    /// Set custom reconnection policy.
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }
}

/// Command sent to the driver task.
enum Command {
    Start,
    Stop,
    Send {
        message: OutboundMessage,
        reply: oneshot::Sender<RcResult<()>>,
    },
    CheckOpen {
        reply: oneshot::Sender<RcResult<()>>,
    },
    Shutdown,
}

/// Handle to one managed connection.
///
/// Manages the full lifecycle of the relay connection including:
/// - Connection with a bounded handshake wait
/// - Automatic reconnection with exponential backoff + jitter
/// - Graceful close with a bounded wait for the peer's confirmation
/// - Ordered delivery of every state change and inbound frame to subscribers
///
/// Dropping the handle aborts the driver task, which drops the socket.
pub struct ConnectionManager {
    address: String,
    dispatcher: EventDispatcher,
    state_rx: watch::Receiver<ConnectionState>,
    commands: mpsc::UnboundedSender<Command>,
    driver: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Create a manager for `address` and spawn its driver task.
    ///
    /// Must be called within a Tokio runtime. The connection stays
    /// `Disconnected` until [`start`](Self::start) is called, so subscribers
    /// registered right after construction observe every transition.
    pub fn new(
        address: impl Into<String>,
        connector: Arc<dyn Connector>,
        options: ConnectionOptions,
    ) -> Self {
        let address = address.into();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let dispatcher = EventDispatcher::new();

        let driver = Driver {
            address: address.clone(),
            connector,
            options,
            state: ConnectionState::Disconnected,
            state_tx,
            dispatcher: dispatcher.clone(),
            commands: command_rx,
            pending_connect: None,
            sink: None,
            source: None,
            retry: None,
            close_deadline: None,
            attempts: 0,
            generation: 0,
            restart_after_close: false,
            shutting_down: false,
        };
        let span = info_span!("connection", address = %address);
        let handle = tokio::spawn(driver.run().instrument(span));

        Self {
            address,
            dispatcher,
            state_rx,
            commands,
            driver: Some(handle),
        }
    }

    /// Create a manager that speaks WebSocket.
    pub fn websocket(address: impl Into<String>, options: ConnectionOptions) -> Self {
        Self::new(address, Arc::new(WebSocketConnector::new()), options)
    }

    /// The relay address this manager connects to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to the latest state. Intermediate states may be coalesced;
    /// use [`subscribe`](Self::subscribe) to see every transition.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Subscribe to every event from now on, in order.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ConnectionEvent> {
        self.dispatcher.subscribe()
    }

    /// Begin connecting. No-op while connecting or open.
    pub fn start(&self) {
        self.post(Command::Start);
    }

    /// Request a graceful shutdown and cancel any pending retry.
    pub fn stop(&self) {
        self.post(Command::Stop);
    }

    /// Transmit one frame.
    ///
    /// Fails with `NotConnected` unless the connection is open, and with
    /// `SendFailed` if the transport rejects the frame. Nothing is queued.
    pub async fn send(&self, message: OutboundMessage) -> RcResult<()> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::Send { message, reply }).is_err() {
            return Err(RcError::NotConnected);
        }
        response
            .await
            .unwrap_or_else(|_| Err(RcError::SendFailed("connection driver stopped".into())))
    }

    /// Confirm the connection is open once every command posted before this
    /// call has been handled.
    ///
    /// Fails with `NotConnected` otherwise. A later `send` can still fail if
    /// the connection drops in between.
    pub async fn ensure_open(&self) -> RcResult<()> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::CheckOpen { reply }).is_err() {
            return Err(RcError::NotConnected);
        }
        response.await.unwrap_or(Err(RcError::NotConnected))
    }

    /// Stop, wait until `Disconnected`, and end the driver task.
    pub async fn shutdown(&mut self) {
        self.post(Command::Shutdown);
        if let Some(handle) = self.driver.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!("connection driver panicked: {e}");
                }
            }
        }
    }

    fn post(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("connection driver already stopped");
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.driver.take() {
            handle.abort();
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RetryTimer {
    at: Instant,
    generation: u64,
}

enum Step {
    Command(Option<Command>),
    Connected(RcResult<TransportPair>),
    Transport(TransportEvent),
    RetryDue(u64),
    CloseTimedOut,
}

/// State owned by the driver task.
struct Driver {
    address: String,
    connector: Arc<dyn Connector>,
    options: ConnectionOptions,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    dispatcher: EventDispatcher,
    commands: mpsc::UnboundedReceiver<Command>,
    pending_connect: Option<BoxFuture<'static, RcResult<TransportPair>>>,
    sink: Option<Box<dyn FrameSink>>,
    source: Option<Box<dyn FrameSource>>,
    retry: Option<RetryTimer>,
    close_deadline: Option<Instant>,
    /// Consecutive retries since the last time the connection was open.
    attempts: u32,
    /// Bumped by every start and stop; retry timers from older generations are stale.
    generation: u64,
    restart_after_close: bool,
    shutting_down: bool,
}

impl Driver {
    async fn run(mut self) {
        debug!("connection driver started");

        loop {
            let step = tokio::select! {
                biased;
                command = self.commands.recv() => Step::Command(command),
                result = next_connect_result(&mut self.pending_connect) => Step::Connected(result),
                event = next_transport_event(&mut self.source) => Step::Transport(event),
                generation = retry_due(self.retry) => Step::RetryDue(generation),
                () = deadline_elapsed(self.close_deadline) => Step::CloseTimedOut,
            };

            match step {
                Step::Command(Some(command)) => self.handle_command(command).await,
                Step::Command(None) => {
                    debug!("all manager handles dropped");
                    break;
                }
                Step::Connected(result) => self.handle_connect_result(result),
                Step::Transport(event) => self.handle_transport_event(event),
                Step::RetryDue(generation) => self.handle_retry(generation),
                Step::CloseTimedOut => {
                    warn!(
                        "peer did not confirm close within {:?}",
                        self.options.close_timeout
                    );
                    self.finish_close();
                }
            }

            if self.shutting_down && self.state == ConnectionState::Disconnected {
                break;
            }
        }

        self.pending_connect = None;
        self.sink = None;
        self.source = None;
        debug!("connection driver stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start => self.start(),
            Command::Stop => self.stop().await,
            Command::Send { message, reply } => {
                let result = self.send(message).await;
                let _ = reply.send(result);
            }
            Command::CheckOpen { reply } => {
                let result = if self.state == ConnectionState::Open {
                    Ok(())
                } else {
                    Err(RcError::NotConnected)
                };
                let _ = reply.send(result);
            }
            Command::Shutdown => {
                self.shutting_down = true;
                self.stop().await;
            }
        }
    }

    fn start(&mut self) {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                debug!("already {}, start ignored", self.state);
            }
            ConnectionState::Closing => {
                debug!("start requested while closing, reconnecting once closed");
                self.restart_after_close = true;
            }
            ConnectionState::Disconnected | ConnectionState::Failed => {
                self.generation += 1;
                self.retry = None;
                self.attempts = 0;
                self.begin_connect();
            }
        }
    }

    async fn stop(&mut self) {
        self.generation += 1;
        self.retry = None;
        self.restart_after_close = false;

        match self.state {
            ConnectionState::Disconnected | ConnectionState::Closing => {}
            ConnectionState::Connecting => {
                // Dropping the attempt drops any half-open socket with it.
                self.pending_connect = None;
                self.transition(ConnectionState::Disconnected);
            }
            ConnectionState::Failed => self.transition(ConnectionState::Disconnected),
            ConnectionState::Open => {
                self.transition(ConnectionState::Closing);
                let limit = self.options.close_timeout;
                let closed = match self.sink.as_mut() {
                    Some(sink) => tokio::time::timeout(limit, sink.close()).await,
                    None => Ok(Ok(())),
                };
                match closed {
                    Ok(Ok(())) => {
                        self.close_deadline = Some(Instant::now() + limit);
                    }
                    Ok(Err(e)) => {
                        warn!("close handshake failed: {e}");
                        self.finish_close();
                    }
                    Err(_) => {
                        warn!("transport did not accept the close frame within {limit:?}");
                        self.finish_close();
                    }
                }
            }
        }
    }

    async fn send(&mut self, message: OutboundMessage) -> RcResult<()> {
        if self.state != ConnectionState::Open {
            return Err(RcError::NotConnected);
        }
        let Some(sink) = self.sink.as_mut() else {
            return Err(RcError::NotConnected);
        };

        let limit = self.options.send_timeout;
        let outcome = tokio::time::timeout(limit, sink.send_text(message.as_str()))
            .await
            .unwrap_or_else(|_| Err(RcError::SendFailed(format!("transport stalled for {limit:?}"))));

        match outcome {
            Ok(()) => {
                debug!("sent frame ({} bytes)", message.as_str().len());
                Ok(())
            }
            Err(e) => {
                let reason = match e {
                    RcError::SendFailed(reason) => reason,
                    other => other.to_string(),
                };
                warn!("send failed: {reason}");
                self.dispatcher.dispatch(ConnectionEvent::SendFailed {
                    payload: message.into_string(),
                    reason: reason.clone(),
                });
                Err(RcError::SendFailed(reason))
            }
        }
    }

    fn begin_connect(&mut self) {
        self.transition(ConnectionState::Connecting);

        let connector = Arc::clone(&self.connector);
        let address = self.address.clone();
        let timeout = self.options.connect_timeout;
        self.pending_connect = Some(Box::pin(async move {
            match tokio::time::timeout(timeout, connector.connect(&address)).await {
                Ok(result) => result,
                Err(_) => Err(RcError::ConnectTimeout(timeout)),
            }
        }));
    }

    fn handle_connect_result(&mut self, result: RcResult<TransportPair>) {
        self.pending_connect = None;
        if self.state != ConnectionState::Connecting {
            debug!("discarding connect result received while {}", self.state);
            return;
        }

        match result {
            Ok(pair) => {
                if self.attempts > 0 {
                    info!("reconnected after {} attempt(s)", self.attempts);
                }
                self.sink = Some(pair.sink);
                self.source = Some(pair.source);
                self.attempts = 0;
                self.transition(ConnectionState::Open);
            }
            Err(RcError::ConnectTimeout(after)) => self.fail(FailureKind::ConnectTimeout(after)),
            Err(RcError::Connect(reason)) => self.fail(FailureKind::ConnectError(reason)),
            Err(other) => self.fail(FailureKind::ConnectError(other.to_string())),
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        let reason = match event {
            TransportEvent::Frame(text) => {
                debug!("inbound frame ({} bytes)", text.len());
                self.dispatcher.dispatch(ConnectionEvent::Frame(text));
                return;
            }
            TransportEvent::Closed => "closed by peer".to_string(),
            TransportEvent::Error(reason) => reason,
        };

        match self.state {
            ConnectionState::Open => self.fail(FailureKind::TransportClosed(reason)),
            ConnectionState::Closing => {
                debug!("close confirmed ({reason})");
                self.finish_close();
            }
            _ => self.source = None,
        }
    }

    fn handle_retry(&mut self, generation: u64) {
        self.retry = None;
        if generation != self.generation || self.state != ConnectionState::Failed {
            debug!("stale retry timer ignored");
            return;
        }
        self.begin_connect();
    }

    fn fail(&mut self, kind: FailureKind) {
        self.sink = None;
        self.source = None;
        warn!("connection failed: {kind}");
        self.transition(ConnectionState::Failed);
        self.dispatcher.dispatch(ConnectionEvent::Failed(kind));
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        let policy = &self.options.reconnect;
        if !policy.allows_retry(self.attempts) {
            error!(
                "max reconnection attempts ({}) reached",
                policy.max_attempts
            );
            return;
        }

        let delay = policy.delay_for(self.attempts);
        self.attempts += 1;
        self.retry = Some(RetryTimer {
            at: Instant::now() + delay,
            generation: self.generation,
        });
        warn!(
            "reconnection attempt {} in {:.1}s",
            self.attempts,
            delay.as_secs_f64()
        );
        self.dispatcher.dispatch(ConnectionEvent::RetryScheduled {
            attempt: self.attempts,
            delay,
        });
    }

    fn finish_close(&mut self) {
        self.sink = None;
        self.source = None;
        self.close_deadline = None;
        self.transition(ConnectionState::Disconnected);

        if std::mem::take(&mut self.restart_after_close) && !self.shutting_down {
            self.generation += 1;
            self.attempts = 0;
            self.begin_connect();
        }
    }

    /// Update the state and notify watchers and subscribers.
    fn transition(&mut self, next: ConnectionState) {
        let previous = self.state;
        if previous == next {
            return;
        }
        if !previous.can_transition_to(next) {
            error!("illegal transition {previous} -> {next} ignored");
            return;
        }

        info!("connection state: {previous} -> {next}");
        self.state = next;
        self.state_tx.send_replace(next);
        self.dispatcher.dispatch(ConnectionEvent::StateChanged {
            previous,
            current: next,
        });
    }
}

async fn next_connect_result(
    pending: &mut Option<BoxFuture<'static, RcResult<TransportPair>>>,
) -> RcResult<TransportPair> {
    match pending.as_mut() {
        Some(attempt) => attempt.await,
        None => std::future::pending().await,
    }
}

async fn next_transport_event(source: &mut Option<Box<dyn FrameSource>>) -> TransportEvent {
    match source.as_mut() {
        Some(source) => source.next_event().await,
        None => std::future::pending().await,
    }
}

async fn retry_due(timer: Option<RetryTimer>) -> u64 {
    match timer {
        Some(timer) => {
            sleep_until(timer.at).await;
            timer.generation
        }
        None => std::future::pending().await,
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
