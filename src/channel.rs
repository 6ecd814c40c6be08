//! Persistent push channel to a game room.
//!
//! [`RoomChannel`] owns at most one live connection at a time. It dials
//! through a [`Connector`], decodes inbound envelopes into
//! [`ServerEvent`]s, and fans them out to registered listeners in
//! registration order. When the connection drops unexpectedly it redials with
//! exponential backoff; the server answers every successful (re)connect with
//! a fresh `initial_state`, so no replay buffering is needed on this side.
//!
//! # Example
//!
//! ```rust,ignore
//! let channel = RoomChannel::new(WebSocketConnector::new("ws://localhost:8000"));
//! let store = GameStore::default();
//!
//! let sink = store.clone();
//! channel.add_listener(move |event| {
//!     if let ChannelEvent::Message(server_event) = event {
//!         sink.dispatch(server_event);
//!     }
//! });
//!
//! channel.connect("ABCDEF").await?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::{MoonhuntError, Result};
use crate::event::{ChannelEvent, DisconnectReason};
use crate::protocol::{ClientMessage, ServerEvent};
use crate::transport::{Connector, Transport};

/// Default delay before the first reconnect attempt.
const DEFAULT_INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default ceiling on the reconnect delay.
const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Default number of consecutive failed dials before the channel gives up.
const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 10;

/// Default multiplier applied to the retry delay after each failed dial.
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`RoomChannel`].
///
/// All fields have sensible defaults; construct via [`Default`] and adjust
/// with the builder methods.
///
/// # Example
///
/// ```
/// use moonhunt_client::channel::ChannelConfig;
/// use std::time::Duration;
///
/// let config = ChannelConfig::default()
///     .with_initial_retry_delay(Duration::from_millis(500))
///     .with_max_retry_attempts(5);
/// assert_eq!(config.max_retry_attempts, 5);
/// ```
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Delay before the first reconnect attempt after an unexpected drop.
    ///
    /// Defaults to **1 second**.
    pub initial_retry_delay: Duration,
    /// Ceiling on the reconnect delay; the backoff never waits longer.
    ///
    /// Defaults to **30 seconds**.
    pub max_retry_delay: Duration,
    /// Consecutive failed dials tolerated before the channel emits
    /// [`DisconnectReason::RetriesExhausted`] and stops.
    ///
    /// Defaults to **10**.
    pub max_retry_attempts: u32,
    /// Multiplier applied to the retry delay after each failed dial.
    ///
    /// Defaults to **2.0**. Values below 1.0 are treated as 1.0.
    pub backoff_multiplier: f64,
    /// Timeout for the graceful shutdown.
    ///
    /// When [`RoomChannel::disconnect`] is called, the background session
    /// loop is given this much time to close the transport and emit a final
    /// `Disconnected` event. If the timeout expires the task is aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            initial_retry_delay: DEFAULT_INITIAL_RETRY_DELAY,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ChannelConfig {
    /// Set the delay before the first reconnect attempt.
    #[must_use]
    pub fn with_initial_retry_delay(mut self, delay: Duration) -> Self {
        self.initial_retry_delay = delay;
        self
    }

    /// Set the ceiling on the reconnect delay.
    #[must_use]
    pub fn with_max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = delay;
        self
    }

    /// Set the number of consecutive failed dials tolerated before giving up.
    #[must_use]
    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    /// Set the multiplier applied to the retry delay after each failed dial.
    ///
    /// Values below 1.0 are treated as 1.0.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Delay to wait before the attempt that follows one waiting `previous`.
    fn next_delay(&self, previous: Duration) -> Duration {
        let factor = if self.backoff_multiplier.is_finite() {
            self.backoff_multiplier.max(1.0)
        } else {
            1.0
        };
        let scaled = previous.as_secs_f64() * factor;
        Duration::from_secs_f64(scaled.min(self.max_retry_delay.as_secs_f64()))
    }
}

// ── Listener registry ───────────────────────────────────────────────

/// Handle returned by [`RoomChannel::add_listener`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ListenerFn = dyn Fn(&ChannelEvent) + Send + Sync;

/// Listeners in registration order. Shared between the channel handle and
/// the session loop.
#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    entries: Vec<(ListenerId, Arc<ListenerFn>)>,
}

fn lock_registry(registry: &StdMutex<ListenerRegistry>) -> std::sync::MutexGuard<'_, ListenerRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Session ─────────────────────────────────────────────────────────

/// One spawned connection lifecycle. Replaced wholesale when the channel
/// moves to another room.
struct Session {
    room_code: String,
    /// Sender half of the command channel to the session loop.
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    /// Oneshot sender to signal the session loop to shut down gracefully.
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Late-delivery guard: once set, the session loop stops fanning out
    /// server events even if some are already in flight.
    gate: Arc<AtomicBool>,
    /// Handle to the background session loop task.
    task: tokio::task::JoinHandle<()>,
}

impl Drop for Session {
    fn drop(&mut self) {
        // `Drop` is synchronous so we cannot await a graceful shutdown.
        // Gate first so a mid-flight fan-out is suppressed, then abort the
        // task, which drops the session loop future immediately.
        self.gate.store(true, Ordering::Release);
        self.task.abort();
    }
}

// ── Channel handle ──────────────────────────────────────────────────

/// Push channel maintaining exactly one live connection per room code.
///
/// Created via [`RoomChannel::new`] with a [`Connector`]; nothing is dialed
/// until [`connect`](Self::connect) is called. Listeners registered with
/// [`add_listener`](Self::add_listener) persist across reconnects and across
/// rooms — only [`remove_listener`](Self::remove_listener) unregisters them.
///
/// Share the channel across tasks by wrapping it in an [`Arc`].
pub struct RoomChannel {
    connector: Arc<dyn Connector>,
    config: ChannelConfig,
    listeners: Arc<StdMutex<ListenerRegistry>>,
    /// Current session, if any. A tokio mutex because connect/disconnect
    /// hold it across awaits.
    session: Mutex<Option<Session>>,
}

impl RoomChannel {
    /// Create a channel that dials through `connector`, with default
    /// configuration.
    pub fn new(connector: impl Connector) -> Self {
        Self::with_config(connector, ChannelConfig::default())
    }

    /// Create a channel with an explicit [`ChannelConfig`].
    pub fn with_config(connector: impl Connector, config: ChannelConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            listeners: Arc::new(StdMutex::new(ListenerRegistry::default())),
            session: Mutex::new(None),
        }
    }

    /// Connect to `room_code`.
    ///
    /// Idempotent: if a live session for the same room already exists this
    /// is a no-op. A session for a different room (or a dead one) is torn
    /// down first, so at most one connection is live at any time.
    ///
    /// The first dial happens inline so the caller learns immediately
    /// whether the room is reachable; reconnects after a drop happen inside
    /// the background loop and surface as [`ChannelEvent::Reconnecting`].
    ///
    /// # Errors
    ///
    /// Returns the [`Connector`]'s error when the initial dial fails. No
    /// session is installed in that case; a later `connect` may succeed.
    pub async fn connect(&self, room_code: &str) -> Result<()> {
        let mut session = self.session.lock().await;

        if let Some(existing) = session.as_ref() {
            if existing.room_code == room_code && !existing.task.is_finished() {
                debug!(room_code, "connect: session already live, nothing to do");
                return Ok(());
            }
        }
        if let Some(old) = session.take() {
            teardown(old, self.config.shutdown_timeout).await;
        }

        let transport = self.connector.connect(room_code).await?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let gate = Arc::new(AtomicBool::new(false));

        let ctx = SessionCtx {
            room_code: room_code.to_string(),
            listeners: Arc::clone(&self.listeners),
            gate: Arc::clone(&gate),
        };
        let task = tokio::spawn(session_loop(
            ctx,
            Arc::clone(&self.connector),
            self.config.clone(),
            transport,
            cmd_rx,
            shutdown_rx,
        ));

        *session = Some(Session {
            room_code: room_code.to_string(),
            cmd_tx,
            shutdown_tx: Some(shutdown_tx),
            gate,
            task,
        });

        Ok(())
    }

    /// Disconnect from the current room, if connected.
    ///
    /// Tears down the session and waits up to
    /// [`shutdown_timeout`](ChannelConfig::shutdown_timeout) for the loop to
    /// exit. Server events already in flight are suppressed the moment this
    /// is called; listeners observe at most one final
    /// [`Disconnected`](ChannelEvent::Disconnected) with
    /// [`DisconnectReason::Requested`] and nothing after it.
    ///
    /// Listeners stay registered and fire again after the next
    /// [`connect`](Self::connect).
    pub async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        if let Some(old) = session.take() {
            teardown(old, self.config.shutdown_timeout).await;
        }
    }

    /// Register a listener invoked for every [`ChannelEvent`].
    ///
    /// Listeners fire in registration order, synchronously with respect to
    /// message arrival: the loop does not read the next envelope until every
    /// listener has returned. The callback must not block.
    pub fn add_listener(
        &self,
        listener: impl Fn(&ChannelEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let mut registry = lock_registry(&self.listeners);
        registry.next_id += 1;
        let id = ListenerId(registry.next_id);
        registry.entries.push((id, Arc::new(listener)));
        id
    }

    /// Unregister a listener. Returns `false` if the id was not registered.
    ///
    /// Safe to call from inside a listener: a listener removed while a
    /// fan-out is in progress is skipped for the remainder of that fan-out,
    /// and the other listeners still run exactly once.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut registry = lock_registry(&self.listeners);
        let before = registry.entries.len();
        registry.entries.retain(|(entry_id, _)| *entry_id != id);
        registry.entries.len() != before
    }

    /// Send a heartbeat ping; the server answers with
    /// [`ServerEvent::Pong`].
    ///
    /// # Errors
    ///
    /// Returns [`MoonhuntError::NotConnected`] if no session is live.
    pub async fn ping(&self) -> Result<()> {
        self.send(ClientMessage::Ping).await
    }

    /// Ask the server to resend a full state snapshot, delivered as a
    /// [`ServerEvent::StateUpdate`].
    ///
    /// # Errors
    ///
    /// Returns [`MoonhuntError::NotConnected`] if no session is live.
    pub async fn request_state(&self) -> Result<()> {
        self.send(ClientMessage::RequestState).await
    }

    /// Returns the room code of the live session, if any.
    pub async fn current_room(&self) -> Option<String> {
        let session = self.session.lock().await;
        session
            .as_ref()
            .filter(|s| !s.task.is_finished())
            .map(|s| s.room_code.clone())
    }

    /// Returns `true` if a session loop is running.
    ///
    /// This tracks the loop, not the socket: during a reconnect backoff the
    /// session is still considered live.
    pub async fn is_connected(&self) -> bool {
        let session = self.session.lock().await;
        session.as_ref().is_some_and(|s| !s.task.is_finished())
    }

    /// Queue a [`ClientMessage`] to the session loop.
    async fn send(&self, msg: ClientMessage) -> Result<()> {
        let session = self.session.lock().await;
        let session = session.as_ref().ok_or(MoonhuntError::NotConnected)?;
        if session.task.is_finished() {
            return Err(MoonhuntError::NotConnected);
        }
        session
            .cmd_tx
            .send(msg)
            .map_err(|_| MoonhuntError::NotConnected)
    }
}

impl std::fmt::Debug for RoomChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let room_code = self
            .session
            .try_lock()
            .ok()
            .and_then(|s| s.as_ref().map(|s| s.room_code.clone()));
        f.debug_struct("RoomChannel")
            .field("room_code", &room_code)
            .field("listeners", &lock_registry(&self.listeners).entries.len())
            .finish()
    }
}

/// Tear down a session: gate fan-out, signal the loop, and wait up to
/// `timeout` before aborting.
async fn teardown(mut session: Session, timeout: Duration) {
    debug!(room_code = %session.room_code, "tearing down session");

    // Gate first so envelopes already in flight cannot reach listeners
    // while the loop winds down.
    session.gate.store(true, Ordering::Release);
    if let Some(tx) = session.shutdown_tx.take() {
        let _ = tx.send(());
    }

    match tokio::time::timeout(timeout, &mut session.task).await {
        Ok(Ok(())) => {}
        Ok(Err(join_err)) => {
            warn!("session loop terminated with join error: {join_err}");
        }
        Err(_) => {
            warn!("session loop did not exit within timeout; aborting task");
            session.task.abort();
            if let Err(join_err) = (&mut session.task).await {
                debug!("session loop aborted: {join_err}");
            }
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

/// Shared pieces the session loop needs to deliver events.
struct SessionCtx {
    room_code: String,
    listeners: Arc<StdMutex<ListenerRegistry>>,
    gate: Arc<AtomicBool>,
}

impl SessionCtx {
    /// Deliver `event` to every registered listener in registration order.
    ///
    /// Suppressed entirely once the teardown gate is set.
    fn emit(&self, event: &ChannelEvent) {
        if self.gate.load(Ordering::Acquire) {
            debug!(
                "session gated, suppressing event: {:?}",
                std::mem::discriminant(event)
            );
            return;
        }
        self.fan_out(event);
    }

    /// Deliver the final `Disconnected` event. Bypasses the teardown gate so
    /// listeners always observe the terminal transition.
    fn emit_terminal(&self, reason: DisconnectReason) {
        self.fan_out(&ChannelEvent::Disconnected { reason });
    }

    fn fan_out(&self, event: &ChannelEvent) {
        // Snapshot the entries, then re-check membership per listener so one
        // removed mid-fan-out is skipped without affecting the others.
        // Callbacks run with no lock held.
        let entries: Vec<(ListenerId, Arc<ListenerFn>)> =
            lock_registry(&self.listeners).entries.clone();
        for (id, listener) in entries {
            let still_registered = lock_registry(&self.listeners)
                .entries
                .iter()
                .any(|(entry_id, _)| *entry_id == id);
            if still_registered {
                listener(event);
            }
        }
    }
}

/// How one connection's pump ended.
enum PumpEnd {
    /// `disconnect()` signaled, or the channel handle vanished.
    Requested,
    /// Transport error or server-side close.
    Lost,
}

/// Background loop owning the connection for one room.
///
/// Pumps the live transport until it ends, then redials with backoff. Exits
/// when teardown is requested or the retry budget runs out.
async fn session_loop(
    ctx: SessionCtx,
    connector: Arc<dyn Connector>,
    config: ChannelConfig,
    mut transport: Box<dyn Transport>,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!(room_code = %ctx.room_code, "session loop started");
    ctx.emit(&ChannelEvent::Connected {
        room_code: ctx.room_code.clone(),
    });

    loop {
        match pump(transport.as_mut(), &mut cmd_rx, &mut shutdown_rx, &ctx).await {
            PumpEnd::Requested => {
                let _ = transport.close().await;
                ctx.emit_terminal(DisconnectReason::Requested);
                debug!(room_code = %ctx.room_code, "session loop exited");
                return;
            }
            PumpEnd::Lost => {
                let _ = transport.close().await;
            }
        }

        // The connection dropped out from under us. Redial with backoff; the
        // server resends a full initial_state on success, which restores
        // whatever was missed during the gap.
        transport = match redial(&ctx, &connector, &config, &mut shutdown_rx).await {
            Some(fresh) => fresh,
            None => return,
        };
        ctx.emit(&ChannelEvent::Connected {
            room_code: ctx.room_code.clone(),
        });
    }
}

/// Pump one live connection: multiplex outgoing commands and incoming
/// envelopes via `tokio::select!` until the connection or the session ends.
async fn pump(
    transport: &mut dyn Transport,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    shutdown_rx: &mut oneshot::Receiver<()>,
    ctx: &SessionCtx,
) -> PumpEnd {
    loop {
        tokio::select! {
            // Branch 1: outgoing command from the channel handle
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(msg) => {
                        debug!("sending client message: {:?}", std::mem::discriminant(&msg));
                        match serde_json::to_string(&msg) {
                            Ok(json) => {
                                if let Err(e) = transport.send(json).await {
                                    error!("transport send error: {e}");
                                    return PumpEnd::Lost;
                                }
                            }
                            Err(e) => {
                                error!("failed to serialize client message: {e}");
                                // Serialization errors are programming bugs; don't kill the loop.
                            }
                        }
                    }
                    // Command channel closed — channel handle dropped.
                    None => {
                        debug!("command channel closed, shutting down session loop");
                        return PumpEnd::Requested;
                    }
                }
            }

            // Branch 2: shutdown signal
            _ = &mut *shutdown_rx => {
                debug!("shutdown signal received");
                return PumpEnd::Requested;
            }

            // Branch 3: incoming envelope from the server
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => ctx.emit(&ChannelEvent::Message(event)),
                            Err(e) => {
                                warn!("failed to decode server envelope: {e} — raw: {text}");
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        return PumpEnd::Lost;
                    }
                    // Transport closed by the server.
                    None => {
                        debug!(room_code = %ctx.room_code, "connection closed by server");
                        return PumpEnd::Lost;
                    }
                }
            }
        }
    }
}

/// Redial after an unexpected drop, waiting longer between attempts.
///
/// Returns the fresh transport, or `None` when the session should end
/// (teardown requested or retry budget exhausted).
async fn redial(
    ctx: &SessionCtx,
    connector: &Arc<dyn Connector>,
    config: &ChannelConfig,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> Option<Box<dyn Transport>> {
    let mut delay = config.initial_retry_delay;

    for attempt in 1..=config.max_retry_attempts {
        ctx.emit(&ChannelEvent::Reconnecting { attempt, delay });
        debug!(
            room_code = %ctx.room_code,
            attempt,
            ?delay,
            "waiting before reconnect attempt"
        );

        tokio::select! {
            _ = &mut *shutdown_rx => {
                debug!("shutdown signal received during reconnect backoff");
                ctx.emit_terminal(DisconnectReason::Requested);
                return None;
            }
            () = tokio::time::sleep(delay) => {}
        }

        match connector.connect(&ctx.room_code).await {
            Ok(transport) => {
                info!(room_code = %ctx.room_code, attempt, "reconnected");
                return Some(transport);
            }
            Err(e) => {
                warn!(room_code = %ctx.room_code, attempt, "reconnect attempt failed: {e}");
                delay = config.next_delay(delay);
            }
        }
    }

    error!(room_code = %ctx.room_code, "reconnect attempts exhausted, giving up");
    ctx.emit_terminal(DisconnectReason::RetriesExhausted);
    None
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::PlayerRef;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::OnceLock;

    // ── Mock transport and connector ────────────────────────────────

    /// A mock transport that records sent messages and replays scripted
    /// responses.
    struct MockTransport {
        /// Items that `recv()` will yield in order.
        incoming: VecDeque<Option<std::result::Result<String, MoonhuntError>>>,
        /// Recorded outgoing messages.
        sent: Arc<StdMutex<Vec<String>>>,
        /// Whether `close()` was called.
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<std::result::Result<String, MoonhuntError>>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let transport = Self {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            };
            (transport, sent, closed)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), MoonhuntError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, MoonhuntError>> {
            if let Some(item) = self.incoming.pop_front() {
                // An explicit `None` entry signals a clean transport close;
                // `Some(result)` delivers the scripted message or error.
                item
            } else {
                // All scripted messages have been delivered — hang forever
                // so the session loop stays alive until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), MoonhuntError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    /// A connector that hands out pre-built transports, one per dial.
    struct MockConnector {
        scripts: StdMutex<VecDeque<MockTransport>>,
        dialed: Arc<StdMutex<Vec<String>>>,
    }

    impl MockConnector {
        fn new(scripts: Vec<MockTransport>) -> (Self, Arc<StdMutex<Vec<String>>>) {
            let dialed = Arc::new(StdMutex::new(Vec::new()));
            let connector = Self {
                scripts: StdMutex::new(VecDeque::from(scripts)),
                dialed: Arc::clone(&dialed),
            };
            (connector, dialed)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self, room_code: &str) -> Result<Box<dyn Transport>> {
            self.dialed.lock().unwrap().push(room_code.to_string());
            match self.scripts.lock().unwrap().pop_front() {
                Some(transport) => Ok(Box::new(transport)),
                // Out of scripts: refuse the dial.
                None => Err(MoonhuntError::TransportReceive("dial refused".into())),
            }
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn recording_listener(channel: &RoomChannel) -> (ListenerId, Arc<StdMutex<Vec<ChannelEvent>>>) {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let id = channel.add_listener(move |event: &ChannelEvent| {
            sink.lock().unwrap().push(event.clone());
        });
        (id, events)
    }

    fn pong_json() -> String {
        serde_json::to_string(&ServerEvent::Pong).unwrap()
    }

    fn player_joined_json(id: i64, nickname: &str) -> String {
        serde_json::to_string(&ServerEvent::PlayerJoined {
            player: PlayerRef {
                id,
                nickname: nickname.to_string(),
            },
        })
        .unwrap()
    }

    /// Config with short timers so tests run fast.
    fn fast_config() -> ChannelConfig {
        ChannelConfig::default()
            .with_initial_retry_delay(Duration::from_millis(10))
            .with_max_retry_delay(Duration::from_millis(40))
            .with_shutdown_timeout(Duration::from_millis(100))
    }

    // ── Config tests ────────────────────────────────────────────────

    #[test]
    fn config_defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.initial_retry_delay, Duration::from_secs(1));
        assert_eq!(config.max_retry_delay, Duration::from_secs(30));
        assert_eq!(config.max_retry_attempts, 10);
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn config_builder_methods() {
        let config = ChannelConfig::default()
            .with_initial_retry_delay(Duration::from_millis(200))
            .with_max_retry_delay(Duration::from_secs(5))
            .with_max_retry_attempts(3)
            .with_backoff_multiplier(1.5)
            .with_shutdown_timeout(Duration::from_secs(2));
        assert_eq!(config.initial_retry_delay, Duration::from_millis(200));
        assert_eq!(config.max_retry_delay, Duration::from_secs(5));
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.backoff_multiplier, 1.5);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(2));
    }

    #[test]
    fn next_delay_doubles_up_to_ceiling() {
        let config = ChannelConfig::default();
        let d1 = config.next_delay(Duration::from_secs(1));
        assert_eq!(d1, Duration::from_secs(2));
        let d2 = config.next_delay(d1);
        assert_eq!(d2, Duration::from_secs(4));
        let capped = config.next_delay(Duration::from_secs(25));
        assert_eq!(capped, Duration::from_secs(30));
    }

    #[test]
    fn next_delay_clamps_shrinking_multiplier() {
        let config = ChannelConfig::default().with_backoff_multiplier(0.1);
        let d = config.next_delay(Duration::from_secs(4));
        assert_eq!(d, Duration::from_secs(4));
    }

    // ── Lifecycle tests ─────────────────────────────────────────────

    #[tokio::test]
    async fn connected_is_first_event() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (connector, _dialed) = MockConnector::new(vec![transport]);
        let channel = RoomChannel::with_config(connector, fast_config());
        let (_id, events) = recording_listener(&channel);

        channel.connect("ABCDEF").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let events = events.lock().unwrap();
        assert_eq!(
            events.first(),
            Some(&ChannelEvent::Connected {
                room_code: "ABCDEF".into()
            })
        );

        drop(events);
        channel.disconnect().await;
    }

    #[tokio::test]
    async fn envelopes_reach_listeners_in_arrival_order() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(pong_json())),
            Some(Ok(player_joined_json(7, "Ana"))),
        ]);
        let (connector, _dialed) = MockConnector::new(vec![transport]);
        let channel = RoomChannel::with_config(connector, fast_config());
        let (_id, events) = recording_listener(&channel);

        channel.connect("ABCDEF").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let events = events.lock().unwrap();
            assert_eq!(events.len(), 3);
            assert!(matches!(events[0], ChannelEvent::Connected { .. }));
            assert_eq!(events[1], ChannelEvent::Message(ServerEvent::Pong));
            assert!(matches!(
                &events[2],
                ChannelEvent::Message(ServerEvent::PlayerJoined { player }) if player.nickname == "Ana"
            ));
        }

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn malformed_envelope_is_dropped_and_loop_survives() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok("{not json".to_string())),
            Some(Ok(r#"{"type": "no_such_event"}"#.to_string())),
            Some(Ok(pong_json())),
        ]);
        let (connector, _dialed) = MockConnector::new(vec![transport]);
        let channel = RoomChannel::with_config(connector, fast_config());
        let (_id, events) = recording_listener(&channel);

        channel.connect("ABCDEF").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let events = events.lock().unwrap();
            // Only Connected and the valid pong; the garbage never surfaces.
            assert_eq!(events.len(), 2);
            assert_eq!(events[1], ChannelEvent::Message(ServerEvent::Pong));
        }

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn connect_is_idempotent_for_same_room() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (connector, dialed) = MockConnector::new(vec![transport]);
        let channel = RoomChannel::with_config(connector, fast_config());
        let (_id, events) = recording_listener(&channel);

        channel.connect("ABCDEF").await.unwrap();
        channel.connect("ABCDEF").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(dialed.lock().unwrap().len(), 1);
        {
            let events = events.lock().unwrap();
            let connected = events
                .iter()
                .filter(|e| matches!(e, ChannelEvent::Connected { .. }))
                .count();
            assert_eq!(connected, 1);
        }

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn connect_to_other_room_tears_down_old_session() {
        let (first, _sent_a, closed_a) = MockTransport::new(vec![]);
        let (second, _sent_b, _closed_b) = MockTransport::new(vec![]);
        let (connector, dialed) = MockConnector::new(vec![first, second]);
        let channel = RoomChannel::with_config(connector, fast_config());
        let (_id, events) = recording_listener(&channel);

        channel.connect("AAAAAA").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        channel.connect("BBBBBB").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            *dialed.lock().unwrap(),
            vec!["AAAAAA".to_string(), "BBBBBB".to_string()]
        );
        assert!(closed_a.load(Ordering::Relaxed));
        assert_eq!(channel.current_room().await.as_deref(), Some("BBBBBB"));

        {
            let events = events.lock().unwrap();
            assert_eq!(
                *events,
                vec![
                    ChannelEvent::Connected {
                        room_code: "AAAAAA".into()
                    },
                    ChannelEvent::Disconnected {
                        reason: DisconnectReason::Requested
                    },
                    ChannelEvent::Connected {
                        room_code: "BBBBBB".into()
                    },
                ]
            );
        }

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn ping_sends_ping_message() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let (connector, _dialed) = MockConnector::new(vec![transport]);
        let channel = RoomChannel::with_config(connector, fast_config());

        channel.connect("ABCDEF").await.unwrap();
        channel.ping().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            assert_eq!(messages.len(), 1);
            let msg: ClientMessage = serde_json::from_str(&messages[0]).unwrap();
            assert!(matches!(msg, ClientMessage::Ping));
        }

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn request_state_sends_message() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let (connector, _dialed) = MockConnector::new(vec![transport]);
        let channel = RoomChannel::with_config(connector, fast_config());

        channel.connect("ABCDEF").await.unwrap();
        channel.request_state().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            let last: ClientMessage = serde_json::from_str(messages.last().unwrap()).unwrap();
            assert!(matches!(last, ClientMessage::RequestState));
        }

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn ping_without_session_is_not_connected() {
        let (connector, _dialed) = MockConnector::new(vec![]);
        let channel = RoomChannel::with_config(connector, fast_config());

        let result = channel.ping().await;
        assert!(matches!(result, Err(MoonhuntError::NotConnected)));
    }

    #[tokio::test]
    async fn failed_initial_dial_installs_no_session() {
        let (connector, dialed) = MockConnector::new(vec![]);
        let channel = RoomChannel::with_config(connector, fast_config());

        let result = channel.connect("ABCDEF").await;
        assert!(result.is_err());
        assert_eq!(dialed.lock().unwrap().len(), 1);
        assert!(!channel.is_connected().await);
        assert!(channel.current_room().await.is_none());
    }

    // ── Late-delivery guard ─────────────────────────────────────────

    /// Transport fed by the test through an mpsc pipe.
    struct PipeTransport {
        rx: mpsc::UnboundedReceiver<Option<std::result::Result<String, MoonhuntError>>>,
    }

    impl PipeTransport {
        fn new() -> (
            Self,
            mpsc::UnboundedSender<Option<std::result::Result<String, MoonhuntError>>>,
        ) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Self { rx }, tx)
        }
    }

    #[async_trait]
    impl Transport for PipeTransport {
        async fn send(&mut self, _message: String) -> std::result::Result<(), MoonhuntError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, MoonhuntError>> {
            match self.rx.recv().await {
                Some(item) => item,
                // Test sender dropped: hold the connection open.
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> std::result::Result<(), MoonhuntError> {
            Ok(())
        }
    }

    /// Connector that hands out a single pre-built transport, then refuses.
    struct OnceConnector<T>(StdMutex<Option<T>>);

    impl<T> OnceConnector<T> {
        fn new(transport: T) -> Self {
            Self(StdMutex::new(Some(transport)))
        }
    }

    #[async_trait]
    impl<T: Transport> Connector for OnceConnector<T> {
        async fn connect(&self, _room_code: &str) -> Result<Box<dyn Transport>> {
            match self.0.lock().unwrap().take() {
                Some(t) => Ok(Box::new(t)),
                None => Err(MoonhuntError::TransportReceive("dial refused".into())),
            }
        }
    }

    #[tokio::test]
    async fn events_after_disconnect_do_not_reach_listeners() {
        let (transport, feed) = PipeTransport::new();
        let channel = RoomChannel::with_config(OnceConnector::new(transport), fast_config());
        let (_id, events) = recording_listener(&channel);

        channel.connect("ABCDEF").await.unwrap();
        feed.send(Some(Ok(pong_json()))).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(events.lock().unwrap().len(), 2); // Connected + Pong

        channel.disconnect().await;

        // Anything the server pushes now must not surface.
        let _ = feed.send(Some(Ok(pong_json())));
        let _ = feed.send(Some(Ok(player_joined_json(1, "Late"))));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[2],
            ChannelEvent::Disconnected {
                reason: DisconnectReason::Requested
            }
        );
    }

    #[test]
    fn gate_suppresses_events_but_not_terminal_disconnect() {
        let listeners = Arc::new(StdMutex::new(ListenerRegistry::default()));
        let events = Arc::new(StdMutex::new(Vec::new()));
        {
            let sink = Arc::clone(&events);
            let mut registry = lock_registry(&listeners);
            registry.next_id += 1;
            let id = ListenerId(registry.next_id);
            registry.entries.push((
                id,
                Arc::new(move |event: &ChannelEvent| {
                    sink.lock().unwrap().push(event.clone());
                }),
            ));
        }
        let ctx = SessionCtx {
            room_code: "ABCDEF".into(),
            listeners,
            gate: Arc::new(AtomicBool::new(true)),
        };

        ctx.emit(&ChannelEvent::Message(ServerEvent::Pong));
        assert!(events.lock().unwrap().is_empty());

        ctx.emit_terminal(DisconnectReason::Requested);
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            ChannelEvent::Disconnected {
                reason: DisconnectReason::Requested
            }
        );
    }

    // ── Listener isolation ──────────────────────────────────────────

    #[tokio::test]
    async fn listener_removed_mid_fanout_is_skipped_others_still_run() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (connector, _dialed) = MockConnector::new(vec![transport]);
        let channel = RoomChannel::with_config(connector, fast_config());

        let first_hits = Arc::new(StdMutex::new(0_u32));
        let third_hits = Arc::new(StdMutex::new(0_u32));
        let third_id: Arc<OnceLock<ListenerId>> = Arc::new(OnceLock::new());

        {
            let hits = Arc::clone(&first_hits);
            channel.add_listener(move |_| {
                *hits.lock().unwrap() += 1;
            });
        }
        {
            // The second listener removes the third during the fan-out.
            let registry = Arc::clone(&channel.listeners);
            let target = Arc::clone(&third_id);
            channel.add_listener(move |_| {
                if let Some(id) = target.get() {
                    lock_registry(&registry)
                        .entries
                        .retain(|(entry_id, _)| entry_id != id);
                }
            });
        }
        {
            let hits = Arc::clone(&third_hits);
            let id = channel.add_listener(move |_| {
                *hits.lock().unwrap() += 1;
            });
            third_id.set(id).unwrap();
        }

        channel.connect("ABCDEF").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The Connected fan-out ran all of listener 1 and 2; listener 3 was
        // removed by 2 before its turn came.
        assert_eq!(*first_hits.lock().unwrap(), 1);
        assert_eq!(*third_hits.lock().unwrap(), 0);

        channel.disconnect().await;
    }

    // ── Reconnect tests ─────────────────────────────────────────────

    #[tokio::test]
    async fn reconnects_after_unexpected_drop() {
        // First connection delivers a pong, then the server closes it.
        let (first, _sent_a, _closed_a) =
            MockTransport::new(vec![Some(Ok(pong_json())), None]);
        // Second connection delivers the resent snapshot.
        let (second, _sent_b, _closed_b) =
            MockTransport::new(vec![Some(Ok(player_joined_json(1, "Back")))]);
        let (connector, dialed) = MockConnector::new(vec![first, second]);
        let channel = RoomChannel::with_config(connector, fast_config());
        let (_id, events) = recording_listener(&channel);

        channel.connect("ABCDEF").await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(dialed.lock().unwrap().len(), 2);
        {
            let events = events.lock().unwrap();
            assert!(matches!(events[0], ChannelEvent::Connected { .. }));
            assert_eq!(events[1], ChannelEvent::Message(ServerEvent::Pong));
            assert_eq!(
                events[2],
                ChannelEvent::Reconnecting {
                    attempt: 1,
                    delay: Duration::from_millis(10)
                }
            );
            assert!(matches!(events[3], ChannelEvent::Connected { .. }));
            assert!(matches!(
                events[4],
                ChannelEvent::Message(ServerEvent::PlayerJoined { .. })
            ));
        }

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn gives_up_after_max_retry_attempts() {
        // One connection that closes immediately; every redial is refused.
        let (only, _sent, _closed) = MockTransport::new(vec![None]);
        let (connector, dialed) = MockConnector::new(vec![only]);
        let config = fast_config()
            .with_max_retry_attempts(2)
            .with_backoff_multiplier(1.0);
        let channel = RoomChannel::with_config(connector, config);
        let (_id, events) = recording_listener(&channel);

        channel.connect("ABCDEF").await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Initial dial plus two refused redials.
        assert_eq!(dialed.lock().unwrap().len(), 3);
        {
            let events = events.lock().unwrap();
            assert_eq!(
                events.last(),
                Some(&ChannelEvent::Disconnected {
                    reason: DisconnectReason::RetriesExhausted
                })
            );
            let attempts: Vec<u32> = events
                .iter()
                .filter_map(|e| match e {
                    ChannelEvent::Reconnecting { attempt, .. } => Some(*attempt),
                    _ => None,
                })
                .collect();
            assert_eq!(attempts, vec![1, 2]);
        }

        assert!(!channel.is_connected().await);
        let result = channel.ping().await;
        assert!(matches!(result, Err(MoonhuntError::NotConnected)));
    }

    #[tokio::test]
    async fn dead_session_can_be_redialed() {
        // First session dies instantly with no retry budget.
        let (doomed, _sent_a, _closed_a) = MockTransport::new(vec![None]);
        let (fresh, _sent_b, _closed_b) = MockTransport::new(vec![]);
        let (connector, dialed) = MockConnector::new(vec![doomed, fresh]);
        let config = fast_config().with_max_retry_attempts(0);
        let channel = RoomChannel::with_config(connector, config);

        channel.connect("ABCDEF").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!channel.is_connected().await);

        // Same room code, but the old session is dead: dial again.
        channel.connect("ABCDEF").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(dialed.lock().unwrap().len(), 2);
        assert!(channel.is_connected().await);

        channel.disconnect().await;
    }

    // ── Shutdown tests ──────────────────────────────────────────────

    /// Transport that hangs in `close()` so the teardown timeout can be
    /// exercised.
    struct HangingCloseTransport {
        close_called: Arc<AtomicBool>,
        dropped: Arc<AtomicBool>,
    }

    impl HangingCloseTransport {
        fn new() -> (Self, Arc<AtomicBool>, Arc<AtomicBool>) {
            let close_called = Arc::new(AtomicBool::new(false));
            let dropped = Arc::new(AtomicBool::new(false));
            (
                Self {
                    close_called: Arc::clone(&close_called),
                    dropped: Arc::clone(&dropped),
                },
                close_called,
                dropped,
            )
        }
    }

    impl Drop for HangingCloseTransport {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::Release);
        }
    }

    #[async_trait]
    impl Transport for HangingCloseTransport {
        async fn send(&mut self, _message: String) -> std::result::Result<(), MoonhuntError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, MoonhuntError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), MoonhuntError> {
            self.close_called.store(true, Ordering::Release);
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn disconnect_timeout_aborts_stuck_session() {
        let (transport, close_called, dropped) = HangingCloseTransport::new();
        let config = fast_config().with_shutdown_timeout(Duration::from_millis(20));
        let channel = RoomChannel::with_config(OnceConnector::new(transport), config);

        channel.connect("ABCDEF").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        channel.disconnect().await;

        assert!(
            close_called.load(Ordering::Acquire),
            "transport.close() should have been attempted during graceful shutdown"
        );
        assert!(
            dropped.load(Ordering::Acquire),
            "timed-out teardown should abort and drop the session loop task"
        );
        assert!(!channel.is_connected().await);
    }

    #[tokio::test]
    async fn double_disconnect_does_not_panic() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (connector, _dialed) = MockConnector::new(vec![transport]);
        let channel = RoomChannel::with_config(connector, fast_config());

        channel.connect("ABCDEF").await.unwrap();
        channel.disconnect().await;
        channel.disconnect().await; // should not panic
    }

    #[tokio::test]
    async fn drop_without_explicit_disconnect_aborts_task() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (connector, _dialed) = MockConnector::new(vec![transport]);
        let channel = RoomChannel::with_config(connector, fast_config());
        let (_id, events) = recording_listener(&channel);

        channel.connect("ABCDEF").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        drop(channel);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Only the Connected event was delivered; the aborted loop emits
        // nothing further.
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn debug_impl_for_channel() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (connector, _dialed) = MockConnector::new(vec![transport]);
        let channel = RoomChannel::with_config(connector, fast_config());

        channel.connect("ABCDEF").await.unwrap();

        let debug_str = format!("{channel:?}");
        assert!(debug_str.contains("RoomChannel"));
        assert!(debug_str.contains("ABCDEF"));

        channel.disconnect().await;
    }
}
