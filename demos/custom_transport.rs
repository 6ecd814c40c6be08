//! # Custom Transport Example
//!
//! Shows how to implement the [`Transport`] and [`Connector`] traits with a
//! simple in-process loopback channel. This is useful for:
//!
//! - **Testing** — drive the whole sync core without a real server
//! - **Custom backends** — adapt any I/O layer (TCP, QUIC, WebRTC data channels)
//!
//! ## Running
//!
//! ```sh
//! cargo run --example custom_transport
//! ```

use async_trait::async_trait;
use moonhunt_client::{
    ChannelEvent, Connector, GameStore, MoonhuntError, RoomChannel, Transport,
};
use std::sync::Mutex;
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: Define a channel-based "loopback" transport
// ─────────────────────────────────────────────────────────────────────

/// A loopback transport that shuttles messages through in-process channels.
///
/// The **client half** (`LoopbackTransport`) implements [`Transport`] and is
/// handed to the room channel; the **server half** (`LoopbackServer`) lets
/// you inject envelopes and read what the client sent.
pub struct LoopbackTransport {
    /// Messages the client sends go here (server reads from the other end).
    tx: mpsc::UnboundedSender<String>,
    /// Messages the server sends arrive here (client reads them).
    rx: mpsc::UnboundedReceiver<String>,
}

/// The "server side" of the loopback — use this to drive the conversation.
pub struct LoopbackServer {
    /// Read what the client sent.
    pub rx: mpsc::UnboundedReceiver<String>,
    /// Send envelopes to the client (as if they came from a server).
    pub tx: mpsc::UnboundedSender<String>,
}

/// Create a connected `(transport, server)` pair.
fn loopback_pair() -> (LoopbackTransport, LoopbackServer) {
    // Client → Server channel
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    // Server → Client channel
    let (server_tx, client_rx) = mpsc::unbounded_channel();

    let transport = LoopbackTransport {
        tx: client_tx,
        rx: client_rx,
    };
    let server = LoopbackServer {
        rx: server_rx,
        tx: server_tx,
    };

    (transport, server)
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: Implement the Transport and Connector traits
// ─────────────────────────────────────────────────────────────────────

#[async_trait]
impl Transport for LoopbackTransport {
    /// Send a JSON message to the "server" side of the loopback.
    async fn send(&mut self, message: String) -> Result<(), MoonhuntError> {
        self.tx
            .send(message)
            .map_err(|e| MoonhuntError::TransportSend(e.to_string()))
    }

    /// Receive the next message from the "server" side.
    ///
    /// Returns `None` when the server channel is closed — this is how the
    /// client discovers that the connection has ended.
    ///
    /// This method is **cancel-safe** because `mpsc::UnboundedReceiver::recv`
    /// is cancel-safe.
    async fn recv(&mut self) -> Option<Result<String, MoonhuntError>> {
        self.rx.recv().await.map(Ok)
    }

    /// Close is a no-op for channels — dropping is sufficient.
    async fn close(&mut self) -> Result<(), MoonhuntError> {
        Ok(())
    }
}

/// Hands out the prepared loopback transport exactly once.
struct LoopbackConnector {
    transport: Mutex<Option<LoopbackTransport>>,
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self, room_code: &str) -> Result<Box<dyn Transport>, MoonhuntError> {
        tracing::info!("Loopback dial for room {room_code}");
        self.transport
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
            .map(|t| Box::new(t) as Box<dyn Transport>)
            .ok_or_else(|| MoonhuntError::TransportReceive("loopback already consumed".into()))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Wire together the sync core and the fake server
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for readable output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Create the loopback pair and the store.
    let (transport, mut server) = loopback_pair();
    let store = GameStore::default();

    // Bridge store notifications to the main loop.
    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    store.subscribe(move |snapshot| {
        let _ = update_tx.send(snapshot.clone());
    });

    // Every decoded envelope flows into the store.
    let channel = RoomChannel::new(LoopbackConnector {
        transport: Mutex::new(Some(transport)),
    });
    let dispatcher = store.clone();
    channel.add_listener(move |event| {
        if let ChannelEvent::Message(server_event) = event {
            dispatcher.dispatch(server_event);
        }
    });

    channel.connect("WOLFIE").await?;
    channel.request_state().await?;

    // ── Fake server: read the state request, then run a tiny game ───
    let Some(request) = server.rx.recv().await else {
        return Err("server channel closed before the state request arrived".into());
    };
    tracing::info!("Server received: {request}");

    // The JSON must match the server's wire format — adjacently tagged:
    // {"type": "event_name", "data": {…}}.
    let script = [
        serde_json::json!({
            "type": "initial_state",
            "data": {
                "room": {"code": "WOLFIE", "status": "playing", "max_players": 8},
                "players": [
                    {"id": 1, "nickname": "Ana", "is_alive": true, "is_leader": false, "role": null},
                    {"id": 2, "nickname": "Bruno", "is_alive": true, "is_leader": false, "role": null},
                    {"id": 3, "nickname": "Chloe", "is_alive": true, "is_leader": false, "role": null}
                ],
                "game_state": {"phase": "night", "night_number": 1, "day_number": 0}
            }
        }),
        serde_json::json!({
            "type": "player_joined",
            "data": {"player": {"id": 4, "nickname": "Dana"}}
        }),
        serde_json::json!({
            "type": "phase_change",
            "data": {
                "phase": "day",
                "day_number": 1,
                "deaths": [{"id": 2, "nickname": "Bruno", "role": "wolf"}]
            }
        }),
        serde_json::json!({
            "type": "game_ended",
            "data": {"winner": "citizens", "reason": "All wolves eliminated"}
        }),
    ];
    for envelope in script {
        server.tx.send(envelope.to_string())?;
    }

    // ── Watch the snapshot evolve ───────────────────────────────────
    while let Some(snapshot) = update_rx.recv().await {
        tracing::info!(
            "Snapshot: {:?} | {} alive, {} dead",
            snapshot.phase(),
            snapshot.alive_players().len(),
            snapshot.dead_players().len()
        );
        if let Some(notice) = snapshot.notifications.iter().last() {
            tracing::info!("Latest notice [{:?}]: {}", notice.kind, notice.message);
        }
        if snapshot.session_ended {
            tracing::info!(
                "Game over — winner: {}",
                snapshot.winner.as_deref().unwrap_or("unknown")
            );
            break;
        }
    }

    // ── Clean shutdown ──────────────────────────────────────────────
    channel.disconnect().await;
    tracing::info!("Done. Custom transport works!");
    Ok(())
}
