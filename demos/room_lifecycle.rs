//! # Room Lifecycle Example
//!
//! Demonstrates a complete Moonhunt client lifecycle:
//!
//! 1. Create a room over the pull API and keep the admin token
//! 2. Join it as a player and keep the player token
//! 3. Open the push channel and wire envelopes into the state store
//! 4. Run the pull bootstrap alongside the connect
//! 5. Watch snapshots change until Ctrl+C or the channel gives up
//!
//! ## Running
//!
//! ```sh
//! # Start a Moonhunt server on localhost:8000, then:
//! cargo run --example room_lifecycle
//!
//! # Override the endpoints:
//! MOONHUNT_API_URL=http://my-server:8000/api \
//! MOONHUNT_WS_URL=ws://my-server:8000 \
//! MOONHUNT_NICKNAME=Ana cargo run --example room_lifecycle
//! ```

use std::sync::Arc;
use std::time::Duration;

use moonhunt_client::{
    bootstrap_room, record_created, record_join, ApiClient, ChannelEvent, CredentialStore,
    GameStore, RoomChannel, RoomSetup, WebSocketConnector,
};

/// Default endpoints when the environment does not override them.
const DEFAULT_API_URL: &str = "http://localhost:8000/api";
const DEFAULT_WS_URL: &str = "ws://localhost:8000";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let api_url = std::env::var("MOONHUNT_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
    let ws_url = std::env::var("MOONHUNT_WS_URL").unwrap_or_else(|_| DEFAULT_WS_URL.to_string());
    let nickname = std::env::var("MOONHUNT_NICKNAME").unwrap_or_else(|_| "RustPlayer".to_string());

    // ── State store ─────────────────────────────────────────────────
    // The store owns the snapshot; every committed change re-notifies.
    let store = GameStore::new(CredentialStore::in_memory());
    store.subscribe(|snapshot| {
        tracing::info!(
            "Snapshot: {:?} | {} in room, {} alive, {} notification(s)",
            snapshot.phase(),
            snapshot.players.len(),
            snapshot.alive_players().len(),
            snapshot.notifications.len()
        );
    });

    // ── Create and join over the pull API ───────────────────────────
    let api = ApiClient::new(&api_url);
    tracing::info!("Creating a room via {api_url}");

    let created = api.create_room(RoomSetup::new().with_max_players(6)).await?;
    let code = created.room.code.clone();
    tracing::info!("Created room {code}");
    record_created(&store, created);

    let joined = api.join_room(&code, &nickname).await?;
    tracing::info!(
        "Joined as {} (player id {})",
        joined.player.nickname,
        joined.player.id
    );
    record_join(&store, &joined);

    // ── Push channel ────────────────────────────────────────────────
    // Decoded envelopes flow into the store; terminal disconnects are
    // bridged to the main loop so it can exit.
    let channel = Arc::new(RoomChannel::new(WebSocketConnector::new(&ws_url)));
    let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
    let dispatcher = store.clone();
    channel.add_listener(move |event| match event {
        ChannelEvent::Connected { room_code } => {
            tracing::info!("Push channel up for room {room_code}");
        }
        ChannelEvent::Message(server_event) => dispatcher.dispatch(server_event),
        ChannelEvent::Reconnecting { attempt, delay } => {
            tracing::warn!("Connection lost, retry {attempt} in {delay:?}");
        }
        ChannelEvent::Disconnected { reason } => {
            let _ = done_tx.send(*reason);
        }
    });

    // Connect first, bootstrap second: the reducer merges the pull result
    // and the racing `initial_state` push in either order.
    channel.connect(&code).await?;
    bootstrap_room(&api, &store, &code).await?;

    // ── Main loop ───────────────────────────────────────────────────
    // Keep the connection warm until Ctrl+C or the channel gives up.
    let mut keepalive = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = keepalive.tick() => {
                if let Err(e) = channel.ping().await {
                    tracing::warn!("Keepalive failed: {e}");
                }
            }

            reason = done_rx.recv() => {
                tracing::warn!("Push channel ended: {reason:?}");
                break;
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down…");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    channel.disconnect().await;
    store.reset();
    tracing::info!("Session closed. Goodbye!");
    Ok(())
}
