//! # Moonhunt Client
//!
//! Client-side state synchronization core for the Moonhunt social-deduction
//! game.
//!
//! The crate mirrors one game room on the client: a pull bootstrap and a
//! persistent push channel both feed a pure reducer, which is the only
//! writer to the owned state snapshot that presentation layers observe.
//!
//! ## Features
//!
//! - **Store-centric** — one owned [`Snapshot`] behind [`GameStore`], mutated
//!   only through the reducer, observed through subscriptions
//! - **Transport-agnostic** — implement [`Transport`] and [`Connector`] for
//!   any backend
//! - **WebSocket built-in** — default `transport-websocket` feature provides
//!   [`WebSocketConnector`]
//! - **Pull API included** — default `http-api` feature provides
//!   [`ApiClient`] and the [`bootstrap_room`] sequence
//! - **Survivable** — bounded-backoff reconnect, idempotent event
//!   application, and convergent pull/push merges
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use moonhunt_client::{
//!     bootstrap_room, ApiClient, ChannelEvent, CredentialStore, GameStore, RoomChannel,
//!     WebSocketConnector,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // The store owns the snapshot; presentation re-renders on notify.
//! let store = GameStore::new(CredentialStore::in_memory());
//! store.subscribe(|snapshot| {
//!     println!("{} players, phase {:?}", snapshot.players.len(), snapshot.phase());
//! });
//!
//! // Every decoded push envelope flows into the store through the reducer.
//! let channel = Arc::new(RoomChannel::new(WebSocketConnector::new("ws://localhost:8000")));
//! let dispatcher = store.clone();
//! channel.add_listener(move |event| {
//!     if let ChannelEvent::Message(server_event) = event {
//!         dispatcher.dispatch(server_event);
//!     }
//! });
//!
//! // The pull bootstrap runs alongside the connect; the merge converges
//! // whichever side lands first.
//! let api = ApiClient::new("http://localhost:8000/api");
//! channel.connect("WOLFIE").await?;
//! bootstrap_room(&api, &store, "WOLFIE").await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod credentials;
pub mod error;
pub mod event;
pub mod notify;
pub mod protocol;
pub mod reducer;
pub mod store;
pub mod transport;
pub mod transports;

#[cfg(feature = "http-api")]
pub mod api;
#[cfg(feature = "http-api")]
pub mod bootstrap;

// Re-export primary types for ergonomic imports.
pub use channel::{ChannelConfig, ListenerId, RoomChannel};
pub use credentials::{CredentialKind, CredentialStorage, CredentialStore, MemoryStorage};
pub use error::{MoonhuntError, Result};
pub use event::{ChannelEvent, DisconnectReason};
pub use notify::{Notification, NotificationKind, NotificationQueue};
pub use protocol::{
    ClientMessage, GameState, Phase, Player, PlayerId, Role, Room, RoomStatus, ServerEvent,
};
pub use store::{GameStore, Snapshot, SubscriptionId};
pub use transport::{Connector, Transport};

#[cfg(feature = "http-api")]
pub use api::{ApiClient, RoomSetup};
#[cfg(feature = "http-api")]
pub use bootstrap::{bootstrap_room, record_created, record_join};
#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
