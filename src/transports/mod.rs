//! Transport implementations for the room push channel.
//!
//! This module provides concrete [`Transport`](crate::Transport) and
//! [`Connector`](crate::Connector) implementations behind feature gates.
//! Enable the corresponding Cargo feature to pull in a transport:
//!
//! | Feature                | Transport                                       |
//! |------------------------|-------------------------------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`], [`WebSocketConnector`]  |
//!
//! # Example
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), moonhunt_client::MoonhuntError> {
//! use moonhunt_client::{Transport, WebSocketTransport};
//!
//! let mut ws = WebSocketTransport::connect("ws://localhost:8000/ws/game/ABCDEF/").await?;
//! ws.send(r#"{"type":"ping"}"#.to_string()).await?;
//!
//! if let Some(Ok(msg)) = ws.recv().await {
//!     println!("server said: {msg}");
//! }
//!
//! ws.close().await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
