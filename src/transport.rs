//! Transport abstraction for the room push channel.
//!
//! The [`Transport`] trait defines a bidirectional text message channel
//! between the client and the game server. The push protocol uses JSON text
//! envelopes, so every transport implementation must handle message framing
//! internally (e.g., WebSocket frames, length-prefixed TCP).
//!
//! # Connection Setup
//!
//! Connection setup is intentionally NOT part of [`Transport`] — different
//! transports have fundamentally different connection parameters. Dialing
//! lives behind [`Connector`] instead, so the channel can re-establish a
//! connection for the same room code during reconnect without knowing what
//! kind of transport it is driving.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use moonhunt_client::error::{MoonhuntError, Result};
//! use moonhunt_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<()> {
//!         // Send the JSON text message over your transport
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String>> {
//!         // Receive the next JSON text message
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<()> {
//!         // Gracefully shut down the connection
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector { /* ... */ }
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(&self, room_code: &str) -> Result<Box<dyn Transport>> {
//!         // Dial the push endpoint for `room_code`
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::Result;

/// A bidirectional text message transport for the room push channel.
///
/// Implementors shuttle serialized JSON strings between the client and
/// server. Each call to [`send`](Transport::send) transmits one complete
/// JSON envelope. Each call to [`recv`](Transport::recv) returns one.
///
/// # Object Safety
///
/// This trait is object-safe; the channel drives a `Box<dyn Transport>`
/// produced by a [`Connector`].
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it
/// is used inside `tokio::select!`. If `recv` is cancelled before
/// completion, calling it again must not lose data. Channel-based
/// implementations (e.g., wrapping `mpsc::Receiver`) are naturally
/// cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`MoonhuntError::TransportSend`] if the message could not be
    /// sent (e.g., connection broken, write buffer full).
    ///
    /// [`MoonhuntError::TransportSend`]: crate::error::MoonhuntError::TransportSend
    async fn send(&mut self, message: String) -> Result<()>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete message was received
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the connection was closed cleanly by the server
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Close the transport connection gracefully.
    ///
    /// After calling this method, subsequent calls to
    /// [`send`](Transport::send) and [`recv`](Transport::recv) may return
    /// errors or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations
    /// should still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<()>;
}

/// Dials a fresh [`Transport`] for a room code.
///
/// The channel owns a connector instead of a transport so its reconnect
/// loop can redial after an unexpected closure. Implementations must be
/// safe to call repeatedly and concurrently-shared (`&self`).
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establishes a connection to the push endpoint for `room_code`.
    ///
    /// # Errors
    ///
    /// Returns a transport or I/O error when the endpoint is unreachable;
    /// the channel turns this into a backoff retry.
    async fn connect(&self, room_code: &str) -> Result<Box<dyn Transport>>;
}
