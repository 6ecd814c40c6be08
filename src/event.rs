//! Events delivered to room-channel listeners.

use std::time::Duration;

use crate::protocol::ServerEvent;

/// Why a channel stopped for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called, or the channel moved to another room.
    Requested,
    /// The reconnect budget ran out without a successful dial.
    RetriesExhausted,
}

/// Connection lifecycle and decoded envelopes, in arrival order.
///
/// Listeners receive every variant; most wire the [`Message`] arm straight
/// into [`GameStore::dispatch`] and surface the others as connectivity UI.
///
/// [`Message`]: ChannelEvent::Message
/// [`GameStore::dispatch`]: crate::store::GameStore::dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A connection for `room_code` was established (first dial and every
    /// successful reconnect; the server follows with `initial_state`).
    Connected { room_code: String },
    /// A decoded server envelope.
    Message(ServerEvent),
    /// The connection dropped; the channel sleeps `delay`, then makes dial
    /// attempt number `attempt`.
    Reconnecting { attempt: u32, delay: Duration },
    /// The connection ended for good.
    Disconnected { reason: DisconnectReason },
}
