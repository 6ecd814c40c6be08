#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for Moonhunt Client integration tests.
//!
//! Provides a channel-based [`MockTransport`], a [`ScriptConnector`] that
//! hands out scripted transports dial by dial, and helper functions for
//! constructing common server envelope JSON strings.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use moonhunt_client::protocol::{
    EliminationPayload, Phase, PhaseChangePayload, Player, PlayerId, PlayerRef, RevealedPlayer,
    Role, Room, RoomStatus, ServerEvent, StatePayload,
};
use moonhunt_client::{Connector, MoonhuntError, Transport};

// ── MockTransport ───────────────────────────────────────────────────

/// A channel-based mock transport for integration testing.
///
/// Scripted server envelopes are consumed in order by `recv()`.
/// All messages sent by the client are recorded in `sent`.
pub struct MockTransport {
    /// Scripted server envelopes (consumed in order by `recv`).
    incoming: VecDeque<Option<Result<String, MoonhuntError>>>,
    /// Recorded outgoing messages from the client.
    pub sent: Arc<StdMutex<Vec<String>>>,
    /// Whether `close()` has been called.
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a new mock transport with the given scripted incoming messages.
    ///
    /// Returns the transport plus shared handles for inspecting sent messages
    /// and whether close was called.
    pub fn new(
        incoming: Vec<Option<Result<String, MoonhuntError>>>,
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
    async fn send(&mut self, message: String) -> Result<(), MoonhuntError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, MoonhuntError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // No more scripted messages — hang forever so the session loop
            // stays alive until disconnect is called.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), MoonhuntError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── ScriptConnector ─────────────────────────────────────────────────

/// Hands out pre-built [`MockTransport`]s one per dial, recording the room
/// code of every dial. Once the script is exhausted, further dials fail,
/// which the channel treats as a failed reconnect attempt.
pub struct ScriptConnector {
    transports: StdMutex<VecDeque<MockTransport>>,
    pub dialed: Arc<StdMutex<Vec<String>>>,
}

impl ScriptConnector {
    pub fn new(transports: Vec<MockTransport>) -> (Self, Arc<StdMutex<Vec<String>>>) {
        let dialed = Arc::new(StdMutex::new(Vec::new()));
        let connector = Self {
            transports: StdMutex::new(VecDeque::from(transports)),
            dialed: Arc::clone(&dialed),
        };
        (connector, dialed)
    }
}

#[async_trait]
impl Connector for ScriptConnector {
    async fn connect(&self, room_code: &str) -> Result<Box<dyn Transport>, MoonhuntError> {
        self.dialed.lock().unwrap().push(room_code.to_string());
        self.transports
            .lock()
            .unwrap()
            .pop_front()
            .map(|t| Box::new(t) as Box<dyn Transport>)
            .ok_or_else(|| MoonhuntError::TransportReceive("connection refused".into()))
    }
}

// ── Roster helpers ──────────────────────────────────────────────────

/// A living, non-leader roster entry with no known role.
pub fn player(id: PlayerId, nickname: &str) -> Player {
    Player {
        id,
        nickname: nickname.into(),
        is_alive: true,
        is_leader: false,
        role: None,
    }
}

/// A push-snapshot room summary (`code`, `status`, `max_players` only).
pub fn room(code: &str, status: RoomStatus) -> Room {
    Room {
        code: code.into(),
        status,
        max_players: 8,
        player_count: None,
        num_wolves: None,
        num_seers: None,
        num_protectors: None,
        num_hunters: None,
    }
}

// ── JSON helper functions ───────────────────────────────────────────

/// Returns the JSON string for an `initial_state` envelope carrying a room
/// summary and a roster, with no game state yet.
pub fn initial_state_json(code: &str, status: RoomStatus, players: Vec<Player>) -> String {
    serde_json::to_string(&ServerEvent::InitialState(Box::new(StatePayload {
        room: Some(room(code, status)),
        players: Some(players),
        game_state: None,
    })))
    .expect("initial_state_json serialization")
}

/// Returns the JSON string for a roster-only `state_update` envelope.
pub fn roster_update_json(players: Vec<Player>) -> String {
    serde_json::to_string(&ServerEvent::StateUpdate(Box::new(StatePayload {
        room: None,
        players: Some(players),
        game_state: None,
    })))
    .expect("roster_update_json serialization")
}

/// Returns the JSON string for a `player_joined` envelope.
pub fn player_joined_json(id: PlayerId, nickname: &str) -> String {
    serde_json::to_string(&ServerEvent::PlayerJoined {
        player: PlayerRef {
            id,
            nickname: nickname.into(),
        },
    })
    .expect("player_joined_json serialization")
}

/// Returns the JSON string for a `phase_change` envelope.
pub fn phase_change_json(phase: Phase, deaths: Vec<RevealedPlayer>) -> String {
    serde_json::to_string(&ServerEvent::PhaseChange(PhaseChangePayload {
        phase,
        night_number: None,
        day_number: None,
        deaths,
    }))
    .expect("phase_change_json serialization")
}

/// Returns the JSON string for a `player_eliminated` envelope.
pub fn eliminated_json(id: PlayerId, nickname: &str, role: Option<Role>) -> String {
    serde_json::to_string(&ServerEvent::PlayerEliminated(EliminationPayload {
        player: RevealedPlayer {
            id,
            nickname: nickname.into(),
            role,
        },
        hunter_revenge: None,
    }))
    .expect("eliminated_json serialization")
}

/// Returns the JSON string for a `leader_elected` envelope.
pub fn leader_elected_json(id: PlayerId, nickname: &str) -> String {
    serde_json::to_string(&ServerEvent::LeaderElected {
        leader: PlayerRef {
            id,
            nickname: nickname.into(),
        },
    })
    .expect("leader_elected_json serialization")
}

/// Returns the JSON string for a `game_ended` envelope.
pub fn game_ended_json(winner: &str, reason: Option<&str>) -> String {
    serde_json::to_string(&ServerEvent::GameEnded {
        winner: winner.into(),
        reason: reason.map(Into::into),
    })
    .expect("game_ended_json serialization")
}

/// Returns the JSON string for a `pong` envelope.
pub fn pong_json() -> String {
    serde_json::to_string(&ServerEvent::Pong).expect("pong_json serialization")
}
