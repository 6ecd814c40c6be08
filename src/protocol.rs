//! Wire-compatible protocol types for the Moonhunt game server.
//!
//! Every type in this module produces the exact JSON the server broadcasts
//! on the room channel and returns from the pull API. Conventions:
//!
//! - Push envelopes are `{type, data}` pairs with snake_case type tags.
//! - Timestamps travel as ISO 8601 strings and are never parsed here.
//! - Roster entries omit `role` unless the server has revealed it.

use serde::{Deserialize, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// Unique identifier for players (server-assigned, unique within a room).
pub type PlayerId = i64;

// ── Enums ───────────────────────────────────────────────────────────

/// Secret role assigned to a player when the game starts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Wolf,
    Citizen,
    Seer,
    Protector,
    Hunter,
}

impl Role {
    /// Wire name of the role, as the server spells it.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Wolf => "wolf",
            Role::Citizen => "citizen",
            Role::Seer => "seer",
            Role::Protector => "protector",
            Role::Hunter => "hunter",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Room lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    #[default]
    Waiting,
    Playing,
    Finished,
}

/// Game phase. Transitions are server-driven and arrive as discrete
/// `phase_change` events; the client never infers one from elapsed time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Setup,
    Night,
    Day,
    LeaderElection,
    Voting,
    Finished,
}

// ── Structs ─────────────────────────────────────────────────────────

/// A player in the room roster.
///
/// Roster broadcasts carry only `{id, nickname, is_alive, is_leader}`;
/// `role` is populated for the local player (via the role endpoint) or when
/// an elimination reveals it. The `player_joined` payload carries only
/// `{id, nickname}`, so the remaining fields default to a freshly joined,
/// living player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub nickname: String,
    #[serde(default = "default_true")]
    pub is_alive: bool,
    #[serde(default)]
    pub is_leader: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

fn default_true() -> bool {
    true
}

/// Room scalars shared by the pull API and the push snapshot.
///
/// Push snapshots carry only `code`, `status`, and `max_players`; the pull
/// API additionally reports the player count and the role composition chosen
/// at creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
    pub code: String,
    pub status: RoomStatus,
    pub max_players: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_wolves: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_seers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_protectors: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_hunters: Option<u32>,
}

/// Current game-state snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GameState {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub night_number: u32,
    #[serde(default)]
    pub day_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_speaker_id: Option<PlayerId>,
    /// ISO 8601 timestamp, present while a phase timer is running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_end: Option<String>,
}

// ── Payload structs ─────────────────────────────────────────────────

/// Payload for the `initial_state` and `state_update` envelopes.
/// Boxed in `ServerEvent` to reduce enum size.
///
/// Each field is independently optional: the server omits what has not
/// changed, and `game_state` is `null` until the game starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<Room>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub players: Option<Vec<Player>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_state: Option<GameState>,
}

/// A player identity as carried inside event payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerRef {
    pub id: PlayerId,
    pub nickname: String,
}

/// A death or elimination disclosure. Leaving the game is the one moment the
/// server reveals a player's role to everyone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevealedPlayer {
    pub id: PlayerId,
    pub nickname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// Payload for the `phase_change` envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseChangePayload {
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub night_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_number: Option<u32>,
    /// Players killed during the preceding night; present when `phase` is
    /// [`Phase::Day`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deaths: Vec<RevealedPlayer>,
}

/// Payload for the `player_eliminated` envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EliminationPayload {
    pub player: RevealedPlayer,
    /// Id of a just-eliminated hunter who is entitled to a revenge shot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hunter_revenge: Option<PlayerId>,
}

// ── Messages ────────────────────────────────────────────────────────

/// Messages a client may send over the room channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Heartbeat to keep the connection alive; answered with `pong`.
    Ping,
    /// Ask the server to resend a full `state_update` snapshot.
    RequestState,
}

/// Envelopes pushed by the server over the room channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full-state snapshot sent immediately after (re)connecting (boxed to
    /// reduce enum size).
    InitialState(Box<StatePayload>),
    /// Full or partial state refresh; also the answer to
    /// [`ClientMessage::RequestState`] (boxed to reduce enum size).
    StateUpdate(Box<StatePayload>),
    /// A player joined the room.
    PlayerJoined { player: PlayerRef },
    /// The game moved to a new phase.
    PhaseChange(PhaseChangePayload),
    /// A player was voted out; their role is revealed.
    PlayerEliminated(EliminationPayload),
    /// A new leader was elected.
    LeaderElected { leader: PlayerRef },
    /// A dead hunter took someone down with them.
    HunterRevenge {
        /// Nickname of the hunter, as the server spells it.
        hunter: String,
        victim: RevealedPlayer,
    },
    /// The game is over.
    GameEnded {
        winner: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Answer to a [`ClientMessage::Ping`].
    Pong,
}
