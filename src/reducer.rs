//! The event reducer: the single merge point between server envelopes and
//! the local snapshot.
//!
//! [`reduce`] is a total, pure function over its two inputs: no I/O, no
//! blocking, no clocks. It reports whether the snapshot changed and which
//! notifications to enqueue; the store commits both. State effects are
//! idempotent because the server resends a full snapshot after reconnects
//! and duplicate delivery is possible around that boundary.

use crate::notify::NoticeDraft;
use crate::protocol::{
    EliminationPayload, GameState, Phase, PhaseChangePayload, Player, PlayerRef,
    RevealedPlayer, Room, ServerEvent, StatePayload,
};
use crate::store::Snapshot;

/// Outcome of one reducer application.
#[derive(Debug, Default)]
pub struct Applied {
    /// Whether the snapshot was mutated.
    pub changed: bool,
    /// Notifications to enqueue, in order.
    pub notices: Vec<NoticeDraft>,
}

/// Applies one server envelope to the snapshot.
pub fn reduce(snapshot: &mut Snapshot, event: &ServerEvent) -> Applied {
    match event {
        ServerEvent::InitialState(payload) | ServerEvent::StateUpdate(payload) => {
            apply_state(snapshot, payload)
        }
        ServerEvent::PlayerJoined { player } => player_joined(snapshot, player),
        ServerEvent::PhaseChange(payload) => phase_change(snapshot, payload),
        ServerEvent::PlayerEliminated(payload) => player_eliminated(snapshot, payload),
        ServerEvent::LeaderElected { leader } => leader_elected(snapshot, leader),
        ServerEvent::HunterRevenge { hunter, victim } => {
            hunter_revenge(snapshot, hunter, victim)
        }
        ServerEvent::GameEnded { winner, reason } => {
            game_ended(snapshot, winner, reason.as_deref())
        }
        ServerEvent::Pong => Applied::default(),
    }
}

/// Merges a full or partial state snapshot, field by field, keyed on
/// presence. The bootstrap loader routes its pull results through this same
/// path, so pull and push converge to the same snapshot in either order.
pub(crate) fn apply_state(snapshot: &mut Snapshot, payload: &StatePayload) -> Applied {
    let mut changed = false;
    if let Some(room) = &payload.room {
        changed |= merge_room(&mut snapshot.room, room);
    }
    if let Some(players) = &payload.players {
        changed |= replace_players(&mut snapshot.players, players);
    }
    if let Some(game_state) = &payload.game_state {
        if snapshot.game_state.as_ref() != Some(game_state) {
            snapshot.game_state = Some(game_state.clone());
            changed = true;
        }
    }
    Applied {
        changed,
        notices: Vec::new(),
    }
}

/// Merges room scalars field by field. The push snapshot omits the pull-only
/// fields (player count, role composition), so an absent optional never
/// erases a known value; pull and push therefore converge in either order.
fn merge_room(current: &mut Option<Room>, incoming: &Room) -> bool {
    let Some(room) = current else {
        *current = Some(incoming.clone());
        return true;
    };
    let mut changed = false;
    if room.code != incoming.code {
        room.code = incoming.code.clone();
        changed = true;
    }
    if room.status != incoming.status {
        room.status = incoming.status;
        changed = true;
    }
    if room.max_players != incoming.max_players {
        room.max_players = incoming.max_players;
        changed = true;
    }
    changed |= merge_known(&mut room.player_count, incoming.player_count);
    changed |= merge_known(&mut room.num_wolves, incoming.num_wolves);
    changed |= merge_known(&mut room.num_seers, incoming.num_seers);
    changed |= merge_known(&mut room.num_protectors, incoming.num_protectors);
    changed |= merge_known(&mut room.num_hunters, incoming.num_hunters);
    changed
}

fn merge_known<T: Copy + PartialEq>(slot: &mut Option<T>, incoming: Option<T>) -> bool {
    if incoming.is_some() && *slot != incoming {
        *slot = incoming;
        true
    } else {
        false
    }
}

/// Replaces the roster wholesale, keyed by id. Entries arriving without a
/// role keep any role already known for the same id (the local role or a
/// prior reveal), so a routine roster refresh never erases knowledge.
fn replace_players(current: &mut Vec<Player>, incoming: &[Player]) -> bool {
    let mut next: Vec<Player> = Vec::with_capacity(incoming.len());
    for entry in incoming {
        if next.iter().any(|p| p.id == entry.id) {
            continue;
        }
        let mut player = entry.clone();
        if player.role.is_none() {
            player.role = current
                .iter()
                .find(|p| p.id == entry.id)
                .and_then(|p| p.role);
        }
        next.push(player);
    }
    if *current == next {
        false
    } else {
        *current = next;
        true
    }
}

fn player_joined(snapshot: &mut Snapshot, joined: &PlayerRef) -> Applied {
    let mut applied = Applied::default();
    if !snapshot.players.iter().any(|p| p.id == joined.id) {
        snapshot.players.push(Player {
            id: joined.id,
            nickname: joined.nickname.clone(),
            is_alive: true,
            is_leader: false,
            role: None,
        });
        applied.changed = true;
    }
    applied
        .notices
        .push(NoticeDraft::info(format!("{} joined the room", joined.nickname)));
    applied
}

fn phase_change(snapshot: &mut Snapshot, payload: &PhaseChangePayload) -> Applied {
    let mut applied = Applied::default();

    let state = snapshot.game_state.get_or_insert_with(GameState::default);
    let phase_changed = state.phase != payload.phase;
    if phase_changed {
        state.phase = payload.phase;
        applied.changed = true;
    }
    let night_fallback = state.night_number;
    let day_fallback = state.day_number;

    if phase_changed && snapshot.pending_hunter_revenge.is_some() {
        snapshot.pending_hunter_revenge = None;
    }

    match payload.phase {
        Phase::Night => {
            let night = payload.night_number.unwrap_or(night_fallback);
            applied
                .notices
                .push(NoticeDraft::info(format!("Night {night} begins...")));
        }
        Phase::Day => {
            let day = payload.day_number.unwrap_or(day_fallback);
            applied.notices.push(NoticeDraft::info(format!("Day {day}")));
            for death in &payload.deaths {
                applied.changed |= mark_dead(&mut snapshot.players, death);
                applied
                    .notices
                    .push(NoticeDraft::error(format!("{} was killed!", death.nickname)));
            }
        }
        Phase::Voting => {
            applied
                .notices
                .push(NoticeDraft::warning("Voting phase begins!"));
        }
        _ => {}
    }
    applied
}

/// Marks a revealed player dead, recording the disclosed role. Unknown ids
/// mutate nothing; the next roster refresh reconciles.
fn mark_dead(players: &mut [Player], revealed: &RevealedPlayer) -> bool {
    let Some(player) = players.iter_mut().find(|p| p.id == revealed.id) else {
        return false;
    };
    let mut changed = false;
    if player.is_alive {
        player.is_alive = false;
        changed = true;
    }
    if player.role.is_none() && revealed.role.is_some() {
        player.role = revealed.role;
        changed = true;
    }
    changed
}

fn player_eliminated(snapshot: &mut Snapshot, payload: &EliminationPayload) -> Applied {
    let mut applied = Applied::default();
    applied.changed = mark_dead(&mut snapshot.players, &payload.player);
    if payload.hunter_revenge.is_some()
        && snapshot.pending_hunter_revenge != payload.hunter_revenge
    {
        snapshot.pending_hunter_revenge = payload.hunter_revenge;
        applied.changed = true;
    }
    let message = match payload.player.role {
        Some(role) => format!(
            "{} was eliminated! They were {role}",
            payload.player.nickname
        ),
        None => format!("{} was eliminated!", payload.player.nickname),
    };
    applied.notices.push(NoticeDraft::error(message));
    applied
}

fn leader_elected(snapshot: &mut Snapshot, leader: &PlayerRef) -> Applied {
    let mut applied = Applied::default();
    // One pass clears and sets, so no intermediate state has two leaders.
    for player in &mut snapshot.players {
        let should_lead = player.id == leader.id;
        if player.is_leader != should_lead {
            player.is_leader = should_lead;
            applied.changed = true;
        }
    }
    applied.notices.push(NoticeDraft::success(format!(
        "{} is now the leader!",
        leader.nickname
    )));
    applied
}

fn hunter_revenge(snapshot: &mut Snapshot, hunter: &str, victim: &RevealedPlayer) -> Applied {
    let mut applied = Applied::default();
    applied.changed = mark_dead(&mut snapshot.players, victim);
    if snapshot.pending_hunter_revenge.is_some() {
        snapshot.pending_hunter_revenge = None;
        applied.changed = true;
    }
    applied.notices.push(NoticeDraft::error(format!(
        "{hunter} took {} with them!",
        victim.nickname
    )));
    applied
}

fn game_ended(snapshot: &mut Snapshot, winner: &str, reason: Option<&str>) -> Applied {
    let mut applied = Applied::default();
    if !snapshot.session_ended {
        snapshot.session_ended = true;
        applied.changed = true;
    }
    if snapshot.winner.as_deref() != Some(winner) {
        snapshot.winner = Some(winner.to_string());
        applied.changed = true;
    }
    if reason.is_some() && snapshot.end_reason.as_deref() != reason {
        snapshot.end_reason = reason.map(str::to_string);
        applied.changed = true;
    }
    applied
        .notices
        .push(NoticeDraft::success(format!("Game Over! {winner} win!")));
    applied
}
