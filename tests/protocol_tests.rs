#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests for the Moonhunt protocol types.
//!
//! Fixtures are verbatim copies of what the game server actually sends, so
//! these tests pin the JSON contract: envelope framing, field defaults, and
//! tolerance for server-side extras the client does not model.

use moonhunt_client::protocol::{
    ClientMessage, GameState, Phase, Player, Role, RoomStatus, ServerEvent, StatePayload,
};

// ════════════════════════════════════════════════════════════════════
// Envelope framing
// ════════════════════════════════════════════════════════════════════

#[test]
fn server_envelopes_use_adjacent_type_and_data_tags() {
    let json = r#"{"type": "player_joined", "data": {"player": {"id": 4, "nickname": "Dana"}}}"#;
    let event: ServerEvent = serde_json::from_str(json).unwrap();
    assert!(matches!(
        &event,
        ServerEvent::PlayerJoined { player } if player.id == 4 && player.nickname == "Dana"
    ));

    let out: serde_json::Value = serde_json::to_value(&event).unwrap();
    assert_eq!(out["type"], "player_joined");
    assert!(out["data"]["player"].is_object());
}

#[test]
fn unit_envelopes_omit_the_data_key() {
    assert_eq!(
        serde_json::to_string(&ServerEvent::Pong).unwrap(),
        r#"{"type":"pong"}"#
    );
    let event: ServerEvent = serde_json::from_str(r#"{"type": "pong"}"#).unwrap();
    assert_eq!(event, ServerEvent::Pong);
}

#[test]
fn unknown_envelope_type_fails_to_decode() {
    let json = r#"{"type": "solar_eclipse", "data": {"duration": 3}}"#;
    assert!(serde_json::from_str::<ServerEvent>(json).is_err());
}

#[test]
fn payload_envelope_without_data_fails_to_decode() {
    assert!(serde_json::from_str::<ServerEvent>(r#"{"type": "player_joined"}"#).is_err());
}

// ════════════════════════════════════════════════════════════════════
// State snapshots
// ════════════════════════════════════════════════════════════════════

#[test]
fn initial_state_decodes_a_full_snapshot() {
    // Captured from a live playing room. `speaking_order`, `time_remaining`
    // and `wolves_voted` are server-side bookkeeping the client ignores.
    let json = r#"{
        "type": "initial_state",
        "data": {
            "room": {"code": "WOLFIE", "status": "playing", "max_players": 8},
            "players": [
                {"id": 1, "nickname": "Ana", "is_alive": true, "is_leader": true},
                {"id": 2, "nickname": "Bruno", "is_alive": true, "is_leader": false},
                {"id": 3, "nickname": "Chloe", "is_alive": false, "is_leader": false, "role": "seer"}
            ],
            "game_state": {
                "phase": "night",
                "night_number": 2,
                "day_number": 1,
                "timer_end": "2026-03-14T21:45:00Z",
                "time_remaining": 37,
                "wolves_voted": 1,
                "speaking_order": [1, 2]
            }
        }
    }"#;
    let event: ServerEvent = serde_json::from_str(json).unwrap();
    let ServerEvent::InitialState(payload) = event else {
        panic!("expected initial_state");
    };

    let room = payload.room.unwrap();
    assert_eq!(room.code, "WOLFIE");
    assert_eq!(room.status, RoomStatus::Playing);
    assert_eq!(room.max_players, 8);
    assert_eq!(room.num_wolves, None);

    let players = payload.players.unwrap();
    assert_eq!(players.len(), 3);
    assert!(players[0].is_leader);
    assert!(!players[2].is_alive);
    assert_eq!(players[2].role, Some(Role::Seer));

    let state = payload.game_state.unwrap();
    assert_eq!(state.phase, Phase::Night);
    assert_eq!(state.night_number, 2);
    assert_eq!(state.timer_end.as_deref(), Some("2026-03-14T21:45:00Z"));
}

#[test]
fn state_update_accepts_partial_payloads() {
    let json = r#"{
        "type": "state_update",
        "data": {
            "game_state": {"phase": "voting", "night_number": 1, "day_number": 1}
        }
    }"#;
    let event: ServerEvent = serde_json::from_str(json).unwrap();
    let ServerEvent::StateUpdate(payload) = event else {
        panic!("expected state_update");
    };
    assert!(payload.room.is_none());
    assert!(payload.players.is_none());
    assert_eq!(payload.game_state.unwrap().phase, Phase::Voting);
}

#[test]
fn null_game_state_decodes_as_absent() {
    // Waiting rooms report `game_state: null` until the game starts.
    let json = r#"{
        "type": "initial_state",
        "data": {
            "room": {"code": "NIGHT1", "status": "waiting", "max_players": 6},
            "players": [],
            "game_state": null
        }
    }"#;
    let event: ServerEvent = serde_json::from_str(json).unwrap();
    let ServerEvent::InitialState(payload) = event else {
        panic!("expected initial_state");
    };
    assert!(payload.game_state.is_none());
    assert_eq!(payload.players.unwrap().len(), 0);
}

#[test]
fn serialized_snapshots_skip_absent_sections() {
    let payload = StatePayload {
        game_state: Some(GameState {
            phase: Phase::Day,
            night_number: 1,
            day_number: 1,
            ..GameState::default()
        }),
        ..StatePayload::default()
    };
    let json = serde_json::to_string(&ServerEvent::StateUpdate(Box::new(payload))).unwrap();
    assert!(!json.contains("\"room\""));
    assert!(!json.contains("\"players\""));
    assert!(!json.contains("timer_end"));
}

// ════════════════════════════════════════════════════════════════════
// Roster entries
// ════════════════════════════════════════════════════════════════════

#[test]
fn player_defaults_apply_when_fields_are_missing() {
    // The join payload carries only id and nickname.
    let player: Player = serde_json::from_str(r#"{"id": 5, "nickname": "Eve"}"#).unwrap();
    assert_eq!(player.id, 5);
    assert!(player.is_alive);
    assert!(!player.is_leader);
    assert_eq!(player.role, None);
}

#[test]
fn unknown_role_is_omitted_from_serialized_roster() {
    let player = Player {
        id: 7,
        nickname: "Filip".to_string(),
        is_alive: true,
        is_leader: false,
        role: None,
    };
    let json = serde_json::to_string(&player).unwrap();
    assert!(!json.contains("role"));
}

#[test]
fn revealed_roster_entry_decodes_role() {
    let json =
        r#"{"id": 2, "nickname": "Bruno", "is_alive": false, "is_leader": false, "role": "wolf"}"#;
    let player: Player = serde_json::from_str(json).unwrap();
    assert!(!player.is_alive);
    assert_eq!(player.role, Some(Role::Wolf));
}

// ════════════════════════════════════════════════════════════════════
// Enum wire spellings
// ════════════════════════════════════════════════════════════════════

#[test]
fn phase_wire_spellings_are_snake_case() {
    let cases = [
        ("setup", Phase::Setup),
        ("night", Phase::Night),
        ("day", Phase::Day),
        ("leader_election", Phase::LeaderElection),
        ("voting", Phase::Voting),
        ("finished", Phase::Finished),
    ];
    for (wire, phase) in cases {
        let decoded: Phase = serde_json::from_str(&format!("\"{wire}\"")).unwrap();
        assert_eq!(decoded, phase, "wire spelling {wire}");
    }
}

#[test]
fn room_status_wire_spellings() {
    for (wire, status) in [
        ("waiting", RoomStatus::Waiting),
        ("playing", RoomStatus::Playing),
        ("finished", RoomStatus::Finished),
    ] {
        let decoded: RoomStatus = serde_json::from_str(&format!("\"{wire}\"")).unwrap();
        assert_eq!(decoded, status);
    }
}

#[test]
fn role_display_matches_wire_spelling() {
    for role in [
        Role::Wolf,
        Role::Citizen,
        Role::Seer,
        Role::Protector,
        Role::Hunter,
    ] {
        let wire = serde_json::to_string(&role).unwrap();
        assert_eq!(wire, format!("\"{role}\""));
    }
}

// ════════════════════════════════════════════════════════════════════
// Game events
// ════════════════════════════════════════════════════════════════════

#[test]
fn phase_change_to_day_carries_night_deaths() {
    let json = r#"{
        "type": "phase_change",
        "data": {
            "phase": "day",
            "night_number": 1,
            "day_number": 1,
            "deaths": [
                {"id": 2, "nickname": "Bruno", "role": "citizen"},
                {"id": 6, "nickname": "Greta"}
            ]
        }
    }"#;
    let event: ServerEvent = serde_json::from_str(json).unwrap();
    let ServerEvent::PhaseChange(payload) = event else {
        panic!("expected phase_change");
    };
    assert_eq!(payload.phase, Phase::Day);
    assert_eq!(payload.deaths.len(), 2);
    assert_eq!(payload.deaths[0].role, Some(Role::Citizen));
    assert_eq!(payload.deaths[1].role, None);
}

#[test]
fn phase_change_without_deaths_defaults_to_empty() {
    let json = r#"{"type": "phase_change", "data": {"phase": "night", "night_number": 2}}"#;
    let event: ServerEvent = serde_json::from_str(json).unwrap();
    let ServerEvent::PhaseChange(payload) = event else {
        panic!("expected phase_change");
    };
    assert_eq!(payload.phase, Phase::Night);
    assert_eq!(payload.night_number, Some(2));
    assert_eq!(payload.day_number, None);
    assert!(payload.deaths.is_empty());
}

#[test]
fn player_eliminated_reveals_role_and_hunter_claim() {
    let json = r#"{
        "type": "player_eliminated",
        "data": {
            "player": {"id": 3, "nickname": "Chloe", "role": "hunter"},
            "hunter_revenge": 3
        }
    }"#;
    let event: ServerEvent = serde_json::from_str(json).unwrap();
    let ServerEvent::PlayerEliminated(payload) = event else {
        panic!("expected player_eliminated");
    };
    assert_eq!(payload.player.role, Some(Role::Hunter));
    assert_eq!(payload.hunter_revenge, Some(3));
}

#[test]
fn player_eliminated_without_revenge_claim() {
    let json = r#"{
        "type": "player_eliminated",
        "data": {"player": {"id": 2, "nickname": "Bruno", "role": "wolf"}}
    }"#;
    let event: ServerEvent = serde_json::from_str(json).unwrap();
    let ServerEvent::PlayerEliminated(payload) = event else {
        panic!("expected player_eliminated");
    };
    assert_eq!(payload.hunter_revenge, None);
}

#[test]
fn leader_elected_names_the_leader() {
    let json = r#"{"type": "leader_elected", "data": {"leader": {"id": 1, "nickname": "Ana"}}}"#;
    let event: ServerEvent = serde_json::from_str(json).unwrap();
    assert!(matches!(
        &event,
        ServerEvent::LeaderElected { leader } if leader.id == 1 && leader.nickname == "Ana"
    ));
}

#[test]
fn hunter_revenge_names_both_sides() {
    let json = r#"{
        "type": "hunter_revenge",
        "data": {
            "hunter": "Chloe",
            "victim": {"id": 5, "nickname": "Eve", "role": "wolf"}
        }
    }"#;
    let event: ServerEvent = serde_json::from_str(json).unwrap();
    let ServerEvent::HunterRevenge { hunter, victim } = event else {
        panic!("expected hunter_revenge");
    };
    assert_eq!(hunter, "Chloe");
    assert_eq!(victim.nickname, "Eve");
    assert_eq!(victim.role, Some(Role::Wolf));
}

#[test]
fn game_ended_with_and_without_reason() {
    let json = r#"{
        "type": "game_ended",
        "data": {"winner": "citizens", "reason": "All wolves eliminated"}
    }"#;
    let event: ServerEvent = serde_json::from_str(json).unwrap();
    assert!(matches!(
        &event,
        ServerEvent::GameEnded { winner, reason }
            if winner == "citizens" && reason.as_deref() == Some("All wolves eliminated")
    ));

    let json = r#"{"type": "game_ended", "data": {"winner": "wolves"}}"#;
    let event: ServerEvent = serde_json::from_str(json).unwrap();
    assert!(matches!(
        &event,
        ServerEvent::GameEnded { winner, reason } if winner == "wolves" && reason.is_none()
    ));
}

#[test]
fn extra_payload_fields_are_ignored() {
    // Servers grow fields; old clients must keep decoding.
    let json = r#"{
        "type": "leader_elected",
        "data": {
            "leader": {"id": 1, "nickname": "Ana", "elected_at": "2026-03-14T20:00:00Z"},
            "votes_cast": 5
        }
    }"#;
    let event: ServerEvent = serde_json::from_str(json).unwrap();
    assert!(matches!(event, ServerEvent::LeaderElected { .. }));
}

// ════════════════════════════════════════════════════════════════════
// Client messages
// ════════════════════════════════════════════════════════════════════

#[test]
fn client_messages_serialize_as_bare_type_tags() {
    assert_eq!(
        serde_json::to_string(&ClientMessage::Ping).unwrap(),
        r#"{"type":"ping"}"#
    );
    assert_eq!(
        serde_json::to_string(&ClientMessage::RequestState).unwrap(),
        r#"{"type":"request_state"}"#
    );
}
