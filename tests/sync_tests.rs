#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! End-to-end synchronization tests: server envelopes flowing through a
//! `RoomChannel` into a `GameStore`, and the ordering and convergence
//! guarantees the store makes to its subscribers.

mod common;

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use moonhunt_client::protocol::{
    GameState, Phase, PhaseChangePayload, PlayerRef, RevealedPlayer, Room, RoomStatus,
    ServerEvent, StatePayload,
};
use moonhunt_client::{
    ChannelConfig, ChannelEvent, CredentialKind, CredentialStore, GameStore, NotificationKind,
    Role, RoomChannel,
};

use common::{initial_state_json, phase_change_json, player, room, MockTransport, ScriptConnector};

fn store() -> GameStore {
    GameStore::new(CredentialStore::in_memory())
}

// ════════════════════════════════════════════════════════════════════
// Pull/push convergence
// ════════════════════════════════════════════════════════════════════

#[test]
fn pull_and_push_snapshots_converge_in_either_order() {
    // The pull API reports the role composition; the push snapshot carries
    // the live game state. A client that bootstraps first and one whose
    // initial_state lands first must end up with the same picture.
    let roster = vec![player(1, "Ana"), player(2, "Bruno")];
    let pull = ServerEvent::StateUpdate(Box::new(StatePayload {
        room: Some(Room {
            code: "WOLFIE".to_string(),
            status: RoomStatus::Playing,
            max_players: 8,
            player_count: Some(2),
            num_wolves: Some(2),
            num_seers: Some(1),
            num_protectors: Some(1),
            num_hunters: Some(1),
        }),
        players: Some(roster.clone()),
        game_state: None,
    }));
    let push = ServerEvent::InitialState(Box::new(StatePayload {
        room: Some(room("WOLFIE", RoomStatus::Playing)),
        players: Some(roster),
        game_state: Some(GameState {
            phase: Phase::Night,
            night_number: 1,
            ..GameState::default()
        }),
    }));

    let pull_first = store();
    pull_first.dispatch(&pull);
    pull_first.dispatch(&push);

    let push_first = store();
    push_first.dispatch(&push);
    push_first.dispatch(&pull);

    let a = pull_first.snapshot();
    let b = push_first.snapshot();
    assert_eq!(a.room, b.room);
    assert_eq!(a.players, b.players);
    assert_eq!(a.game_state, b.game_state);

    // Neither order loses the pull-only composition or the push-only phase.
    assert_eq!(a.room.as_ref().unwrap().num_wolves, Some(2));
    assert_eq!(a.phase(), Phase::Night);
}

// ════════════════════════════════════════════════════════════════════
// Room lifecycle scenarios
// ════════════════════════════════════════════════════════════════════

#[test]
fn fresh_room_gains_members_as_they_join() {
    let store = store();
    store.dispatch(&ServerEvent::InitialState(Box::new(StatePayload {
        room: Some(room("WOLFIE", RoomStatus::Waiting)),
        players: Some(vec![]),
        game_state: None,
    })));
    store.dispatch(&ServerEvent::PlayerJoined {
        player: PlayerRef {
            id: 1,
            nickname: "Ana".to_string(),
        },
    });

    let snapshot = store.snapshot();
    assert_eq!(snapshot.players.len(), 1);
    assert!(snapshot.players[0].is_alive);
    assert!(!snapshot.players[0].is_leader);
    assert!(snapshot
        .notifications
        .iter()
        .any(|n| n.kind == NotificationKind::Info && n.message == "Ana joined the room"));
}

#[test]
fn daybreak_kills_victims_and_notifies_once() {
    let store = store();
    store.dispatch(&ServerEvent::InitialState(Box::new(StatePayload {
        room: Some(room("WOLFIE", RoomStatus::Playing)),
        players: Some(vec![player(1, "Ana"), player(2, "Bruno"), player(3, "Chloe")]),
        game_state: Some(GameState {
            phase: Phase::Night,
            night_number: 1,
            ..GameState::default()
        }),
    })));

    let daybreak = ServerEvent::PhaseChange(PhaseChangePayload {
        phase: Phase::Day,
        night_number: Some(1),
        day_number: Some(1),
        deaths: vec![RevealedPlayer {
            id: 2,
            nickname: "Bruno".to_string(),
            role: Some(Role::Citizen),
        }],
    });
    store.dispatch(&daybreak);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.phase(), Phase::Day);
    assert_eq!(snapshot.alive_players().len(), 2);
    let bruno = snapshot.players.iter().find(|p| p.id == 2).unwrap();
    assert!(!bruno.is_alive);
    assert_eq!(bruno.role, Some(Role::Citizen));

    let death_notices = snapshot
        .notifications
        .iter()
        .filter(|n| n.kind == NotificationKind::Error && n.message.contains("Bruno"))
        .count();
    assert_eq!(death_notices, 1);

    // Replaying the same envelope leaves the roster untouched.
    store.dispatch(&daybreak);
    assert_eq!(store.snapshot().players, snapshot.players);
}

#[test]
fn leader_badge_moves_to_the_elected_player() {
    let store = store();
    let mut ana = player(1, "Ana");
    ana.is_leader = true;
    store.dispatch(&ServerEvent::InitialState(Box::new(StatePayload {
        room: Some(room("WOLFIE", RoomStatus::Playing)),
        players: Some(vec![ana, player(2, "Bruno")]),
        game_state: None,
    })));

    store.dispatch(&ServerEvent::LeaderElected {
        leader: PlayerRef {
            id: 2,
            nickname: "Bruno".to_string(),
        },
    });

    let snapshot = store.snapshot();
    let leaders: Vec<_> = snapshot.players.iter().filter(|p| p.is_leader).collect();
    assert_eq!(leaders.len(), 1);
    assert_eq!(leaders[0].id, 2);
}

#[test]
fn reset_clears_snapshot_and_credentials_together() {
    let credentials = CredentialStore::in_memory();
    credentials.set(CredentialKind::RoomCode, "WOLFIE");
    credentials.set_player(1, "tok-ana");
    let store = GameStore::new(credentials);

    store.dispatch(&ServerEvent::InitialState(Box::new(StatePayload {
        room: Some(room("WOLFIE", RoomStatus::Playing)),
        players: Some(vec![player(1, "Ana")]),
        game_state: None,
    })));
    store.bind_local_player(1);
    assert!(store.local_player().is_some());

    store.reset();

    let snapshot = store.snapshot();
    assert!(snapshot.room.is_none());
    assert!(snapshot.players.is_empty());
    assert!(snapshot.notifications.is_empty());
    assert_eq!(store.credentials().room_code(), None);
    assert_eq!(store.credentials().player_token(), None);
}

// ════════════════════════════════════════════════════════════════════
// Subscriber guarantees
// ════════════════════════════════════════════════════════════════════

#[test]
fn subscribers_observe_each_commit_in_order() {
    let store = store();
    let seen = Arc::new(StdMutex::new(Vec::new()));
    let sink = seen.clone();
    store.subscribe(move |snapshot| {
        sink.lock().unwrap().push(snapshot.players.len());
    });

    store.dispatch(&ServerEvent::PlayerJoined {
        player: PlayerRef {
            id: 1,
            nickname: "Ana".to_string(),
        },
    });
    store.dispatch(&ServerEvent::PlayerJoined {
        player: PlayerRef {
            id: 2,
            nickname: "Bruno".to_string(),
        },
    });

    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
}

#[test]
fn no_change_events_do_not_wake_subscribers() {
    let store = store();
    let calls = Arc::new(StdMutex::new(0usize));
    let sink = calls.clone();
    store.subscribe(move |_| {
        *sink.lock().unwrap() += 1;
    });

    store.dispatch(&ServerEvent::Pong);
    assert_eq!(*calls.lock().unwrap(), 0);
}

// ════════════════════════════════════════════════════════════════════
// Channel-to-store wiring
// ════════════════════════════════════════════════════════════════════

/// Full path: scripted transport, channel fan-out, store dispatch. The
/// snapshot rebuilt from the resent initial_state must match the one from
/// before the drop.
#[tokio::test]
async fn reconnect_rebuilds_an_identical_snapshot() {
    let full_state = || {
        serde_json::to_string(&ServerEvent::InitialState(Box::new(StatePayload {
            room: Some(room("WOLFIE", RoomStatus::Playing)),
            players: Some(vec![player(1, "Ana"), player(2, "Bruno")]),
            game_state: Some(GameState {
                phase: Phase::Night,
                night_number: 1,
                ..GameState::default()
            }),
        })))
        .expect("initial_state serialization")
    };
    let (first, _sent_a, _closed_a) = MockTransport::new(vec![Some(Ok(full_state())), None]);
    let (second, _sent_b, _closed_b) = MockTransport::new(vec![Some(Ok(full_state()))]);
    let (connector, _dialed) = ScriptConnector::new(vec![first, second]);

    let channel = RoomChannel::with_config(
        connector,
        ChannelConfig::default().with_initial_retry_delay(Duration::from_millis(10)),
    );
    let store = store();

    // Bridge: dispatch into the store, then report progress for sequencing.
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let dispatch_store = store.clone();
    channel.add_listener(move |event| {
        if let ChannelEvent::Message(server_event) = event {
            dispatch_store.dispatch(server_event);
        }
        let _ = tx.send(event.clone());
    });

    channel.connect("WOLFIE").await.expect("connect");

    // Wait for the first snapshot to land, then record it.
    loop {
        let ev = rx.recv().await.expect("event");
        if matches!(ev, ChannelEvent::Message(ServerEvent::InitialState(_))) {
            break;
        }
    }
    let before = store.snapshot();
    assert_eq!(before.players.len(), 2);

    // Wait for the reconnect and the resent snapshot.
    loop {
        let ev = rx.recv().await.expect("event");
        if matches!(ev, ChannelEvent::Message(ServerEvent::InitialState(_))) {
            break;
        }
    }
    let after = store.snapshot();
    assert_eq!(after.room, before.room);
    assert_eq!(after.players, before.players);
    assert_eq!(after.game_state, before.game_state);

    channel.disconnect().await;
}

/// Scripted envelopes drive a waiting room through a whole game; the store's
/// derived selectors track every transition.
#[tokio::test]
async fn scripted_game_drives_store_to_completion() {
    let (transport, _sent, _closed) = MockTransport::new(vec![
        Some(Ok(initial_state_json(
            "WOLFIE",
            RoomStatus::Playing,
            vec![player(1, "Ana"), player(2, "Bruno"), player(3, "Chloe")],
        ))),
        Some(Ok(phase_change_json(Phase::Night, vec![]))),
        Some(Ok(phase_change_json(
            Phase::Day,
            vec![RevealedPlayer {
                id: 2,
                nickname: "Bruno".to_string(),
                role: Some(Role::Wolf),
            }],
        ))),
        Some(Ok(serde_json::to_string(&ServerEvent::GameEnded {
            winner: "citizens".to_string(),
            reason: Some("All wolves eliminated".to_string()),
        })
        .expect("game_ended serialization"))),
    ]);
    let (connector, _dialed) = ScriptConnector::new(vec![transport]);
    let channel = RoomChannel::new(connector);
    let store = store();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let dispatch_store = store.clone();
    channel.add_listener(move |event| {
        if let ChannelEvent::Message(server_event) = event {
            dispatch_store.dispatch(server_event);
            let _ = tx.send(());
        }
    });

    channel.connect("WOLFIE").await.expect("connect");
    for _ in 0..4 {
        rx.recv().await.expect("dispatched envelope");
    }

    let snapshot = store.snapshot();
    assert!(snapshot.session_ended);
    assert_eq!(snapshot.winner.as_deref(), Some("citizens"));
    assert_eq!(snapshot.end_reason.as_deref(), Some("All wolves eliminated"));
    assert_eq!(snapshot.alive_players().len(), 2);
    assert_eq!(snapshot.dead_players().len(), 1);
    assert!(snapshot
        .notifications
        .iter()
        .any(|n| n.message == "Game Over! citizens win!"));

    channel.disconnect().await;
}
