//! One-shot pull sequence that primes the store on room entry.
//!
//! [`bootstrap_room`] runs once per room entry, concurrently with the push
//! channel's connect: room summary, then the game-state snapshot when a game
//! is underway, then the local player's private role when a player identity
//! is already on file. Everything lands in the store through
//! [`GameStore::dispatch`], the same merge path push envelopes take, so pull
//! results and a racing `initial_state` converge regardless of which arrives
//! first.
//!
//! [`record_created`] and [`record_join`] are the companion glue for the
//! create/join responses: they bind the issued credentials and identity so a
//! later reload (or this bootstrap) can resume the session.
//!
//! # Feature gate
//!
//! This module is only available when the `http-api` feature is enabled (it
//! is enabled by default).

use tracing::{debug, warn};

use crate::api::{ApiClient, CreatedRoom, JoinedRoom};
use crate::credentials::CredentialKind;
use crate::error::{MoonhuntError, Result};
use crate::notify::NotificationKind;
use crate::protocol::{RoomStatus, ServerEvent, StatePayload};
use crate::store::GameStore;

/// Prime `store` for the room at `code`.
///
/// Fetches the room summary, then the game-state snapshot when the room is
/// playing or finished, then the local player's private role when the
/// session already holds a player identity and the game is in progress.
///
/// The role fetch is best-effort: a rejected token surfaces as a
/// notification and any other failure is only logged, so a stale player
/// credential can never block entering the room as a spectator.
///
/// # Errors
///
/// Room and game-state fetch failures are pushed onto the notification
/// queue and returned; the caller decides whether to navigate away.
pub async fn bootstrap_room(api: &ApiClient, store: &GameStore, code: &str) -> Result<()> {
    let credentials = store.credentials();
    credentials.set(CredentialKind::RoomCode, code);

    let detail = match api.room(code).await {
        Ok(detail) => detail,
        Err(err) => {
            let message = if err.is_not_found() {
                "Room not found".to_string()
            } else {
                describe(&err)
            };
            store.push_notification(NotificationKind::Error, message);
            return Err(err);
        }
    };
    let status = detail.status;
    let (room, players) = detail.into_parts();
    store.dispatch(&ServerEvent::StateUpdate(Box::new(StatePayload {
        room: Some(room),
        players: Some(players),
        game_state: None,
    })));
    debug!(code, ?status, "room summary loaded");

    if let Some(player_id) = credentials.player_id() {
        store.bind_local_player(player_id);
    }

    if matches!(status, RoomStatus::Playing | RoomStatus::Finished) {
        let game_state = match api.game_state(code).await {
            Ok(game_state) => game_state,
            Err(err) => {
                store.push_notification(NotificationKind::Error, describe(&err));
                return Err(err);
            }
        };
        store.dispatch(&ServerEvent::StateUpdate(Box::new(StatePayload {
            room: None,
            players: None,
            game_state: Some(game_state),
        })));
    }
    if status == RoomStatus::Finished {
        store.mark_session_ended();
    }

    if status == RoomStatus::Playing {
        if let (Some(player_id), Some(player_token)) =
            (credentials.player_id(), credentials.player_token())
        {
            match api.player_role(player_id, &player_token).await {
                Ok(response) => {
                    if let Some(role) = response.role {
                        store.set_local_role(role);
                    }
                }
                Err(err) if err.is_auth_error() => {
                    store.push_notification(
                        NotificationKind::Error,
                        "Player token was rejected",
                    );
                }
                Err(err) => {
                    // Best-effort: the room is already usable as a spectator.
                    warn!(player_id, "role fetch failed: {err}");
                }
            }
        }
    }

    Ok(())
}

/// Bind the credentials and initial snapshot from a successful
/// [`ApiClient::create_room`] call.
///
/// The admin token is stored for later `start_game`/`advance_phase` calls;
/// the embedded room record primes the store the same way a bootstrap
/// would.
pub fn record_created(store: &GameStore, created: CreatedRoom) {
    let credentials = store.credentials();
    credentials.set(CredentialKind::RoomCode, created.room.code.clone());
    credentials.set(CredentialKind::AdminToken, created.admin_token);

    let (room, players) = created.room.into_parts();
    store.dispatch(&ServerEvent::StateUpdate(Box::new(StatePayload {
        room: Some(room),
        players: Some(players),
        game_state: None,
    })));
}

/// Bind the player identity from a successful [`ApiClient::join_room`]
/// call.
///
/// Only the identity is recorded here; the roster entry itself arrives
/// through the push channel's `player_joined`, or through the next
/// bootstrap.
pub fn record_join(store: &GameStore, joined: &JoinedRoom) {
    store
        .credentials()
        .set_player(joined.player.id, joined.player_token.clone());
    store.bind_local_player(joined.player.id);
}

fn describe(err: &MoonhuntError) -> String {
    match err {
        MoonhuntError::Api { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::notify::NotificationKind;
    use crate::protocol::{Phase, Role};
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    // ── Scripted HTTP server ────────────────────────────────────────

    /// Serve the scripted `(status line, JSON body)` responses in order, one
    /// connection per request, recording each raw request.
    async fn spawn_script_server(
        responses: Vec<(&'static str, String)>,
    ) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut request = String::new();
                let mut buf = vec![0_u8; 4096];
                while !request.contains("\r\n\r\n") {
                    let n = stream.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.push_str(&String::from_utf8_lossy(&buf[..n]));
                }
                seen.lock().unwrap().push(request);

                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.unwrap();
            }
        });

        (format!("http://{addr}/api"), requests)
    }

    fn room_json(code: &str, status: &str, players: &str) -> String {
        format!(
            r#"{{
                "id": 1,
                "code": "{code}",
                "max_players": 8,
                "status": "{status}",
                "created_at": "2025-03-01T18:00:00Z",
                "players": {players},
                "player_count": 1,
                "num_wolves": 2,
                "num_seers": 1,
                "num_protectors": 1,
                "num_hunters": 1
            }}"#
        )
    }

    fn ana() -> &'static str {
        r#"[{"id": 7, "nickname": "Ana", "is_alive": true, "is_leader": false, "role": null}]"#
    }

    fn night_state() -> String {
        r#"{"phase": "night", "night_number": 1, "day_number": 0, "timer_end": null, "current_speaker_id": null}"#.to_string()
    }

    // ── bootstrap_room ──────────────────────────────────────────────

    #[tokio::test]
    async fn waiting_room_primes_roster_only() {
        let (base_url, requests) =
            spawn_script_server(vec![("200 OK", room_json("WOLFIE", "waiting", ana()))]).await;
        let store = GameStore::default();
        let api = ApiClient::new(base_url);

        bootstrap_room(&api, &store, "WOLFIE").await.unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.room.unwrap().code, "WOLFIE");
        assert_eq!(snapshot.players.len(), 1);
        assert!(snapshot.game_state.is_none());
        assert_eq!(store.credentials().room_code().as_deref(), Some("WOLFIE"));
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn playing_room_fetches_state_and_role() {
        let (base_url, requests) = spawn_script_server(vec![
            ("200 OK", room_json("WOLFIE", "playing", ana())),
            ("200 OK", night_state()),
            (
                "200 OK",
                r#"{"role": "seer", "role_display": "Agisienne (Seer)"}"#.to_string(),
            ),
        ])
        .await;
        let store = GameStore::default();
        store.credentials().set_player(7, "tok-7");
        let api = ApiClient::new(base_url);

        bootstrap_room(&api, &store, "WOLFIE").await.unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.phase(), Phase::Night);
        assert_eq!(snapshot.local_player().unwrap().role, Some(Role::Seer));
        assert!(snapshot.show_role_modal);

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests[1].starts_with("GET /api/rooms/WOLFIE/state/ "));
        assert!(requests[2].starts_with("GET /api/players/7/role/ "));
        assert!(requests[2].to_ascii_lowercase().contains("x-player-token: tok-7"));
    }

    #[tokio::test]
    async fn finished_room_marks_session_ended_without_role_fetch() {
        let (base_url, requests) = spawn_script_server(vec![
            ("200 OK", room_json("WOLFIE", "finished", ana())),
            (
                "200 OK",
                r#"{"phase": "finished", "night_number": 2, "day_number": 2}"#.to_string(),
            ),
        ])
        .await;
        let store = GameStore::default();
        store.credentials().set_player(7, "tok-7");
        let api = ApiClient::new(base_url);

        bootstrap_room(&api, &store, "WOLFIE").await.unwrap();

        assert!(store.snapshot().session_ended);
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_room_notifies_and_errs() {
        let (base_url, _requests) = spawn_script_server(vec![(
            "404 Not Found",
            r#"{"detail": "Not found."}"#.to_string(),
        )])
        .await;
        let store = GameStore::default();
        let api = ApiClient::new(base_url);

        let err = bootstrap_room(&api, &store, "NOROOM").await.unwrap_err();
        assert!(err.is_not_found());

        let snapshot = store.snapshot();
        assert!(snapshot.room.is_none());
        let notices: Vec<_> = snapshot.notifications.iter().collect();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NotificationKind::Error);
        assert_eq!(notices[0].message, "Room not found");
    }

    #[tokio::test]
    async fn game_state_failure_surfaces_servers_message() {
        let (base_url, _requests) = spawn_script_server(vec![
            ("200 OK", room_json("WOLFIE", "playing", ana())),
            (
                "404 Not Found",
                r#"{"error": "Game not started"}"#.to_string(),
            ),
        ])
        .await;
        let store = GameStore::default();
        let api = ApiClient::new(base_url);

        assert!(bootstrap_room(&api, &store, "WOLFIE").await.is_err());

        let snapshot = store.snapshot();
        // The roster loaded before the failing step stays.
        assert_eq!(snapshot.players.len(), 1);
        let messages: Vec<&str> = snapshot
            .notifications
            .iter()
            .map(|n| n.message.as_str())
            .collect();
        assert_eq!(messages, vec!["Game not started"]);
    }

    #[tokio::test]
    async fn rejected_player_token_notifies_but_does_not_abort() {
        let (base_url, _requests) = spawn_script_server(vec![
            ("200 OK", room_json("WOLFIE", "playing", ana())),
            ("200 OK", night_state()),
            ("403 Forbidden", r#"{"error": "Unauthorized"}"#.to_string()),
        ])
        .await;
        let store = GameStore::default();
        store.credentials().set_player(7, "stale-tok");
        let api = ApiClient::new(base_url);

        bootstrap_room(&api, &store, "WOLFIE").await.unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.phase(), Phase::Night);
        assert!(snapshot.local_player().unwrap().role.is_none());
        let messages: Vec<&str> = snapshot
            .notifications
            .iter()
            .map(|n| n.message.as_str())
            .collect();
        assert_eq!(messages, vec!["Player token was rejected"]);
    }

    #[tokio::test]
    async fn role_fetch_outage_is_logged_only() {
        let (base_url, _requests) = spawn_script_server(vec![
            ("200 OK", room_json("WOLFIE", "playing", ana())),
            ("200 OK", night_state()),
            ("500 Internal Server Error", "<html>boom</html>".to_string()),
        ])
        .await;
        let store = GameStore::default();
        store.credentials().set_player(7, "tok-7");
        let api = ApiClient::new(base_url);

        bootstrap_room(&api, &store, "WOLFIE").await.unwrap();

        let snapshot = store.snapshot();
        assert!(snapshot.local_player().unwrap().role.is_none());
        assert!(snapshot.notifications.is_empty());
    }

    #[tokio::test]
    async fn spectator_without_identity_skips_role_fetch() {
        let (base_url, requests) = spawn_script_server(vec![
            ("200 OK", room_json("WOLFIE", "playing", ana())),
            ("200 OK", night_state()),
        ])
        .await;
        let store = GameStore::default();
        let api = ApiClient::new(base_url);

        bootstrap_room(&api, &store, "WOLFIE").await.unwrap();

        assert!(store.snapshot().local_player_id.is_none());
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn resumed_identity_is_bound_to_roster() {
        let (base_url, _requests) =
            spawn_script_server(vec![("200 OK", room_json("WOLFIE", "waiting", ana()))]).await;
        let store = GameStore::default();
        store.credentials().set_player(7, "tok-7");
        let api = ApiClient::new(base_url);

        bootstrap_room(&api, &store, "WOLFIE").await.unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.local_player_id, Some(7));
        assert_eq!(snapshot.local_player().unwrap().nickname, "Ana");
    }

    // ── record_created / record_join ────────────────────────────────

    #[test]
    fn record_created_binds_admin_session() {
        let store = GameStore::default();
        let created: CreatedRoom = serde_json::from_str(&format!(
            r#"{{"room": {}, "admin_token": "admin-tok"}}"#,
            room_json("WOLFIE", "waiting", "[]")
        ))
        .unwrap();

        record_created(&store, created);

        assert_eq!(store.credentials().room_code().as_deref(), Some("WOLFIE"));
        assert_eq!(
            store.credentials().admin_token().as_deref(),
            Some("admin-tok")
        );
        assert!(store.is_admin());
        assert_eq!(store.snapshot().room.unwrap().code, "WOLFIE");
    }

    #[test]
    fn record_join_binds_player_identity() {
        let store = GameStore::default();
        let joined: JoinedRoom = serde_json::from_str(
            r#"{
                "player": {"id": 7, "nickname": "Ana", "is_alive": true, "is_leader": false, "role": null},
                "player_token": "tok-7"
            }"#,
        )
        .unwrap();

        record_join(&store, &joined);

        assert_eq!(store.credentials().player_id(), Some(7));
        assert_eq!(store.credentials().player_token().as_deref(), Some("tok-7"));
        assert_eq!(store.snapshot().local_player_id, Some(7));
    }
}
