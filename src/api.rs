//! REST client for the game server's pull API.
//!
//! [`ApiClient`] covers the one-shot requests that live outside the push
//! channel: room creation and joining, admin phase control, the private role
//! lookup, night actions, votes, and the game log. Responses decode into the
//! shared [`protocol`](crate::protocol) types where the push channel uses the
//! same shape, and into request-specific types here where it does not.
//!
//! Non-2xx responses carry a JSON `{"error": "..."}` body; those surface as
//! [`MoonhuntError::Api`] with the status code and the server's message.
//!
//! # Feature gate
//!
//! This module is only available when the `http-api` feature is enabled (it
//! is enabled by default).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MoonhuntError, Result};
use crate::protocol::{GameState, Phase, Player, PlayerId, Role, Room, RoomStatus};

/// Default base URL of the pull API.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";

/// Default timeout for a single pull request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ── Request types ───────────────────────────────────────────────────

/// Capacity and role composition for a new room.
///
/// The defaults mirror the server's: an 8-seat room with 2 wolves, 1 seer,
/// 1 protector, and 1 hunter.
///
/// # Example
///
/// ```
/// use moonhunt_client::api::RoomSetup;
///
/// let setup = RoomSetup::new().with_max_players(6).with_num_wolves(1);
/// assert_eq!(setup.max_players, 6);
/// assert_eq!(setup.num_seers, 1);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct RoomSetup {
    pub max_players: u32,
    pub num_wolves: u32,
    pub num_seers: u32,
    pub num_protectors: u32,
    pub num_hunters: u32,
}

impl Default for RoomSetup {
    fn default() -> Self {
        Self {
            max_players: 8,
            num_wolves: 2,
            num_seers: 1,
            num_protectors: 1,
            num_hunters: 1,
        }
    }
}

impl RoomSetup {
    /// Create a room setup with the server's default composition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of seats in the room.
    #[must_use]
    pub fn with_max_players(mut self, max_players: u32) -> Self {
        self.max_players = max_players;
        self
    }

    /// Set the number of wolves dealt at game start.
    #[must_use]
    pub fn with_num_wolves(mut self, num_wolves: u32) -> Self {
        self.num_wolves = num_wolves;
        self
    }

    /// Set the number of seers dealt at game start.
    #[must_use]
    pub fn with_num_seers(mut self, num_seers: u32) -> Self {
        self.num_seers = num_seers;
        self
    }

    /// Set the number of protectors dealt at game start.
    #[must_use]
    pub fn with_num_protectors(mut self, num_protectors: u32) -> Self {
        self.num_protectors = num_protectors;
        self
    }

    /// Set the number of hunters dealt at game start.
    #[must_use]
    pub fn with_num_hunters(mut self, num_hunters: u32) -> Self {
        self.num_hunters = num_hunters;
        self
    }
}

#[derive(Serialize)]
struct JoinRequest<'a> {
    nickname: &'a str,
}

#[derive(Serialize)]
struct TargetRequest {
    target_id: PlayerId,
}

// ── Response types ──────────────────────────────────────────────────

/// Full room record as the pull API reports it.
///
/// A superset of the push-channel [`Room`]: it adds the numeric id, the
/// creation timestamp, and the embedded roster.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RoomDetail {
    pub id: i64,
    pub code: String,
    pub max_players: u32,
    pub status: RoomStatus,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    pub players: Vec<Player>,
    pub player_count: u32,
    pub num_wolves: u32,
    pub num_seers: u32,
    pub num_protectors: u32,
    pub num_hunters: u32,
}

impl RoomDetail {
    /// Split into the push-channel [`Room`] summary plus the roster, the two
    /// pieces a state snapshot carries.
    pub fn into_parts(self) -> (Room, Vec<Player>) {
        let room = Room {
            code: self.code,
            status: self.status,
            max_players: self.max_players,
            player_count: Some(self.player_count),
            num_wolves: Some(self.num_wolves),
            num_seers: Some(self.num_seers),
            num_protectors: Some(self.num_protectors),
            num_hunters: Some(self.num_hunters),
        };
        (room, self.players)
    }
}

/// Response to [`ApiClient::create_room`].
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedRoom {
    pub room: RoomDetail,
    /// Admin credential for the new room. Shown once, never re-fetchable.
    pub admin_token: String,
}

/// Response to [`ApiClient::join_room`].
#[derive(Debug, Clone, Deserialize)]
pub struct JoinedRoom {
    pub player: Player,
    /// Player credential for this seat. Shown once, never re-fetchable.
    pub player_token: String,
}

/// Response to [`ApiClient::player_role`].
///
/// `role` is `None` until the game has started and roles are dealt.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RoleResponse {
    pub role: Option<Role>,
    /// Human-readable role name, e.g. `"Agisienne (Seer)"`.
    pub role_display: Option<String>,
}

/// Response to [`ApiClient::start_game`].
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StartGameAck {
    pub message: String,
    pub phase: Phase,
    pub night_number: u32,
}

/// Plain acknowledgement carrying only the server's message.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ActionAck {
    pub message: String,
}

/// What a seer learns about their inspection target.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SeerResult {
    pub target_nickname: String,
    pub target_role: Option<Role>,
}

/// Response to [`ApiClient::night_action`].
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NightActionAck {
    pub message: String,
    /// Present only for the seer's inspection.
    #[serde(default)]
    pub result: Option<SeerResult>,
}

/// The vote record echoed back by [`ApiClient::vote`].
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct VoteRecord {
    pub id: i64,
    pub player: PlayerId,
    pub player_nickname: String,
    pub target: PlayerId,
    pub target_nickname: String,
    /// `"elimination"` or `"leader"`, depending on the phase.
    pub vote_type: String,
    pub vote_phase: u32,
    pub timestamp: String,
}

/// Response to [`ApiClient::vote`].
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct VoteAck {
    pub message: String,
    pub vote: VoteRecord,
}

/// One entry of the room's public game log.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GameLogEntry {
    pub id: i64,
    /// Phase label the server attached; free-form, not restricted to
    /// [`Phase`] names.
    pub phase: String,
    pub message: String,
    pub timestamp: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Error body the server attaches to non-2xx responses.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(alias = "detail")]
    error: String,
}

// ── Client ──────────────────────────────────────────────────────────

/// HTTP client for the pull API.
///
/// Cheap to clone; clones share the underlying connection pool.
///
/// # Example
///
/// ```rust,ignore
/// let api = ApiClient::new("http://localhost:8000/api");
/// let created = api.create_room(RoomSetup::new()).await?;
/// let joined = api.join_room(&created.room.code, "Ana").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for the API at `base_url` (e.g.
    /// `http://localhost:8000/api`). A trailing slash is tolerated.
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_http_client(http, base_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`], for callers
    /// that need custom TLS, proxies, or timeouts.
    pub fn with_http_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    // ── Room endpoints ──────────────────────────────────────────────

    /// Create a new room.
    ///
    /// The returned [`CreatedRoom::admin_token`] is the only copy the server
    /// ever hands out.
    ///
    /// # Errors
    ///
    /// Returns [`MoonhuntError::Api`] for a rejected setup, or
    /// [`MoonhuntError::Http`] when the server is unreachable.
    pub async fn create_room(&self, setup: RoomSetup) -> Result<CreatedRoom> {
        debug!(max_players = setup.max_players, "creating room");
        let response = self
            .http
            .post(self.url("/rooms/"))
            .json(&setup)
            .send()
            .await?;
        decode(response).await
    }

    /// Fetch a room's record, including its roster.
    ///
    /// # Errors
    ///
    /// Returns [`MoonhuntError::Api`] with status 404 for an unknown code.
    pub async fn room(&self, code: &str) -> Result<RoomDetail> {
        debug!(code, "fetching room");
        let response = self.http.get(self.url(&format!("/rooms/{code}/"))).send().await?;
        decode(response).await
    }

    /// Join a room as a new player.
    ///
    /// The returned [`JoinedRoom::player_token`] is the only copy the server
    /// ever hands out.
    ///
    /// # Errors
    ///
    /// Returns [`MoonhuntError::Api`] when the room is full, already
    /// playing, or the nickname is taken.
    pub async fn join_room(&self, code: &str, nickname: &str) -> Result<JoinedRoom> {
        debug!(code, nickname, "joining room");
        let response = self
            .http
            .post(self.url(&format!("/rooms/{code}/join/")))
            .json(&JoinRequest { nickname })
            .send()
            .await?;
        decode(response).await
    }

    /// Start the game. Admin only; roles are dealt and the first night
    /// begins.
    ///
    /// # Errors
    ///
    /// Returns [`MoonhuntError::Api`] with status 403 for a wrong token, or
    /// 400 when the room is not full yet.
    pub async fn start_game(&self, code: &str, admin_token: &str) -> Result<StartGameAck> {
        debug!(code, "starting game");
        let response = self
            .http
            .post(self.url(&format!("/rooms/{code}/start_game/")))
            .header("X-Admin-Token", admin_token)
            .send()
            .await?;
        decode(response).await
    }

    /// Advance to the next phase. Admin only.
    ///
    /// # Errors
    ///
    /// Returns [`MoonhuntError::Api`] with status 403 for a wrong token, or
    /// 400 when the current phase cannot be advanced manually.
    pub async fn advance_phase(&self, code: &str, admin_token: &str) -> Result<ActionAck> {
        debug!(code, "advancing phase");
        let response = self
            .http
            .post(self.url(&format!("/rooms/{code}/advance_phase/")))
            .header("X-Admin-Token", admin_token)
            .send()
            .await?;
        decode(response).await
    }

    /// Fetch the room's current game-state snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`MoonhuntError::Api`] with status 404 while the game has not
    /// started.
    pub async fn game_state(&self, code: &str) -> Result<GameState> {
        debug!(code, "fetching game state");
        let response = self
            .http
            .get(self.url(&format!("/rooms/{code}/state/")))
            .send()
            .await?;
        decode(response).await
    }

    // ── Player endpoints ────────────────────────────────────────────

    /// Fetch the local player's private role.
    ///
    /// # Errors
    ///
    /// Returns [`MoonhuntError::Api`] with status 403 for a wrong token.
    pub async fn player_role(
        &self,
        player_id: PlayerId,
        player_token: &str,
    ) -> Result<RoleResponse> {
        debug!(player_id, "fetching player role");
        let response = self
            .http
            .get(self.url(&format!("/players/{player_id}/role/")))
            .header("X-Player-Token", player_token)
            .send()
            .await?;
        decode(response).await
    }

    /// Submit the local player's night action against `target_id`.
    ///
    /// For a seer the acknowledgement carries the inspection
    /// [`result`](NightActionAck::result).
    ///
    /// # Errors
    ///
    /// Returns [`MoonhuntError::Api`] when it is not night, the player is
    /// dead or roleless, or the target is invalid.
    pub async fn night_action(
        &self,
        player_id: PlayerId,
        player_token: &str,
        target_id: PlayerId,
    ) -> Result<NightActionAck> {
        debug!(player_id, target_id, "submitting night action");
        let response = self
            .http
            .post(self.url(&format!("/players/{player_id}/night_action/")))
            .header("X-Player-Token", player_token)
            .json(&TargetRequest { target_id })
            .send()
            .await?;
        decode(response).await
    }

    /// Submit the local player's vote for `target_id`. Counts as a leader
    /// ballot during leader election and as an elimination ballot during
    /// voting.
    ///
    /// # Errors
    ///
    /// Returns [`MoonhuntError::Api`] when it is not a voting phase or the
    /// target is invalid.
    pub async fn vote(
        &self,
        player_id: PlayerId,
        player_token: &str,
        target_id: PlayerId,
    ) -> Result<VoteAck> {
        debug!(player_id, target_id, "submitting vote");
        let response = self
            .http
            .post(self.url(&format!("/players/{player_id}/vote/")))
            .header("X-Player-Token", player_token)
            .json(&TargetRequest { target_id })
            .send()
            .await?;
        decode(response).await
    }

    /// Fire the dead hunter's revenge shot at `target_id`.
    ///
    /// # Errors
    ///
    /// Returns [`MoonhuntError::Api`] unless the player is a dead hunter and
    /// the target is alive.
    pub async fn hunter_revenge(
        &self,
        player_id: PlayerId,
        player_token: &str,
        target_id: PlayerId,
    ) -> Result<ActionAck> {
        debug!(player_id, target_id, "submitting hunter revenge");
        let response = self
            .http
            .post(self.url(&format!("/players/{player_id}/hunter_revenge/")))
            .header("X-Player-Token", player_token)
            .json(&TargetRequest { target_id })
            .send()
            .await?;
        decode(response).await
    }

    // ── Log endpoint ────────────────────────────────────────────────

    /// Fetch the room's public game log, oldest first.
    pub async fn game_logs(&self, room_code: &str) -> Result<Vec<GameLogEntry>> {
        debug!(room_code, "fetching game logs");
        let response = self
            .http
            .get(self.url("/logs/"))
            .query(&[("room_code", room_code)])
            .send()
            .await?;
        decode(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE_URL)
    }
}

/// Decode a 2xx body into `T`, or a non-2xx body into
/// [`MoonhuntError::Api`].
async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }
    let message = match response.json::<ApiErrorBody>().await {
        Ok(body) => body.error,
        // Not the documented error shape; fall back to the status text.
        Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
    };
    Err(MoonhuntError::Api {
        status: status.as_u16(),
        message,
    })
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    // ── Mock HTTP server ────────────────────────────────────────────

    /// Serve exactly one request with the given status line and JSON body,
    /// returning the base URL and a handle resolving to the raw request.
    async fn spawn_http_server(
        status: &'static str,
        body: String,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = String::new();
            let mut buf = vec![0_u8; 4096];

            // Read the full head, then drain the advertised body.
            while !request.contains("\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.push_str(&String::from_utf8_lossy(&buf[..n]));
            }
            let body_len = request
                .lines()
                .find_map(|line| {
                    line.to_ascii_lowercase()
                        .strip_prefix("content-length:")
                        .map(|v| v.trim().parse::<usize>().unwrap())
                })
                .unwrap_or(0);
            let head_end = request.find("\r\n\r\n").map_or(request.len(), |i| i + 4);
            while request.len() < head_end + body_len {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.push_str(&String::from_utf8_lossy(&buf[..n]));
            }

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
            request
        });

        (format!("http://{addr}/api"), handle)
    }

    fn room_detail_json(code: &str, status: &str) -> String {
        format!(
            r#"{{
                "id": 1,
                "code": "{code}",
                "max_players": 8,
                "status": "{status}",
                "created_at": "2025-03-01T18:00:00Z",
                "players": [],
                "player_count": 0,
                "num_wolves": 2,
                "num_seers": 1,
                "num_protectors": 1,
                "num_hunters": 1
            }}"#
        )
    }

    // ── Endpoint tests ──────────────────────────────────────────────

    #[tokio::test]
    async fn create_room_posts_setup_and_decodes_response() {
        let body = format!(
            r#"{{"room": {}, "admin_token": "admin-tok"}}"#,
            room_detail_json("WOLFIE", "waiting")
        );
        let (base_url, handle) = spawn_http_server("201 Created", body).await;

        let api = ApiClient::new(base_url);
        let created = api.create_room(RoomSetup::new()).await.unwrap();

        assert_eq!(created.admin_token, "admin-tok");
        assert_eq!(created.room.code, "WOLFIE");
        assert_eq!(created.room.status, RoomStatus::Waiting);

        let request = handle.await.unwrap();
        assert!(request.starts_with("POST /api/rooms/ "));
        assert!(request.contains(r#""max_players":8"#));
        assert!(request.contains(r#""num_wolves":2"#));
    }

    #[tokio::test]
    async fn join_room_posts_nickname() {
        let body = r#"{
            "player": {"id": 7, "nickname": "Ana", "is_alive": true, "is_leader": false, "role": null},
            "player_token": "player-tok"
        }"#;
        let (base_url, handle) = spawn_http_server("201 Created", body.to_string()).await;

        let api = ApiClient::new(base_url);
        let joined = api.join_room("WOLFIE", "Ana").await.unwrap();

        assert_eq!(joined.player.id, 7);
        assert_eq!(joined.player.nickname, "Ana");
        assert!(joined.player.is_alive);
        assert!(joined.player.role.is_none());
        assert_eq!(joined.player_token, "player-tok");

        let request = handle.await.unwrap();
        assert!(request.starts_with("POST /api/rooms/WOLFIE/join/ "));
        assert!(request.contains(r#""nickname":"Ana""#));
    }

    #[tokio::test]
    async fn start_game_sends_admin_token_header() {
        let body = r#"{"message": "Game started", "phase": "night", "night_number": 1}"#;
        let (base_url, handle) = spawn_http_server("200 OK", body.to_string()).await;

        let api = ApiClient::new(base_url);
        let ack = api.start_game("WOLFIE", "admin-tok").await.unwrap();

        assert_eq!(ack.phase, Phase::Night);
        assert_eq!(ack.night_number, 1);

        let request = handle.await.unwrap();
        assert!(request.starts_with("POST /api/rooms/WOLFIE/start_game/ "));
        assert!(request.to_ascii_lowercase().contains("x-admin-token: admin-tok"));
    }

    #[tokio::test]
    async fn game_state_ignores_server_only_fields() {
        let body = r#"{
            "phase": "night",
            "night_number": 2,
            "day_number": 1,
            "timer_end": null,
            "current_speaker_id": null,
            "speaking_order": [3, 1, 2],
            "time_remaining": 42,
            "wolves_voted": false,
            "seer_acted": true,
            "protector_acted": false
        }"#;
        let (base_url, _handle) = spawn_http_server("200 OK", body.to_string()).await;

        let api = ApiClient::new(base_url);
        let state = api.game_state("WOLFIE").await.unwrap();

        assert_eq!(state.phase, Phase::Night);
        assert_eq!(state.night_number, 2);
        assert_eq!(state.day_number, 1);
        assert!(state.timer_end.is_none());
    }

    #[tokio::test]
    async fn player_role_sends_player_token_header() {
        let body = r#"{"role": "seer", "role_display": "Agisienne (Seer)"}"#;
        let (base_url, handle) = spawn_http_server("200 OK", body.to_string()).await;

        let api = ApiClient::new(base_url);
        let role = api.player_role(7, "player-tok").await.unwrap();

        assert_eq!(role.role, Some(Role::Seer));
        assert_eq!(role.role_display.as_deref(), Some("Agisienne (Seer)"));

        let request = handle.await.unwrap();
        assert!(request.starts_with("GET /api/players/7/role/ "));
        assert!(request.to_ascii_lowercase().contains("x-player-token: player-tok"));
    }

    #[tokio::test]
    async fn night_action_decodes_seer_result() {
        let body = r#"{
            "message": "Action submitted",
            "result": {"target_nickname": "Bruno", "target_role": "wolf"}
        }"#;
        let (base_url, handle) = spawn_http_server("200 OK", body.to_string()).await;

        let api = ApiClient::new(base_url);
        let ack = api.night_action(7, "player-tok", 3).await.unwrap();

        let result = ack.result.unwrap();
        assert_eq!(result.target_nickname, "Bruno");
        assert_eq!(result.target_role, Some(Role::Wolf));

        let request = handle.await.unwrap();
        assert!(request.starts_with("POST /api/players/7/night_action/ "));
        assert!(request.contains(r#""target_id":3"#));
    }

    #[tokio::test]
    async fn vote_decodes_echoed_record() {
        let body = r#"{
            "message": "Vote submitted",
            "vote": {
                "id": 12,
                "player": 7,
                "player_nickname": "Ana",
                "target": 3,
                "target_nickname": "Bruno",
                "vote_type": "elimination",
                "vote_phase": 1,
                "timestamp": "2025-03-01T18:30:00Z"
            }
        }"#;
        let (base_url, _handle) = spawn_http_server("200 OK", body.to_string()).await;

        let api = ApiClient::new(base_url);
        let ack = api.vote(7, "player-tok", 3).await.unwrap();

        assert_eq!(ack.vote.target_nickname, "Bruno");
        assert_eq!(ack.vote.vote_type, "elimination");
    }

    #[tokio::test]
    async fn game_logs_decode_entries() {
        let body = r#"[
            {"id": 1, "phase": "night", "message": "Night 1 begins", "timestamp": "2025-03-01T18:10:00Z", "metadata": null},
            {"id": 2, "phase": "hunter_revenge", "message": "Ana took Bruno with them", "timestamp": "2025-03-01T18:20:00Z", "metadata": {"victim": 3}}
        ]"#;
        let (base_url, handle) = spawn_http_server("200 OK", body.to_string()).await;

        let api = ApiClient::new(base_url);
        let logs = api.game_logs("WOLFIE").await.unwrap();

        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].phase, "night");
        assert_eq!(logs[1].phase, "hunter_revenge");
        assert!(logs[1].metadata.is_some());

        let request = handle.await.unwrap();
        assert!(request.starts_with("GET /api/logs/?room_code=WOLFIE "));
    }

    // ── Error mapping tests ─────────────────────────────────────────

    #[tokio::test]
    async fn error_body_is_surfaced_with_status() {
        let body = r#"{"error": "Unauthorized"}"#;
        let (base_url, _handle) = spawn_http_server("403 Forbidden", body.to_string()).await;

        let api = ApiClient::new(base_url);
        let err = api.start_game("WOLFIE", "wrong-tok").await.unwrap_err();

        match &err {
            MoonhuntError::Api { status, message } => {
                assert_eq!(*status, 403);
                assert_eq!(message, "Unauthorized");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
        assert!(err.is_auth_error());
    }

    #[tokio::test]
    async fn detail_error_body_is_accepted() {
        // Framework-generated 404s use a "detail" key instead of "error".
        let body = r#"{"detail": "Not found."}"#;
        let (base_url, _handle) = spawn_http_server("404 Not Found", body.to_string()).await;

        let api = ApiClient::new(base_url);
        let err = api.room("NOROOM").await.unwrap_err();

        match &err {
            MoonhuntError::Api { status, message } => {
                assert_eq!(*status, 404);
                assert_eq!(message, "Not found.");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn non_json_error_body_falls_back_to_status_text() {
        let (base_url, _handle) =
            spawn_http_server("500 Internal Server Error", "<html>boom</html>".to_string()).await;

        let api = ApiClient::new(base_url);
        let err = api.room("WOLFIE").await.unwrap_err();

        match err {
            MoonhuntError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "Internal Server Error");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    // ── DTO tests ───────────────────────────────────────────────────

    #[test]
    fn room_setup_defaults_match_server() {
        let setup = RoomSetup::new();
        assert_eq!(setup.max_players, 8);
        assert_eq!(setup.num_wolves, 2);
        assert_eq!(setup.num_seers, 1);
        assert_eq!(setup.num_protectors, 1);
        assert_eq!(setup.num_hunters, 1);
    }

    #[test]
    fn room_detail_into_parts_keeps_pull_only_fields() {
        let detail: RoomDetail =
            serde_json::from_str(&room_detail_json("WOLFIE", "playing")).unwrap();
        let (room, players) = detail.into_parts();

        assert_eq!(room.code, "WOLFIE");
        assert_eq!(room.status, RoomStatus::Playing);
        assert_eq!(room.player_count, Some(0));
        assert_eq!(room.num_wolves, Some(2));
        assert!(players.is_empty());
    }

    #[test]
    fn base_url_trailing_slash_is_tolerated() {
        let api = ApiClient::new("http://localhost:8000/api/");
        assert_eq!(api.url("/rooms/"), "http://localhost:8000/api/rooms/");
    }
}
