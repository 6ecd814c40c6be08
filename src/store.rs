//! The client state store: one owned snapshot, observed by presentation.
//!
//! Writers are the event dispatcher ([`GameStore::dispatch`]), the bootstrap
//! loader, and the explicit session operations; everyone else reads. Reads
//! are copy-on-read: [`GameStore::snapshot`] hands out an owned clone, never
//! a live reference, so no observer can watch a mutation in progress.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::debug;

use crate::credentials::CredentialStore;
use crate::notify::{NotificationKind, NotificationQueue};
use crate::protocol::{GameState, Phase, Player, PlayerId, Role, Room, ServerEvent};
use crate::reducer::{reduce, Applied};

/// The complete client-side mirror of one room.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub room: Option<Room>,
    pub players: Vec<Player>,
    pub game_state: Option<GameState>,
    /// Roster id of the locally-authenticated player, when known.
    pub local_player_id: Option<PlayerId>,
    /// Raised when the local role becomes known; presentation lowers it.
    pub show_role_modal: bool,
    /// Set by `game_ended`, or on entering a room that already finished.
    pub session_ended: bool,
    pub winner: Option<String>,
    pub end_reason: Option<String>,
    /// A dead hunter entitled to a revenge shot, until it resolves.
    pub pending_hunter_revenge: Option<PlayerId>,
    pub notifications: NotificationQueue,
}

impl Snapshot {
    /// Roster entries still alive, in roster order.
    pub fn alive_players(&self) -> Vec<&Player> {
        self.players.iter().filter(|p| p.is_alive).collect()
    }

    /// Roster entries out of the game, in roster order.
    pub fn dead_players(&self) -> Vec<&Player> {
        self.players.iter().filter(|p| !p.is_alive).collect()
    }

    /// The locally-authenticated player's roster entry, when bound.
    pub fn local_player(&self) -> Option<&Player> {
        self.local_player_id
            .and_then(|id| self.players.iter().find(|p| p.id == id))
    }

    pub fn is_local_alive(&self) -> bool {
        self.local_player().is_some_and(|p| p.is_alive)
    }

    pub fn is_local_leader(&self) -> bool {
        self.local_player().is_some_and(|p| p.is_leader)
    }

    /// Current phase; [`Phase::Setup`] until game state arrives.
    pub fn phase(&self) -> Phase {
        self.game_state
            .as_ref()
            .map(|state| state.phase)
            .unwrap_or_default()
    }
}

/// Identifies one store subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type SubscriberFn = dyn Fn(&Snapshot) + Send + Sync;

#[derive(Default)]
struct SubscriberRegistry {
    next_id: u64,
    entries: Vec<(SubscriptionId, Arc<SubscriberFn>)>,
}

struct StoreInner {
    snapshot: Mutex<Snapshot>,
    subscribers: Mutex<SubscriberRegistry>,
    credentials: CredentialStore,
}

/// The owned, dependency-injected state container presentation code
/// observes. Cloning is cheap; clones share the same state.
///
/// Every committed mutation notifies subscribers with a fresh snapshot copy
/// before the method returns, so an envelope is fully applied and observed
/// before the next one is processed.
#[derive(Clone)]
pub struct GameStore {
    inner: Arc<StoreInner>,
}

impl GameStore {
    pub fn new(credentials: CredentialStore) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                snapshot: Mutex::new(Snapshot::default()),
                subscribers: Mutex::new(SubscriberRegistry::default()),
                credentials,
            }),
        }
    }

    /// The credential session this store clears on [`reset`](Self::reset).
    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    /// An owned copy of the current snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.lock_snapshot().clone()
    }

    /// Registers an observer called after every committed change, in
    /// registration order. The callback must not block.
    pub fn subscribe(&self, callback: impl Fn(&Snapshot) + Send + Sync + 'static) -> SubscriptionId {
        let mut registry = self.lock_subscribers();
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry.entries.push((id, Arc::new(callback)));
        id
    }

    /// Unregisters an observer. Safe to call from inside a callback; the
    /// removed observer is skipped for the rest of that notification pass.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.lock_subscribers();
        let before = registry.entries.len();
        registry.entries.retain(|(entry_id, _)| *entry_id != id);
        registry.entries.len() != before
    }

    /// Applies one server envelope: reduce, enqueue the derived
    /// notifications, then notify subscribers. Fully commits before
    /// returning.
    pub fn dispatch(&self, event: &ServerEvent) {
        let changed = {
            let mut snapshot = self.lock_snapshot();
            let Applied { changed, notices } = reduce(&mut snapshot, event);
            let notified = !notices.is_empty();
            for draft in notices {
                snapshot.notifications.push(draft);
            }
            changed || notified
        };
        debug!(?changed, "dispatched server event");
        if changed {
            self.notify_subscribers();
        }
    }

    /// Enqueues a user-facing notification outside the reducer path (domain
    /// failures such as a rejected token or an unknown room). Returns the
    /// assigned id.
    pub fn push_notification(&self, kind: NotificationKind, message: impl Into<String>) -> u64 {
        let id = {
            let mut snapshot = self.lock_snapshot();
            snapshot
                .notifications
                .push(crate::notify::NoticeDraft::new(kind, message))
        };
        self.notify_subscribers();
        id
    }

    /// Dismisses one notification. Unknown ids are a no-op.
    pub fn dismiss_notification(&self, id: u64) -> bool {
        let removed = self.lock_snapshot().notifications.dismiss(id);
        if removed {
            self.notify_subscribers();
        }
        removed
    }

    pub fn clear_notifications(&self) {
        self.lock_snapshot().notifications.clear();
        self.notify_subscribers();
    }

    /// Records which roster entry is the local player. Called on join and by
    /// the bootstrap loader.
    pub fn bind_local_player(&self, id: PlayerId) {
        {
            let mut snapshot = self.lock_snapshot();
            snapshot.local_player_id = Some(id);
            if snapshot.local_player().and_then(|p| p.role).is_some() {
                snapshot.show_role_modal = true;
            }
        }
        self.notify_subscribers();
    }

    /// Records the local player's private role and raises the role modal.
    /// A no-op until a local player is bound and present in the roster.
    pub fn set_local_role(&self, role: Role) {
        let changed = {
            let mut snapshot = self.lock_snapshot();
            let Some(id) = snapshot.local_player_id else {
                return;
            };
            match snapshot.players.iter_mut().find(|p| p.id == id) {
                Some(player) => {
                    player.role = Some(role);
                    snapshot.show_role_modal = true;
                    true
                }
                None => false,
            }
        };
        if changed {
            self.notify_subscribers();
        }
    }

    /// Lowers the role modal flag once presentation has shown it.
    pub fn hide_role_modal(&self) {
        self.lock_snapshot().show_role_modal = false;
        self.notify_subscribers();
    }

    /// Marks the session ended without a winner announcement; used when
    /// entering a room whose game already finished.
    pub fn mark_session_ended(&self) {
        let changed = {
            let mut snapshot = self.lock_snapshot();
            let changed = !snapshot.session_ended;
            snapshot.session_ended = true;
            changed
        };
        if changed {
            self.notify_subscribers();
        }
    }

    /// Clears the snapshot and the credential session together; used on
    /// leaving a room.
    pub fn reset(&self) {
        *self.lock_snapshot() = Snapshot::default();
        self.inner.credentials.clear();
        self.notify_subscribers();
    }

    // ── Derived selectors ───────────────────────────────────────────

    /// Whether this session holds an admin token.
    pub fn is_admin(&self) -> bool {
        self.inner.credentials.admin_token().is_some()
    }

    pub fn alive_players(&self) -> Vec<Player> {
        self.lock_snapshot()
            .alive_players()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn dead_players(&self) -> Vec<Player> {
        self.lock_snapshot()
            .dead_players()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn local_player(&self) -> Option<Player> {
        self.lock_snapshot().local_player().cloned()
    }

    pub fn is_local_alive(&self) -> bool {
        self.lock_snapshot().is_local_alive()
    }

    pub fn is_local_leader(&self) -> bool {
        self.lock_snapshot().is_local_leader()
    }

    pub fn phase(&self) -> Phase {
        self.lock_snapshot().phase()
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Calls every current subscriber with one shared snapshot copy. The
    /// registry snapshot is taken up front and each entry is re-checked for
    /// membership just before its turn, so unsubscribing mid-pass takes
    /// effect immediately without skipping anyone else; callbacks run with
    /// no lock held.
    fn notify_subscribers(&self) {
        let view = self.snapshot();
        let entries: Vec<(SubscriptionId, Arc<SubscriberFn>)> =
            self.lock_subscribers().entries.clone();
        for (id, callback) in entries {
            let still_registered = self
                .lock_subscribers()
                .entries
                .iter()
                .any(|(entry_id, _)| *entry_id == id);
            if still_registered {
                callback(&view);
            }
        }
    }

    fn lock_snapshot(&self) -> MutexGuard<'_, Snapshot> {
        self.inner
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, SubscriberRegistry> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for GameStore {
    fn default() -> Self {
        Self::new(CredentialStore::in_memory())
    }
}

impl fmt::Debug for GameStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.lock_snapshot();
        f.debug_struct("GameStore")
            .field("room", &snapshot.room.as_ref().map(|r| r.code.as_str()))
            .field("players", &snapshot.players.len())
            .field("phase", &snapshot.phase())
            .field("notifications", &snapshot.notifications.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::credentials::CredentialKind;
    use crate::protocol::{PlayerRef, StatePayload};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn join_event(id: PlayerId, nickname: &str) -> ServerEvent {
        ServerEvent::PlayerJoined {
            player: PlayerRef {
                id,
                nickname: nickname.to_string(),
            },
        }
    }

    #[test]
    fn dispatch_notifies_subscribers_with_committed_state() {
        let store = GameStore::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        store.subscribe(move |snapshot: &Snapshot| {
            seen_clone
                .lock()
                .unwrap()
                .push(snapshot.players.len());
        });

        store.dispatch(&join_event(1, "Ana"));
        store.dispatch(&join_event(2, "Bob"));

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn snapshot_is_copy_on_read() {
        let store = GameStore::default();
        store.dispatch(&join_event(1, "Ana"));

        let mut copy = store.snapshot();
        copy.players.clear();

        assert_eq!(store.snapshot().players.len(), 1);
    }

    #[test]
    fn unsubscribed_callback_stops_firing() {
        let store = GameStore::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let id = store.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        store.dispatch(&join_event(1, "Ana"));
        assert!(store.unsubscribe(id));
        store.dispatch(&join_event(2, "Bob"));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribing_mid_notify_keeps_remaining_subscribers() {
        let store = GameStore::default();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first_order = order.clone();
        let self_id = Arc::new(Mutex::new(None::<SubscriptionId>));
        let self_id_clone = self_id.clone();
        let store_clone = store.clone();
        let first = store.subscribe(move |_| {
            first_order.lock().unwrap().push("first");
            if let Some(id) = *self_id_clone.lock().unwrap() {
                store_clone.unsubscribe(id);
            }
        });
        *self_id.lock().unwrap() = Some(first);

        let second_order = order.clone();
        store.subscribe(move |_| {
            second_order.lock().unwrap().push("second");
        });

        // First unsubscribes itself during dispatch; second must still run.
        store.dispatch(&join_event(1, "Ana"));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);

        // And first must not fire again.
        store.dispatch(&join_event(2, "Bob"));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "second"]);
    }

    #[test]
    fn reset_clears_snapshot_and_credentials_together() {
        let creds = CredentialStore::in_memory();
        creds.set(CredentialKind::AdminToken, "admin-1");
        creds.set(CredentialKind::RoomCode, "ABCDEF");
        let store = GameStore::new(creds);
        store.dispatch(&join_event(1, "Ana"));
        assert!(store.is_admin());

        store.reset();

        assert_eq!(store.snapshot(), Snapshot::default());
        assert!(!store.is_admin());
        assert_eq!(store.credentials().room_code(), None);
    }

    #[test]
    fn local_role_binding_raises_modal_and_sticks() {
        let store = GameStore::default();
        store.dispatch(&ServerEvent::StateUpdate(Box::new(StatePayload {
            room: None,
            players: Some(vec![
                Player {
                    id: 1,
                    nickname: "Ana".to_string(),
                    is_alive: true,
                    is_leader: false,
                    role: None,
                },
                Player {
                    id: 2,
                    nickname: "Bob".to_string(),
                    is_alive: true,
                    is_leader: false,
                    role: None,
                },
            ]),
            game_state: None,
        })));

        store.bind_local_player(1);
        store.set_local_role(Role::Seer);

        let snapshot = store.snapshot();
        assert!(snapshot.show_role_modal);
        assert_eq!(snapshot.local_player().unwrap().role, Some(Role::Seer));

        // A roster refresh without roles must not erase it.
        store.dispatch(&ServerEvent::StateUpdate(Box::new(StatePayload {
            room: None,
            players: Some(vec![
                Player {
                    id: 1,
                    nickname: "Ana".to_string(),
                    is_alive: true,
                    is_leader: false,
                    role: None,
                },
                Player {
                    id: 2,
                    nickname: "Bob".to_string(),
                    is_alive: true,
                    is_leader: false,
                    role: None,
                },
            ]),
            game_state: None,
        })));
        assert_eq!(
            store.snapshot().local_player().unwrap().role,
            Some(Role::Seer)
        );
    }

    #[test]
    fn selectors_split_roster_by_liveness() {
        let store = GameStore::default();
        store.dispatch(&join_event(1, "Ana"));
        store.dispatch(&join_event(2, "Bob"));
        store.dispatch(&ServerEvent::PlayerEliminated(
            crate::protocol::EliminationPayload {
                player: crate::protocol::RevealedPlayer {
                    id: 2,
                    nickname: "Bob".to_string(),
                    role: Some(Role::Wolf),
                },
                hunter_revenge: None,
            },
        ));

        let alive: Vec<String> = store
            .alive_players()
            .into_iter()
            .map(|p| p.nickname)
            .collect();
        let dead: Vec<String> = store
            .dead_players()
            .into_iter()
            .map(|p| p.nickname)
            .collect();
        assert_eq!(alive, vec!["Ana"]);
        assert_eq!(dead, vec!["Bob"]);
    }

    #[test]
    fn notification_ops_flow_through_store() {
        let store = GameStore::default();
        let id = store.push_notification(NotificationKind::Error, "Room not found");
        assert_eq!(store.snapshot().notifications.len(), 1);

        assert!(store.dismiss_notification(id));
        assert!(!store.dismiss_notification(id));
        assert!(store.snapshot().notifications.is_empty());

        store.push_notification(NotificationKind::Info, "a");
        store.push_notification(NotificationKind::Info, "b");
        store.clear_notifications();
        assert!(store.snapshot().notifications.is_empty());
    }

    #[test]
    fn dispatch_enqueues_reducer_notices() {
        let store = GameStore::default();
        store.dispatch(&join_event(1, "Ana"));

        let snapshot = store.snapshot();
        let messages: Vec<&str> = snapshot
            .notifications
            .iter()
            .map(|n| n.message.as_str())
            .collect();
        assert_eq!(messages, vec!["Ana joined the room"]);
    }
}
