//! Session credentials and their durable mirror.
//!
//! A session may hold a player identity, an admin identity, both, or
//! neither. Every write is mirrored through a [`CredentialStorage`] so a
//! reload can resume the session; loading tolerates any subset of the keys
//! being present.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::protocol::PlayerId;

/// The credential slots a session can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    RoomCode,
    PlayerId,
    PlayerToken,
    AdminToken,
}

impl CredentialKind {
    /// Every kind, in load order.
    pub const ALL: [CredentialKind; 4] = [
        CredentialKind::RoomCode,
        CredentialKind::PlayerId,
        CredentialKind::PlayerToken,
        CredentialKind::AdminToken,
    ];

    /// Fixed durable-storage key for this kind. Hosts binding platform
    /// storage must use these verbatim for sessions to survive a reload.
    pub fn storage_key(self) -> &'static str {
        match self {
            CredentialKind::RoomCode => "roomCode",
            CredentialKind::PlayerId => "playerId",
            CredentialKind::PlayerToken => "playerToken",
            CredentialKind::AdminToken => "adminToken",
        }
    }
}

/// Durable key/value storage for credentials.
///
/// The interface is infallible: implementations own their error handling (log
/// and move on), so a failed platform write can never poison the in-memory
/// session.
pub trait CredentialStorage: Send + Sync {
    /// Returns the stored value for `key`, if any.
    fn read(&self, key: &str) -> Option<String>;
    /// Stores `value` under `key`, replacing any previous value.
    fn write(&self, key: &str, value: &str);
    /// Removes `key` if present.
    fn delete(&self, key: &str);
}

/// In-memory [`CredentialStorage`]; sessions do not survive the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStorage for MemoryStorage {
    fn read(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn write(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn delete(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Holds the identifiers and secrets needed to authenticate requests.
///
/// Cloning is cheap; clones share the same session.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<Inner>,
}

struct Inner {
    values: Mutex<HashMap<CredentialKind, String>>,
    storage: Arc<dyn CredentialStorage>,
}

impl CredentialStore {
    /// Creates an empty session mirrored to `storage`.
    pub fn new(storage: Arc<dyn CredentialStorage>) -> Self {
        Self {
            inner: Arc::new(Inner {
                values: Mutex::new(HashMap::new()),
                storage,
            }),
        }
    }

    /// Creates an empty session over in-memory storage.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Primes a session from `storage`. Missing keys are simply absent;
    /// partially-populated storage is not an error.
    pub fn load_session(storage: Arc<dyn CredentialStorage>) -> Self {
        let mut values = HashMap::new();
        for kind in CredentialKind::ALL {
            if let Some(value) = storage.read(kind.storage_key()) {
                values.insert(kind, value);
            }
        }
        Self {
            inner: Arc::new(Inner {
                values: Mutex::new(values),
                storage,
            }),
        }
    }

    /// Stores a credential and mirrors it to durable storage. Empty values
    /// are ignored.
    pub fn set(&self, kind: CredentialKind, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }
        self.inner.storage.write(kind.storage_key(), &value);
        self.lock_values().insert(kind, value);
    }

    /// Returns the credential for `kind`, if held.
    pub fn get(&self, kind: CredentialKind) -> Option<String> {
        self.lock_values().get(&kind).cloned()
    }

    /// Clears the whole session, in memory and in durable storage.
    pub fn clear(&self) {
        for kind in CredentialKind::ALL {
            self.inner.storage.delete(kind.storage_key());
        }
        self.lock_values().clear();
    }

    /// Records the local player identity issued on a successful join.
    pub fn set_player(&self, id: PlayerId, token: impl Into<String>) {
        self.set(CredentialKind::PlayerId, id.to_string());
        self.set(CredentialKind::PlayerToken, token);
    }

    pub fn room_code(&self) -> Option<String> {
        self.get(CredentialKind::RoomCode)
    }

    /// Player id parsed from its stored string form. `None` when absent or
    /// unparseable.
    pub fn player_id(&self) -> Option<PlayerId> {
        self.get(CredentialKind::PlayerId)
            .and_then(|value| value.parse().ok())
    }

    pub fn player_token(&self) -> Option<String> {
        self.get(CredentialKind::PlayerToken)
    }

    pub fn admin_token(&self) -> Option<String> {
        self.get(CredentialKind::AdminToken)
    }

    fn lock_values(&self) -> std::sync::MutexGuard<'_, HashMap<CredentialKind, String>> {
        self.inner
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Tokens are secrets; show presence only.
        f.debug_struct("CredentialStore")
            .field("room_code", &self.room_code())
            .field("player_id", &self.player_id())
            .field("has_player_token", &self.player_token().is_some())
            .field("has_admin_token", &self.admin_token().is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn load_session_tolerates_partial_storage() {
        let storage = Arc::new(MemoryStorage::new());
        storage.write("playerToken", "tok-123");

        let creds = CredentialStore::load_session(storage);
        assert_eq!(creds.player_token().as_deref(), Some("tok-123"));
        assert_eq!(creds.player_id(), None);
        assert_eq!(creds.admin_token(), None);
        assert_eq!(creds.room_code(), None);
    }

    #[test]
    fn writes_mirror_to_storage() {
        let storage = Arc::new(MemoryStorage::new());
        let creds = CredentialStore::new(storage.clone());

        creds.set(CredentialKind::RoomCode, "ABCDEF");
        creds.set_player(42, "tok-42");

        assert_eq!(storage.read("roomCode").as_deref(), Some("ABCDEF"));
        assert_eq!(storage.read("playerId").as_deref(), Some("42"));
        assert_eq!(storage.read("playerToken").as_deref(), Some("tok-42"));
    }

    #[test]
    fn clear_removes_memory_and_storage() {
        let storage = Arc::new(MemoryStorage::new());
        let creds = CredentialStore::new(storage.clone());
        creds.set(CredentialKind::AdminToken, "admin-1");
        creds.set(CredentialKind::RoomCode, "ROOMZZ");

        creds.clear();

        assert_eq!(creds.admin_token(), None);
        assert_eq!(creds.room_code(), None);
        assert_eq!(storage.read("adminToken"), None);
        assert_eq!(storage.read("roomCode"), None);
    }

    #[test]
    fn empty_values_are_ignored() {
        let creds = CredentialStore::in_memory();
        creds.set(CredentialKind::AdminToken, "");
        assert_eq!(creds.admin_token(), None);
    }

    #[test]
    fn unparseable_player_id_reads_as_none() {
        let storage = Arc::new(MemoryStorage::new());
        storage.write("playerId", "not-a-number");
        let creds = CredentialStore::load_session(storage);
        assert_eq!(creds.player_id(), None);
    }

    #[test]
    fn reload_resumes_session() {
        let storage = Arc::new(MemoryStorage::new());
        {
            let creds = CredentialStore::new(storage.clone());
            creds.set(CredentialKind::RoomCode, "WOLFIE");
            creds.set_player(7, "tok-7");
        }

        let resumed = CredentialStore::load_session(storage);
        assert_eq!(resumed.room_code().as_deref(), Some("WOLFIE"));
        assert_eq!(resumed.player_id(), Some(7));
        assert_eq!(resumed.player_token().as_deref(), Some("tok-7"));
    }
}
