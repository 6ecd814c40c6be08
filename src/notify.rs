//! User-facing notification queue.
//!
//! Notifications are presentation hints derived from dispatched events,
//! never a source of truth for game state. The reducer stays pure by
//! producing [`NoticeDraft`]s; the queue assigns identifiers and timestamps
//! at enqueue time.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Severity of a notification, mirroring the presentation styles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

/// A notification that has not been enqueued yet: no id, no timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeDraft {
    pub kind: NotificationKind,
    pub message: String,
}

impl NoticeDraft {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, message)
    }
}

/// One entry in the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    /// Monotonic identifier, unique within a session.
    pub id: u64,
    pub message: String,
    pub kind: NotificationKind,
    /// Enqueue time.
    pub created_at: SystemTime,
}

/// Append-only queue of user-facing notifications.
///
/// Insertion order is display order. Ids start at 1 and keep growing across
/// dismissals and clears.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NotificationQueue {
    entries: Vec<Notification>,
    next_id: u64,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a draft, assigning the next id and stamping the time.
    /// Returns the assigned id.
    pub fn push(&mut self, draft: NoticeDraft) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.push(Notification {
            id,
            message: draft.message,
            kind: draft.kind,
            created_at: SystemTime::now(),
        });
        id
    }

    /// Removes one entry. Returns false for unknown ids.
    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|n| n.id != id);
        self.entries.len() != before
    }

    /// Empties the queue without resetting the id counter.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_across_dismissals() {
        let mut queue = NotificationQueue::new();
        let first = queue.push(NoticeDraft::info("one"));
        let second = queue.push(NoticeDraft::info("two"));
        assert!(second > first);

        assert!(queue.dismiss(first));
        let third = queue.push(NoticeDraft::info("three"));
        assert!(third > second);
    }

    #[test]
    fn dismiss_unknown_id_is_a_noop() {
        let mut queue = NotificationQueue::new();
        queue.push(NoticeDraft::warning("stay"));
        assert!(!queue.dismiss(999));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn clear_keeps_counter_growing() {
        let mut queue = NotificationQueue::new();
        let before = queue.push(NoticeDraft::error("boom"));
        queue.clear();
        assert!(queue.is_empty());
        let after = queue.push(NoticeDraft::info("fresh"));
        assert!(after > before);
    }

    #[test]
    fn iteration_is_insertion_order() {
        let mut queue = NotificationQueue::new();
        queue.push(NoticeDraft::info("a"));
        queue.push(NoticeDraft::success("b"));
        queue.push(NoticeDraft::error("c"));
        let messages: Vec<&str> = queue.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, vec!["a", "b", "c"]);
    }
}
