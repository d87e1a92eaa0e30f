use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::payload::{ActionDescriptor, ActionKind};

/// What is kept of an action between presentation and user interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub id: String,
    pub notification_id: String,
    pub kind: ActionKind,
}

impl PendingAction {
    pub fn from_descriptor(descriptor: ActionDescriptor, notification_id: &str) -> Self {
        Self {
            id: descriptor.id,
            notification_id: notification_id.to_string(),
            kind: descriptor.kind,
        }
    }
}

/// Pending actions keyed by action id.
///
/// Shared between the request path (which registers) and the interaction
/// path (which consumes). Ids are not scoped per notification: registering
/// an id that is already pending replaces the earlier entry.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    entries: Arc<Mutex<HashMap<String, PendingAction>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite; returns the replaced entry, if any.
    pub fn register(&self, action: PendingAction) -> Option<PendingAction> {
        let id = action.id.clone();
        let previous = self.lock().insert(id.clone(), action);
        if let Some(previous) = &previous {
            debug!(
                action_id = %id,
                previous_notification = %previous.notification_id,
                "pending action overwritten"
            );
        }
        previous
    }

    /// Remove and return the entry for `id`. At most one caller ever
    /// receives a given registration.
    pub fn consume(&self, id: &str) -> Option<PendingAction> {
        self.lock().remove(id)
    }

    /// Remove `id` only while it still belongs to `notification_id`.
    pub fn remove_owned(&self, id: &str, notification_id: &str) -> bool {
        let mut entries = self.lock();
        match entries.get(id) {
            Some(entry) if entry.notification_id == notification_id => {
                entries.remove(id);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingAction>> {
        // A panic while holding the guard cannot leave the map half-updated.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(id: &str, notification_id: &str) -> PendingAction {
        PendingAction {
            id: id.to_string(),
            notification_id: notification_id.to_string(),
            kind: ActionKind::Open {
                location: format!("/tmp/{id}"),
            },
        }
    }

    #[test]
    fn consume_returns_entry_exactly_once() {
        let registry = ActionRegistry::new();
        registry.register(pending("open_action", "n1"));

        assert_eq!(registry.consume("open_action"), Some(pending("open_action", "n1")));
        assert_eq!(registry.consume("open_action"), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn consume_unknown_id_is_none() {
        let registry = ActionRegistry::new();
        assert_eq!(registry.consume("never-registered"), None);
    }

    #[test]
    fn reregistration_overwrites_and_rearms() {
        let registry = ActionRegistry::new();
        assert!(registry.register(pending("a", "n1")).is_none());
        assert_eq!(registry.register(pending("a", "n2")), Some(pending("a", "n1")));
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.consume("a").map(|p| p.notification_id), Some("n2".into()));
        registry.register(pending("a", "n3"));
        assert!(registry.consume("a").is_some());
    }

    #[test]
    fn remove_owned_leaves_foreign_entries() {
        let registry = ActionRegistry::new();
        registry.register(pending("a", "n2"));

        assert!(!registry.remove_owned("a", "n1"));
        assert!(registry.contains("a"));
        assert!(registry.remove_owned("a", "n2"));
        assert!(!registry.contains("a"));
    }

    #[test]
    fn clones_share_state() {
        let registry = ActionRegistry::new();
        let handle = registry.clone();
        registry.register(pending("shared", "n1"));
        assert!(handle.consume("shared").is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_consumers_see_one_winner() {
        let registry = ActionRegistry::new();
        registry.register(pending("race", "n1"));

        let winners: usize = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.consume("race").is_some())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| usize::from(handle.join().expect("thread")))
            .sum();

        assert_eq!(winners, 1);
    }
}
