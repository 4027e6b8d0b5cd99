//! Shared notification store.

use std::sync::{PoisonError, RwLock};

use tokio::sync::watch;
use tracing::debug;

use super::models::{Notification, NotificationId, NotificationPage, NotificationQuery};
use super::state::{FetchTicket, NotificationState, StoreAction};

/// Result of presenting a fetch response to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    /// A newer fetch was already applied; the response was dropped.
    Stale,
}

/// Point-in-time copy of the store contents.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
    pub total_count: u64,
    pub total_pages: u32,
    pub page: u32,
}

/// Single-writer container around `NotificationState`.
///
/// Every effective change bumps a revision published on a watch channel so
/// views can re-render without polling.
pub struct NotificationStore {
    state: RwLock<NotificationState>,
    revision: watch::Sender<u64>,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: RwLock::new(NotificationState::new()),
            revision,
        }
    }

    /// Apply an action, returning true if the state changed.
    pub fn dispatch(&self, action: StoreAction) -> bool {
        let changed = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.apply(action)
        };
        if changed {
            self.revision.send_modify(|rev| *rev += 1);
        }
        changed
    }

    pub fn begin_fetch(&self, query: &NotificationQuery) -> FetchTicket {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .begin_fetch(query)
    }

    pub fn finish_fetch(&self, ticket: FetchTicket, page: NotificationPage) -> FetchOutcome {
        if self.dispatch(StoreAction::FetchSucceeded { ticket, page }) {
            FetchOutcome::Applied
        } else {
            debug!("Dropping stale notification page (fetch #{})", ticket.seq());
            FetchOutcome::Stale
        }
    }

    pub fn mark_read(&self, id: &NotificationId) -> bool {
        self.dispatch(StoreAction::MarkedRead(id.clone()))
    }

    pub fn mark_all_read(&self) -> bool {
        self.dispatch(StoreAction::AllMarkedRead)
    }

    pub fn delete(&self, id: &NotificationId) -> bool {
        self.dispatch(StoreAction::Deleted(id.clone()))
    }

    pub fn clear(&self) -> bool {
        self.dispatch(StoreAction::Cleared)
    }

    /// Push path: put a new record at the front of the list.
    pub fn add_notification(&self, notification: Notification) -> bool {
        self.dispatch(StoreAction::Pushed(notification))
    }

    pub fn reset(&self) {
        self.dispatch(StoreAction::Reset);
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        StoreSnapshot {
            notifications: state.notifications().to_vec(),
            unread_count: state.unread_count(),
            total_count: state.total_count(),
            total_pages: state.total_pages(),
            page: state.page(),
        }
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .notifications()
            .to_vec()
    }

    pub fn unread_count(&self) -> u64 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .unread_count()
    }

    pub fn get(&self, id: &NotificationId) -> Option<Notification> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn is_read(&self, id: &NotificationId) -> Option<bool> {
        self.get(id).map(|n| n.is_read)
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::models::NotificationCategory;
    use chrono::Utc;

    fn notification(id: &str, is_read: bool) -> Notification {
        Notification {
            id: NotificationId::confirmed(id),
            title: "title".to_string(),
            message: "message".to_string(),
            category: NotificationCategory::Warning,
            is_read,
            created_at: Utc::now(),
            related_entity: None,
        }
    }

    #[test]
    fn test_revision_bumps_only_on_change() {
        let store = NotificationStore::new();
        assert_eq!(store.revision(), 0);

        store.add_notification(notification("a", false));
        assert_eq!(store.revision(), 1);

        store.mark_read(&"a".into());
        assert_eq!(store.revision(), 2);

        // Already read: no change, no revision bump.
        store.mark_read(&"a".into());
        assert_eq!(store.revision(), 2);
    }

    #[test]
    fn test_finish_fetch_reports_stale() {
        let store = NotificationStore::new();
        let query = NotificationQuery::default();
        let first = store.begin_fetch(&query);
        let second = store.begin_fetch(&query);

        let page = NotificationPage {
            notifications: vec![notification("a", false)],
            total_count: 1,
            total_pages: 1,
            unread_count: 1,
        };

        assert_eq!(store.finish_fetch(second, page.clone()), FetchOutcome::Applied);
        assert_eq!(store.finish_fetch(first, page), FetchOutcome::Stale);
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let store = NotificationStore::new();
        store.add_notification(notification("a", false));
        store.add_notification(notification("b", true));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.notifications.len(), 2);
        assert_eq!(snapshot.unread_count, 1);
        assert_eq!(snapshot.total_count, 2);
        assert_eq!(store.is_read(&"b".into()), Some(true));
        assert_eq!(store.is_read(&"missing".into()), None);
    }

    #[tokio::test]
    async fn test_subscribers_observe_changes() {
        let store = NotificationStore::new();
        let mut changes = store.subscribe_changes();

        store.add_notification(notification("a", false));

        changes.changed().await.unwrap();
        assert_eq!(*changes.borrow(), 1);
    }
}
