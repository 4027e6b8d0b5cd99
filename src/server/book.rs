//! In-memory notification storage, one list per user.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Deserialize;

use crate::notifications::{
    NewNotification, Notification, NotificationCategory, NotificationId, NotificationPage,
    ReadFilter, SortOrder,
};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Query string of `GET /notifications`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub filter: Option<ReadFilter>,
    #[serde(rename = "type")]
    pub category: Option<NotificationCategory>,
    pub sort: Option<SortOrder>,
}

#[derive(Default)]
pub struct NotificationBook {
    /// user_id -> notifications in insertion order
    users: Mutex<HashMap<u64, Vec<Notification>>>,
    next_id: AtomicU64,
}

impl NotificationBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn users(&self) -> MutexGuard<'_, HashMap<u64, Vec<Notification>>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a new unread notification for `user_id` and return it.
    pub fn create(&self, user_id: u64, new: NewNotification) -> Notification {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let notification = Notification {
            id: NotificationId::confirmed(format!("n-{}", id)),
            title: new.title,
            message: new.message,
            category: new.category,
            is_read: false,
            created_at: Utc::now(),
            related_entity: new.related_entity,
        };
        self.users()
            .entry(user_id)
            .or_default()
            .push(notification.clone());
        notification
    }

    pub fn list(&self, user_id: u64, params: &ListParams) -> NotificationPage {
        let users = self.users();
        let all = users.get(&user_id).map(Vec::as_slice).unwrap_or_default();

        let filter = params.filter.unwrap_or_default();
        let mut matching: Vec<&Notification> = all
            .iter()
            .filter(|n| filter.matches(n))
            .filter(|n| params.category.map_or(true, |c| n.category == c))
            .collect();
        matching.sort_by_key(|n| n.created_at);
        if params.sort.unwrap_or_default() == SortOrder::Newest {
            matching.reverse();
        }

        let limit = params
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let page = params.page.unwrap_or(1).max(1);
        let total_count = matching.len() as u64;
        let total_pages = total_count.div_ceil(limit as u64) as u32;
        let offset = usize::try_from(u64::from(page - 1).saturating_mul(u64::from(limit)))
            .unwrap_or(usize::MAX);

        let notifications = matching
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .cloned()
            .collect();

        NotificationPage {
            notifications,
            total_count,
            total_pages,
            unread_count: all.iter().filter(|n| !n.is_read).count() as u64,
        }
    }

    /// Returns the updated record, or `None` if the user has no such id.
    pub fn mark_read(&self, user_id: u64, id: &str) -> Option<Notification> {
        let mut users = self.users();
        let notification = users
            .get_mut(&user_id)?
            .iter_mut()
            .find(|n| n.id.server_id() == Some(id))?;
        notification.is_read = true;
        Some(notification.clone())
    }

    /// Returns how many notifications changed.
    pub fn mark_all_read(&self, user_id: u64) -> usize {
        let mut users = self.users();
        let Some(list) = users.get_mut(&user_id) else {
            return 0;
        };
        let mut updated = 0;
        for notification in list.iter_mut().filter(|n| !n.is_read) {
            notification.is_read = true;
            updated += 1;
        }
        updated
    }

    pub fn delete(&self, user_id: u64, id: &str) -> bool {
        let mut users = self.users();
        let Some(list) = users.get_mut(&user_id) else {
            return false;
        };
        let before = list.len();
        list.retain(|n| n.id.server_id() != Some(id));
        list.len() != before
    }

    pub fn clear(&self, user_id: u64) -> usize {
        self.users()
            .remove(&user_id)
            .map(|list| list.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new(title: &str, category: NotificationCategory) -> NewNotification {
        NewNotification {
            title: title.to_string(),
            message: "m".to_string(),
            category,
            related_entity: None,
        }
    }

    fn seeded(count: usize) -> NotificationBook {
        let book = NotificationBook::new();
        for i in 0..count {
            book.create(1, new(&format!("t{}", i), NotificationCategory::Info));
        }
        book
    }

    #[test]
    fn test_list_paginates() {
        let book = seeded(45);

        let page = book.list(
            1,
            &ListParams {
                page: Some(3),
                limit: Some(20),
                ..Default::default()
            },
        );

        assert_eq!(page.notifications.len(), 5);
        assert_eq!(page.total_count, 45);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.unread_count, 45);
    }

    #[test]
    fn test_list_far_past_the_last_page_is_empty() {
        let book = seeded(3);

        let page = book.list(
            1,
            &ListParams {
                page: Some(u32::MAX),
                limit: Some(100),
                ..Default::default()
            },
        );

        assert!(page.notifications.is_empty());
        assert_eq!(page.total_count, 3);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn test_list_filters_by_read_state_and_category() {
        let book = seeded(3);
        book.create(1, new("down", NotificationCategory::EquipmentStatusChanged));
        book.mark_read(1, "n-1").unwrap();

        let unread = book.list(
            1,
            &ListParams {
                filter: Some(ReadFilter::Unread),
                ..Default::default()
            },
        );
        assert_eq!(unread.total_count, 3);

        let equipment = book.list(
            1,
            &ListParams {
                category: Some(NotificationCategory::EquipmentStatusChanged),
                ..Default::default()
            },
        );
        assert_eq!(equipment.total_count, 1);
        assert_eq!(equipment.notifications[0].title, "down");
    }

    #[test]
    fn test_list_is_scoped_per_user() {
        let book = seeded(2);
        book.create(2, new("other", NotificationCategory::Info));

        assert_eq!(book.list(1, &ListParams::default()).total_count, 2);
        assert_eq!(book.list(2, &ListParams::default()).total_count, 1);
        assert_eq!(book.list(3, &ListParams::default()).total_count, 0);
    }

    #[test]
    fn test_mark_read_delete_and_clear() {
        let book = seeded(4);

        assert!(book.mark_read(1, "n-2").unwrap().is_read);
        assert!(book.mark_read(1, "n-99").is_none());
        assert!(book.mark_read(2, "n-2").is_none());

        assert!(book.delete(1, "n-3"));
        assert!(!book.delete(1, "n-3"));

        assert_eq!(book.mark_all_read(1), 2);
        assert_eq!(book.mark_all_read(1), 0);
        assert_eq!(book.list(1, &ListParams::default()).unread_count, 0);

        assert_eq!(book.clear(1), 3);
        assert_eq!(book.list(1, &ListParams::default()).total_count, 0);
    }
}
