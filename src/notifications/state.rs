//! Notification state reducer.
//!
//! `NotificationState` is a plain value mutated only through `apply`, which
//! keeps the unread counter in step with every transition. Locking and change
//! signalling live in `NotificationStore`.

use std::collections::VecDeque;

use super::models::{
    Notification, NotificationCategory, NotificationId, NotificationPage, NotificationQuery,
    ReadFilter, SortOrder,
};

/// Upper bound on pushes remembered for replay over in-flight fetches.
const MAX_RECENT_PUSHES: usize = 256;

/// Issued when a fetch starts; presented again when its response arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    seq: u64,
    push_seq: u64,
    page: u32,
    page_size: u32,
    filter: ReadFilter,
    category: Option<NotificationCategory>,
    sort: SortOrder,
}

impl FetchTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Whether a fresh record belongs at the head of this fetch's page.
    fn shows_at_head(&self, notification: &Notification) -> bool {
        self.page <= 1
            && self.sort == SortOrder::Newest
            && self.filter.matches(notification)
            && self.category.map_or(true, |c| c == notification.category)
    }
}

/// Every state transition the store accepts.
#[derive(Debug, Clone)]
pub enum StoreAction {
    FetchSucceeded {
        ticket: FetchTicket,
        page: NotificationPage,
    },
    MarkedRead(NotificationId),
    AllMarkedRead,
    Deleted(NotificationId),
    Cleared,
    Pushed(Notification),
    PendingAdded(Notification),
    PendingConfirmed {
        pending: NotificationId,
        confirmed: Notification,
    },
    PendingDiscarded(NotificationId),
    Reset,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationState {
    notifications: Vec<Notification>,
    unread_count: u64,
    total_count: u64,
    total_pages: u32,
    page: u32,
    page_size: u32,
    issued_fetch_seq: u64,
    applied_fetch_seq: u64,
    push_seq: u64,
    recent_pushes: VecDeque<(u64, Notification)>,
}

impl NotificationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn unread_count(&self) -> u64 {
        self.unread_count
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn get(&self, id: &NotificationId) -> Option<&Notification> {
        self.notifications.iter().find(|n| &n.id == id)
    }

    fn position(&self, id: &NotificationId) -> Option<usize> {
        self.notifications.iter().position(|n| &n.id == id)
    }

    /// Reserve a sequence number for a fetch that is about to be sent.
    pub fn begin_fetch(&mut self, query: &NotificationQuery) -> FetchTicket {
        self.issued_fetch_seq += 1;
        FetchTicket {
            seq: self.issued_fetch_seq,
            push_seq: self.push_seq,
            page: query.page,
            page_size: query.page_size,
            filter: query.filter,
            category: query.category,
            sort: query.sort,
        }
    }

    /// Apply an action. Returns true if the state changed.
    pub fn apply(&mut self, action: StoreAction) -> bool {
        match action {
            StoreAction::FetchSucceeded { ticket, page } => self.apply_fetch(ticket, page),
            StoreAction::MarkedRead(id) => self.mark_read(&id),
            StoreAction::AllMarkedRead => self.mark_all_read(),
            StoreAction::Deleted(id) | StoreAction::PendingDiscarded(id) => self.remove(&id),
            StoreAction::Cleared => {
                let changed = !self.notifications.is_empty() || self.unread_count != 0;
                self.notifications.clear();
                self.recent_pushes.clear();
                self.unread_count = 0;
                self.total_count = 0;
                self.total_pages = 0;
                changed
            }
            StoreAction::Pushed(notification) => {
                if self.position(&notification.id).is_some() {
                    return false;
                }
                self.push_seq += 1;
                self.recent_pushes
                    .push_back((self.push_seq, notification.clone()));
                while self.recent_pushes.len() > MAX_RECENT_PUSHES {
                    self.recent_pushes.pop_front();
                }
                self.prepend(notification);
                true
            }
            StoreAction::PendingAdded(notification) => {
                if self.position(&notification.id).is_some() {
                    return false;
                }
                self.prepend(notification);
                true
            }
            StoreAction::PendingConfirmed { pending, confirmed } => {
                self.confirm_pending(&pending, confirmed)
            }
            StoreAction::Reset => {
                // Outstanding fetch tickets must not land on the fresh state.
                let issued = self.issued_fetch_seq;
                *self = Self {
                    issued_fetch_seq: issued,
                    applied_fetch_seq: issued,
                    ..Self::default()
                };
                true
            }
        }
    }

    fn apply_fetch(&mut self, ticket: FetchTicket, page: NotificationPage) -> bool {
        if ticket.seq <= self.applied_fetch_seq {
            return false;
        }
        self.applied_fetch_seq = ticket.seq;

        self.notifications = page.notifications;
        self.unread_count = page.unread_count;
        self.total_count = page.total_count;
        self.total_pages = page.total_pages;
        self.page = ticket.page;
        self.page_size = ticket.page_size;

        // Pushes that arrived while this fetch was in flight may be missing
        // from the server snapshot. Only a newest-first first page can show
        // whether the snapshot predates them: anything newer than its head
        // was not counted yet. Elsewhere the server's counters stand.
        let head_created_at = self.notifications.first().map(|n| n.created_at);
        let replay: Vec<Notification> = self
            .recent_pushes
            .iter()
            .filter(|(seq, _)| *seq > ticket.push_seq)
            .map(|(_, n)| n.clone())
            .filter(|n| ticket.shows_at_head(n))
            .filter(|n| head_created_at.map_or(true, |head| n.created_at > head))
            .collect();
        for notification in replay {
            if self.position(&notification.id).is_none() {
                self.prepend(notification);
            }
        }

        self.recent_pushes.retain(|(seq, _)| *seq > ticket.push_seq);
        true
    }

    fn prepend(&mut self, notification: Notification) {
        if !notification.is_read {
            self.unread_count += 1;
        }
        self.total_count += 1;
        self.notifications.insert(0, notification);
    }

    fn mark_read(&mut self, id: &NotificationId) -> bool {
        for (_, pushed) in self.recent_pushes.iter_mut() {
            if &pushed.id == id {
                pushed.is_read = true;
            }
        }
        match self.notifications.iter_mut().find(|n| &n.id == id) {
            Some(notification) if !notification.is_read => {
                notification.is_read = true;
                self.unread_count = self.unread_count.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    fn mark_all_read(&mut self) -> bool {
        let changed =
            self.unread_count != 0 || self.notifications.iter().any(|n| !n.is_read);
        for notification in self.notifications.iter_mut() {
            notification.is_read = true;
        }
        for (_, pushed) in self.recent_pushes.iter_mut() {
            pushed.is_read = true;
        }
        self.unread_count = 0;
        changed
    }

    fn remove(&mut self, id: &NotificationId) -> bool {
        self.recent_pushes.retain(|(_, n)| &n.id != id);
        let Some(index) = self.position(id) else {
            return false;
        };
        let removed = self.notifications.remove(index);
        if !removed.is_read {
            self.unread_count = self.unread_count.saturating_sub(1);
        }
        self.total_count = self.total_count.saturating_sub(1);
        true
    }

    fn confirm_pending(&mut self, pending: &NotificationId, confirmed: Notification) -> bool {
        let Some(index) = self.position(pending) else {
            return false;
        };

        if self.position(&confirmed.id).is_some() {
            // The push for this record beat the POST response.
            return self.remove(pending);
        }

        let was_unread = !self.notifications[index].is_read;
        match (was_unread, confirmed.is_read) {
            (true, true) => self.unread_count = self.unread_count.saturating_sub(1),
            (false, false) => self.unread_count += 1,
            _ => {}
        }
        self.notifications[index] = confirmed;
        true
    }
}
