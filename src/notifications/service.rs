//! Notification service: applies server responses to the store and reports
//! outcomes to the user.

use std::sync::Arc;

use tracing::{debug, warn};

use super::models::{NewNotification, Notification, NotificationId, NotificationQuery};
use super::state::StoreAction;
use super::store::{FetchOutcome, NotificationStore};
use crate::alerts::AlertCenter;
use crate::api::{ApiError, NotificationsApi};
use crate::realtime::{ClientEvent, ConnectionManager};

/// Service driving the notification store from REST calls.
///
/// Failures leave the store untouched and surface the server's message as a
/// transient alert. Nothing is retried automatically.
pub struct NotificationService {
    api: Arc<dyn NotificationsApi>,
    store: Arc<NotificationStore>,
    alerts: Arc<AlertCenter>,
    realtime: Option<ConnectionManager>,
}

impl NotificationService {
    pub fn new(
        api: Arc<dyn NotificationsApi>,
        store: Arc<NotificationStore>,
        alerts: Arc<AlertCenter>,
        realtime: Option<ConnectionManager>,
    ) -> Self {
        Self {
            api,
            store,
            alerts,
            realtime,
        }
    }

    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    /// Replace the loaded page with the server's view.
    pub async fn fetch(&self, query: &NotificationQuery) -> Result<FetchOutcome, ApiError> {
        let ticket = self.store.begin_fetch(query);
        let page = self
            .api
            .list(query)
            .await
            .map_err(|e| self.report("Failed to load notifications", e))?;
        Ok(self.store.finish_fetch(ticket, page))
    }

    /// Mark one notification read. Already-read records cost no request.
    pub async fn mark_as_read(&self, id: &NotificationId) -> Result<(), ApiError> {
        if self.store.is_read(id) == Some(true) {
            return Ok(());
        }
        let server_id = Self::server_id(id)?;

        self.api
            .mark_read(server_id)
            .await
            .map_err(|e| self.report("Failed to mark notification as read", e))?;
        self.store.mark_read(id);

        self.notify_peers(ClientEvent::notification_read(server_id))
            .await;
        Ok(())
    }

    pub async fn mark_all_as_read(&self) -> Result<(), ApiError> {
        self.api
            .mark_all_read()
            .await
            .map_err(|e| self.report("Failed to mark notifications as read", e))?;
        self.store.mark_all_read();
        self.alerts.success("All notifications marked as read");

        self.notify_peers(ClientEvent::NotificationReadAll).await;
        Ok(())
    }

    pub async fn delete(&self, id: &NotificationId) -> Result<(), ApiError> {
        let server_id = Self::server_id(id)?;
        self.api
            .delete(server_id)
            .await
            .map_err(|e| self.report("Failed to delete notification", e))?;
        self.store.delete(id);
        self.alerts.success("Notification deleted");
        Ok(())
    }

    pub async fn clear_all(&self) -> Result<(), ApiError> {
        self.api
            .clear()
            .await
            .map_err(|e| self.report("Failed to clear notifications", e))?;
        self.store.clear();
        self.alerts.success("All notifications cleared");
        Ok(())
    }

    /// Create a notification optimistically.
    ///
    /// A pending record shows up immediately and is swapped for the server's
    /// record on success, or removed again on failure.
    pub async fn create(&self, new: &NewNotification) -> Result<Notification, ApiError> {
        let local = Notification::pending(new);
        let pending_id = local.id.clone();
        self.store.dispatch(StoreAction::PendingAdded(local));

        match self.api.create(new).await {
            Ok(confirmed) => {
                debug!("Notification {} confirmed as {}", pending_id, confirmed.id);
                self.store.dispatch(StoreAction::PendingConfirmed {
                    pending: pending_id,
                    confirmed: confirmed.clone(),
                });
                Ok(confirmed)
            }
            Err(e) => {
                self.store
                    .dispatch(StoreAction::PendingDiscarded(pending_id));
                Err(self.report("Failed to create notification", e))
            }
        }
    }

    fn server_id(id: &NotificationId) -> Result<&str, ApiError> {
        id.server_id().ok_or_else(|| {
            ApiError::InvalidRequest(format!("notification {} is not saved yet", id))
        })
    }

    fn report(&self, context: &str, error: ApiError) -> ApiError {
        warn!("{}: {}", context, error);
        self.alerts.error(error.user_message());
        error
    }

    /// Tell the server's other sessions about a read-state change.
    async fn notify_peers(&self, event: ClientEvent) {
        let Some(realtime) = &self.realtime else {
            return;
        };
        if let Err(e) = realtime.emit(event).await {
            debug!("Skipping read-state push: {}", e);
        }
    }
}
