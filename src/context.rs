//! Per-session wiring of the notification pipeline.
//!
//! A context owns one store, one registry, one alert center and one push
//! channel. Nothing is shared between contexts, so a sign-out followed by a
//! sign-in as somebody else starts from a clean slate.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::alerts::{AlertCenter, AlertLevel};
use crate::api::{ApiError, NotificationsApi, NotificationsClient};
use crate::auth::Credential;
use crate::config::AppConfig;
use crate::notifications::{NotificationCategory, NotificationService, NotificationStore};
use crate::realtime::{
    ConnectionManager, EventKind, RealtimeError, RealtimeSettings, ServerEvent, Subscription,
    SubscriptionRegistry,
};

/// The authenticated user the context works for.
#[derive(Debug, Clone)]
pub struct Session {
    pub credential: Option<Credential>,
    pub user_id: u64,
}

pub struct NotificationContext {
    session: Session,
    store: Arc<NotificationStore>,
    registry: Arc<SubscriptionRegistry>,
    alerts: Arc<AlertCenter>,
    connection: ConnectionManager,
    service: NotificationService,
    toast_handler: Mutex<Option<Subscription>>,
}

impl NotificationContext {
    /// Build a context talking to the REST API described by `config`.
    pub fn create(config: &AppConfig, session: Session) -> Result<Self, ApiError> {
        let api = NotificationsClient::new(
            config.api_url.clone(),
            session.credential.clone(),
            config.request_timeout,
        )?;
        Ok(Self::with_api(
            config.realtime.clone(),
            Arc::new(api),
            session,
        ))
    }

    pub fn with_api(
        settings: RealtimeSettings,
        api: Arc<dyn NotificationsApi>,
        session: Session,
    ) -> Self {
        let store = Arc::new(NotificationStore::new());
        let registry = Arc::new(SubscriptionRegistry::new());
        let alerts = Arc::new(AlertCenter::new());
        let connection = ConnectionManager::new(
            settings,
            registry.clone(),
            store.clone(),
            alerts.clone(),
        );
        let service = NotificationService::new(
            api,
            store.clone(),
            alerts.clone(),
            Some(connection.clone()),
        );

        Self {
            session,
            store,
            registry,
            alerts,
            connection,
            service,
            toast_handler: Mutex::new(None),
        }
    }

    /// Install the default handlers, join the user's channel and open the
    /// push channel.
    ///
    /// The channel is joined first so that whichever connect succeeds, this
    /// one or a background retry, subscribes to it. Handlers stay installed
    /// when connecting fails.
    pub async fn start(&self) -> Result<(), RealtimeError> {
        self.install_toast_handler();
        self.connection
            .join_user_channel(self.session.user_id)
            .await;
        self.connection
            .connect(self.session.credential.clone())
            .await?;
        info!("Notifications started for user {}", self.session.user_id);
        Ok(())
    }

    /// Explicit reconnect, e.g. from the "unavailable" banner.
    pub async fn reconnect(&self) -> Result<(), RealtimeError> {
        self.connection
            .connect(self.session.credential.clone())
            .await
    }

    /// Tear everything down. The context can be started again afterwards.
    pub async fn dispose(&self) {
        if let Some(handler) = self
            .toast_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handler.unsubscribe();
        }
        self.connection
            .leave_user_channel(self.session.user_id)
            .await;
        self.connection.disconnect().await;
        self.registry.clear();
        self.store.reset();
        self.alerts.clear_banner();
        debug!("Notifications disposed for user {}", self.session.user_id);
    }

    fn install_toast_handler(&self) {
        let mut handler = self
            .toast_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if handler.is_some() {
            return;
        }
        let alerts = self.alerts.clone();
        *handler = Some(self.registry.subscribe(
            EventKind::Notification,
            move |event: &ServerEvent| {
                if let ServerEvent::Notification(notification) = event {
                    alerts.toast(
                        level_for(notification.category),
                        notification.title.clone(),
                    );
                }
                Ok(())
            },
        ));
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn alerts(&self) -> &Arc<AlertCenter> {
        &self.alerts
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn service(&self) -> &NotificationService {
        &self.service
    }
}

fn level_for(category: NotificationCategory) -> AlertLevel {
    match category {
        NotificationCategory::Success => AlertLevel::Success,
        NotificationCategory::Warning | NotificationCategory::EquipmentStatusChanged => {
            AlertLevel::Warning
        }
        NotificationCategory::Error => AlertLevel::Error,
        _ => AlertLevel::Info,
    }
}
