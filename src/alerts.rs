//! User-visible alerts.
//!
//! Transient toasts are broadcast to whoever renders them; the persistent
//! banner is a single slot shown while real-time delivery is unavailable.

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient, dismissible notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub level: AlertLevel,
    pub message: String,
}

pub struct AlertCenter {
    toasts: broadcast::Sender<Toast>,
    banner: watch::Sender<Option<String>>,
}

impl Default for AlertCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertCenter {
    pub fn new() -> Self {
        let (toasts, _) = broadcast::channel(64);
        let (banner, _) = watch::channel(None);
        Self { toasts, banner }
    }

    pub fn toast(&self, level: AlertLevel, message: impl Into<String>) {
        let toast = Toast {
            level,
            message: message.into(),
        };
        match level {
            AlertLevel::Info | AlertLevel::Success => info!("[alert] {}", toast.message),
            AlertLevel::Warning => warn!("[alert] {}", toast.message),
            AlertLevel::Error => error!("[alert] {}", toast.message),
        }
        // Nobody rendering toasts is fine.
        let _ = self.toasts.send(toast);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.toast(AlertLevel::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.toast(AlertLevel::Error, message);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Toast> {
        self.toasts.subscribe()
    }

    /// Show the persistent banner, replacing any previous text.
    pub fn show_banner(&self, message: impl Into<String>) {
        let message = message.into();
        error!("[banner] {}", message);
        self.banner.send_replace(Some(message));
    }

    pub fn clear_banner(&self) {
        self.banner.send_if_modified(|banner| banner.take().is_some());
    }

    pub fn banner(&self) -> Option<String> {
        self.banner.borrow().clone()
    }

    pub fn watch_banner(&self) -> watch::Receiver<Option<String>> {
        self.banner.subscribe()
    }
}
