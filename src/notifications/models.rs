//! Notification data models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

const PENDING_PREFIX: &str = "tmp-";

/// Identity of a notification.
///
/// Records created optimistically on the client carry a `Pending` id until
/// the server acknowledges them and hands back its own identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NotificationId {
    Pending(Uuid),
    Confirmed(String),
}

impl NotificationId {
    pub fn new_pending() -> Self {
        NotificationId::Pending(Uuid::new_v4())
    }

    pub fn confirmed(id: impl Into<String>) -> Self {
        NotificationId::Confirmed(id.into())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, NotificationId::Pending(_))
    }

    /// The server identifier, if the record has been acknowledged.
    pub fn server_id(&self) -> Option<&str> {
        match self {
            NotificationId::Confirmed(id) => Some(id),
            NotificationId::Pending(_) => None,
        }
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationId::Pending(uuid) => write!(f, "{}{}", PENDING_PREFIX, uuid),
            NotificationId::Confirmed(id) => f.write_str(id),
        }
    }
}

impl From<&str> for NotificationId {
    fn from(value: &str) -> Self {
        NotificationId::Confirmed(value.to_string())
    }
}

impl Serialize for NotificationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Anything coming off the wire is server-assigned.
impl<'de> Deserialize<'de> for NotificationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(NotificationId::Confirmed)
    }
}

/// Notification category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    Info,
    Success,
    Warning,
    Error,
    IncidentAssigned,
    IncidentUpdated,
    EquipmentStatusChanged,
    System,
    #[serde(other)]
    Other,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::Info => "info",
            NotificationCategory::Success => "success",
            NotificationCategory::Warning => "warning",
            NotificationCategory::Error => "error",
            NotificationCategory::IncidentAssigned => "incident_assigned",
            NotificationCategory::IncidentUpdated => "incident_updated",
            NotificationCategory::EquipmentStatusChanged => "equipment_status_changed",
            NotificationCategory::System => "system",
            NotificationCategory::Other => "other",
        }
    }
}

/// Kind of entity a notification may point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Incident,
    Equipment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub kind: EntityKind,
    pub id: String,
}

/// A user notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub category: NotificationCategory,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_entity: Option<RelatedEntity>,
}

impl Notification {
    /// Build the optimistic local record for a user-triggered creation.
    pub fn pending(new: &NewNotification) -> Self {
        Self {
            id: NotificationId::new_pending(),
            title: new.title.clone(),
            message: new.message.clone(),
            category: new.category,
            is_read: false,
            created_at: Utc::now(),
            related_entity: new.related_entity.clone(),
        }
    }
}

/// Body of a user-triggered notification creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub category: NotificationCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_entity: Option<RelatedEntity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadFilter {
    #[default]
    All,
    Unread,
    Read,
}

impl ReadFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadFilter::All => "all",
            ReadFilter::Unread => "unread",
            ReadFilter::Read => "read",
        }
    }

    pub fn matches(&self, notification: &Notification) -> bool {
        match self {
            ReadFilter::All => true,
            ReadFilter::Unread => !notification.is_read,
            ReadFilter::Read => notification.is_read,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Newest => "newest",
            SortOrder::Oldest => "oldest",
        }
    }
}

/// Parameters of a paginated notification listing.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationQuery {
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
    pub filter: ReadFilter,
    pub category: Option<NotificationCategory>,
    pub sort: SortOrder,
}

impl Default for NotificationQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            filter: ReadFilter::All,
            category: None,
            sort: SortOrder::Newest,
        }
    }
}

impl NotificationQuery {
    pub fn page(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
            ..Default::default()
        }
    }

    /// Query-string pairs for `GET /notifications`.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", self.page.to_string()),
            ("limit", self.page_size.to_string()),
            ("filter", self.filter.as_str().to_string()),
            ("sort", self.sort.as_str().to_string()),
        ];
        if let Some(category) = self.category {
            params.push(("type", category.as_str().to_string()));
        }
        params
    }
}

/// One page of notifications as returned by `GET /notifications`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub total_count: u64,
    pub total_pages: u32,
    pub unread_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_deserializes_from_server_json() {
        let json = r#"{
            "id": "n-1",
            "title": "Incident assigned",
            "message": "INC-42 was assigned to you",
            "type": "incident_assigned",
            "isRead": false,
            "createdAt": "2024-03-01T10:00:00Z",
            "relatedEntity": {"kind": "incident", "id": "INC-42"}
        }"#;

        let notification: Notification = serde_json::from_str(json).unwrap();

        assert_eq!(notification.id, NotificationId::confirmed("n-1"));
        assert_eq!(notification.category, NotificationCategory::IncidentAssigned);
        assert!(!notification.is_read);
        assert_eq!(
            notification.related_entity,
            Some(RelatedEntity {
                kind: EntityKind::Incident,
                id: "INC-42".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_category_decodes_as_other() {
        let category: NotificationCategory = serde_json::from_str("\"maintenance_window\"").unwrap();
        assert_eq!(category, NotificationCategory::Other);
    }

    #[test]
    fn test_missing_is_read_defaults_to_unread() {
        let json = r#"{"id":"n-2","title":"t","message":"m","type":"info","createdAt":"2024-03-01T10:00:00Z"}"#;
        let notification: Notification = serde_json::from_str(json).unwrap();
        assert!(!notification.is_read);
        assert!(notification.related_entity.is_none());
    }

    #[test]
    fn test_pending_id_display() {
        let id = NotificationId::new_pending();
        assert!(id.is_pending());
        assert!(id.server_id().is_none());
        assert!(id.to_string().starts_with("tmp-"));

        let confirmed = NotificationId::confirmed("abc");
        assert_eq!(confirmed.server_id(), Some("abc"));
        assert_eq!(serde_json::to_string(&confirmed).unwrap(), "\"abc\"");
    }

    #[test]
    fn test_query_params() {
        let query = NotificationQuery {
            page: 2,
            page_size: 10,
            filter: ReadFilter::Unread,
            category: Some(NotificationCategory::Warning),
            sort: SortOrder::Oldest,
        };

        let params = query.to_params();

        assert!(params.contains(&("page", "2".to_string())));
        assert!(params.contains(&("limit", "10".to_string())));
        assert!(params.contains(&("filter", "unread".to_string())));
        assert!(params.contains(&("sort", "oldest".to_string())));
        assert!(params.contains(&("type", "warning".to_string())));
    }

    #[test]
    fn test_page_query_clamps_to_one() {
        let query = NotificationQuery::page(0, 0);
        assert_eq!(query.page, 1);
        assert_eq!(query.page_size, 1);
    }

    #[test]
    fn test_page_response_uses_camel_case() {
        let json = r#"{"notifications":[],"totalCount":12,"totalPages":2,"unreadCount":5}"#;
        let page: NotificationPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.total_count, 12);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.unread_count, 5);
    }
}
