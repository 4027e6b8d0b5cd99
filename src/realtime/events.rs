//! Push-channel message types.
//!
//! Every frame is a JSON object `{"type": ..., "payload": ...}`. Both
//! directions are closed enums so routing never depends on raw strings.

use serde::{Deserialize, Serialize};

use crate::notifications::Notification;

/// Routing key for the subscription registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Notification,
    IncidentUpdate,
    EquipmentUpdate,
    DashboardUpdate,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Notification,
        EventKind::IncidentUpdate,
        EventKind::EquipmentUpdate,
        EventKind::DashboardUpdate,
    ];

    /// Wire name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Notification => "notification",
            EventKind::IncidentUpdate => "incident:update",
            EventKind::EquipmentUpdate => "equipment:update",
            EventKind::DashboardUpdate => "dashboard:update",
        }
    }
}

/// Payload of `incident:update` and `equipment:update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdate {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Remaining fields, passed through untouched.
    #[serde(flatten)]
    pub changes: serde_json::Map<String, serde_json::Value>,
}

/// Payload of `dashboard:update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardUpdate {
    #[serde(flatten)]
    pub metrics: serde_json::Map<String, serde_json::Value>,
}

/// Server -> Client event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEvent {
    #[serde(rename = "notification")]
    Notification(Notification),
    #[serde(rename = "incident:update")]
    IncidentUpdate(EntityUpdate),
    #[serde(rename = "equipment:update")]
    EquipmentUpdate(EntityUpdate),
    #[serde(rename = "dashboard:update")]
    DashboardUpdate(DashboardUpdate),
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::Notification(_) => EventKind::Notification,
            ServerEvent::IncidentUpdate(_) => EventKind::IncidentUpdate,
            ServerEvent::EquipmentUpdate(_) => EventKind::EquipmentUpdate,
            ServerEvent::DashboardUpdate(_) => EventKind::DashboardUpdate,
        }
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserChannel {
    pub user_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRef {
    pub id: String,
}

/// Client -> Server event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientEvent {
    #[serde(rename = "subscribe")]
    Subscribe(UserChannel),
    #[serde(rename = "unsubscribe")]
    Unsubscribe(UserChannel),
    #[serde(rename = "notification:read")]
    NotificationRead(NotificationRef),
    #[serde(rename = "notification:readAll")]
    NotificationReadAll,
}

impl ClientEvent {
    pub fn subscribe(user_id: u64) -> Self {
        ClientEvent::Subscribe(UserChannel { user_id })
    }

    pub fn unsubscribe(user_id: u64) -> Self {
        ClientEvent::Unsubscribe(UserChannel { user_id })
    }

    pub fn notification_read(id: impl Into<String>) -> Self {
        ClientEvent::NotificationRead(NotificationRef { id: id.into() })
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{NotificationCategory, NotificationId};

    #[test]
    fn notification_event_decodes() {
        let json = r#"{"type":"notification","payload":{
            "id":"n-9","title":"Printer offline","message":"PRN-3 went offline",
            "type":"equipment_status_changed","isRead":false,"createdAt":"2024-05-05T08:30:00Z"}}"#;

        let event = ServerEvent::decode(json).unwrap();

        assert_eq!(event.kind(), EventKind::Notification);
        let ServerEvent::Notification(notification) = event else {
            panic!("expected notification event");
        };
        assert_eq!(notification.id, NotificationId::confirmed("n-9"));
        assert_eq!(
            notification.category,
            NotificationCategory::EquipmentStatusChanged
        );
    }

    #[test]
    fn incident_update_keeps_extra_fields() {
        let json = r#"{"type":"incident:update","payload":{"id":"INC-1","status":"resolved","priority":"high"}}"#;

        let event = ServerEvent::decode(json).unwrap();

        let ServerEvent::IncidentUpdate(update) = event else {
            panic!("expected incident update");
        };
        assert_eq!(update.id, "INC-1");
        assert_eq!(update.status.as_deref(), Some("resolved"));
        assert_eq!(update.changes["priority"], "high");
    }

    #[test]
    fn dashboard_update_decodes_metrics() {
        let json = r#"{"type":"dashboard:update","payload":{"openIncidents":4}}"#;
        let event = ServerEvent::decode(json).unwrap();
        assert_eq!(event.kind(), EventKind::DashboardUpdate);
    }

    #[test]
    fn unknown_event_type_fails_to_decode() {
        let json = r#"{"type":"chat:message","payload":{}}"#;
        assert!(ServerEvent::decode(json).is_err());
    }

    #[test]
    fn client_events_serialize_with_wire_names() {
        let json = ClientEvent::subscribe(7).encode().unwrap();
        assert!(json.contains("\"type\":\"subscribe\""));
        assert!(json.contains("\"userId\":7"));

        let json = ClientEvent::notification_read("n-1").encode().unwrap();
        assert!(json.contains("\"type\":\"notification:read\""));
        assert!(json.contains("\"id\":\"n-1\""));

        let json = ClientEvent::NotificationReadAll.encode().unwrap();
        assert_eq!(json, r#"{"type":"notification:readAll"}"#);
    }

    #[test]
    fn client_read_all_decodes_without_payload() {
        let event = ClientEvent::decode(r#"{"type":"notification:readAll"}"#).unwrap();
        assert_eq!(event, ClientEvent::NotificationReadAll);
    }

    #[test]
    fn event_kind_wire_names() {
        let names: Vec<&str> = EventKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "notification",
                "incident:update",
                "equipment:update",
                "dashboard:update"
            ]
        );
    }
}
