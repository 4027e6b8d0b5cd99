//! REST handlers for `/notifications`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tracing::debug;

use super::book::ListParams;
use super::session::{ApiFailure, Session};
use super::state::{GuardedNotificationBook, ServerState};
use crate::notifications::{NewNotification, Notification, NotificationPage};

pub async fn list_notifications(
    session: Session,
    State(book): State<GuardedNotificationBook>,
    Query(params): Query<ListParams>,
) -> Json<NotificationPage> {
    Json(book.list(session.user_id, &params))
}

pub async fn create_notification(
    session: Session,
    State(state): State<ServerState>,
    Json(new): Json<NewNotification>,
) -> Result<(StatusCode, Json<Notification>), ApiFailure> {
    if new.title.trim().is_empty() {
        return Err(ApiFailure::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Title is required",
        ));
    }
    let created = state.push_notification(session.user_id, new).await;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn mark_notification_read(
    session: Session,
    State(book): State<GuardedNotificationBook>,
    Path(id): Path<String>,
) -> Result<Json<Notification>, ApiFailure> {
    book.mark_read(session.user_id, &id)
        .map(Json)
        .ok_or_else(|| ApiFailure::not_found("Notification"))
}

pub async fn mark_all_notifications_read(
    session: Session,
    State(book): State<GuardedNotificationBook>,
) -> impl IntoResponse {
    let updated = book.mark_all_read(session.user_id);
    debug!("Marked {} notifications read for user {}", updated, session.user_id);
    Json(json!({ "updated": updated }))
}

pub async fn delete_notification(
    session: Session,
    State(book): State<GuardedNotificationBook>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiFailure> {
    if book.delete(session.user_id, &id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiFailure::not_found("Notification"))
    }
}

pub async fn clear_notifications(
    session: Session,
    State(book): State<GuardedNotificationBook>,
) -> impl IntoResponse {
    let deleted = book.clear(session.user_id);
    Json(json!({ "deleted": deleted }))
}
