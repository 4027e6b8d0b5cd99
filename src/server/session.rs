use super::state::ServerState;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::debug;

/// The user a request was authenticated as.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub user_id: u64,
}

/// Error response in the `{"message": ...}` shape clients expect.
#[derive(Debug)]
pub struct ApiFailure {
    pub status: StatusCode,
    pub message: String,
}

impl ApiFailure {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Authentication required")
    }

    pub fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{} not found", what))
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn session_from_headers(headers: &HeaderMap, ctx: &ServerState) -> Option<Session> {
    let Some(token) = extract_bearer_token(headers) else {
        debug!("No bearer token in headers.");
        return None;
    };
    match ctx.user_for_token(token) {
        Some(user_id) => Some(Session { user_id }),
        None => {
            debug!("Unknown bearer token.");
            None
        }
    }
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = ApiFailure;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        session_from_headers(&parts.headers, ctx).ok_or_else(ApiFailure::unauthorized)
    }
}
