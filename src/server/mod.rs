//! In-memory reference server speaking the notification REST API and push
//! channel. Used by the end-to-end tests and the `dev-server` binary.

mod book;
mod routes;
mod session;
mod state;
pub mod websocket;

pub use book::{ListParams, NotificationBook};
pub use session::{ApiFailure, Session};
pub use state::{ServerControls, ServerState};

use std::time::Instant;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::Request,
    middleware::{self, Next},
    response::IntoResponse,
    routing::{get, patch},
    Router,
};
use tokio::net::TcpListener;
use tracing::{debug, info};

async fn log_requests(request: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    debug!(
        "{} {} -> {} in {:?}",
        method,
        path,
        response.status(),
        start.elapsed()
    );
    response
}

pub fn make_app(state: ServerState) -> Router {
    let notification_routes: Router = Router::new()
        .route(
            "/notifications",
            get(routes::list_notifications)
                .post(routes::create_notification)
                .delete(routes::clear_notifications),
        )
        .route(
            "/notifications/read-all",
            patch(routes::mark_all_notifications_read),
        )
        .route(
            "/notifications/{id}",
            axum::routing::delete(routes::delete_notification),
        )
        .route(
            "/notifications/{id}/read",
            patch(routes::mark_notification_read),
        )
        .with_state(state.clone());

    Router::new()
        .route("/ws", get(websocket::ws_handler))
        .with_state(state)
        .nest("/api", notification_routes)
        .layer(middleware::from_fn(log_requests))
}

/// Serve on an already bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, state: ServerState) -> Result<()> {
    let addr = listener.local_addr()?;
    info!("Reference server listening on {}", addr);
    axum::serve(listener, make_app(state))
        .await
        .context("Reference server stopped")
}

pub async fn run_server(port: u16, state: ServerState) -> Result<()> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    serve(listener, state).await
}
