use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};

use crate::errors::AppError;
use crate::AppState;

pub mod handlers;
pub mod ws;

/// Full application router: health, metrics, WebSocket, and the
/// collaborator API under `/api/v1`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints (no auth)
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        // Realtime: one socket per client session
        .route("/ws", get(ws::ws_handler))
        .nest("/api/v1", api_router(state.clone()))
        .with_state(state)
}

/// Build the collaborator API router.
/// All routes are relative; the caller mounts this under `/api/v1`.
pub fn api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        // Event entry points
        .route("/events", post(handlers::create_event))
        .route("/events/domain", post(handlers::create_domain_event))
        // Notifications
        .route(
            "/users/:user_id/notifications",
            get(handlers::list_recent_notifications),
        )
        .route(
            "/users/:user_id/notifications/unread",
            get(handlers::list_unread_notifications),
        )
        .route(
            "/users/:user_id/notifications/unread/count",
            get(handlers::count_unread_notifications),
        )
        .route(
            "/users/:user_id/notifications/read-all",
            post(handlers::mark_all_notifications_read),
        )
        .route(
            "/notifications/:id/read",
            patch(handlers::mark_notification_read).post(handlers::mark_notification_read),
        )
        // Push
        .route(
            "/users/:user_id/push-token",
            get(handlers::check_push_token).put(handlers::set_push_token),
        )
        .route("/push/dispatch", post(handlers::dispatch_push))
        .route("/push/send", post(handlers::send_push))
        // Realtime
        .route("/realtime/notify", post(handlers::notify_realtime))
        .layer(middleware::from_fn_with_state(state, service_auth))
        .fallback(fallback_404)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn readiness_check(State(state): State<Arc<AppState>>) -> Response {
    match state.pipeline.store().ping().await {
        Ok(()) => "ok".into_response(),
        Err(e) => {
            tracing::warn!("readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "store unavailable").into_response()
        }
    }
}

async fn metrics_handler() -> String {
    crate::middleware::metrics::encode_metrics()
}

/// Middleware: validates `X-Service-Key` (or a bearer token) against the
/// configured service key. No key configured means the API is open.
async fn service_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = match state.config.service_key.as_deref() {
        Some(k) => k,
        None => return Ok(next.run(req).await),
    };

    let provided_key = req
        .headers()
        .get("x-service-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| t.trim())
        });

    match provided_key {
        Some(k) if k == expected => Ok(next.run(req).await),
        Some(k) => {
            // Never log the full provided key
            let masked = if k.len() > 8 {
                format!("{}…{}", &k[..4], &k[k.len() - 4..])
            } else {
                "****".to_string()
            };
            tracing::warn!("collaborator API: invalid service key (provided: '{}')", masked);
            Err(AppError::Unauthorized)
        }
        None => {
            tracing::warn!("collaborator API: missing X-Service-Key header");
            Err(AppError::Unauthorized)
        }
    }
}
