use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::event::DomainEvent;
use crate::models::notification::{NewNotification, NotificationRecord};
use crate::notification::push::{PushMessage, PushPriority};
use crate::notification::realtime::RealtimeMessage;
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct DomainEventParams {
    /// Accept the event and run the pipeline in the background.
    #[serde(default)]
    pub detached: bool,
}

#[derive(Deserialize)]
pub struct LimitParams {
    pub limit: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub user_id: String,
    pub unread: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadAllResponse {
    pub user_id: String,
    pub updated: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTokenRequest {
    pub token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatusResponse {
    pub token_status: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchPushRequest {
    pub user_id: String,
    pub title: String,
    pub body: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPushRequest {
    pub token: String,
    pub title: String,
    pub body: String,
    pub priority: Option<PushPriority>,
    pub ttl_secs: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRealtimeRequest {
    pub user_id: String,
    #[serde(default = "default_realtime_event")]
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

fn default_realtime_event() -> String {
    "newNotification".to_string()
}

fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

// ── Events ───────────────────────────────────────────────────

/// Generic entry point: the caller supplies title, category, body and
/// metadata as-is.
pub async fn create_event(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewNotification>,
) -> Result<(StatusCode, Json<NotificationRecord>), AppError> {
    let record = state.pipeline.create_event(payload).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Typed entry point for the platform's domain actions. The notification
/// text is built server-side from the event.
pub async fn create_domain_event(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DomainEventParams>,
    Json(event): Json<DomainEvent>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let new = event.into_notification()?;

    if params.detached {
        new.validate()?;
        let category = new.category.clone();
        state.pipeline.emit_detached(new);
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "accepted": true, "category": category })),
        ));
    }

    let record = state.pipeline.create_event(new).await?;
    Ok((StatusCode::CREATED, Json(json!(record))))
}

// ── Notifications ────────────────────────────────────────────

pub async fn list_unread_notifications(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<NotificationRecord>>, AppError> {
    let records = state.pipeline.list_unread(&user_id).await?;
    Ok(Json(records))
}

pub async fn list_recent_notifications(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<NotificationRecord>>, AppError> {
    let records = state
        .pipeline
        .list_recent(&user_id, params.limit.unwrap_or(50))
        .await?;
    Ok(Json(records))
}

pub async fn count_unread_notifications(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<UnreadCountResponse>, AppError> {
    let unread = state.pipeline.count_unread(&user_id).await?;
    Ok(Json(UnreadCountResponse { user_id, unread }))
}

pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<NotificationRecord>, AppError> {
    // A malformed id cannot match any record.
    let id = Uuid::parse_str(&id).map_err(|_| AppError::NotFound)?;
    let record = state.pipeline.mark_read(id).await?;
    Ok(Json(record))
}

pub async fn mark_all_notifications_read(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<ReadAllResponse>, AppError> {
    let updated = state.pipeline.mark_all_read(&user_id).await?;
    Ok(Json(ReadAllResponse { user_id, updated }))
}

// ── Push ─────────────────────────────────────────────────────

pub async fn set_push_token(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(payload): Json<SetTokenRequest>,
) -> Result<Json<TokenStatusResponse>, AppError> {
    state.pipeline.set_token(&user_id, &payload.token).await?;
    Ok(Json(TokenStatusResponse { token_status: true }))
}

pub async fn check_push_token(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<TokenStatusResponse>, AppError> {
    let token_status = state.pipeline.has_token(&user_id).await?;
    Ok(Json(TokenStatusResponse { token_status }))
}

/// Best-effort push to a user. Always 202: the outcome is reported, never
/// raised.
pub async fn dispatch_push(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DispatchPushRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    require("userId", &payload.user_id)?;
    let outcome = state
        .pipeline
        .dispatch_push(&payload.user_id, &payload.title, &payload.body)
        .await;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "outcome": outcome.as_str() })),
    ))
}

/// Direct send to a raw device token. Gateway failures surface as 502.
pub async fn send_push(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SendPushRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    require("token", &payload.token)?;
    require("title", &payload.title)?;

    let mut message = PushMessage::new(payload.title, payload.body);
    message.priority = payload.priority;
    message.ttl_secs = payload.ttl_secs;

    state
        .pipeline
        .send_direct_push(&payload.token, &message)
        .await?;
    Ok(Json(json!({ "message": "Notification sent successfully." })))
}

// ── Realtime ─────────────────────────────────────────────────

pub async fn notify_realtime(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NotifyRealtimeRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    require("userId", &payload.user_id)?;
    require("event", &payload.event)?;

    let message = RealtimeMessage::new(payload.event, payload.data);
    let outcome = state
        .pipeline
        .notify_realtime(&payload.user_id, message)
        .await;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "outcome": outcome.as_str() })),
    ))
}
