use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::store::ProfileStore;

// ── Push message ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushPriority {
    High,
    Normal,
}

#[derive(Debug, Clone)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub priority: Option<PushPriority>,
    /// Time-to-live on the gateway side, in seconds.
    pub ttl_secs: Option<u64>,
}

impl PushMessage {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            priority: None,
            ttl_secs: None,
        }
    }
}

/// Third-party push delivery. One call, one device token, no retry.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, token: &str, message: &PushMessage) -> anyhow::Result<()>;
}

// ── FCM gateway ───────────────────────────────────────────────

#[derive(Serialize)]
struct FcmRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    notification: FcmNotification<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    android: Option<FcmAndroid>,
}

#[derive(Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Serialize)]
struct FcmAndroid {
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<PushPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<String>,
}

/// Firebase Cloud Messaging (HTTP v1) client.
#[derive(Clone)]
pub struct FcmGateway {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl FcmGateway {
    pub fn new(endpoint: String, access_token: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("ideahub-push/1.0")
            .build()
            .context("failed to build push HTTP client")?;
        Ok(Self {
            client,
            endpoint,
            access_token,
        })
    }
}

#[async_trait]
impl PushGateway for FcmGateway {
    async fn send(&self, token: &str, message: &PushMessage) -> anyhow::Result<()> {
        let android = if message.priority.is_some() || message.ttl_secs.is_some() {
            Some(FcmAndroid {
                priority: message.priority,
                ttl: message.ttl_secs.map(|s| format!("{}s", s)),
            })
        } else {
            None
        };

        let payload = FcmRequest {
            message: FcmMessage {
                token,
                notification: FcmNotification {
                    title: &message.title,
                    body: &message.body,
                },
                android,
            },
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .context("failed to reach push gateway")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("push gateway returned error: status={}, body={}", status, body);
        }

        Ok(())
    }
}

// ── Dispatcher ────────────────────────────────────────────────

/// What happened to one best-effort push. Never an error for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Sent,
    /// No profile, or a profile without a device token.
    NoToken,
    /// Blank title or body.
    Skipped,
    /// No gateway configured.
    Disabled,
    /// Token lookup or gateway call failed; logged and dropped.
    Failed,
}

impl PushOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushOutcome::Sent => "sent",
            PushOutcome::NoToken => "no_token",
            PushOutcome::Skipped => "skipped",
            PushOutcome::Disabled => "disabled",
            PushOutcome::Failed => "failed",
        }
    }
}

/// At-most-once delivery to a user's registered device.
#[derive(Clone)]
pub struct PushDispatcher {
    profiles: Arc<dyn ProfileStore>,
    gateway: Option<Arc<dyn PushGateway>>,
}

impl PushDispatcher {
    pub fn new(profiles: Arc<dyn ProfileStore>, gateway: Option<Arc<dyn PushGateway>>) -> Self {
        Self { profiles, gateway }
    }

    /// Look up the user's token and hand (title, body) to the gateway.
    /// Missing tokens are a silent no-op; failures are logged and swallowed.
    pub async fn dispatch(&self, user_id: &str, title: &str, body: &str) -> PushOutcome {
        let token = match self.profiles.push_token(user_id).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!(user_id, "no push token registered, skipping push");
                return PushOutcome::NoToken;
            }
            Err(e) => {
                warn!(user_id, error = %e, "push token lookup failed");
                return PushOutcome::Failed;
            }
        };

        if title.trim().is_empty() || body.trim().is_empty() {
            debug!(user_id, "push title or body empty, skipping push");
            return PushOutcome::Skipped;
        }

        let gateway = match &self.gateway {
            Some(g) => g,
            None => {
                debug!(user_id, "no push gateway configured, skipping push");
                return PushOutcome::Disabled;
            }
        };

        match gateway.send(&token, &PushMessage::new(title, body)).await {
            Ok(()) => {
                info!(user_id, "push notification sent");
                PushOutcome::Sent
            }
            Err(e) => {
                warn!(user_id, error = %e, "push delivery failed");
                PushOutcome::Failed
            }
        }
    }

    /// Operator-initiated push straight to a token. Unlike `dispatch`, errors
    /// are returned to the caller.
    pub async fn send_direct(&self, token: &str, message: &PushMessage) -> Result<(), AppError> {
        if token.trim().is_empty() || message.title.trim().is_empty() || message.body.trim().is_empty()
        {
            return Err(AppError::validation("token, title, and body are required"));
        }
        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| AppError::PushGateway("push gateway is not configured".to_string()))?;
        gateway
            .send(token, message)
            .await
            .map_err(|e| AppError::PushGateway(e.to_string()))
    }

    pub async fn set_token(&self, user_id: &str, token: &str) -> Result<(), AppError> {
        if user_id.trim().is_empty() || token.trim().is_empty() {
            return Err(AppError::validation("userId and token are required"));
        }
        self.profiles.set_push_token(user_id, token).await
    }

    pub async fn has_token(&self, user_id: &str) -> Result<bool, AppError> {
        self.profiles.has_push_token(user_id).await
    }
}

// ── Tests ─────────────────────────────────────────────────────
