//! Security audit trail.
//!
//! The engine records every code issuance, exchange, rotation and revocation
//! as an [`AuditEvent`]. Events are handed to an [`AuditDispatcher`], which
//! queues them on a bounded channel and forwards them to an [`AuditSink`]
//! from a background task. Recording never blocks or fails the operation
//! that produced the event.
//!
//! Grant failures are returned to clients as a generic `invalid_grant`; the
//! specific cause (replay, expiry, binding mismatch) only appears here.

mod dispatcher;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::AuthResult;

pub use dispatcher::AuditDispatcher;

/// Audited token lifecycle actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CodeIssued,
    CodeExchanged,
    CodeExchangeFailed,
    TokenRefreshed,
    RefreshReplayDetected,
    BindingViolation,
    RotationRaceLost,
    FamilyRevoked,
    TokenRevoked,
    UserSessionsRevoked,
    OrgSessionsRevoked,
    UserInOrgRevoked,
}

impl AuditAction {
    /// Dotted event code used in log output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::CodeIssued => "code.issued",
            Self::CodeExchanged => "code.exchanged",
            Self::CodeExchangeFailed => "code.exchange_failed",
            Self::TokenRefreshed => "token.refreshed",
            Self::RefreshReplayDetected => "token.replay_detected",
            Self::BindingViolation => "token.binding_violation",
            Self::RotationRaceLost => "token.rotation_race_lost",
            Self::FamilyRevoked => "family.revoked",
            Self::TokenRevoked => "token.revoked",
            Self::UserSessionsRevoked => "sessions.user_revoked",
            Self::OrgSessionsRevoked => "sessions.org_revoked",
            Self::UserInOrgRevoked => "sessions.user_in_org_revoked",
        }
    }

    /// Returns `true` for actions that indicate a likely compromise.
    #[must_use]
    pub fn is_security_incident(&self) -> bool {
        matches!(
            self,
            Self::RefreshReplayDetected | Self::BindingViolation | Self::RotationRaceLost
        )
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,

    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,

    pub action: AuditAction,

    /// Who acted: a user id or a client id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    /// What was acted on: a client id, family id, user id or organization id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    pub success: bool,

    #[serde(default)]
    pub details: Map<String, Value>,

    /// Internal failure cause. Never shown to clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
}

impl AuditEvent {
    /// Creates a successful event for `action`.
    #[must_use]
    pub fn new(action: AuditAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_at: OffsetDateTime::now_utc(),
            action,
            actor: None,
            resource: None,
            success: true,
            details: Map::new(),
            error: None,
            request_id: None,
        }
    }

    #[must_use]
    pub fn actor(mut self, actor: impl ToString) -> Self {
        self.actor = Some(actor.to_string());
        self
    }

    #[must_use]
    pub fn resource(mut self, resource: impl ToString) -> Self {
        self.resource = Some(resource.to_string());
        self
    }

    /// Marks the event as failed with an internal cause.
    #[must_use]
    pub fn failure(mut self, error: impl ToString) -> Self {
        self.success = false;
        self.error = Some(error.to_string());
        self
    }

    #[must_use]
    pub fn detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

/// Destination for audit events.
///
/// Implementations may be slow or fail; the dispatcher logs and drops
/// failures without surfacing them to the engine.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persists one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event could not be persisted.
    async fn record(&self, event: AuditEvent) -> AuthResult<()>;
}

/// Writes each event as a structured `tracing` record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) -> AuthResult<()> {
        let details = Value::Object(event.details);
        if event.action.is_security_incident() {
            tracing::warn!(
                target: "keygate::audit",
                event_id = %event.id,
                action = event.action.code(),
                actor = event.actor.as_deref(),
                resource = event.resource.as_deref(),
                success = event.success,
                error = event.error.as_deref(),
                details = %details,
                "Security audit event"
            );
        } else {
            tracing::info!(
                target: "keygate::audit",
                event_id = %event.id,
                action = event.action.code(),
                actor = event.actor.as_deref(),
                resource = event.resource.as_deref(),
                success = event.success,
                error = event.error.as_deref(),
                details = %details,
                "Audit event"
            );
        }
        Ok(())
    }
}

/// Keeps events in memory. Intended for tests and local inspection.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<RwLock<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events, oldest first.
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }

    /// Events with the given action.
    pub async fn events_for(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }

    /// Polls until an event with `action` arrives or `timeout` elapses.
    pub async fn wait_for(&self, action: AuditAction, timeout: Duration) -> Option<AuditEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(event) = self.events_for(action).await.into_iter().next() {
                return Some(event);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuditEvent) -> AuthResult<()> {
        self.events.write().await.push(event);
        Ok(())
    }
}
