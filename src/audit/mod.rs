use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

pub mod action;
pub mod store;
pub mod writer;

pub use action::AuditAction;
pub use store::{AuditPage, AuditQuery, AuditStore, ChainVerification, SqliteAuditStore};
pub use writer::{spawn_audit_writer, RetryPolicy};

use crate::models::EntityType;

/// One adjudicated action. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub action: AuditAction,
    pub entity_type: EntityType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(actor_id: Uuid, action: AuditAction, entity_type: EntityType) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id,
            action,
            entity_type,
            entity_id: None,
            details: None,
            source_address: None,
            // stored with microsecond precision
            created_at: Utc::now().trunc_subsecs(6),
        }
    }

    pub fn with_entity_id(mut self, entity_id: Uuid) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_context(mut self, context: &RequestContext) -> Self {
        self.source_address = context.ip.clone();
        self
    }
}

/// Request context for audit entries: the caller's address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract context from request headers
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            });

        Self { ip }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }
}

/// Sink for audit entries. `record` must not block on the durable write.
pub trait AuditRecorder: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Recorder that hands entries to the background writer.
#[derive(Debug, Clone)]
pub struct ChannelAuditRecorder {
    tx: mpsc::UnboundedSender<AuditEntry>,
}

impl AuditRecorder for ChannelAuditRecorder {
    fn record(&self, entry: AuditEntry) {
        let action = entry.action;
        let actor_id = entry.actor_id;
        // Fire and forget - audit failures must not fail the request
        if self.tx.send(entry).is_err() {
            tracing::error!(
                action = %action,
                actor_id = %actor_id,
                "audit writer is gone, entry dropped"
            );
        }
    }
}

/// Recorder plus the receiving end to pass to [`spawn_audit_writer`].
pub fn audit_channel() -> (ChannelAuditRecorder, mpsc::UnboundedReceiver<AuditEntry>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelAuditRecorder { tx }, rx)
}
