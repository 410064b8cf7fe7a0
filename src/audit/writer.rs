use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{AuditEntry, AuditStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Grows linearly with the attempt number.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

/// Single consumer that drains the audit channel into the store, so entries
/// are appended in the order they were recorded. Exits once every recorder
/// has been dropped and the channel is empty.
pub fn spawn_audit_writer(
    mut rx: mpsc::UnboundedReceiver<AuditEntry>,
    store: Arc<dyn AuditStore>,
    policy: RetryPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(max_retries = policy.max_retries, "Audit writer started");
        while let Some(entry) = rx.recv().await {
            write_with_retry(store.as_ref(), &entry, &policy).await;
        }
        tracing::info!("Audit writer stopped");
    })
}

async fn write_with_retry(store: &dyn AuditStore, entry: &AuditEntry, policy: &RetryPolicy) -> bool {
    let mut attempt = 0u32;
    loop {
        match store.append(entry).await {
            Ok(()) => {
                if attempt > 0 {
                    tracing::info!(entry_id = %entry.id, attempt, "audit entry written after retry");
                }
                return true;
            }
            Err(e) if attempt < policy.max_retries => {
                attempt += 1;
                tracing::warn!(
                    entry_id = %entry.id,
                    action = %entry.action,
                    attempt,
                    error = %e,
                    "audit append failed, retrying"
                );
                tokio::time::sleep(policy.delay_for(attempt)).await;
            }
            Err(e) => {
                tracing::error!(
                    entry_id = %entry.id,
                    action = %entry.action,
                    actor_id = %entry.actor_id,
                    entity_type = %entry.entity_type,
                    error = %e,
                    "audit entry lost after retries"
                );
                return false;
            }
        }
    }
}
