use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::sqlite::Sqlite;
use sqlx::{QueryBuilder, Row, SqlitePool};
use uuid::Uuid;

use super::AuditEntry;
use crate::db::row_parsers::{audit_entry_from_row, format_timestamp};
use crate::errors::{AppError, AppResult};
use crate::models::EntityType;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Filters are AND-combined. `action` matches as a substring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditQuery {
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<Uuid>,
    pub action: Option<String>,
    pub actor_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// 1-based
    pub page: u32,
    pub page_size: u32,
}

impl AuditQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page at least 1, page size defaulted and capped.
    pub fn normalized(&self) -> Self {
        let page_size = match self.page_size {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        };

        Self {
            page: self.page.max(1),
            page_size,
            action: self.action.clone().filter(|a| !a.trim().is_empty()),
            ..self.clone()
        }
    }

    fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.page_size)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub entries: Vec<AuditEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChainVerification {
    pub checked: u64,
    /// Sequence number of the first entry that fails verification.
    pub first_broken: Option<i64>,
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        self.first_broken.is_none()
    }
}

/// Durable, append-only audit storage.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> AppResult<()>;

    /// Newest first.
    async fn query(&self, query: &AuditQuery) -> AppResult<AuditPage>;
}

#[derive(Debug, Clone)]
pub struct SqliteAuditStore {
    pool: SqlitePool,
}

impl SqliteAuditStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Walks the hash chain oldest first and reports the first entry whose
    /// link, hash or columns disagree with its stored payload.
    pub async fn verify_chain(&self) -> AppResult<ChainVerification> {
        let rows = sqlx::query(
            "SELECT seq, id, actor_id, action, entity_type, entity_id, details, source_address, created_at, payload, prev_hash, hash \
             FROM audit_log ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut previous: Option<String> = None;
        let mut checked = 0u64;

        for row in &rows {
            let seq: i64 = row.try_get("seq")?;
            let payload: String = row.try_get("payload")?;
            let prev_hash: Option<String> = row.try_get("prev_hash")?;
            let hash: String = row.try_get("hash")?;

            let linked = prev_hash == previous;
            let intact = chain_hash(prev_hash.as_deref(), &payload) == hash;
            let consistent = match (serde_json::from_str::<AuditEntry>(&payload), audit_entry_from_row(row)) {
                (Ok(stored), Ok(columns)) => stored == columns,
                _ => false,
            };

            if !(linked && intact && consistent) {
                tracing::warn!(seq, linked, intact, consistent, "audit chain broken");
                return Ok(ChainVerification {
                    checked,
                    first_broken: Some(seq),
                });
            }

            previous = Some(hash);
            checked += 1;
        }

        Ok(ChainVerification {
            checked,
            first_broken: None,
        })
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn append(&self, entry: &AuditEntry) -> AppResult<()> {
        let entry = AuditEntry {
            created_at: entry.created_at.trunc_subsecs(6),
            ..entry.clone()
        };
        let payload = serde_json::to_string(&entry)
            .map_err(|e| AppError::internal(format!("failed to encode audit entry: {e}")))?;

        let mut tx = self.pool.begin().await?;

        let prev_hash: Option<String> =
            sqlx::query_scalar("SELECT hash FROM audit_log ORDER BY seq DESC LIMIT 1")
                .fetch_optional(&mut *tx)
                .await?;
        let hash = chain_hash(prev_hash.as_deref(), &payload);

        sqlx::query(
            "INSERT INTO audit_log (id, actor_id, action, entity_type, entity_id, details, source_address, created_at, payload, prev_hash, hash) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id.to_string())
        .bind(entry.actor_id.to_string())
        .bind(entry.action.as_str())
        .bind(entry.entity_type.as_str())
        .bind(entry.entity_id.map(|id| id.to_string()))
        .bind(&entry.details)
        .bind(&entry.source_address)
        .bind(format_timestamp(entry.created_at))
        .bind(&payload)
        .bind(&prev_hash)
        .bind(&hash)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> AppResult<AuditPage> {
        let query = query.normalized();

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(1) FROM audit_log WHERE 1 = 1");
        push_filters(&mut count, &query);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new(
            "SELECT id, actor_id, action, entity_type, entity_id, details, source_address, created_at \
             FROM audit_log WHERE 1 = 1",
        );
        push_filters(&mut select, &query);
        select
            .push(" ORDER BY created_at DESC, seq DESC LIMIT ")
            .push_bind(i64::from(query.page_size))
            .push(" OFFSET ")
            .push_bind(query.offset());

        let rows = select.build().fetch_all(&self.pool).await?;
        let entries = rows
            .iter()
            .map(audit_entry_from_row)
            .collect::<AppResult<Vec<_>>>()?;

        let total_count = u64::try_from(total).unwrap_or_default();
        let total_pages = total_count.div_ceil(u64::from(query.page_size));

        Ok(AuditPage {
            total_count,
            page: query.page,
            page_size: query.page_size,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
            entries,
        })
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &AuditQuery) {
    if let Some(entity_type) = query.entity_type {
        builder.push(" AND entity_type = ").push_bind(entity_type.as_str());
    }
    if let Some(entity_id) = query.entity_id {
        builder.push(" AND entity_id = ").push_bind(entity_id.to_string());
    }
    if let Some(action) = &query.action {
        builder
            .push(" AND instr(action, ")
            .push_bind(action.trim().to_ascii_uppercase())
            .push(") > 0");
    }
    if let Some(actor_id) = query.actor_id {
        builder.push(" AND actor_id = ").push_bind(actor_id.to_string());
    }
    if let Some(from) = query.from {
        builder.push(" AND created_at >= ").push_bind(format_timestamp(from));
    }
    if let Some(to) = query.to {
        builder.push(" AND created_at <= ").push_bind(format_timestamp(to));
    }
}

/// SHA256(prev_hash || payload), hex encoded.
fn chain_hash(prev_hash: Option<&str>, payload: &str) -> String {
    let mut hasher = Sha256::new();
    if let Some(prev) = prev_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}
