use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::row_parsers::{opt_uuid_column, uuid_column};
use super::uuid_sql::{uuid_eq, uuid_text};
use crate::errors::AppResult;
use crate::guard::EntityLookup;
use crate::models::{EntityDescriptor, EntityType};

/// Projects scope descriptors straight from the domain tables.
///
/// The organization of a task (and of a comment, through its task) always
/// comes from the task's team; a task without a team has none.
#[derive(Debug, Clone)]
pub struct SqliteEntityLookup {
    pool: SqlitePool,
}

impl SqliteEntityLookup {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, sql: String, id: Uuid) -> AppResult<Option<SqliteRow>> {
        let id = id.to_string();
        let row = sqlx::query(&sql)
            .bind(&id)
            .bind(&id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

#[async_trait]
impl EntityLookup for SqliteEntityLookup {
    async fn describe(&self, entity_type: EntityType, entity_id: Uuid) -> AppResult<Option<EntityDescriptor>> {
        let sql = match entity_type {
            EntityType::Task => format!(
                "SELECT {}, {}, {}, {}, {} FROM tasks t LEFT JOIN teams tm ON tm.id = t.team_id WHERE {}",
                uuid_text("t.id"),
                uuid_text("t.created_by"),
                uuid_text("t.assigned_to"),
                uuid_text("t.team_id"),
                uuid_text("tm.organization_id"),
                uuid_eq("t.id"),
            ),
            EntityType::Team => format!(
                "SELECT {}, {} FROM teams WHERE {}",
                uuid_text("id"),
                uuid_text("organization_id"),
                uuid_eq("id"),
            ),
            EntityType::Organization => format!(
                "SELECT {} FROM organizations WHERE {}",
                uuid_text("id"),
                uuid_eq("id"),
            ),
            EntityType::User => format!(
                "SELECT {}, {} FROM users WHERE {}",
                uuid_text("id"),
                uuid_text("organization_id"),
                uuid_eq("id"),
            ),
            EntityType::Comment => format!(
                "SELECT {}, {}, {}, {} FROM comments c JOIN tasks t ON t.id = c.task_id LEFT JOIN teams tm ON tm.id = t.team_id WHERE {}",
                uuid_text("c.id"),
                uuid_text("c.author_id"),
                uuid_text("t.team_id"),
                uuid_text("tm.organization_id"),
                uuid_eq("c.id"),
            ),
            // the log has no per-entry scope rows
            EntityType::AuditLog => return Ok(None),
        };

        let Some(row) = self.fetch(sql, entity_id).await? else {
            tracing::debug!(entity_type = %entity_type, entity_id = %entity_id, "entity not found");
            return Ok(None);
        };

        let id = uuid_column(&row, "id")?;
        let descriptor = match entity_type {
            EntityType::Task => {
                let mut task = EntityDescriptor::task(id).with_owner(uuid_column(&row, "created_by")?);
                task.assignee_id = opt_uuid_column(&row, "assigned_to")?;
                task.team_id = opt_uuid_column(&row, "team_id")?;
                task.organization_id = opt_uuid_column(&row, "organization_id")?;
                task
            }
            EntityType::Team => EntityDescriptor::team(id, uuid_column(&row, "organization_id")?),
            EntityType::Organization => EntityDescriptor::organization(id),
            EntityType::User => EntityDescriptor::user(id, opt_uuid_column(&row, "organization_id")?),
            EntityType::Comment => {
                let mut comment = EntityDescriptor::comment(id, uuid_column(&row, "author_id")?);
                comment.team_id = opt_uuid_column(&row, "team_id")?;
                comment.organization_id = opt_uuid_column(&row, "organization_id")?;
                comment
            }
            EntityType::AuditLog => return Ok(None),
        };

        Ok(Some(descriptor))
    }
}
