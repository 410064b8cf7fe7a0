use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::row_parsers::opt_uuid_column;
use super::uuid_sql::{uuid_eq, uuid_text};
use crate::authz::{IdentityContext, Role};
use crate::errors::{AppError, AppResult};

/// Builds the identity of a stored user. Permissions come from the user's
/// role through `role_permissions`; the role level from `roles`.
///
/// For operator tooling. Request handling builds identities from claims.
pub async fn load_identity(pool: &SqlitePool, user_id: Uuid) -> AppResult<Option<IdentityContext>> {
    let sql = format!(
        "SELECT u.role, r.level, {}, {} FROM users u JOIN roles r ON r.name = u.role WHERE {}",
        uuid_text("u.organization_id"),
        uuid_text("u.team_id"),
        uuid_eq("u.id"),
    );
    let id = user_id.to_string();
    let Some(row) = sqlx::query(&sql).bind(&id).bind(&id).fetch_optional(pool).await? else {
        return Ok(None);
    };

    let role: String = row.try_get("role")?;
    let level: i64 = row.try_get("level")?;
    let role: Role = role.parse()?;
    let level = u8::try_from(level).map_err(|_| AppError::internal(format!("role level out of range: {level}")))?;

    let sql = format!(
        "SELECT rp.permission FROM role_permissions rp JOIN users u ON u.role = rp.role WHERE {} ORDER BY rp.permission",
        uuid_eq("u.id"),
    );
    let permissions: Vec<String> = sqlx::query_scalar(&sql)
        .bind(&id)
        .bind(&id)
        .fetch_all(pool)
        .await?;

    let mut identity = IdentityContext::new(user_id, role)?
        .with_role_level(level)?
        .with_permissions(permissions);
    if let Some(org) = opt_uuid_column(&row, "organization_id")? {
        identity = identity.with_organization(org);
    }
    if let Some(team) = opt_uuid_column(&row, "team_id")? {
        identity = identity.with_team(team);
    }

    Ok(Some(identity))
}
