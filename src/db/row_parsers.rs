use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::audit::AuditEntry;
use crate::errors::AppError;

/// Fixed-width RFC3339 so stored timestamps order lexicographically.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    // Try RFC3339 first (e.g. 2025-11-19T12:34:56Z)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite default timestamp format: "YYYY-MM-DD HH:MM:SS" (with optional fractional seconds)
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::internal("invalid datetime: date out of range"))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

pub fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(s.trim()).map_err(|e| AppError::internal(format!("invalid uuid {s}: {e}")))
}

pub fn parse_opt_uuid(s: Option<String>) -> Result<Option<Uuid>, AppError> {
    match s.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => parse_uuid(raw).map(Some),
    }
}

pub fn uuid_column(row: &SqliteRow, column: &str) -> Result<Uuid, AppError> {
    let raw: String = row
        .try_get(column)
        .map_err(|e| AppError::internal(format!("missing {column}: {e}")))?;
    parse_uuid(&raw)
}

pub fn opt_uuid_column(row: &SqliteRow, column: &str) -> Result<Option<Uuid>, AppError> {
    let raw: Option<String> = row
        .try_get(column)
        .map_err(|e| AppError::internal(format!("missing {column}: {e}")))?;
    parse_opt_uuid(raw)
}

pub fn audit_entry_from_row(row: &SqliteRow) -> Result<AuditEntry, AppError> {
    let action: String = row.try_get("action").map_err(|e| AppError::internal(format!("missing action: {}", e)))?;
    let entity_type: String = row.try_get("entity_type").map_err(|e| AppError::internal(format!("missing entity_type: {}", e)))?;
    let details: Option<String> = row.try_get("details").map_err(|e| AppError::internal(format!("missing details: {}", e)))?;
    let source_address: Option<String> = row.try_get("source_address").map_err(|e| AppError::internal(format!("missing source_address: {}", e)))?;
    let created_at_s: String = row.try_get("created_at").map_err(|e| AppError::internal(format!("missing created_at: {}", e)))?;

    Ok(AuditEntry {
        id: uuid_column(row, "id")?,
        actor_id: uuid_column(row, "actor_id")?,
        action: action.parse()?,
        entity_type: entity_type.parse()?,
        entity_id: opt_uuid_column(row, "entity_id")?,
        details,
        source_address,
        created_at: parse_datetime(&created_at_s)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{SubsecRound, Timelike};

    #[test]
    fn timestamps_are_fixed_width_and_parse_back() {
        let now = Utc::now().trunc_subsecs(6);
        let whole = now.with_nanosecond(0).unwrap();
        let a = format_timestamp(whole);
        let b = format_timestamp(now);
        assert_eq!(a.len(), b.len());
        assert_eq!(parse_datetime(&b).unwrap(), now);
    }

    #[test]
    fn sqlite_and_date_only_formats_are_accepted() {
        let dt = parse_datetime("2025-03-04 05:06:07").unwrap();
        assert_eq!(format_timestamp(dt), "2025-03-04T05:06:07.000000Z");
        let day = parse_datetime("2025-03-04").unwrap();
        assert_eq!(format_timestamp(day), "2025-03-04T00:00:00.000000Z");
        assert!(parse_datetime("yesterday").is_err());
    }

    #[test]
    fn blank_optional_uuid_is_none() {
        assert_eq!(parse_opt_uuid(Some("  ".into())).unwrap(), None);
        assert_eq!(parse_opt_uuid(None).unwrap(), None);
        assert!(parse_opt_uuid(Some("nope".into())).is_err());
    }
}
