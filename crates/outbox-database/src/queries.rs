//! Standalone outbox query functions.
//!
//! Each function takes a `&Connection` as its first parameter and runs on the
//! executor thread. Status transitions are single conditional `UPDATE`s keyed
//! on the current status, which makes them safe against other connections to
//! the same file.

use crate::{OutboxRecord, OutboxStatus, RecordId, StoreError, StoreResult};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::debug;

const RECORD_COLUMNS: &str =
    "id, topic, payload, status, created_at, claimed_at, claimant_id, retry_count, completed_at";

/// Fixed-width RFC 3339 so that text order matches time order.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_optional_timestamp(idx: usize, s: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_timestamp(idx, s)).transpose()
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<OutboxRecord> {
    let status = row
        .get::<_, String>(3)?
        .parse::<OutboxStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    Ok(OutboxRecord {
        id: RecordId::from_string(row.get::<_, String>(0)?),
        topic: row.get(1)?,
        payload: row.get(2)?,
        status,
        created_at: parse_timestamp(4, row.get(4)?)?,
        claimed_at: parse_optional_timestamp(5, row.get(5)?)?,
        claimant_id: row.get(6)?,
        retry_count: row.get(7)?,
        completed_at: parse_optional_timestamp(8, row.get(8)?)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Explain why a fenced transition matched no row.
fn transition_error(
    conn: &Connection,
    id: &RecordId,
    claimant_id: &str,
    to: OutboxStatus,
) -> StoreError {
    let current: Option<(String, Option<String>)> = match conn
        .query_row(
            "SELECT status, claimant_id FROM outbox_records WHERE id = ?1",
            params![id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
    {
        Ok(current) => current,
        Err(e) => return e.into(),
    };
    let Some((status, holder)) = current else {
        return StoreError::NotFound(id.to_string());
    };
    let from = match status.parse::<OutboxStatus>() {
        Ok(from) => from,
        Err(e) => return e,
    };
    if from == OutboxStatus::InProgress && holder.as_deref() != Some(claimant_id) {
        return StoreError::ClaimLost {
            id: id.to_string(),
            claimant_id: claimant_id.to_string(),
        };
    }
    StoreError::InvalidTransition {
        id: id.to_string(),
        from,
        to,
    }
}

/// Insert a record as pending.
pub fn insert_record(conn: &Connection, record: &OutboxRecord) -> StoreResult<()> {
    let result = conn.execute(
        "INSERT INTO outbox_records (id, topic, payload, status, created_at, retry_count)
         VALUES (?1, ?2, ?3, 'pending', ?4, 0)",
        params![
            record.id.as_str(),
            record.topic,
            record.payload,
            format_timestamp(&record.created_at),
        ],
    );
    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateId(record.id.to_string())),
        Err(e) => Err(e.into()),
    }
}

pub fn get_record(conn: &Connection, id: &RecordId) -> StoreResult<Option<OutboxRecord>> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM outbox_records WHERE id = ?1");
    let mut stmt = conn.prepare_cached(&sql)?;
    Ok(stmt
        .query_row(params![id.as_str()], record_from_row)
        .optional()?)
}

/// Claim up to `max_count` pending records, oldest first.
///
/// Candidates are read first and then taken one by one with a status-guarded
/// `UPDATE`. A candidate that another connection claimed in between is
/// skipped, and the read is repeated until enough records are claimed or none
/// are pending.
pub fn claim_pending(
    conn: &Connection,
    max_count: usize,
    claimant_id: &str,
    now: DateTime<Utc>,
) -> StoreResult<Vec<OutboxRecord>> {
    let select_sql = format!(
        "SELECT {RECORD_COLUMNS} FROM outbox_records
         WHERE status = 'pending'
         ORDER BY created_at ASC, rowid ASC
         LIMIT ?1"
    );
    let claimed_at = format_timestamp(&now);
    let mut claimed = Vec::new();

    while claimed.len() < max_count {
        let remaining = max_count - claimed.len();
        let candidates = {
            let mut stmt = conn.prepare_cached(&select_sql)?;
            let rows = stmt
                .query_map(params![remaining as i64], record_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        if candidates.is_empty() {
            break;
        }

        for mut record in candidates {
            let updated = conn.execute(
                "UPDATE outbox_records
                 SET status = 'in_progress', claimed_at = ?2, claimant_id = ?3
                 WHERE id = ?1 AND status = 'pending'",
                params![record.id.as_str(), claimed_at, claimant_id],
            )?;
            if updated == 1 {
                record.status = OutboxStatus::InProgress;
                record.claimed_at = Some(now);
                record.claimant_id = Some(claimant_id.to_string());
                claimed.push(record);
            } else {
                debug!(id = %record.id, "Claim lost to another worker");
            }
        }
    }

    Ok(claimed)
}

/// `in_progress → completed` for the current claimant; a no-op on records
/// already completed.
pub fn mark_completed(
    conn: &Connection,
    id: &RecordId,
    claimant_id: &str,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    let updated = conn.execute(
        "UPDATE outbox_records
         SET status = 'completed', completed_at = ?3
         WHERE id = ?1 AND status = 'in_progress' AND claimant_id = ?2",
        params![id.as_str(), claimant_id, format_timestamp(&now)],
    )?;
    if updated == 1 {
        return Ok(());
    }
    match transition_error(conn, id, claimant_id, OutboxStatus::Completed) {
        StoreError::InvalidTransition {
            from: OutboxStatus::Completed,
            ..
        } => Ok(()),
        e => Err(e),
    }
}

/// Count a failed attempt and return the resulting status.
pub fn mark_retry_or_failed(
    conn: &Connection,
    id: &RecordId,
    claimant_id: &str,
    max_retries: u32,
) -> StoreResult<OutboxStatus> {
    let limit = max_retries.max(1);
    let status: Option<String> = conn
        .query_row(
            "UPDATE outbox_records
             SET retry_count = retry_count + 1,
                 status = CASE WHEN retry_count + 1 >= ?2 THEN 'failed' ELSE 'pending' END
             WHERE id = ?1 AND status = 'in_progress' AND claimant_id = ?3
             RETURNING status",
            params![id.as_str(), limit, claimant_id],
            |row| row.get(0),
        )
        .optional()?;
    match status {
        Some(status) => status.parse(),
        None => Err(transition_error(conn, id, claimant_id, OutboxStatus::Pending)),
    }
}

/// `in_progress → pending` without touching the retry count.
pub fn release(conn: &Connection, id: &RecordId, claimant_id: &str) -> StoreResult<()> {
    let updated = conn.execute(
        "UPDATE outbox_records SET status = 'pending'
         WHERE id = ?1 AND status = 'in_progress' AND claimant_id = ?2",
        params![id.as_str(), claimant_id],
    )?;
    if updated == 1 {
        Ok(())
    } else {
        Err(transition_error(conn, id, claimant_id, OutboxStatus::Pending))
    }
}

/// Return in-progress records claimed before `claimed_before` to pending.
pub fn reclaim_stale(conn: &Connection, claimed_before: DateTime<Utc>) -> StoreResult<usize> {
    let updated = conn.execute(
        "UPDATE outbox_records SET status = 'pending'
         WHERE status = 'in_progress'
           AND (claimed_at IS NULL OR claimed_at < ?1)",
        params![format_timestamp(&claimed_before)],
    )?;
    Ok(updated)
}

pub fn count_by_status(conn: &Connection, status: OutboxStatus) -> StoreResult<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM outbox_records WHERE status = ?1",
        params![status.as_str()],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

pub fn list_by_status(
    conn: &Connection,
    status: OutboxStatus,
    limit: usize,
) -> StoreResult<Vec<OutboxRecord>> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM outbox_records
         WHERE status = ?1
         ORDER BY created_at ASC, rowid ASC
         LIMIT ?2"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let records = stmt
        .query_map(params![status.as_str(), limit as i64], record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}
