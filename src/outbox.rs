use anyhow::{anyhow, Context};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::violations::{timestamp, Violation};

pub const BACKUP_KEY_PREFIX: &str = "violations_backup_";

pub fn backup_key(assignment_id: i64) -> String {
    format!("{BACKUP_KEY_PREFIX}{assignment_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    /// The backend refused the payload; kept for inspection, never retried.
    Rejected,
    /// Accepted by the backend as `server_id`; excluded from reads.
    Synced,
}

impl EntryStatus {
    fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Rejected => "rejected",
            EntryStatus::Synced => "synced",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "rejected" => EntryStatus::Rejected,
            "synced" => EntryStatus::Synced,
            _ => EntryStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboxEntry {
    pub local_id: Uuid,
    pub backup_key: String,
    pub assignment_id: i64,
    pub created_at: String,
    pub status: EntryStatus,
    pub attempts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<i64>,
    /// Stored payload no longer matches its digest.
    pub tampered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation: Option<Violation>,
}

pub fn payload_digest(payload: &str) -> String {
    format!("{:x}", Sha256::digest(payload.as_bytes()))
}

/// Stores a locally-created violation. The record must carry a `local_id`.
pub fn append(conn: &Connection, v: &Violation) -> anyhow::Result<Uuid> {
    let local_id = v
        .local_id
        .ok_or_else(|| anyhow!("outbox records need a local_id"))?;
    let payload = serde_json::to_string(v).context("failed to serialize violation")?;
    conn.execute(
        "INSERT INTO violation_outbox(
            local_id, backup_key, assignment_id, student_id, payload, payload_sha256, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?)",
        params![
            local_id.to_string(),
            backup_key(v.assignment_id),
            v.assignment_id,
            v.student_id,
            payload,
            payload_digest(&payload),
            timestamp::format(&Utc::now()),
        ],
    )
    .context("failed to insert outbox entry")?;
    Ok(local_id)
}

const SELECT_COLUMNS: &str = "local_id, backup_key, assignment_id, payload, payload_sha256,
     created_at, status, attempts, last_error, server_id";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<OutboxEntry> {
    let local_id: String = row.get(0)?;
    let payload: String = row.get(3)?;
    let digest: String = row.get(4)?;
    let status: String = row.get(6)?;

    let tampered = payload_digest(&payload) != digest;
    let violation = if tampered {
        None
    } else {
        serde_json::from_str::<Violation>(&payload).ok()
    };

    Ok(OutboxEntry {
        local_id: Uuid::parse_str(&local_id).unwrap_or_else(|_| Uuid::nil()),
        backup_key: row.get(1)?,
        assignment_id: row.get(2)?,
        created_at: row.get(5)?,
        status: EntryStatus::parse(&status),
        attempts: row.get(7)?,
        last_error: row.get(8)?,
        server_id: row.get(9)?,
        tampered: tampered || violation.is_none(),
        violation,
    })
}

pub fn list(conn: &Connection, assignment_id: Option<i64>) -> anyhow::Result<Vec<OutboxEntry>> {
    let entries = match assignment_id {
        Some(aid) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM violation_outbox
                 WHERE backup_key = ?
                 ORDER BY created_at, rowid"
            ))?;
            let rows = stmt
                .query_map([backup_key(aid)], entry_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM violation_outbox ORDER BY created_at, rowid"
            ))?;
            let rows = stmt
                .query_map([], entry_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(entries)
}

/// Locally held violations for an assignment that have not been accepted
/// by the backend. Tampered rows are skipped.
pub fn backups_for_assignment(conn: &Connection, assignment_id: i64) -> anyhow::Result<Vec<Violation>> {
    let mut out = Vec::new();
    for e in list(conn, Some(assignment_id))? {
        if e.status == EntryStatus::Synced {
            continue;
        }
        if e.tampered {
            warn!(local_id = %e.local_id, "outbox entry failed its integrity check");
            continue;
        }
        if let Some(v) = e.violation {
            out.push(v);
        }
    }
    Ok(out)
}

pub fn pending(conn: &Connection) -> anyhow::Result<Vec<OutboxEntry>> {
    Ok(list(conn, None)?
        .into_iter()
        .filter(|e| e.status == EntryStatus::Pending && !e.tampered)
        .collect())
}

pub fn get(conn: &Connection, local_id: Uuid) -> anyhow::Result<Option<OutboxEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM violation_outbox WHERE local_id = ?"
    ))?;
    Ok(stmt
        .query_row([local_id.to_string()], entry_from_row)
        .optional()?)
}

pub fn mark_synced(conn: &Connection, local_id: Uuid, server_id: Option<i64>) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE violation_outbox
         SET status = ?, server_id = ?, attempts = attempts + 1, last_error = NULL
         WHERE local_id = ?",
        params![EntryStatus::Synced.as_str(), server_id, local_id.to_string()],
    )?;
    Ok(())
}

pub fn mark_rejected(conn: &Connection, local_id: Uuid, message: &str) -> anyhow::Result<()> {
    set_status(conn, local_id, EntryStatus::Rejected, Some(message))
}

pub fn record_failed_attempt(conn: &Connection, local_id: Uuid, message: &str) -> anyhow::Result<()> {
    set_status(conn, local_id, EntryStatus::Pending, Some(message))
}

fn set_status(
    conn: &Connection,
    local_id: Uuid,
    status: EntryStatus,
    message: Option<&str>,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE violation_outbox
         SET status = ?, attempts = attempts + 1, last_error = ?
         WHERE local_id = ?",
        params![status.as_str(), message, local_id.to_string()],
    )?;
    Ok(())
}

pub fn remove(conn: &Connection, local_id: Uuid) -> anyhow::Result<bool> {
    let n = conn.execute(
        "DELETE FROM violation_outbox WHERE local_id = ?",
        [local_id.to_string()],
    )?;
    Ok(n > 0)
}

/// Drops local copies of a violation the backend has deleted: rows synced as
/// `server_id`, plus unsynced rows describing the same event.
pub fn prune_deleted(conn: &Connection, server_id: i64, deleted: Option<&Violation>) -> anyhow::Result<usize> {
    let mut removed = conn.execute(
        "DELETE FROM violation_outbox WHERE server_id = ?",
        [server_id],
    )?;
    if let Some(d) = deleted {
        let key = d.composite_key();
        for e in list(conn, Some(d.assignment_id))? {
            let same = e
                .violation
                .as_ref()
                .map(|v| v.composite_key() == key)
                .unwrap_or(false);
            if same && remove(conn, e.local_id)? {
                removed += 1;
            }
        }
    }
    Ok(removed)
}
