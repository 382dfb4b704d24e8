use anyhow::{anyhow, Context};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::outbox::{backup_key, payload_digest};

const MANIFEST_ENTRY: &str = "manifest.json";
const ENTRIES_ENTRY: &str = "outbox/entries.json";
pub const BUNDLE_FORMAT_V1: &str = "classroomd-outbox-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped_existing: usize,
    pub rejected_digest: usize,
}

/// Raw outbox row as carried in a bundle; the digest travels with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BundleEntry {
    local_id: String,
    assignment_id: i64,
    student_id: i64,
    payload: String,
    payload_sha256: String,
    created_at: String,
}

/// Writes every unsynced outbox row to a zip bundle for offline hand-off.
pub fn export_outbox_bundle(conn: &Connection, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let mut stmt = conn.prepare(
        "SELECT local_id, assignment_id, student_id, payload, payload_sha256, created_at
         FROM violation_outbox
         WHERE status != 'synced'
         ORDER BY created_at, rowid",
    )?;
    let entries = stmt
        .query_map([], |row| {
            Ok(BundleEntry {
                local_id: row.get(0)?,
                assignment_id: row.get(1)?,
                student_id: row.get(2)?,
                payload: row.get(3)?,
                payload_sha256: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let exported_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at,
        "entryCount": entries.len(),
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(ENTRIES_ENTRY, opts)
        .context("failed to start entries entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&entries)
            .context("failed to serialize outbox entries")?
            .as_bytes(),
    )
    .context("failed to write entries entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: entries.len(),
    })
}

/// Merges a bundle into the local outbox. Rows already present are left
/// alone; rows whose payload does not match the carried digest are dropped.
pub fn import_outbox_bundle(conn: &Connection, in_path: &Path) -> anyhow::Result<ImportSummary> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let mut entries_text = String::new();
    archive
        .by_name(ENTRIES_ENTRY)
        .context("bundle missing outbox/entries.json")?
        .read_to_string(&mut entries_text)
        .context("failed to read outbox/entries.json")?;
    let entries: Vec<BundleEntry> =
        serde_json::from_str(&entries_text).context("outbox/entries.json is invalid")?;

    let tx = conn.unchecked_transaction()?;
    let mut summary = ImportSummary {
        imported: 0,
        skipped_existing: 0,
        rejected_digest: 0,
    };
    for e in entries {
        if payload_digest(&e.payload) != e.payload_sha256 {
            summary.rejected_digest += 1;
            continue;
        }
        let n = tx.execute(
            "INSERT OR IGNORE INTO violation_outbox(
                local_id, backup_key, assignment_id, student_id, payload, payload_sha256, created_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?)",
            params![
                e.local_id,
                backup_key(e.assignment_id),
                e.assignment_id,
                e.student_id,
                e.payload,
                e.payload_sha256,
                e.created_at,
            ],
        )?;
        if n == 0 {
            summary.skipped_existing += 1;
        } else {
            summary.imported += 1;
        }
    }
    tx.commit().context("failed to commit bundle import")?;

    Ok(summary)
}
