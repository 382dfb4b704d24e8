use crate::backup;
use crate::ipc::error::{err, internal_err, ok};
use crate::ipc::helpers::{optional_i64, require_db, required_str};
use crate::ipc::types::{AppState, Request};
use crate::outbox;
use crate::violations::sync_outbox;
use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match outbox::list(conn, optional_i64(req, "assignmentId")) {
        Ok(entries) => ok(&req.id, json!({ "entries": entries })),
        Err(e) => internal_err(&req.id, e),
    }
}

fn handle_sync(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let api = state.api();
    let report = match sync_outbox(&api, conn) {
        Ok(r) => r,
        Err(e) => return internal_err(&req.id, e),
    };
    drop(api);
    state.note_unauthorized(report.unauthorized);
    ok(&req.id, json!(report))
}

fn handle_discard(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let raw = match required_str(req, "localId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Ok(local_id) = Uuid::parse_str(raw) else {
        return err(&req.id, "bad_params", "localId must be a UUID", None);
    };
    match outbox::remove(conn, local_id) {
        Ok(true) => ok(&req.id, json!({ "localId": local_id, "discarded": true })),
        Ok(false) => err(
            &req.id,
            "not_found",
            "outbox entry not found",
            Some(json!({ "localId": local_id })),
        ),
        Err(e) => internal_err(&req.id, e),
    }
}

fn handle_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let out_path = match required_str(req, "outPath") {
        Ok(v) => v.to_string(),
        Err(e) => return e,
    };
    match backup::export_outbox_bundle(conn, &PathBuf::from(&out_path)) {
        Ok(export) => ok(
            &req.id,
            json!({
                "path": out_path,
                "bundleFormat": export.bundle_format,
                "entryCount": export.entry_count
            }),
        ),
        Err(e) => err(
            &req.id,
            "io_failed",
            format!("{e:#}"),
            Some(json!({ "path": out_path })),
        ),
    }
}

fn handle_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let in_path = match required_str(req, "inPath") {
        Ok(v) => v.to_string(),
        Err(e) => return e,
    };
    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "bundle file not found",
            Some(json!({ "path": in_path })),
        );
    }
    match backup::import_outbox_bundle(conn, &src) {
        Ok(import) => ok(
            &req.id,
            json!({
                "path": in_path,
                "imported": import.imported,
                "skippedExisting": import.skipped_existing,
                "rejectedDigest": import.rejected_digest
            }),
        ),
        Err(e) => err(
            &req.id,
            "io_failed",
            format!("{e:#}"),
            Some(json!({ "path": in_path })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "outbox.list" => Some(handle_list(state, req)),
        "outbox.sync" => Some(handle_sync(state, req)),
        "outbox.discard" => Some(handle_discard(state, req)),
        "outbox.export" => Some(handle_export(state, req)),
        "outbox.import" => Some(handle_import(state, req)),
        _ => None,
    }
}
