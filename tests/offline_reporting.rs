mod test_support;

use serde_json::json;
use test_support::{request, request_ok, spawn_sidecar, temp_dir};

fn report_params(student_id: i64) -> serde_json::Value {
    json!({
        "studentId": student_id,
        "assignmentId": 7,
        "violationType": "tab_switch",
        "description": "Left the assignment tab",
        "timeAwaySeconds": 12,
        "severity": "medium"
    })
}

#[test]
fn offline_report_is_visible_to_list_and_summary() {
    let workspace = temp_dir("classroomd-offline-report");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let reported = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "violations.report",
        report_params(42),
    );
    assert_eq!(reported["persisted"], "outbox");
    assert_eq!(reported["violation"]["student_id"], 42);
    assert!(reported["violation"]["local_id"].is_string());
    assert!(reported["violation"].get("id").is_none());

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "violations.list",
        json!({ "assignmentId": 7 }),
    );
    let violations = listed["violations"].as_array().expect("violations array");
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0]["student_id"], 42);
    assert_eq!(violations[0]["violation_type"], "tab_switch");
    assert_eq!(listed["complete"], false);

    let other = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "violations.list",
        json!({ "assignmentId": 8 }),
    );
    assert_eq!(other["violations"].as_array().map(|a| a.len()), Some(0));

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "violations.summary",
        json!({ "assignmentId": 7 }),
    );
    assert_eq!(summary["source"], "computed");
    assert_eq!(summary["total_violations"], 1);
    assert_eq!(summary["violations_by_type"]["tab_switch"], 1);
    assert_eq!(summary["violations_by_severity"]["medium"], 1);
    assert_eq!(summary["average_time_away_seconds"], 12.0);
    assert_eq!(summary["students_with_violations"], 1);
    assert_eq!(summary["total_students_estimated"], true);

    let entries = request_ok(&mut stdin, &mut reader, "6", "outbox.list", json!({}));
    let entries = entries["entries"].as_array().expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["status"], "pending");
    assert_eq!(entries[0]["backup_key"], "violations_backup_7");

    // Backend still down: the entry stays pending and records the attempt.
    let sync = request_ok(&mut stdin, &mut reader, "7", "outbox.sync", json!({}));
    assert_eq!(sync["pushed"], 0);
    assert_eq!(sync["remaining"], 1);
    assert!(sync["stopped_on"].is_string());

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn invalid_report_is_refused_without_touching_outbox() {
    let workspace = temp_dir("classroomd-invalid-report");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let resp = request(&mut stdin, &mut reader, "2", "violations.report", report_params(0));
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "validation_failed");

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "violations.report",
        json!({ "studentId": 1 }),
    );
    assert_eq!(resp["error"]["code"], "bad_params");

    let entries = request_ok(&mut stdin, &mut reader, "4", "outbox.list", json!({}));
    assert_eq!(entries["entries"].as_array().map(|a| a.len()), Some(0));
    drop(stdin);
    let _ = child.wait();
}

#[test]
fn report_without_workspace_is_unsaved() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let reported = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "violations.report",
        report_params(42),
    );
    assert_eq!(reported["persisted"], "unsaved");
    drop(stdin);
    let _ = child.wait();
}

#[test]
fn outbox_survives_restart_and_can_be_discarded() {
    let workspace = temp_dir("classroomd-outbox-restart");
    {
        let (mut child, mut stdin, mut reader) = spawn_sidecar();
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        let _ = request_ok(&mut stdin, &mut reader, "2", "violations.report", report_params(42));
        drop(stdin);
        let _ = child.wait();
    }

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let entries = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "outbox.list",
        json!({ "assignmentId": 7 }),
    );
    let entries = entries["entries"].as_array().expect("entries").clone();
    assert_eq!(entries.len(), 1);
    let local_id = entries[0]["local_id"].as_str().expect("local id").to_string();

    let discarded = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "outbox.discard",
        json!({ "localId": local_id }),
    );
    assert_eq!(discarded["discarded"], true);

    let again = request(
        &mut stdin,
        &mut reader,
        "4",
        "outbox.discard",
        json!({ "localId": local_id }),
    );
    assert_eq!(again["error"]["code"], "not_found");

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "violations.list",
        json!({ "assignmentId": 7 }),
    );
    assert_eq!(listed["violations"].as_array().map(|a| a.len()), Some(0));
    drop(stdin);
    let _ = child.wait();
}
