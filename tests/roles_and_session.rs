mod test_support;

use classroomd::api::{ApiClient, Body, Method};
use classroomd::auth::{self, CurrentUser, Role, Session};
use classroomd::classes::{create_class, list_classes, ClassInput};
use classroomd::config::Config;
use classroomd::db;
use classroomd::ipc::{handle_request, AppState, Request};
use classroomd::users::{create_user, list_users, UserInput};
use serde_json::json;
use test_support::{temp_dir, FakeBackend};

fn class(id: i64, name: &str) -> serde_json::Value {
    json!({ "id": id, "name": name, "code": format!("C{id}"), "teacher_id": 5 })
}

#[test]
fn class_listing_follows_role() {
    let fake = FakeBackend::new();
    fake.route(Method::Get, "/classes/", 200, json!([class(1, "Algebra"), class(2, "Biology")]));
    fake.route(
        Method::Get,
        "/teachers/me/classes",
        200,
        json!({ "classes": [class(2, "Biology")] }),
    );
    fake.route(Method::Get, "/students/me/classes", 200, json!([class(3, "Chemistry")]));
    let api = ApiClient::new(&fake, "http://backend");

    let admin = list_classes(&api, Role::Admin);
    assert_eq!(admin.classes.len(), 2);
    assert_eq!(admin.strategy, Some("all_classes"));

    let teacher = list_classes(&api, Role::Teacher);
    assert_eq!(teacher.classes.len(), 1);
    assert_eq!(teacher.classes[0].name, "Biology");

    let student = list_classes(&api, Role::Student);
    assert_eq!(student.classes.len(), 1);
    assert_eq!(student.classes[0].name, "Chemistry");
    assert_eq!(student.strategy, Some("student_classes"));
    assert_eq!(fake.count(Method::Get, "/classes/"), 1);
}

#[test]
fn student_never_sees_unenrolled_classes_when_enrollment_fails() {
    for status in [500u16, 404] {
        let fake = FakeBackend::new();
        fake.route(
            Method::Get,
            "/students/me/classes",
            status,
            json!({ "detail": "unavailable" }),
        );
        fake.route(Method::Get, "/classes/", 200, json!([class(1, "Enrolled"), class(2, "NotEnrolled")]));
        fake.route(
            Method::Get,
            "/classes/student/",
            200,
            json!([class(1, "Enrolled"), class(2, "NotEnrolled")]),
        );
        let api = ApiClient::new(&fake, "http://backend");

        let student = list_classes(&api, Role::Student);
        assert!(student.classes.is_empty(), "status {status}: {:?}", student.classes);
        assert!(student.strategy.is_none());
        assert_eq!(fake.count(Method::Get, "/classes/student/"), 0);
        assert_eq!(fake.count(Method::Get, "/classes/"), 0);
    }

    let offline = FakeBackend::offline();
    offline.route(
        Method::Get,
        "/classes/student/",
        200,
        json!([class(1, "Enrolled"), class(2, "NotEnrolled")]),
    );
    let api = ApiClient::new(&offline, "http://backend");
    assert!(list_classes(&api, Role::Student).classes.is_empty());
}

#[test]
fn class_listing_degrades_to_empty_when_offline() {
    let offline = FakeBackend::offline();
    let api = ApiClient::new(&offline, "http://backend");
    let list = list_classes(&api, Role::Teacher);
    assert!(list.classes.is_empty());
    assert!(list.strategy.is_none());
}

#[test]
fn writes_validate_before_sending() {
    let fake = FakeBackend::new();
    let api = ApiClient::new(&fake, "http://backend");

    let err = create_class(
        &api,
        &ClassInput {
            name: Some("  ".into()),
            code: Some("BIO".into()),
            teacher_id: None,
            description: None,
        },
    )
    .expect_err("blank name");
    assert_eq!(err.code(), "validation_failed");

    let err = create_user(
        &api,
        &UserInput {
            username: Some("ab".into()),
            password: Some("secret1".into()),
            role: Some(Role::Student),
        },
    )
    .expect_err("short username");
    assert_eq!(err.code(), "validation_failed");

    let err = create_user(
        &api,
        &UserInput {
            username: Some("abby".into()),
            password: Some("12345".into()),
            role: Some(Role::Student),
        },
    )
    .expect_err("short password");
    assert!(err.to_string().contains("Password"));
    assert!(fake.calls().is_empty());
}

#[test]
fn login_exchanges_password_for_token_and_profile() {
    let fake = FakeBackend::new();
    fake.route(
        Method::Post,
        "/token",
        200,
        json!({ "access_token": "tok-1", "token_type": "bearer" }),
    );
    fake.route(
        Method::Get,
        "/users/me",
        200,
        json!({ "id": 5, "username": "mrivera", "role": "teacher", "first_name": "Maria", "last_name": "Rivera" }),
    );

    let session = auth::login(&fake, "http://backend", "mrivera", "hunter22").expect("login");
    assert_eq!(session.token.as_deref(), Some("tok-1"));
    assert_eq!(session.role(), Some(Role::Teacher));
    assert_eq!(
        session.user.as_ref().map(|u| u.display_name()),
        Some("Maria Rivera".to_string())
    );

    let calls = fake.calls();
    match &calls[0].body {
        Body::Form(fields) => {
            assert!(fields.contains(&("grant_type".to_string(), "password".to_string())));
            assert!(fields.contains(&("username".to_string(), "mrivera".to_string())));
        }
        other => panic!("expected form body, got {other:?}"),
    }
    assert_eq!(calls[1].bearer.as_deref(), Some("tok-1"));

    let conn = db::open_in_memory().expect("db");
    auth::persist(&conn, &session).expect("persist");
    let restored = auth::restore(&conn).expect("restore");
    assert_eq!(restored.token, session.token);
    assert_eq!(restored.user, session.user);
}

#[test]
fn bad_credentials_surface_as_unauthorized() {
    let fake = FakeBackend::new();
    fake.route(
        Method::Post,
        "/token",
        401,
        json!({ "detail": "Incorrect username or password" }),
    );
    let err = auth::login(&fake, "http://backend", "mrivera", "wrong").expect_err("401");
    assert_eq!(err.code(), "unauthorized");
    assert_eq!(err.to_string(), "Incorrect username or password");
}

fn req(id: &str, method: &str, params: serde_json::Value) -> Request {
    Request {
        id: id.to_string(),
        method: method.to_string(),
        params,
    }
}

fn signed_in_state(fake: &FakeBackend, role: Role) -> AppState {
    let mut state = AppState::with_transport(Config::default(), fake.boxed());
    state.session = Session {
        token: Some("tok-1".into()),
        user: Some(CurrentUser {
            id: 1,
            username: "someone".into(),
            role,
            first_name: None,
            last_name: None,
        }),
    };
    state
}

#[test]
fn rejected_token_signs_the_session_out() {
    let workspace = temp_dir("classroomd-evict");
    let fake = FakeBackend::new();
    fake.route(
        Method::Get,
        "/assignments/7/violations",
        401,
        json!({ "detail": "Could not validate credentials" }),
    );
    let mut state = signed_in_state(&fake, Role::Teacher);
    let resp = handle_request(
        &mut state,
        req("1", "workspace.select", json!({ "path": workspace.to_string_lossy() })),
    );
    assert_eq!(resp["ok"], true);
    let stored = auth::restore(state.db.as_ref().expect("db")).expect("restore");
    assert_eq!(stored.token.as_deref(), Some("tok-1"));

    let resp = handle_request(&mut state, req("2", "violations.list", json!({ "assignmentId": 7 })));
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "unauthorized");
    assert_eq!(resp["error"]["details"]["redirect"], "/login");
    assert!(!state.session.is_signed_in());

    let stored = auth::restore(state.db.as_ref().expect("db")).expect("restore");
    assert!(stored.token.is_none());
}

#[test]
fn delete_is_admin_only() {
    let fake = FakeBackend::new();
    fake.route(Method::Delete, "/violations/3", 204, serde_json::Value::Null);

    let mut teacher = signed_in_state(&fake, Role::Teacher);
    let resp = handle_request(&mut teacher, req("1", "violations.delete", json!({ "violationId": 3 })));
    assert_eq!(resp["error"]["code"], "forbidden");
    assert_eq!(fake.count(Method::Delete, "/violations/3"), 0);

    let mut admin = signed_in_state(&fake, Role::Admin);
    let resp = handle_request(&mut admin, req("2", "violations.delete", json!({ "violationId": 3 })));
    assert_eq!(resp["ok"], true);
    assert_eq!(resp["result"]["deleted"], true);
    assert_eq!(fake.count(Method::Delete, "/violations/3"), 1);
}

#[test]
fn classes_list_over_ipc_reports_role() {
    let fake = FakeBackend::new();
    fake.route(
        Method::Get,
        "/students/me/classes",
        200,
        json!([class(3, "Chemistry")]),
    );
    let mut state = signed_in_state(&fake, Role::Student);
    let resp = handle_request(&mut state, req("1", "classes.list", json!({})));
    assert_eq!(resp["ok"], true);
    assert_eq!(resp["result"]["role"], "student");
    assert_eq!(resp["result"]["classes"][0]["name"], "Chemistry");
}

#[test]
fn grade_outside_range_is_refused() {
    let fake = FakeBackend::new();
    let mut state = signed_in_state(&fake, Role::Teacher);
    let resp = handle_request(
        &mut state,
        req("1", "submissions.grade", json!({ "submissionId": 11, "grade": 140 })),
    );
    assert_eq!(resp["error"]["code"], "validation_failed");
    assert!(fake.calls().is_empty());
}

#[test]
fn health_reports_the_signed_in_user() {
    let fake = FakeBackend::new();
    let mut state = AppState::with_transport(Config::default(), fake.boxed());
    let resp = handle_request(&mut state, req("1", "health", json!({})));
    assert_eq!(resp["result"]["signedIn"], false);
    assert!(resp["result"]["user"].is_null());

    let mut state = signed_in_state(&fake, Role::Admin);
    let resp = handle_request(&mut state, req("2", "health", json!({})));
    assert_eq!(resp["result"]["signedIn"], true);
    assert_eq!(resp["result"]["user"]["username"], "someone");
    assert_eq!(resp["result"]["user"]["role"], "admin");
    assert!(fake.calls().is_empty());
}

#[test]
fn user_listing_skips_malformed_entries() {
    let fake = FakeBackend::new();
    fake.route(
        Method::Get,
        "/users/",
        200,
        json!([
            { "id": 1, "username": "mrivera", "role": "teacher" },
            { "id": "two", "username": 7 },
            { "id": 3, "username": "sam", "role": "student" }
        ]),
    );
    let api = ApiClient::new(&fake, "http://backend");
    let users = list_users(&api);
    let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, ["mrivera", "sam"]);
}
