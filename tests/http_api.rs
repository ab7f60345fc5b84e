use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use ulid::Ulid;

use classgrid::directory::{Cohort, CourseUnit, InMemoryDirectory, Instructor, InstructorStatus, Program};
use classgrid::engine::Engine;
use classgrid::http::{self, AppState, AssignmentView};

// ── Test infrastructure ──────────────────────────────────────

struct Ids {
    cohort: Ulid,
    program: Ulid,
    course_unit: Ulid,
    t1: Ulid,
    t2: Ulid,
    retired: Ulid,
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    ids: Ids,
    directory: Arc<InMemoryDirectory>,
}

async fn start_test_server() -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();

    let ids = Ids {
        cohort: Ulid::new(),
        program: Ulid::new(),
        course_unit: Ulid::new(),
        t1: Ulid::new(),
        t2: Ulid::new(),
        retired: Ulid::new(),
    };
    let directory = Arc::new(InMemoryDirectory::new());
    directory.insert_cohort(Cohort { id: ids.cohort, name: "L1 Info A".into(), active: true });
    directory.insert_program(Program { id: ids.program, name: "Informatique".into() });
    directory.insert_course_unit(CourseUnit {
        id: ids.course_unit,
        program_id: ids.program,
        name: "Algorithmique".into(),
        coefficient: 3.0,
    });
    for (id, status) in [
        (ids.t1, InstructorStatus::Active),
        (ids.t2, InstructorStatus::Active),
        (ids.retired, InstructorStatus::Inactive),
    ] {
        directory.insert_instructor(Instructor { id, name: id.to_string(), status });
    }
    directory.link_program(ids.cohort, ids.program);

    let dir = std::env::temp_dir().join(format!("classgrid_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let engine = Arc::new(Engine::new(dir.join("classgrid.wal"), directory.clone()).unwrap());

    tokio::spawn(http::serve(listener, AppState { engine }, std::future::pending()));

    TestServer {
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
        ids,
        directory,
    }
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn body(&self, instructor: Ulid, slots: Value) -> Value {
        json!({
            "cohortId": self.ids.cohort.to_string(),
            "programId": self.ids.program.to_string(),
            "courseUnitId": self.ids.course_unit.to_string(),
            "instructorId": instructor.to_string(),
            "slots": slots,
            "period": { "startDate": "2026-01-05", "endDate": "2026-06-26" },
        })
    }

    async fn post(&self, body: &Value) -> (StatusCode, Value) {
        let resp = self.client.post(self.url("/assignments")).json(body).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn health() {
    let srv = start_test_server().await;
    let resp = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn create_then_conflict() {
    let srv = start_test_server().await;

    let (status, created) = srv
        .post(&srv.body(
            srv.ids.t1,
            json!([{ "day": "mon", "startTime": "09:00", "endTime": "11:00", "roomLabel": "Room A" }]),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let created: AssignmentView = serde_json::from_value(created).unwrap();
    let room = created.slots[0].room.clone().unwrap();
    assert_eq!(room.name, "Room A");

    // Different instructor, same room spelled differently.
    let (status, body) = srv
        .post(&srv.body(
            srv.ids.t2,
            json!([{ "day": "monday", "startTime": "09:30", "endTime": "10:30", "roomLabel": "room a" }]),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "scheduling_conflict");
    assert_eq!(body["conflicts"]["instructorConflicts"], json!([]));
    let room_conflicts = body["conflicts"]["roomConflicts"].as_array().unwrap();
    assert_eq!(room_conflicts.len(), 1);
    assert_eq!(room_conflicts[0]["assignmentId"], created.id.to_string());
    assert_eq!(room_conflicts[0]["overlaps"][0]["existing"]["roomId"], room.id.to_string());

    let rooms: Value = srv.client.get(srv.url("/rooms")).send().await.unwrap().json().await.unwrap();
    assert_eq!(rooms.as_array().unwrap().len(), 1);
    assert_eq!(rooms[0]["capacity"], 30);
}

#[tokio::test]
async fn reference_errors_map_to_statuses() {
    let srv = start_test_server().await;
    let slots = json!([{ "day": "tue", "startTime": "08:00", "endTime": "10:00" }]);

    let (status, body) = srv.post(&srv.body(Ulid::new(), slots.clone())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["entity"], "instructor");

    let (status, body) = srv.post(&srv.body(srv.ids.retired, slots.clone())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "instructor_inactive");
    assert_eq!(body["instructorId"], srv.ids.retired.to_string());

    srv.directory.unlink_program(srv.ids.cohort, srv.ids.program);
    let (status, body) = srv.post(&srv.body(srv.ids.t1, slots)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "program_not_linked");
}

#[tokio::test]
async fn malformed_input_is_bad_request() {
    let srv = start_test_server().await;

    let (status, body) = srv
        .post(&srv.body(srv.ids.t1, json!([{ "day": "mon", "startTime": "11:00", "endTime": "09:00" }])))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, body) = srv
        .post(&srv.body(srv.ids.t1, json!([{ "day": "someday", "startTime": "08:00", "endTime": "09:00" }])))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let resp = srv
        .client
        .get(srv.url("/assignments?cohort=not-a-ulid"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = srv.client.delete(srv.url("/assignments")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_update_delete_roundtrip() {
    let srv = start_test_server().await;

    let mut ids = Vec::new();
    for day in ["mon", "tue", "wed"] {
        let (status, body) = srv
            .post(&srv.body(srv.ids.t1, json!([{ "day": day, "startTime": "08:00", "endTime": "10:00" }])))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        ids.push(body["id"].as_str().unwrap().to_string());
    }

    let list: Vec<AssignmentView> = srv
        .client
        .get(srv.url(&format!("/assignments?cohort={}&program=", srv.ids.cohort)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let listed: Vec<String> = list.iter().map(|a| a.id.to_string()).collect();
    let mut newest_first = ids.clone();
    newest_first.reverse();
    assert_eq!(listed, newest_first);

    let mut update = srv.body(
        srv.ids.t2,
        json!([{ "day": "mon", "startTime": "13:00", "endTime": "14:30", "roomLabel": "B12" }]),
    );
    update["id"] = json!(ids[0]);
    let resp = srv.client.put(srv.url("/assignments")).json(&update).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: AssignmentView = resp.json().await.unwrap();
    assert_eq!(updated.instructor_id, srv.ids.t2);
    assert_eq!(updated.slots[0].end_time.to_string(), "14:30");

    let resp = srv.client.get(srv.url(&format!("/assignments/{}", ids[0]))).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = srv
        .client
        .delete(srv.url(&format!("/assignments?id={}", ids[0])))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["deleted"], ids[0]);

    let resp = srv.client.get(srv.url(&format!("/assignments/{}", ids[0]))).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = srv
        .client
        .delete(srv.url(&format!("/assignments?id={}", ids[0])))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn conflict_preview_writes_nothing() {
    let srv = start_test_server().await;
    let (status, created) = srv
        .post(&srv.body(
            srv.ids.t1,
            json!([{ "day": "fri", "startTime": "10:00", "endTime": "12:00", "roomLabel": "Lab" }]),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let candidate = srv.body(
        srv.ids.t1,
        json!([{ "day": "fri", "startTime": "11:00", "endTime": "13:00", "roomLabel": "Elsewhere" }]),
    );
    let resp = srv
        .client
        .post(srv.url("/assignments/conflicts"))
        .json(&candidate)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let report: Value = resp.json().await.unwrap();
    assert_eq!(report["instructorConflicts"][0]["assignmentId"], created["id"]);
    assert_eq!(report["roomConflicts"], json!([]));

    let mut own = candidate.clone();
    own["id"] = created["id"].clone();
    let report: Value = srv
        .client
        .post(srv.url("/assignments/conflicts"))
        .json(&own)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["instructorConflicts"], json!([]));

    let rooms: Value = srv.client.get(srv.url("/rooms")).send().await.unwrap().json().await.unwrap();
    assert_eq!(rooms.as_array().unwrap().len(), 1);
}
