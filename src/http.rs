//! JSON request/response API over the engine.
//!
//! | Method | Path | |
//! |---|---|---|
//! | GET | `/assignments?cohort=&program=&instructor=&room=` | list, newest first |
//! | POST | `/assignments` | create |
//! | PUT | `/assignments` | update (`id` in body) |
//! | DELETE | `/assignments?id=` | delete |
//! | GET | `/assignments/{id}` | fetch one |
//! | POST | `/assignments/conflicts` | dry-run conflict check |
//! | GET | `/rooms` | room catalog |

use std::future::Future;
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::model::*;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/assignments",
            get(list_assignments)
                .post(create_assignment)
                .put(update_assignment)
                .delete(delete_assignment),
        )
        .route("/assignments/conflicts", post(preview_conflicts))
        .route("/assignments/:id", get(get_assignment))
        .route("/rooms", get(list_rooms))
        .with_state(state)
}

/// Serve until `shutdown` resolves, then finish in-flight requests.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

// ── Payloads ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentUpdate {
    pub id: Ulid,
    #[serde(flatten)]
    pub draft: AssignmentDraft,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictCheck {
    /// Assignment being edited, excluded from its own check.
    #[serde(default)]
    pub id: Option<Ulid>,
    #[serde(flatten)]
    pub draft: AssignmentDraft,
}

/// Query strings take ids as text so `?cohort=` reads as "no filter".
#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    cohort: Option<String>,
    program: Option<String>,
    instructor: Option<String>,
    room: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IdQuery {
    id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRef {
    pub id: Ulid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub day: Weekday,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub room: Option<RoomRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentView {
    pub id: Ulid,
    pub cohort_id: Ulid,
    pub program_id: Ulid,
    pub course_unit_id: Ulid,
    pub instructor_id: Ulid,
    pub slots: Vec<SlotView>,
    pub period: Period,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl AssignmentView {
    fn render(engine: &Engine, a: Assignment) -> Self {
        let slots = a
            .slots
            .iter()
            .map(|s| SlotView {
                day: s.day,
                start_time: s.start_time,
                end_time: s.end_time,
                room: s
                    .room_id
                    .and_then(|id| engine.get_room(&id))
                    .map(|room| RoomRef { id: room.id, name: room.name }),
            })
            .collect();
        Self {
            id: a.id,
            cohort_id: a.cohort_id,
            program_id: a.program_id,
            course_unit_id: a.course_unit_id,
            instructor_id: a.instructor_id,
            slots,
            period: a.period,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    BadRequest(String),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(e: PathRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

fn status_for(e: &EngineError) -> StatusCode {
    match e {
        EngineError::Validation(_) | EngineError::LimitExceeded(_) => StatusCode::BAD_REQUEST,
        EngineError::NotFound(..) => StatusCode::NOT_FOUND,
        EngineError::SchedulingConflict(_) => StatusCode::CONFLICT,
        EngineError::ProgramNotLinked { .. } | EngineError::InstructorInactive(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        EngineError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let e = match self {
            ApiError::BadRequest(message) => {
                let body = json!({ "error": "bad_request", "message": message, "retryable": false });
                return (StatusCode::BAD_REQUEST, Json(body)).into_response();
            }
            ApiError::Engine(e) => e,
        };
        if e.is_retryable() {
            tracing::error!("request failed: {e}");
        }
        let mut body = json!({
            "error": e.label(),
            "message": e.to_string(),
            "retryable": e.is_retryable(),
        });
        match &e {
            EngineError::NotFound(kind, id) => {
                body["entity"] = json!(kind.as_str());
                body["id"] = json!(id.to_string());
            }
            EngineError::ProgramNotLinked {
                cohort_id,
                program_id,
            } => {
                body["cohortId"] = json!(cohort_id.to_string());
                body["programId"] = json!(program_id.to_string());
            }
            EngineError::InstructorInactive(id) => {
                body["instructorId"] = json!(id.to_string());
            }
            EngineError::SchedulingConflict(report) => {
                body["conflicts"] = serde_json::to_value(report).unwrap_or_default();
            }
            _ => {}
        }
        (status_for(&e), Json(body)).into_response()
    }
}

fn parse_id(field: &str, raw: Option<&str>) -> Result<Option<Ulid>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => Ulid::from_string(s)
            .map(Some)
            .map_err(|e| ApiError::BadRequest(format!("invalid {field} id {s:?}: {e}"))),
    }
}

// ── Handlers ─────────────────────────────────────────────────────

async fn list_assignments(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<AssignmentView>>, ApiError> {
    let Query(q) = query?;
    let filter = AssignmentFilter {
        cohort: parse_id("cohort", q.cohort.as_deref())?,
        program: parse_id("program", q.program.as_deref())?,
        instructor: parse_id("instructor", q.instructor.as_deref())?,
        room: parse_id("room", q.room.as_deref())?,
    };
    let views = state
        .engine
        .list_assignments(&filter)
        .into_iter()
        .map(|a| AssignmentView::render(&state.engine, a))
        .collect();
    Ok(Json(views))
}

async fn get_assignment(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<AssignmentView>, ApiError> {
    let Path(raw) = id?;
    let id = parse_id("assignment", Some(raw.as_str()))?
        .ok_or_else(|| ApiError::BadRequest("assignment id is required".into()))?;
    let assignment = state
        .engine
        .get_assignment(&id)
        .ok_or(EngineError::NotFound(crate::engine::EntityKind::Assignment, id))?;
    Ok(Json(AssignmentView::render(&state.engine, assignment)))
}

async fn create_assignment(
    State(state): State<AppState>,
    body: Result<Json<AssignmentDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<AssignmentView>), ApiError> {
    let Json(draft) = body?;
    let assignment = state.engine.create_assignment(draft).await?;
    Ok((StatusCode::CREATED, Json(AssignmentView::render(&state.engine, assignment))))
}

async fn update_assignment(
    State(state): State<AppState>,
    body: Result<Json<AssignmentUpdate>, JsonRejection>,
) -> Result<Json<AssignmentView>, ApiError> {
    let Json(update) = body?;
    let assignment = state.engine.update_assignment(update.id, update.draft).await?;
    Ok(Json(AssignmentView::render(&state.engine, assignment)))
}

async fn delete_assignment(
    State(state): State<AppState>,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Query(q) = query?;
    let id = parse_id("assignment", q.id.as_deref())?
        .ok_or_else(|| ApiError::BadRequest("query parameter `id` is required".into()))?;
    state.engine.delete_assignment(id).await?;
    Ok(Json(json!({ "deleted": id.to_string() })))
}

async fn preview_conflicts(
    State(state): State<AppState>,
    body: Result<Json<ConflictCheck>, JsonRejection>,
) -> Result<Json<ConflictReport>, ApiError> {
    let Json(check) = body?;
    Ok(Json(state.engine.preview_conflicts(&check.draft, check.id)?))
}

async fn list_rooms(State(state): State<AppState>) -> Json<Vec<Room>> {
    Json(state.engine.list_rooms())
}
