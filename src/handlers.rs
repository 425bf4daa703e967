// src/handlers.rs
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::clock_engine::{PunchDirection, PunchOutcome};
use crate::error::EngineError;
use crate::models::{
    ApiResponse, ClockRecord, CreatePlanningRequest, CreateTeamRequest, CreateUserTeamRequest,
    Id, MemberPlanningSwap, PatchScheduleRequest, PlanningWithSchedules, ReplacePlanningRequest,
    Schedule, Team, TeamPlanningSwap, UserTeam,
};
use crate::resolver::AttendanceCore;

const CLOCK_HISTORY_LIMIT: usize = 20;

pub fn router(core: AttendanceCore) -> Router {
    let api = Router::new()
        .route("/teams", post(create_team))
        .route("/teams/{id}", get(get_team))
        .route(
            "/teams/{id}/planning",
            put(replace_team_planning).delete(clear_team_planning),
        )
        .route("/user-teams", post(create_user_team))
        .route("/user-teams/{id}", get(get_user_team))
        .route("/user-teams/{id}/planning", put(replace_member_planning))
        .route(
            "/user-teams/{id}/clocks",
            post(punch).get(list_clocks),
        )
        .route("/plannings", post(create_planning))
        .route("/plannings/{id}", get(get_planning).delete(delete_planning))
        .route("/schedules/{id}", patch(patch_schedule));
    Router::new()
        .nest("/api", api)
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(core)
}

async fn status(State(core): State<AttendanceCore>) -> Result<Json<serde_json::Value>, EngineError> {
    let (plannings, schedules, teams, user_teams, clocks) = core.store.counts().await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "plannings": plannings,
        "schedules": schedules,
        "teams": teams,
        "userTeams": user_teams,
        "clocks": clocks,
    })))
}

async fn create_team(
    State(core): State<AttendanceCore>,
    Json(req): Json<CreateTeamRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Team>>), EngineError> {
    let team = core
        .create_team(&req.name, req.lateness_limit, &req.timezone)
        .await?;
    info!("Created team {} ({})", team.id, team.name);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Team created", team)),
    ))
}

async fn get_team(
    State(core): State<AttendanceCore>,
    Path(id): Path<Id>,
) -> Result<Json<ApiResponse<Team>>, EngineError> {
    let team = core.get_team(id).await?;
    Ok(Json(ApiResponse::ok("Team found", team)))
}

async fn replace_team_planning(
    State(core): State<AttendanceCore>,
    Path(id): Path<Id>,
    Json(req): Json<ReplacePlanningRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TeamPlanningSwap>>), EngineError> {
    let swap = core.replace_team_default(id, req.schedules.as_deref()).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Team default planning replaced", swap)),
    ))
}

async fn clear_team_planning(
    State(core): State<AttendanceCore>,
    Path(id): Path<Id>,
) -> Result<Json<ApiResponse<Team>>, EngineError> {
    let team = core.clear_team_default(id).await?;
    Ok(Json(ApiResponse::ok("Team default planning unset", team)))
}

async fn create_user_team(
    State(core): State<AttendanceCore>,
    Json(req): Json<CreateUserTeamRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserTeam>>), EngineError> {
    let user_team = core
        .create_user_team(req.user_id, req.team_id, req.role)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("User added to team", user_team)),
    ))
}

async fn get_user_team(
    State(core): State<AttendanceCore>,
    Path(id): Path<Id>,
) -> Result<Json<ApiResponse<UserTeam>>, EngineError> {
    let user_team = core.get_user_team(id).await?;
    Ok(Json(ApiResponse::ok("Association found", user_team)))
}

async fn replace_member_planning(
    State(core): State<AttendanceCore>,
    Path(id): Path<Id>,
    Json(req): Json<ReplacePlanningRequest>,
) -> Result<(StatusCode, Json<ApiResponse<MemberPlanningSwap>>), EngineError> {
    let swap = core
        .replace_member_planning(id, req.schedules.as_deref())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Member planning replaced", swap)),
    ))
}

async fn create_planning(
    State(core): State<AttendanceCore>,
    Json(req): Json<CreatePlanningRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PlanningWithSchedules>>), EngineError> {
    let created = core
        .create_planning(req.schedules.as_deref(), req.is_default)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Planning created", created)),
    ))
}

async fn get_planning(
    State(core): State<AttendanceCore>,
    Path(id): Path<Id>,
) -> Result<Json<ApiResponse<PlanningWithSchedules>>, EngineError> {
    let planning = core.get_planning_with_schedules(id).await?;
    Ok(Json(ApiResponse::ok("Planning found", planning)))
}

async fn delete_planning(
    State(core): State<AttendanceCore>,
    Path(id): Path<Id>,
) -> Result<Json<ApiResponse<serde_json::Value>>, EngineError> {
    core.delete_planning(id).await?;
    Ok(Json(ApiResponse::ok(
        "Planning deleted",
        serde_json::json!({ "id": id }),
    )))
}

async fn patch_schedule(
    State(core): State<AttendanceCore>,
    Path(id): Path<Id>,
    Json(req): Json<PatchScheduleRequest>,
) -> Result<Json<ApiResponse<Schedule>>, EngineError> {
    let schedule = core.patch_schedule(id, &req).await?;
    Ok(Json(ApiResponse::ok("Schedule updated", schedule)))
}

async fn punch(
    State(core): State<AttendanceCore>,
    Path(id): Path<Id>,
) -> Result<(StatusCode, Json<ApiResponse<PunchOutcome>>), EngineError> {
    let outcome = core.punch(id).await?;
    let (status, message) = match outcome.direction {
        PunchDirection::In => (StatusCode::CREATED, "Clocked in"),
        PunchDirection::Out => (StatusCode::OK, "Clocked out"),
    };
    let is_late = outcome.is_late;
    let warnings = outcome.warnings.clone();
    let body = ApiResponse::ok(message, outcome)
        .with_warnings(warnings)
        .with_is_late(is_late);
    Ok((status, Json(body)))
}

async fn list_clocks(
    State(core): State<AttendanceCore>,
    Path(id): Path<Id>,
) -> Result<Json<ApiResponse<Vec<ClockRecord>>>, EngineError> {
    let clocks = core.list_clocks(id, CLOCK_HISTORY_LIMIT).await?;
    Ok(Json(ApiResponse::ok("Clock history", clocks)))
}
