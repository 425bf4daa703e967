// src/error.rs
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDate;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::models::{ApiResponse, ClockRecord, Team};
use crate::store::StoreError;

/// Error taxonomy for the attendance core. Validation and conflict errors
/// are never retried; store errors trigger compensation where the planning
/// coordinator is involved.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Already clocked in for the work day starting {work_day}; multiple clock-ins per work day are not allowed")]
    DuplicateClockIn {
        work_day: NaiveDate,
        conflicts: Vec<ClockRecord>,
    },
    #[error("Planning is set as the default planning of {} team(s) and cannot be deleted", .teams.len())]
    PlanningReferencedByTeams { teams: Vec<Team> },
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Conflict(_)
            | EngineError::DuplicateClockIn { .. }
            | EngineError::PlanningReferencedByTeams { .. } => StatusCode::CONFLICT,
            EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Internal error serving request: {}", self);
        }
        let message = self.to_string();
        // Conflict variants carry the rows the client needs for display.
        let data = match &self {
            EngineError::DuplicateClockIn { conflicts, .. } => {
                Some(json!({ "conflicts": conflicts }))
            }
            EngineError::PlanningReferencedByTeams { teams } => Some(json!({ "teams": teams })),
            _ => None,
        };
        let body = ApiResponse::<serde_json::Value> {
            success: false,
            message: message.clone(),
            data,
            error: Some(message),
            warnings: None,
            is_late: None,
        };
        (status, Json(body)).into_response()
    }
}
